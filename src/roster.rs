//! Phase identities, agent roles, and the fixed per-phase rosters.
//!
//! Rosters are fixed at construction; the manager selects *from* a
//! roster each round but never adds to it. Once Analysis has concluded a
//! source platform, the specialist for the other platform is no longer
//! eligible in later phases.

use crate::context::Platform;
use serde::{Deserialize, Serialize};

/// One of the four ordered pipeline phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    Analysis,
    Design,
    Yaml,
    Documentation,
}

impl PhaseKind {
    pub const ALL: [PhaseKind; 4] = [
        PhaseKind::Analysis,
        PhaseKind::Design,
        PhaseKind::Yaml,
        PhaseKind::Documentation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Analysis => "Analysis",
            Self::Design => "Design",
            Self::Yaml => "YAML",
            Self::Documentation => "Documentation",
        }
    }

    /// The report artifact this phase promises in the output folder.
    pub fn report_artifact(&self) -> &'static str {
        match self {
            Self::Analysis => "analysis_result.md",
            Self::Design => "design_result.md",
            Self::Yaml => "file_converting_result.md",
            Self::Documentation => "migration_report.md",
        }
    }
}

impl std::fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Expert roles that can participate in a phase conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentRole {
    ChiefArchitect,
    EksSpecialist,
    GkeSpecialist,
    AzureSpecialist,
    YamlSpecialist,
    QaEngineer,
    TechnicalWriter,
}

impl AgentRole {
    /// Wire name used in prompts, selections, and telemetry.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::ChiefArchitect => "Chief_Architect",
            Self::EksSpecialist => "EKS_Specialist",
            Self::GkeSpecialist => "GKE_Specialist",
            Self::AzureSpecialist => "Azure_Specialist",
            Self::YamlSpecialist => "YAML_Specialist",
            Self::QaEngineer => "QA_Engineer",
            Self::TechnicalWriter => "Technical_Writer",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        match name {
            "Chief_Architect" => Some(Self::ChiefArchitect),
            "EKS_Specialist" => Some(Self::EksSpecialist),
            "GKE_Specialist" => Some(Self::GkeSpecialist),
            "Azure_Specialist" => Some(Self::AzureSpecialist),
            "YAML_Specialist" => Some(Self::YamlSpecialist),
            "QA_Engineer" => Some(Self::QaEngineer),
            "Technical_Writer" => Some(Self::TechnicalWriter),
            _ => None,
        }
    }

    /// Short description shown to the manager when selecting speakers.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ChiefArchitect => {
                "Leads the analysis, arbitrates expert disagreement, owns hard termination calls"
            }
            Self::EksSpecialist => "Identifies AWS/EKS constructs and their migration implications",
            Self::GkeSpecialist => "Identifies GCP/GKE constructs and their migration implications",
            Self::AzureSpecialist => {
                "Maps source constructs onto Azure services and AKS best practices"
            }
            Self::YamlSpecialist => "Converts Kubernetes manifests and verifies structural fidelity",
            Self::QaEngineer => "Challenges conversions, checks accuracy claims against evidence",
            Self::TechnicalWriter => "Aggregates results into the final migration documentation",
        }
    }

    /// The platform this role specializes in, if any.
    pub fn platform(&self) -> Option<Platform> {
        match self {
            Self::EksSpecialist => Some(Platform::Eks),
            Self::GkeSpecialist => Some(Platform::Gke),
            _ => None,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Fixed roster for a phase, in selection priority order.
pub fn roster(phase: PhaseKind) -> &'static [AgentRole] {
    match phase {
        PhaseKind::Analysis => &[
            AgentRole::ChiefArchitect,
            AgentRole::EksSpecialist,
            AgentRole::GkeSpecialist,
        ],
        PhaseKind::Design => &[
            AgentRole::AzureSpecialist,
            AgentRole::ChiefArchitect,
            AgentRole::EksSpecialist,
            AgentRole::GkeSpecialist,
        ],
        PhaseKind::Yaml => &[
            AgentRole::YamlSpecialist,
            AgentRole::AzureSpecialist,
            AgentRole::QaEngineer,
            AgentRole::TechnicalWriter,
        ],
        PhaseKind::Documentation => &[
            AgentRole::TechnicalWriter,
            AgentRole::ChiefArchitect,
            AgentRole::AzureSpecialist,
            AgentRole::EksSpecialist,
            AgentRole::GkeSpecialist,
            AgentRole::QaEngineer,
        ],
    }
}

/// Safe-fallback role when the manager's selection is malformed,
/// out-of-roster, or platform-ineligible.
pub fn canonical_lead(phase: PhaseKind) -> AgentRole {
    match phase {
        PhaseKind::Analysis => AgentRole::ChiefArchitect,
        PhaseKind::Design => AgentRole::AzureSpecialist,
        PhaseKind::Yaml => AgentRole::YamlSpecialist,
        PhaseKind::Documentation => AgentRole::TechnicalWriter,
    }
}

/// Default round budget per phase.
pub fn default_round_budget(phase: PhaseKind) -> u32 {
    match phase {
        PhaseKind::Analysis => 50,
        PhaseKind::Design | PhaseKind::Yaml | PhaseKind::Documentation => 100,
    }
}

/// Roster filtered by platform awareness: once a source platform is
/// known, the other platform's specialist is not eligible.
pub fn eligible_roles(phase: PhaseKind, platform: Option<Platform>) -> Vec<AgentRole> {
    roster(phase)
        .iter()
        .copied()
        .filter(|role| match (role.platform(), platform) {
            (Some(role_platform), Some(detected)) => role_platform == detected,
            _ => true,
        })
        .collect()
}
