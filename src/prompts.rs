//! Prompt builders for the manager and the expert agents.
//!
//! The prose here is deliberately compact: the structure (selection /
//! termination / filter triple per phase, evidence discipline for
//! hard terminations) is the contract, not the wording.

use crate::context::ProcessContext;
use crate::roster::{AgentRole, PhaseKind};
use crate::tools::ALL_TOOLS;
use crate::verdict::blocking;

/// One-line objective per phase, used in tasks and manager prompts.
pub fn phase_objective(phase: PhaseKind) -> &'static str {
    match phase {
        PhaseKind::Analysis => {
            "Discover all source manifests, conclude the source platform (EKS or GKE), and assess migration readiness"
        }
        PhaseKind::Design => {
            "Design the target Azure architecture for the analyzed workloads and record every architecture decision"
        }
        PhaseKind::Yaml => {
            "Convert every source manifest to an AKS-compatible equivalent and assess conversion quality across network, security, storage, and compute"
        }
        PhaseKind::Documentation => {
            "Aggregate all phase results into the final migration report"
        }
    }
}

/// The task message seeding a phase conversation.
pub fn phase_task(phase: PhaseKind, ctx: &ProcessContext) -> String {
    format!(
        "Coordinate the {phase} step: {objective}\n\n\
         container: {container}\n\
         source folder: {source}\n\
         workspace folder: {workspace}\n\
         output folder: {output}\n\n\
         Available tools: {tools}\n\
         Ground every claim in tool output. Write the phase report \
         ({report}) to the output folder before claiming completion.",
        objective = phase_objective(phase),
        container = ctx.container_name,
        source = ctx.source_file_folder,
        workspace = ctx.workspace_file_folder,
        output = ctx.output_file_folder,
        tools = ALL_TOOLS.join(", "),
        report = phase.report_artifact(),
    )
}

/// System prompt for one expert taking a turn.
pub fn agent_system_prompt(role: AgentRole, phase: PhaseKind) -> String {
    format!(
        "You are {name}: {description}.\n\
         Current step: {phase} - {objective}\n\
         Use the tools to verify before you assert; quote tool results \
         (\"returned:\", \"got error:\") in your findings. Stay within \
         your specialty and keep responses focused.",
        name = role.wire_name(),
        description = role.description(),
        objective = phase_objective(phase),
    )
}

/// User message that hands the floor to the selected agent.
pub fn turn_prompt(role: AgentRole, phase: PhaseKind) -> String {
    format!(
        "{}, it is your turn. Continue the {phase} work from where the conversation stands.",
        role.wire_name(),
    )
}

/// System prompt for the manager's speaker selection.
pub fn selection_prompt(phase: PhaseKind, eligible: &[AgentRole]) -> String {
    let participants = eligible
        .iter()
        .map(|role| format!("{}: {}", role.wire_name(), role.description()))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You manage the {phase} step conversation.\n\
         Participants:\n{participants}\n\n\
         Answer with JSON {{\"result\": \"<participant name>\", \"reason\": \"...\"}}.\n\
         The result must be exactly one participant name from the list, \
         nothing else. Keep an agent speaking while it is mid-task, but \
         do not let one agent stall the conversation."
    )
}

/// System prompt for the manager's termination decision.
pub fn termination_prompt(phase: PhaseKind, ctx: &ProcessContext) -> String {
    let mut prompt = format!(
        "You manage the {phase} step: {objective}\n\
         source folder: {source}\n\
         output folder: {output}\n\n\
         Decide whether the step is complete. Respond with the {phase} \
         verdict JSON only.\n\
         - Continue: {{\"result\": false, \"reason\": \"...\"}}\n\
         - Complete: result true with every required field populated and \
           the report file verified in the output folder. No placeholder \
           values, no invented file names.\n\
         - Blocked: result true, is_hard_terminated true, \
           termination_type \"hard_blocked\", termination_output null, \
           and the verified blocking codes in blocking_issues.\n\
         Hard terminations require independent verification: execute the \
         blob tools yourself and quote their outputs in the reason. Never \
         terminate on another agent's unverified claim.",
        objective = phase_objective(phase),
        source = ctx.source_file_folder,
        output = ctx.output_file_folder,
    );
    if phase == PhaseKind::Analysis {
        prompt.push_str(&format!(
            "\nRecognized blocking codes: {}.",
            blocking::ALL.join(", ")
        ));
    }
    prompt
}

/// System prompt for the manager's end-of-phase summary.
pub fn filter_prompt(phase: PhaseKind) -> String {
    format!(
        "The {phase} step has terminated. Summarize what the experts \
         established, decisions taken, and artifacts produced, as an \
         audit-friendly narrative. Respond with JSON \
         {{\"result\": \"<summary>\", \"reason\": \"...\"}}."
    )
}

/// User message appended for the termination decision.
pub fn termination_instruction(phase: PhaseKind) -> String {
    match phase {
        PhaseKind::Analysis => {
            "Determine if file discovery and platform analysis is complete.".to_string()
        }
        PhaseKind::Design => "Determine if the Azure design is complete.".to_string(),
        PhaseKind::Yaml => "Determine if every manifest conversion is complete.".to_string(),
        PhaseKind::Documentation => {
            "Determine if the migration report is complete.".to_string()
        }
    }
}
