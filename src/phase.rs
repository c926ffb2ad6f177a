//! Phase descriptor: names a phase, its objective, and the rendered
//! task that seeds the conversation.

use crate::context::ProcessContext;
use crate::prompts;
use crate::roster::PhaseKind;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDescriptor {
    pub kind: PhaseKind,
    pub objective: String,
    /// Task message rendered with the request's folders.
    pub task: String,
}

impl PhaseDescriptor {
    pub fn for_phase(kind: PhaseKind, ctx: &ProcessContext) -> Self {
        Self {
            kind,
            objective: prompts::phase_objective(kind).to_string(),
            task: prompts::phase_task(kind, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MigrationRequest;

    #[test]
    fn descriptor_renders_request_folders() {
        let request = MigrationRequest {
            process_id: "p1".into(),
            container_name: "workloads".into(),
            source_file_folder: "uploads/source".into(),
            workspace_file_folder: "uploads/workspace".into(),
            output_file_folder: "uploads/output".into(),
        };
        let ctx = ProcessContext::new("user", &request);

        let descriptor = PhaseDescriptor::for_phase(PhaseKind::Yaml, &ctx);
        assert_eq!(descriptor.kind, PhaseKind::Yaml);
        assert!(descriptor.task.contains("uploads/source"));
        assert!(descriptor.task.contains("file_converting_result.md"));
        assert!(descriptor.objective.contains("Convert"));
    }
}
