//! Reference world shared by the recorder and the simulator

use wsync_envelope::ClientIdentity;
use wsync_lifecycle::{
    Agent, Artifact, ArtifactStatus, Decision, DecisionStatus, Project, ProjectStatus, Task,
    TaskStatus, WorldSnapshot,
};

pub const REFERENCE_SCENE: &str = "cozy_office_v0";

/// Known-good agents, in seed order
pub const AGENTS: [&str; 3] = ["agent_bd", "agent_eng", "agent_res"];

/// Two executing projects: `task_copy` is blocked on the open `dec_copy`,
/// `task_design` has the delivered `art_design` awaiting review.
#[must_use]
pub fn reference_world() -> WorldSnapshot {
    WorldSnapshot {
        scene_id: Some(REFERENCE_SCENE.to_string()),
        projects: vec![
            Project::new("proj_alpha", "Alpha launch", ProjectStatus::Executing),
            Project::new("proj_beta", "Beta research", ProjectStatus::Executing),
        ],
        agents: vec![
            Agent::new("agent_bd").on_task("task_copy"),
            Agent::new("agent_eng").on_task("task_design"),
            Agent::new("agent_res"),
        ],
        tasks: vec![
            Task::new("task_copy", "proj_alpha", "Write launch copy", TaskStatus::Blocked)
                .with_assignee("agent_bd"),
            Task::new("task_design", "proj_alpha", "Design landing page", TaskStatus::InProgress)
                .with_assignee("agent_eng"),
            Task::new("task_plan", "proj_alpha", "Plan rollout", TaskStatus::Planned),
            Task::new("task_beta", "proj_beta", "Survey users", TaskStatus::Planned),
            Task::new("task_notes", "proj_beta", "Collect notes", TaskStatus::Planned),
        ],
        decisions: vec![
            Decision::new("dec_copy", "proj_alpha", "Which tone?", DecisionStatus::Open)
                .for_task("task_copy"),
        ],
        artifacts: vec![
            Artifact::new("art_design", "proj_alpha", "mockup", ArtifactStatus::Delivered)
                .for_task("task_design"),
        ],
    }
}

#[must_use]
pub fn conformance_client() -> ClientIdentity {
    ClientIdentity::new("wsync-conformance", env!("CARGO_PKG_VERSION"), std::env::consts::OS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_world_is_consistent() {
        let world = reference_world();
        world.validate_references().unwrap();
        for agent in AGENTS {
            assert!(world.agent(agent).is_some(), "{agent} missing");
        }
    }
}
