use proptest::prelude::*;
use wsync_lifecycle::{
    validate_transition, validate_transition_sequence, ArtifactStatus, EntityKind, Lifecycle,
    TaskStatus,
};

fn any_task_status() -> impl Strategy<Value = TaskStatus> {
    prop::sample::select(TaskStatus::ALL.to_vec())
}

fn any_artifact_status() -> impl Strategy<Value = ArtifactStatus> {
    prop::sample::select(ArtifactStatus::ALL.to_vec())
}

#[test]
fn terminal_task_statuses_accept_nothing() {
    for to in TaskStatus::ALL {
        assert!(validate_transition(TaskStatus::Done, *to).is_err());
        assert!(validate_transition(TaskStatus::Cancelled, *to).is_err());
    }
}

#[test]
fn superseded_only_archives() {
    for to in ArtifactStatus::ALL {
        let ok = validate_transition(ArtifactStatus::Superseded, *to).is_ok();
        assert_eq!(ok, *to == ArtifactStatus::Archived);
    }
}

proptest! {
    #[test]
    fn prop_task_hop_agrees_with_table(from in any_task_status(), to in any_task_status()) {
        let res = validate_transition(from, to);
        prop_assert_eq!(res.is_ok(), from.allowed_transitions().contains(&to));
    }

    #[test]
    fn prop_artifact_pairs_agree_with_sequence_check(
        from in any_artifact_status(),
        to in any_artifact_status(),
    ) {
        let single = validate_transition(from, to).is_ok();
        let sequence = validate_transition_sequence(
            EntityKind::Artifact,
            &[from.as_str(), to.as_str()],
        );
        prop_assert_eq!(single, sequence);
    }

    #[test]
    fn prop_single_status_is_never_a_path(status in any_task_status()) {
        prop_assert!(!validate_transition_sequence(EntityKind::Task, &[status.as_str()]));
    }
}
