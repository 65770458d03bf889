//! Scheduler unit tests
//!
//! Covers task identity/state plumbing, spec validation, the ready queue and
//! the dispatch loop. Behavioral ordering scenarios live in tests/behavior.rs.


use crate::scheduler::{Scheduler, SchedulerConfig, TaskBuilder, TaskId, TaskState};

#[cfg(test)]
mod task_id_tests {
    use super::*;

    #[test]
    fn test_task_id_inner() {
        let id = TaskId(42);
        assert_eq!(id.inner(), 42);
        assert_eq!(TaskId::from(7u64), TaskId(7));
    }

    #[test]
    fn test_task_id_display() {
        assert_eq!(TaskId(5).to_string(), "Task(5)");
    }

    #[test]
    fn test_task_id_partial_eq() {
        assert_eq!(TaskId(1), TaskId(1));
        assert_ne!(TaskId(1), TaskId(2));
    }
}

#[cfg(test)]
mod task_state_tests {
    use super::*;

    #[test]
    fn test_task_state_u8_round_trip() {
        for state in [
            TaskState::Created,
            TaskState::Queued,
            TaskState::Running,
            TaskState::Suspended,
            TaskState::Done,
            TaskState::Failed,
            TaskState::Cancelled,
        ] {
            assert_eq!(TaskState::from_u8(state.as_u8()), state);
        }
    }

    #[test]
    fn test_task_state_unknown_u8_maps_to_created() {
        assert_eq!(TaskState::from_u8(200), TaskState::Created);
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(TaskState::Done.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(!TaskState::Running.is_terminal());
        assert!(!TaskState::Suspended.is_terminal());
    }
}

#[cfg(test)]
mod builder_tests {
    use super::*;
    use crate::error::SchedulerError;

    #[test]
    fn test_builder_defaults() {
        let spec = TaskBuilder::new("t")
            .init(|| 0u32)
            .step(|_| false)
            .into_spec()
            .unwrap();
        assert_eq!(spec.name(), "t");
        assert_eq!(spec.priority(), 1);
        assert_eq!(spec.batch(), 1);
    }

    #[test]
    fn test_builder_missing_init_rejected() {
        let err = TaskBuilder::<u32>::new("no-init")
            .step(|_| false)
            .into_spec()
            .unwrap_err();
        assert_eq!(
            err,
            SchedulerError::MissingHook {
                name: "no-init".to_string(),
                hook: "init",
            }
        );
    }

    #[test]
    fn test_builder_missing_step_rejected() {
        let err = TaskBuilder::<u32>::new("no-step")
            .init(|| 0)
            .into_spec()
            .unwrap_err();
        assert!(matches!(err, SchedulerError::MissingHook { hook: "step", .. }));
    }

    #[test]
    fn test_create_rejects_zero_priority() {
        let scheduler = Scheduler::new();
        let spec = TaskBuilder::new("p0")
            .priority(0)
            .init(|| ())
            .step(|_| false)
            .into_spec()
            .unwrap();
        assert_eq!(
            scheduler.create(spec).unwrap_err(),
            SchedulerError::InvalidPriority(0)
        );
    }

    #[test]
    fn test_create_rejects_zero_batch() {
        let scheduler = Scheduler::new();
        let spec = TaskBuilder::new("b0")
            .batch(0)
            .init(|| ())
            .step(|_| false)
            .into_spec()
            .unwrap();
        assert_eq!(scheduler.create(spec).unwrap_err(), SchedulerError::InvalidBatch);
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_config_default_capacity() {
        let config = SchedulerConfig::default();
        assert_eq!(config.capacity, 8);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let scheduler = Scheduler::with_config(SchedulerConfig { capacity: 0 });
        assert_eq!(scheduler.config().capacity, 1);
    }
}

#[cfg(test)]
mod registry_tests {
    use super::*;
    use std::sync::Arc;

    // The registry is process-wide; these tests use capacities no other test
    // touches so parallel test threads cannot interfere.

    #[test]
    fn test_get_instance_memoized_per_capacity() {
        let a = Scheduler::get_instance(71);
        let b = Scheduler::get_instance(71);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_get_instance_distinct_capacities() {
        let a = Scheduler::get_instance(72);
        let b = Scheduler::get_instance(73);
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(a.config().capacity, 72);
        assert_eq!(b.config().capacity, 73);
    }
}
