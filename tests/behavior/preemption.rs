//! Preemption: a strictly more urgent start suspends the running task at the
//! step boundary that issued it; the suspended task later resumes from its
//! exact suspension point with no lost or replayed steps.

use tileflow::{Scheduler, TaskState, Turn};

use crate::common::{events, full_run, logged, logged_with_trigger, new_trace};

#[test]
fn higher_priority_nested_start_preempts() {
    let scheduler = Scheduler::new();
    let trace = new_trace();

    let b = logged(&scheduler, &trace, "b", 1, 10, 3);
    let a = logged_with_trigger(&scheduler, &trace, "a", 2, 10, 5, Some((2, b)));

    a.start();
    scheduler.run_until_idle();

    assert_eq!(
        events(&trace),
        [
            "a:init", "a:s1", "a:s2", // suspended right after the triggering step
            "b:init", "b:s1", "b:s2", "b:s3", "b:done", // b runs to completion
            "a:s3", "a:s4", "a:s5", "a:done", // a resumes at its next step
        ]
    );
}

#[test]
fn suspension_point_survives_turn_boundaries() {
    let scheduler = Scheduler::new();
    let trace = new_trace();

    let b = logged(&scheduler, &trace, "b", 1, 1, 2);
    let a = logged_with_trigger(&scheduler, &trace, "a", 2, 3, 4, Some((2, b.clone())));

    a.start();

    // Turn 1: a takes two steps, admits b, suspends; b takes its single-step
    // batch and yields mid-run.
    assert_eq!(scheduler.turn(), Turn::Progressed);
    assert_eq!(a.state(), TaskState::Suspended);
    assert_eq!(b.state(), TaskState::Running);
    assert_eq!(
        events(&trace),
        ["a:init", "a:s1", "a:s2", "b:init", "b:s1"]
    );

    // Turn 2: b finishes, a resumes from s3 within the same turn.
    assert_eq!(scheduler.turn(), Turn::Progressed);
    assert_eq!(a.state(), TaskState::Done);
    assert_eq!(b.state(), TaskState::Done);

    let mut expected = vec![
        "a:init".to_string(),
        "a:s1".to_string(),
        "a:s2".to_string(),
        "b:init".to_string(),
        "b:s1".to_string(),
        "b:s2".to_string(),
        "b:done".to_string(),
    ];
    expected.extend(["a:s3".to_string(), "a:s4".to_string(), "a:done".to_string()]);
    assert_eq!(events(&trace), expected);
}

#[test]
fn preemption_chains_nest() {
    let scheduler = Scheduler::new();
    let trace = new_trace();

    let c = logged(&scheduler, &trace, "c", 1, 10, 2);
    let b = logged_with_trigger(&scheduler, &trace, "b", 2, 10, 3, Some((1, c)));
    let a = logged_with_trigger(&scheduler, &trace, "a", 3, 10, 3, Some((1, b)));

    a.start();
    scheduler.run_until_idle();

    assert_eq!(
        events(&trace),
        [
            "a:init", "a:s1", //
            "b:init", "b:s1", //
            "c:init", "c:s1", "c:s2", "c:done", //
            "b:s2", "b:s3", "b:done", //
            "a:s2", "a:s3", "a:done",
        ]
    );
}

#[test]
fn equal_priority_start_does_not_preempt() {
    let scheduler = Scheduler::new();
    let trace = new_trace();

    let b = logged(&scheduler, &trace, "b", 2, 10, 2);
    let a = logged_with_trigger(&scheduler, &trace, "a", 2, 10, 3, Some((1, b)));

    a.start();
    scheduler.run_until_idle();

    let mut expected = full_run("a", 3);
    expected.extend(full_run("b", 2));
    assert_eq!(events(&trace), expected);
}

#[test]
fn independent_urgent_start_preempts_between_turns() {
    let scheduler = Scheduler::new();
    let trace = new_trace();

    let a = logged(&scheduler, &trace, "a", 5, 2, 6);
    a.start();
    scheduler.turn();
    assert_eq!(events(&trace), ["a:init", "a:s1", "a:s2"]);

    // An urgent task started from the host while a is parked mid-run.
    let b = logged(&scheduler, &trace, "b", 1, 10, 2);
    b.start();
    scheduler.run_until_idle();

    let mut expected = vec!["a:init".to_string(), "a:s1".to_string(), "a:s2".to_string()];
    expected.extend(full_run("b", 2));
    expected.extend([
        "a:s3".to_string(),
        "a:s4".to_string(),
        "a:s5".to_string(),
        "a:s6".to_string(),
        "a:done".to_string(),
    ]);
    assert_eq!(events(&trace), expected);
}
