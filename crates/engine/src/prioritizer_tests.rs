// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use polka_core::{FakeClock, Task};
use std::time::Duration;

fn prioritizer() -> Prioritizer<FakeClock> {
    Prioritizer::new(FakeClock::new())
}

fn fresh_task(clock: &FakeClock) -> Task {
    Task::builder().created_at(clock.epoch_ms()).build()
}

#[test]
fn baseline_priority_is_unchanged() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let task = fresh_task(&clock);
    let result = p.prioritize(vec![task.clone()], &[task.clone()]);
    assert_eq!(result[0].priority, Priority::MEDIUM);
}

#[test]
fn previous_failure_boosts_by_200() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let task = fresh_task(&clock);

    p.record_execution(&task, false);
    let result = p.prioritize(vec![task.clone()], &[task.clone()]);
    assert_eq!(result[0].priority, Priority(800));
}

#[test]
fn success_clears_failure_mark() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let task = fresh_task(&clock);

    p.record_execution(&task, false);
    p.record_execution(&task, true);
    let result = p.prioritize(vec![task.clone()], &[task.clone()]);
    assert_eq!(result[0].priority, Priority::MEDIUM);
}

#[test]
fn incomplete_dependency_penalizes_150() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let dep = fresh_task(&clock);
    let mut task = fresh_task(&clock);
    task.dependencies = vec![dep.id];

    let all = vec![dep.clone(), task.clone()];
    let result = p.prioritize(vec![task.clone()], &all);
    // −150 for the blocked candidate
    assert_eq!(result[0].priority, Priority(450));

    // Once the dependency completes, the penalty disappears.
    let mut done = dep;
    done.status = polka_core::TaskStatus::Completed;
    let all = vec![done, task.clone()];
    let result = p.prioritize(vec![task], &all);
    assert_eq!(result[0].priority, Priority::MEDIUM);
}

#[test]
fn prerequisite_of_incomplete_task_boosts_100() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let base = fresh_task(&clock);
    let mut dependent = fresh_task(&clock);
    dependent.dependencies = vec![base.id];

    let all = vec![base.clone(), dependent.clone()];
    let result = p.prioritize(vec![base.clone()], &all);
    assert_eq!(result[0].priority, Priority(700));
}

#[test]
fn hot_file_boosts_150() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let mut task = fresh_task(&clock);
    task.files = vec!["src/hot.rs".into()];

    for _ in 0..6 {
        p.record_file_change(Path::new("src/hot.rs"));
    }
    let result = p.prioritize(vec![task.clone()], &[task.clone()]);
    assert_eq!(result[0].priority, Priority(750));
}

#[test]
fn five_changes_is_not_yet_hot() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let mut task = fresh_task(&clock);
    task.files = vec!["src/warm.rs".into()];

    for _ in 0..5 {
        p.record_file_change(Path::new("src/warm.rs"));
    }
    let result = p.prioritize(vec![task.clone()], &[task.clone()]);
    assert_eq!(result[0].priority, Priority::MEDIUM);
}

#[test]
fn repeated_file_failures_within_hour_boost_100() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let mut failing = fresh_task(&clock);
    failing.files = vec!["src/flaky.rs".into()];

    // Two failures recorded against the file (also marks the task failed).
    p.record_execution(&failing, false);
    p.record_execution(&failing, false);

    let mut other = fresh_task(&clock);
    other.files = vec!["src/flaky.rs".into()];
    let result = p.prioritize(vec![other.clone()], &[other.clone()]);
    assert_eq!(result[0].priority, Priority(700));
}

#[test]
fn old_file_failures_expire() {
    let clock = FakeClock::new();
    let p = Prioritizer::new(clock.clone());
    let mut failing = fresh_task(&clock);
    failing.files = vec!["src/flaky.rs".into()];

    p.record_execution(&failing, false);
    p.record_execution(&failing, false);
    clock.advance(Duration::from_secs(3700));

    let mut other = Task::builder().created_at(clock.epoch_ms()).build();
    other.files = vec!["src/flaky.rs".into()];
    let result = p.prioritize(vec![other.clone()], &[other.clone()]);
    assert_eq!(result[0].priority, Priority::MEDIUM);
}

#[test]
fn age_boost_caps_at_150() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(30 * 86_400_000);
    let p = Prioritizer::new(clock.clone());

    let two_days = Task::builder().created_at(clock.epoch_ms() - 2 * 86_400_000).build();
    let ten_days = Task::builder().created_at(clock.epoch_ms() - 10 * 86_400_000).build();

    let result = p.prioritize(vec![two_days.clone()], &[two_days.clone()]);
    assert_eq!(result[0].priority, Priority(700));

    let result = p.prioritize(vec![ten_days.clone()], &[ten_days.clone()]);
    assert_eq!(result[0].priority, Priority(750));
}

#[test]
fn retry_boost_caps_at_300() {
    let p = prioritizer();
    let clock = FakeClock::new();

    let mut one_retry = fresh_task(&clock);
    one_retry.retry_count = 1;
    let result = p.prioritize(vec![one_retry.clone()], &[one_retry.clone()]);
    assert_eq!(result[0].priority, Priority(700));

    let mut many_retries = fresh_task(&clock);
    many_retries.retry_count = 7;
    let result = p.prioritize(vec![many_retries.clone()], &[many_retries.clone()]);
    assert_eq!(result[0].priority, Priority(900));
}

#[test]
fn adjustments_clamp_to_range() {
    let p = prioritizer();
    let clock = FakeClock::new();

    // Stack every boost on a CRITICAL task: stays CRITICAL.
    let mut maxed = fresh_task(&clock);
    maxed.priority = Priority::CRITICAL;
    maxed.retry_count = 5;
    p.record_execution(&maxed, false);
    let result = p.prioritize(vec![maxed.clone()], &[maxed.clone()]);
    assert_eq!(result[0].priority, Priority::CRITICAL);

    // A blocked TRIVIAL task stays TRIVIAL.
    let dep = fresh_task(&clock);
    let mut lowest = fresh_task(&clock);
    lowest.priority = Priority::TRIVIAL;
    lowest.dependencies = vec![dep.id];
    let all = vec![dep, lowest.clone()];
    let result = p.prioritize(vec![lowest], &all);
    assert_eq!(result[0].priority, Priority::TRIVIAL);
}

#[test]
fn orders_descending_with_oldest_first_ties() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(10_000_000);
    let p = Prioritizer::new(clock.clone());

    let older = Task::builder().title("older").created_at(1_000).build();
    let newer = Task::builder().title("newer").created_at(2_000).build();
    let mut urgent = Task::builder().title("urgent").created_at(3_000).build();
    urgent.priority = Priority::HIGH;

    let all = vec![older.clone(), newer.clone(), urgent.clone()];
    let result = p.prioritize(vec![newer, older, urgent], &all);

    let titles: Vec<&str> = result.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["urgent", "older", "newer"]);
}

#[test]
fn prioritize_is_deterministic() {
    let clock = FakeClock::new();
    let p = Prioritizer::new(clock.clone());

    let tasks: Vec<Task> = (0..5)
        .map(|i| Task::builder().title(format!("t{}", i)).created_at(1_000 + i).build())
        .collect();
    let first = p.prioritize(tasks.clone(), &tasks);
    let second = p.prioritize(tasks.clone(), &tasks);

    let ids_a: Vec<TaskId> = first.iter().map(|t| t.id).collect();
    let ids_b: Vec<TaskId> = second.iter().map(|t| t.id).collect();
    assert_eq!(ids_a, ids_b);
}

#[test]
fn reset_history_clears_boosts() {
    let p = prioritizer();
    let clock = FakeClock::new();
    let task = fresh_task(&clock);

    p.record_execution(&task, false);
    p.reset_history();
    let result = p.prioritize(vec![task.clone()], &[task.clone()]);
    assert_eq!(result[0].priority, Priority::MEDIUM);
}
