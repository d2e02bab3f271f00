//! Turning the accumulated tasks into a timeline relative to the first
//! process start.

use crate::trace::{Process, Task};
use indexmap::IndexMap;
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

/// Result of shifting all task timestamps.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Shifted {
    /// latest relative timestamp of any task
    pub end: i64,
    /// tasks that were dispatched but never began
    pub unrun: BTreeSet<u64>,
    /// tasks that never ended
    pub unfinished: BTreeSet<u64>,
}

pub fn earliest_start(processes: &BTreeMap<u64, Process>) -> Option<i64> {
    processes.values().map(|p| p.start).min()
}

/// Make dispatch/begin/end relative to `origin`, leaving unset (zero)
/// timestamps alone. Out of range results clamp instead of overflowing.
pub fn to_relative_time(tasks: &mut IndexMap<u64, Task>, origin: i64) -> Shifted {
    let mut shifted = Shifted::default();
    for task in tasks.values_mut() {
        if task.dispatch != 0 {
            task.dispatch = task.dispatch.saturating_sub(origin);
        }
        if task.begin != 0 {
            task.begin = task.begin.saturating_sub(origin);
        } else {
            shifted.unrun.insert(task.id);
        }
        if task.end != 0 {
            task.end = task.end.saturating_sub(origin);
        } else {
            shifted.unfinished.insert(task.id);
        }
        shifted.end = shifted.end.max(task.dispatch).max(task.begin).max(task.end);
    }
    shifted
}

/// Close tasks that never ran or never finished at the end of the trace.
pub fn fill_incomplete(tasks: &mut IndexMap<u64, Task>, shifted: &Shifted) {
    for id in &shifted.unrun {
        if let Some(task) = tasks.get_mut(id) {
            task.begin = shifted.end;
            task.end = shifted.end;
        }
    }
    for id in &shifted.unfinished {
        if let Some(task) = tasks.get_mut(id) {
            task.end = shifted.end;
        }
    }
}

/// Tasks ordered by dispatch time; equal times keep their first-seen order.
pub fn sort_by_dispatch(tasks: IndexMap<u64, Task>) -> Vec<Task> {
    let mut sorted: Vec<Task> = tasks.into_values().collect();
    sorted.sort_by_key(|task| task.dispatch);
    sorted
}

#[derive(Debug)]
pub struct Timeline {
    pub begin: i64,
    pub end: i64,
    pub tasks: Vec<Task>,
}

/// Shift, back-fill and sort. `origin` is the earliest process start.
pub fn build(mut tasks: IndexMap<u64, Task>, origin: i64) -> Timeline {
    let shifted = to_relative_time(&mut tasks, origin);
    debug!(
        "{} tasks never ran, {} never finished, trace ends at {}",
        shifted.unrun.len(),
        shifted.unfinished.len(),
        shifted.end
    );
    fill_incomplete(&mut tasks, &shifted);
    Timeline { begin: 0, end: shifted.end, tasks: sort_by_dispatch(tasks) }
}
