//! Pulse scheduler
//!
//! The host drives all periodic and deferred work from a fixed-rate pulse
//! loop. Work is registered as one-shot or recurring tasks keyed by a
//! caller-supplied value; [`Scheduler::tick`] advances one pulse and
//! returns the keys that came due, and the caller runs the matching work.
//! Recurring tasks are re-armed by the scheduler itself after they fire.
//!
//! Tasks are grouped by category. The sweep only visits categories with
//! pending work, and a whole category can be cancelled at once when a
//! connection is torn down.

use std::collections::BTreeMap;

pub const PULSES_PER_SECOND: u64 = 8;
pub const PULSES_PER_MINUTE: u64 = 60 * PULSES_PER_SECOND;

/// Handle for cancelling a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskId(u64);

#[derive(Debug)]
struct Task<K> {
    id: TaskId,
    key: K,
    remaining: u64,
    /// Re-arm period; `None` for one-shots.
    period: Option<u64>,
}

#[derive(Debug, Default)]
pub struct Scheduler<K> {
    next_id: u64,
    categories: BTreeMap<&'static str, Vec<Task<K>>>,
}

impl<K: Clone> Scheduler<K> {
    pub fn new() -> Self {
        Self {
            next_id: 0,
            categories: BTreeMap::new(),
        }
    }

    /// Fire `key` once, `delay` pulses from now. A zero delay fires on
    /// the next pulse.
    pub fn schedule_once(&mut self, category: &'static str, delay: u64, key: K) -> TaskId {
        self.insert(category, delay, None, key)
    }

    /// Fire `key` every `period` pulses until cancelled.
    pub fn schedule_recurring(&mut self, category: &'static str, period: u64, key: K) -> TaskId {
        let period = period.max(1);
        self.insert(category, period, Some(period), key)
    }

    fn insert(
        &mut self,
        category: &'static str,
        delay: u64,
        period: Option<u64>,
        key: K,
    ) -> TaskId {
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.categories.entry(category).or_default().push(Task {
            id,
            key,
            remaining: delay.max(1),
            period,
        });
        id
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        for tasks in self.categories.values_mut() {
            if let Some(pos) = tasks.iter().position(|task| task.id == id) {
                tasks.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drop every task in a category (connection teardown).
    pub fn clear_category(&mut self, category: &'static str) {
        self.categories.remove(category);
    }

    pub fn has_pending(&self, category: &'static str) -> bool {
        self.categories
            .get(category)
            .is_some_and(|tasks| !tasks.is_empty())
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance one pulse. Returns due keys grouped by category (category
    /// name order, then scheduling order). Idle categories are dropped
    /// from the table, so they cost nothing on later sweeps.
    pub fn tick(&mut self) -> Vec<K> {
        let mut due = Vec::new();
        for tasks in self.categories.values_mut() {
            let mut index = 0;
            while index < tasks.len() {
                tasks[index].remaining -= 1;
                if tasks[index].remaining == 0 {
                    due.push(tasks[index].key.clone());
                    match tasks[index].period {
                        Some(period) => {
                            tasks[index].remaining = period;
                            index += 1;
                        }
                        None => {
                            tasks.remove(index);
                        }
                    }
                } else {
                    index += 1;
                }
            }
        }
        self.categories.retain(|_, tasks| !tasks.is_empty());
        due
    }
}
