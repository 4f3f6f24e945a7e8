//! Process-level statistics and per-rule execution counters.
//!
//! Counters exist mostly for tests and operational sanity checks. Rules with
//! a `track` action additionally appear in the final report, broken down by
//! the note attached to the flight at fire time.

use std::collections::{BTreeMap, BTreeSet};

use comfy_table::Table;

/// Execution counter for a single rule.
#[derive(Debug, Clone, Default)]
pub struct ExecutionCounter {
    pub count: u64,
    /// Note string → fires carrying that note.
    pub notes: BTreeMap<String, u64>,
}

impl ExecutionCounter {
    fn increment(&mut self, note: Option<&str>) {
        self.count += 1;
        if let Some(note) = note {
            *self.notes.entry(note.to_string()).or_insert(0) += 1;
        }
    }
}

/// Engine-wide counters. Owned by the driver thread; readable after the run.
#[derive(Debug, Default)]
pub struct Stats {
    pub reports_read: u64,
    pub reports_dropped: u64,
    pub reports_out_of_order: u64,
    pub flights_created: u64,
    pub flights_expired: u64,
    pub condition_evals: u64,
    pub rules_fired: u64,
    pub callbacks_fired: u64,
    pub callback_panics: u64,
    pub expire_callbacks_fired: u64,
    pub prints_emitted: u64,
    pub notes_set: u64,
    pub webhooks_enqueued: u64,
    pub shells_enqueued: u64,
    pub jobs_dropped: u64,

    counters: BTreeMap<String, ExecutionCounter>,
    tracked: BTreeSet<String>,
}

impl Stats {
    pub fn new() -> Stats {
        Stats::default()
    }

    /// Record a rule fire, with the flight's note at fire time.
    pub fn log_fire(&mut self, rule: &str, note: Option<&str>) {
        self.rules_fired += 1;
        self.counters.entry(rule.to_string()).or_default().increment(note);
    }

    /// Mark a rule for inclusion in the final report.
    pub fn mark_tracked(&mut self, rule: &str) {
        self.tracked.insert(rule.to_string());
    }

    pub fn counter(&self, rule: &str) -> Option<&ExecutionCounter> {
        self.counters.get(rule)
    }

    pub fn fires(&self, rule: &str) -> u64 {
        self.counters.get(rule).map(|c| c.count).unwrap_or(0)
    }

    /// Render the tracked-rule report. Tracked rules that never fired still
    /// appear with a zero count.
    pub fn final_report(&self) -> String {
        let mut table = Table::new();
        table.set_header(vec!["rule", "fires", "notes"]);

        for rule in &self.tracked {
            let counter = self.counters.get(rule).cloned().unwrap_or_default();
            let notes = counter
                .notes
                .iter()
                .map(|(note, n)| format!("{note}: {n}"))
                .collect::<Vec<_>>()
                .join(", ");
            table.add_row(vec![rule.clone(), counter.count.to_string(), notes]);
        }
        table.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
