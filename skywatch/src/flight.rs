//! Per-aircraft rolling state.
//!
//! A `Flight` aggregates successive reports for one identifier: the latest
//! two reports, region membership derived from each, sticky notes, per-rule
//! cooldown stamps, and registered expiration callbacks. `FlightView` is the
//! narrow snapshot handed to user callbacks.

use std::collections::HashMap;

use crate::regions::RegionSet;
use crate::report::Report;

/// Rolling altitude window length for trend classification.
const ALT_TRACK_ENTRIES: usize = 5;

/// Altitude trend relative to the recent average.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AltTrend {
    Climbing,
    #[default]
    Level,
    Descending,
}

impl AltTrend {
    pub fn glyph(&self) -> &'static str {
        match self {
            AltTrend::Climbing => "^",
            AltTrend::Level => " ",
            AltTrend::Descending => "v",
        }
    }
}

/// Mutable aggregate for one live aircraft.
#[derive(Debug, Clone)]
pub struct Flight {
    pub ident: String,
    pub first: Report,
    pub last: Report,
    pub prev: Option<Report>,
    /// Region name per region file, derived from `last`.
    pub current_regions: Vec<Option<String>>,
    /// Region name per region file, derived from `prev` (all `None` before
    /// the second report).
    pub previous_regions: Vec<Option<String>>,
    /// Sticky notes set by actions, keyed by rule name.
    pub notes: HashMap<String, String>,
    pub created_at: f64,
    pub last_seen: f64,
    /// Last fire timestamp per rule index.
    rule_cooldowns: Vec<Option<f64>>,
    /// Callback names to invoke when this flight is evicted.
    expire_callbacks: Vec<String>,
    alt_window: Vec<i32>,
    alt_trend: AltTrend,
}

impl Flight {
    pub fn new(report: Report, regions: &RegionSet, rule_count: usize) -> Flight {
        let current_regions = regions.resolve(&report);
        let mut flight = Flight {
            ident: report.ident.clone(),
            created_at: report.now,
            last_seen: report.now,
            first: report.clone(),
            prev: None,
            previous_regions: vec![None; regions.file_count()],
            current_regions,
            last: report,
            notes: HashMap::new(),
            rule_cooldowns: vec![None; rule_count],
            expire_callbacks: Vec::new(),
            alt_window: Vec::new(),
            alt_trend: AltTrend::Level,
        };
        flight.record_alt();
        flight
    }

    /// Fold in a new report: the old latest becomes `prev`, region
    /// membership rolls with it.
    pub fn apply(&mut self, report: Report, regions: &RegionSet) {
        self.prev = Some(std::mem::replace(&mut self.last, report));
        self.previous_regions =
            std::mem::replace(&mut self.current_regions, regions.resolve(&self.last));
        self.last_seen = self.last.now;
        self.record_alt();
    }

    fn record_alt(&mut self) {
        let Some(alt) = self.last.alt_baro else {
            return;
        };
        let avg = if self.alt_window.is_empty() {
            alt as f64
        } else {
            self.alt_window.iter().sum::<i32>() as f64 / self.alt_window.len() as f64
        };
        if self.alt_window.len() == ALT_TRACK_ENTRIES {
            self.alt_window.remove(0);
        }
        self.alt_window.push(alt);

        self.alt_trend = if (alt as f64) > avg {
            AltTrend::Climbing
        } else if (alt as f64) < avg {
            AltTrend::Descending
        } else {
            AltTrend::Level
        };
    }

    pub fn alt_trend(&self) -> AltTrend {
        self.alt_trend
    }

    // -- region queries -----------------------------------------------------

    pub fn in_any_region(&self) -> bool {
        self.current_regions.iter().any(Option::is_some)
    }

    /// Is the flight currently in one of the named regions (any file)?
    pub fn in_named_region(&self, names: &[String]) -> bool {
        self.current_regions
            .iter()
            .flatten()
            .any(|r| names.iter().any(|n| n == r))
    }

    /// Did any file observe the `from` → `to` transition on the last update?
    /// `None` on either side means "no region".
    pub fn transitioned(&self, from: Option<&str>, to: Option<&str>) -> bool {
        self.previous_regions
            .iter()
            .zip(&self.current_regions)
            .any(|(p, c)| p.as_deref() == from && c.as_deref() == to)
    }

    /// Did region membership change in any file on the last update?
    pub fn region_changed(&self) -> bool {
        self.previous_regions
            .iter()
            .zip(&self.current_regions)
            .any(|(p, c)| p != c)
    }

    // -- cooldown bookkeeping ----------------------------------------------

    pub fn last_fire(&self, rule_idx: usize) -> Option<f64> {
        self.rule_cooldowns.get(rule_idx).copied().flatten()
    }

    pub fn stamp_fire(&mut self, rule_idx: usize, now: f64) {
        if let Some(slot) = self.rule_cooldowns.get_mut(rule_idx) {
            *slot = Some(now);
        }
    }

    // -- expiration callbacks ----------------------------------------------

    /// Register a callback to run at eviction. Idempotent per name.
    pub fn register_expire_callback(&mut self, name: &str) {
        if !self.expire_callbacks.iter().any(|n| n == name) {
            self.expire_callbacks.push(name.to_string());
        }
    }

    pub fn expire_callbacks(&self) -> &[String] {
        &self.expire_callbacks
    }

    // -- snapshots ----------------------------------------------------------

    /// Note values joined for display and statistics breakdown, in sorted
    /// key order.
    pub fn notes_joined(&self) -> Option<String> {
        if self.notes.is_empty() {
            return None;
        }
        let mut keys: Vec<_> = self.notes.keys().collect();
        keys.sort();
        Some(
            keys.iter()
                .map(|k| self.notes[*k].as_str())
                .collect::<Vec<_>>()
                .join(", "),
        )
    }

    pub fn view(&self) -> FlightView {
        FlightView {
            ident: self.ident.clone(),
            last: self.last.clone(),
            prev: self.prev.clone(),
            regions: self.current_regions.clone(),
            notes: self.notes.clone(),
            alt_trend: self.alt_trend,
            created_at: self.created_at,
            last_seen: self.last_seen,
        }
    }
}

/// Immutable flight snapshot passed to user callbacks. Exposes only the
/// observable state, decoupling user code from the engine's aggregate.
#[derive(Debug, Clone)]
pub struct FlightView {
    pub ident: String,
    pub last: Report,
    pub prev: Option<Report>,
    pub regions: Vec<Option<String>>,
    pub notes: HashMap<String, String>,
    pub alt_trend: AltTrend,
    pub created_at: f64,
    pub last_seen: f64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
