//! The rule evaluator.
//!
//! For every processed report, each rule is gated on its cooldowns, its
//! conditions are AND-ed against the flight's state, and matches dispatch
//! their actions. Proximity rules additionally scan the store for partner
//! flights and fire once per ordered pair, subject to the same gates.

use chrono::{DateTime, FixedOffset};
use tracing::debug;

use crate::actions::Dispatcher;
use crate::flight::Flight;
use crate::flight::FlightView;
use crate::grid::RuleGrid;
use crate::lists::AircraftLists;
use crate::rules::{Rule, RuleSet};
use crate::stats::Stats;
use crate::store::FlightStore;

pub struct Evaluator {
    rules: RuleSet,
    /// Last fire timestamp per rule, across all flights.
    last_rule_fire: Vec<Option<f64>>,
    grid: Option<RuleGrid>,
    tz: FixedOffset,
}

impl Evaluator {
    /// Build an evaluator. The grid index is a pure accelerator; results
    /// are identical with and without it.
    pub fn new(rules: RuleSet, use_grid: bool, tz: FixedOffset) -> Evaluator {
        let grid = use_grid.then(|| RuleGrid::build(&rules));
        Evaluator {
            last_rule_fire: vec![None; rules.len()],
            rules,
            grid,
            tz,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate all rules against the just-updated flight.
    pub fn process(
        &mut self,
        store: &mut FlightStore,
        ident: &str,
        now: f64,
        lists: &AircraftLists,
        dispatcher: &Dispatcher,
        stats: &mut Stats,
    ) {
        let candidates: Vec<usize> = {
            let Some(flight) = store.get(ident) else {
                return;
            };
            match &self.grid {
                Some(grid) => grid.candidates(flight.last.lat, flight.last.lon),
                None => (0..self.rules.len()).collect(),
            }
        };

        // Pass 1: plan matches against an immutable store. Rules only
        // interact through their own cooldown stamps, so later rules cannot
        // be unblocked by earlier fires within one report.
        let mut planned: Vec<(usize, Vec<FlightView>)> = Vec::new();
        {
            let Some(flight) = store.get(ident) else {
                return;
            };
            for idx in candidates {
                let rule = match self.rules.get(idx) {
                    Some(r) => r,
                    None => continue,
                };
                if self.gated(idx, flight, now) {
                    debug!(rule = %rule.name, flight = ident, "cooldown gate");
                    continue;
                }
                stats.condition_evals += 1;
                if !conditions_hold(rule, flight, lists, self.tz, now) {
                    continue;
                }
                if let Some((alt_sep, lat_sep)) = rule.conditions.proximity {
                    let partners = store.find_nearby(ident, alt_sep, lat_sep, now);
                    if partners.is_empty() {
                        continue;
                    }
                    planned.push((idx, partners));
                } else {
                    planned.push((idx, Vec::new()));
                }
            }
        }

        // Pass 2: fire in rule order, actions in declared order.
        for (idx, partners) in planned {
            if partners.is_empty() {
                self.fire(store, ident, idx, None, now, dispatcher, stats);
                continue;
            }
            for partner in &partners {
                // An earlier partner fire stamps the cooldowns, so re-check.
                let gated = match store.get(ident) {
                    Some(flight) => self.gated(idx, flight, now),
                    None => true,
                };
                if gated {
                    break;
                }
                self.fire(store, ident, idx, Some(partner), now, dispatcher, stats);
            }
        }
    }

    /// Is the rule within either of its cooldown windows for this flight?
    fn gated(&self, idx: usize, flight: &Flight, now: f64) -> bool {
        let Some(rule) = self.rules.get(idx) else {
            return true;
        };
        if rule.cooldown_rule_secs > 0.0 {
            if let Some(t) = self.last_rule_fire[idx] {
                if now - t < rule.cooldown_rule_secs {
                    return true;
                }
            }
        }
        if rule.cooldown_flight_secs > 0.0 {
            if let Some(t) = flight.last_fire(idx) {
                if now - t < rule.cooldown_flight_secs {
                    return true;
                }
            }
        }
        false
    }

    fn fire(
        &mut self,
        store: &mut FlightStore,
        ident: &str,
        idx: usize,
        partner: Option<&FlightView>,
        now: f64,
        dispatcher: &Dispatcher,
        stats: &mut Stats,
    ) {
        self.last_rule_fire[idx] = Some(now);
        let Some(flight) = store.get_mut(ident) else {
            return;
        };
        flight.stamp_fire(idx, now);

        let Some(rule) = self.rules.get(idx) else {
            return;
        };
        debug!(rule = %rule.name, flight = ident, "rule matched");
        stats.log_fire(&rule.name, flight.notes_joined().as_deref());
        dispatcher.dispatch(rule, flight, partner, stats);
    }
}

/// Evaluate the AND-ed condition block. An empty block matches
/// unconditionally; missing data resolves each predicate to false, never to
/// an error. Proximity is handled by the caller.
pub fn conditions_hold(
    rule: &Rule,
    flight: &Flight,
    lists: &AircraftLists,
    tz: FixedOffset,
    now: f64,
) -> bool {
    let c = &rule.conditions;
    let report = &flight.last;

    if let Some(min) = c.min_alt {
        if !report.alt_baro.is_some_and(|a| a >= min) {
            return false;
        }
    }
    if let Some(max) = c.max_alt {
        if !report.alt_baro.is_some_and(|a| a <= max) {
            return false;
        }
    }

    if let Some(list) = &c.aircraft_list {
        if !lists.contains(list, &flight.ident) {
            return false;
        }
    }
    if let Some(list) = &c.exclude_aircraft_list {
        if lists.contains(list, &flight.ident) {
            return false;
        }
    }
    if let Some(substrs) = &c.exclude_aircraft_substrs {
        if substrs.iter().any(|s| flight.ident.contains(s.as_str())) {
            return false;
        }
    }

    if let Some(names) = &c.regions {
        let hold = if names.is_empty() {
            !flight.in_any_region()
        } else {
            flight.in_named_region(names)
        };
        if !hold {
            return false;
        }
    }
    if let Some((from, to)) = &c.transition_regions {
        if !flight.transitioned(from.as_deref(), to.as_deref()) {
            return false;
        }
    }
    if let Some(changed) = c.changed_regions {
        if flight.region_changed() != changed {
            return false;
        }
    }

    if let Some((nm, lat, lon)) = c.latlongring {
        if report.dist_nm(lat, lon) > nm {
            return false;
        }
    }

    if let Some(attr) = &c.has_attr {
        if !report.attr_truthy(attr) {
            return false;
        }
    }

    if let Some(min) = c.min_time {
        if !local_hhmm(now, tz).is_some_and(|t| t >= min) {
            return false;
        }
    }
    if let Some(max) = c.max_time {
        if !local_hhmm(now, tz).is_some_and(|t| t <= max) {
            return false;
        }
    }

    true
}

/// Stream timestamp → local time of day as HHMM.
fn local_hhmm(now: f64, tz: FixedOffset) -> Option<u32> {
    use chrono::Timelike;
    let local = DateTime::from_timestamp(now as i64, 0)?.with_timezone(&tz);
    Some(local.hour() * 100 + local.minute())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
