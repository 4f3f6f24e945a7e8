//! Storage for all live flights, keyed by identifier.
//!
//! Single-writer: the driver loop owns all mutation. Expiration is driven by
//! the stream clock, never wall time, so replayed data behaves
//! deterministically.

use std::collections::HashMap;

use crate::flight::{Flight, FlightView};
use crate::geo;
use crate::regions::RegionSet;
use crate::report::Report;

/// Flights unseen for this many seconds of stream time are evicted.
pub const DEFAULT_EXPIRY_SECS: f64 = 600.0;

/// Proximity partners must have been seen within this window of `now`.
pub const PROXIMITY_FRESH_SECS: f64 = 60.0;

/// All live `Flight` aggregates, keyed by identifier.
#[derive(Default)]
pub struct FlightStore {
    flights: HashMap<String, Flight>,
}

impl FlightStore {
    pub fn new() -> FlightStore {
        FlightStore::default()
    }

    /// Upsert from a report: creates the flight on first sight, otherwise
    /// rolls the aggregate forward. Returns whether the flight was created.
    pub fn update(&mut self, report: Report, regions: &RegionSet, rule_count: usize) -> bool {
        use std::collections::hash_map::Entry;
        match self.flights.entry(report.ident.clone()) {
            Entry::Occupied(mut e) => {
                e.get_mut().apply(report, regions);
                false
            }
            Entry::Vacant(e) => {
                e.insert(Flight::new(report, regions, rule_count));
                true
            }
        }
    }

    pub fn get(&self, ident: &str) -> Option<&Flight> {
        self.flights.get(ident)
    }

    pub fn get_mut(&mut self, ident: &str) -> Option<&mut Flight> {
        self.flights.get_mut(ident)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flight> {
        self.flights.values()
    }

    /// Remove all flights unseen for `expiry_secs` of stream time. Evicted
    /// flights are returned (identifier order) so the caller can run their
    /// expiration hooks.
    pub fn expire(&mut self, now: f64, expiry_secs: f64) -> Vec<Flight> {
        let stale: Vec<String> = self
            .flights
            .iter()
            .filter(|(_, f)| now - f.last_seen >= expiry_secs)
            .map(|(id, _)| id.clone())
            .collect();

        let mut evicted: Vec<Flight> = stale
            .iter()
            .filter_map(|id| self.flights.remove(id))
            .collect();
        evicted.sort_by(|a, b| a.ident.cmp(&b.ident));
        evicted
    }

    /// Remove and return every flight, for the final sweep at stream end.
    pub fn drain_all(&mut self) -> Vec<Flight> {
        let mut evicted: Vec<Flight> = self.flights.drain().map(|(_, f)| f).collect();
        evicted.sort_by(|a, b| a.ident.cmp(&b.ident));
        evicted
    }

    /// Find all live flights within the given separations of `ident`.
    ///
    /// Partners must have been seen within `PROXIMITY_FRESH_SECS` of `now`,
    /// both flights must report altitude, and both thresholds are inclusive.
    /// The flight is never paired with itself. Results are snapshots, sorted
    /// by identifier so pair order is deterministic.
    pub fn find_nearby(
        &self,
        ident: &str,
        max_alt_sep_ft: f64,
        max_lat_sep_nm: f64,
        now: f64,
    ) -> Vec<FlightView> {
        let Some(flight) = self.flights.get(ident) else {
            return Vec::new();
        };
        let Some(alt) = flight.last.alt_baro else {
            return Vec::new();
        };

        let mut partners: Vec<FlightView> = self
            .flights
            .values()
            .filter(|g| g.ident != ident)
            .filter(|g| now - g.last_seen <= PROXIMITY_FRESH_SECS)
            .filter(|g| {
                g.last
                    .alt_baro
                    .is_some_and(|ga| ((ga - alt).abs() as f64) <= max_alt_sep_ft)
            })
            .filter(|g| {
                geo::haversine_nm(flight.last.lat, flight.last.lon, g.last.lat, g.last.lon)
                    <= max_lat_sep_nm
            })
            .map(Flight::view)
            .collect();
        partners.sort_by(|a, b| a.ident.cmp(&b.ident));
        partners
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
