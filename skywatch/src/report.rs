//! Parsing and representation of a single aircraft position report.
//!
//! A `Report` is immutable once built. Normalization accepts the field
//! variants seen across feed formats (`hex`/`flight`, `alt_baro`/`alt`,
//! `now`/`seen_pos`) and keeps the full attribute map for `has_attr`
//! conditions and user callbacks.

use serde_json::{Map, Value};

use crate::geo;
use crate::ident;

/// A single aircraft position + data update.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Canonical identifier: derived tail number or flight id, uppercased.
    pub ident: String,
    /// Stream timestamp, seconds since epoch.
    pub now: f64,
    pub lat: f64,
    pub lon: f64,
    /// Barometric altitude, feet MSL. `"ground"` normalizes to 0.
    pub alt_baro: Option<i32>,
    /// Ground speed, knots.
    pub gs: Option<f64>,
    /// Track over ground, degrees.
    pub track: Option<f64>,
    /// Raw ICAO hex address, when present.
    pub hex: Option<String>,
    /// Flight/callsign field, when present.
    pub flight: Option<String>,
    /// The full input object, preserved for attribute matching.
    pub attrs: Map<String, Value>,
}

impl Report {
    /// Build a report from a JSON object.
    ///
    /// Returns `None` when the point is unusable: not an object, missing
    /// lat/lon, or no derivable identifier. A missing timestamp falls back
    /// to `fallback_now` (the stream clock).
    pub fn from_json(value: &Value, fallback_now: f64) -> Option<Report> {
        let obj = value.as_object()?;

        let lat = obj.get("lat")?.as_f64()?;
        let lon = obj.get("lon")?.as_f64()?;

        let hex = obj.get("hex").and_then(Value::as_str).map(str::to_string);
        let flight = obj
            .get("flight")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string());
        let ident = ident::canonical_ident(hex.as_deref(), flight.as_deref())?;

        let now = obj
            .get("now")
            .or_else(|| obj.get("seen_pos"))
            .and_then(Value::as_f64)
            .unwrap_or(fallback_now);

        let alt_baro = parse_altitude(obj.get("alt_baro").or_else(|| obj.get("alt")));
        let gs = obj
            .get("gs")
            .or_else(|| obj.get("ground_speed"))
            .and_then(Value::as_f64);
        let track = obj.get("track").and_then(Value::as_f64);

        Some(Report {
            ident,
            now,
            lat,
            lon,
            alt_baro,
            gs,
            track,
            hex,
            flight,
            attrs: obj.clone(),
        })
    }

    /// Distance from this report to a lat/lon, in nautical miles.
    pub fn dist_nm(&self, lat: f64, lon: f64) -> f64 {
        geo::haversine_nm(self.lat, self.lon, lat, lon)
    }

    /// Does the attribute map hold a truthy value for `name`?
    ///
    /// Truthy means present, not null, not `""`, not numeric zero, not
    /// `false`. Arrays and objects count as truthy by presence.
    pub fn attr_truthy(&self, name: &str) -> bool {
        match self.attrs.get(name) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
            Some(Value::Array(_)) | Some(Value::Object(_)) => true,
        }
    }

    /// One-line summary used by the print action and webhook messages.
    pub fn summary(&self) -> String {
        let alt = self
            .alt_baro
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".into());
        let track = self.track.map(|t| format!("{t:.0}")).unwrap_or_else(|| "?".into());
        let gs = self.gs.map(|g| format!("{g:.1}")).unwrap_or_else(|| "?".into());
        format!(
            "{}: {} MSL {} deg {} kts {:.4}, {:.4}",
            self.ident, alt, track, gs, self.lat, self.lon
        )
    }
}

/// Altitude fields are usually numbers but arrive as `"ground"` for surface
/// reports; the reference feed also emits other junk strings, which map to
/// absent.
fn parse_altitude(v: Option<&Value>) -> Option<i32> {
    match v? {
        Value::Number(n) => n.as_f64().map(|f| f.round() as i32),
        Value::String(s) if s == "ground" => Some(0),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
