//! Configuration file model.
//!
//! The engine is configured from one YAML document:
//!
//! ```yaml
//! config:
//!   kmls: [regions/airport.yaml, regions/valley.yaml]   # ordered region files
//!   time_zone: "-08:00"                                 # for min_time/max_time
//! aircraft_lists:
//!   watchlist: [N12345, N67890]
//! rules:
//!   takeoff:
//!     conditions:
//!       transition_regions: [GROUND, AIR]
//!     actions:
//!       callback: takeoff_cb
//! ```
//!
//! Unknown keys anywhere are startup errors, not silent no-ops. Rule order
//! in the document is the evaluation order.

use std::collections::HashMap;
use std::path::Path;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::error::{EngineError, Result};

/// Top-level configuration document.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub config: EngineSection,
    #[serde(default)]
    pub aircraft_lists: HashMap<String, Vec<String>>,
    /// Rule name → rule body, in declaration order.
    #[serde(default)]
    pub rules: serde_yaml::Mapping,
}

/// The `config:` section — engine-wide settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineSection {
    /// Ordered region files. The key name is the historical one; files are
    /// YAML region descriptors (see `regions`).
    #[serde(default, alias = "region_files")]
    pub kmls: Vec<String>,
    /// Fixed offset for time-of-day conditions, e.g. `"-08:00"`. Defaults
    /// to UTC with a startup warning when time conditions are configured.
    pub time_zone: Option<String>,
    /// Flight expiration horizon in stream seconds. Default 600.
    pub expiry_secs: Option<f64>,
    /// Enable the lat/lon grid index over `latlongring` rules.
    #[serde(default)]
    pub spatial_index: bool,
}

/// One rule as written in YAML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSpec {
    #[serde(default)]
    pub conditions: ConditionsSpec,
    /// Action kind → payload, in declaration order.
    #[serde(default)]
    pub actions: serde_yaml::Mapping,
}

/// The AND-ed condition block of a rule. All fields optional; an empty block
/// matches unconditionally.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConditionsSpec {
    pub min_alt: Option<i32>,
    pub max_alt: Option<i32>,
    pub aircraft_list: Option<String>,
    pub exclude_aircraft_list: Option<String>,
    pub exclude_aircraft_substrs: Option<Vec<String>>,
    /// Region names to match; the empty list means "in no region at all".
    pub regions: Option<Vec<String>>,
    /// `[from, to]`, either side null for "no region".
    pub transition_regions: Option<(Option<String>, Option<String>)>,
    pub changed_regions: Option<bool>,
    /// `[radius_nm, lat, lon]`.
    pub latlongring: Option<(f64, f64, f64)>,
    /// `[alt_sep_ft, lateral_sep_nm]`.
    pub proximity: Option<(f64, f64)>,
    /// Per-flight cooldown, minutes.
    pub cooldown: Option<u32>,
    /// Per-rule (all flights) cooldown, minutes.
    pub rule_cooldown: Option<u32>,
    pub has_attr: Option<String>,
    /// Local time of day as HHMM, no leading zero.
    pub min_time: Option<u32>,
    pub max_time: Option<u32>,
}

impl ConfigFile {
    pub fn from_yaml_str(text: &str) -> Result<ConfigFile> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<ConfigFile> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

/// Parse a `"+HH:MM"` / `"-HH:MM"` fixed offset. `"UTC"` and `"Z"` are
/// accepted as zero.
pub fn parse_time_zone(s: &str) -> Result<FixedOffset> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("utc") || s == "Z" {
        return Ok(FixedOffset::east_opt(0).unwrap());
    }

    let bad = || EngineError::Config(format!("invalid time_zone '{s}', expected \"+HH:MM\""));

    let (sign, rest) = match s.as_bytes()[0] {
        b'+' => (1i32, &s[1..]),
        b'-' => (-1i32, &s[1..]),
        _ => return Err(bad()),
    };
    let (h, m) = rest.split_once(':').ok_or_else(bad)?;
    let hours: i32 = h.parse().map_err(|_| bad())?;
    let minutes: i32 = m.parse().map_err(|_| bad())?;
    if hours > 14 || minutes > 59 {
        return Err(bad());
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(bad)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
config:
  kmls: [a.yaml, b.yaml]
  time_zone: "-08:00"
aircraft_lists:
  watchlist: [N12345, N67890]
rules:
  takeoff:
    conditions:
      transition_regions: [GROUND, AIR]
    actions:
      callback: takeoff_cb
  low:
    conditions:
      max_alt: 1000
      cooldown: 1
    actions:
      print: true
"#;

    #[test]
    fn test_parse_sample() {
        let cfg = ConfigFile::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(cfg.config.kmls, vec!["a.yaml", "b.yaml"]);
        assert_eq!(cfg.config.time_zone.as_deref(), Some("-08:00"));
        assert_eq!(cfg.aircraft_lists["watchlist"].len(), 2);
        assert_eq!(cfg.rules.len(), 2);

        // Declaration order is preserved
        let names: Vec<_> = cfg.rules.keys().map(|k| k.as_str().unwrap()).collect();
        assert_eq!(names, vec!["takeoff", "low"]);
    }

    #[test]
    fn test_rule_spec_parse() {
        let cfg = ConfigFile::from_yaml_str(SAMPLE).unwrap();
        let body = cfg.rules.values().next().unwrap();
        let spec: RuleSpec = serde_yaml::from_value(body.clone()).unwrap();
        assert_eq!(
            spec.conditions.transition_regions,
            Some((Some("GROUND".into()), Some("AIR".into())))
        );
    }

    #[test]
    fn test_transition_null_side() {
        let yaml = r#"
rules:
  appeared:
    conditions:
      transition_regions: [null, AIR]
    actions: {}
"#;
        let cfg = ConfigFile::from_yaml_str(yaml).unwrap();
        let spec: RuleSpec =
            serde_yaml::from_value(cfg.rules.values().next().unwrap().clone()).unwrap();
        assert_eq!(spec.conditions.transition_regions, Some((None, Some("AIR".into()))));
    }

    #[test]
    fn test_unknown_condition_key_rejected() {
        let yaml = r#"
rules:
  bad:
    conditions:
      altitude_minimum: 500
    actions: {}
"#;
        let cfg = ConfigFile::from_yaml_str(yaml).unwrap();
        let parsed: std::result::Result<RuleSpec, _> =
            serde_yaml::from_value(cfg.rules.values().next().unwrap().clone());
        assert!(parsed.is_err());
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(ConfigFile::from_yaml_str("bogus_section: 1\n").is_err());
    }

    #[test]
    fn test_empty_document() {
        let cfg = ConfigFile::from_yaml_str("config: {}\n").unwrap();
        assert!(cfg.rules.is_empty());
        assert!(cfg.config.kmls.is_empty());
    }

    #[test]
    fn test_parse_time_zone() {
        assert_eq!(parse_time_zone("UTC").unwrap().local_minus_utc(), 0);
        assert_eq!(parse_time_zone("+05:30").unwrap().local_minus_utc(), 5 * 3600 + 30 * 60);
        assert_eq!(parse_time_zone("-08:00").unwrap().local_minus_utc(), -8 * 3600);
        assert!(parse_time_zone("PST").is_err());
        assert!(parse_time_zone("+25:00").is_err());
    }

    #[test]
    fn test_latlongring_accepts_integers() {
        let yaml = r#"
rules:
  ring:
    conditions:
      latlongring: [50, 37, -122]
    actions: {}
"#;
        let cfg = ConfigFile::from_yaml_str(yaml).unwrap();
        let spec: RuleSpec =
            serde_yaml::from_value(cfg.rules.values().next().unwrap().clone()).unwrap();
        assert_eq!(spec.conditions.latlongring, Some((50.0, 37.0, -122.0)));
    }
}
