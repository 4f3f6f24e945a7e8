//! Compiled rule model.
//!
//! YAML rule bodies compile into `Rule` values with typed conditions and an
//! ordered action list. Compilation is where configuration problems surface:
//! unknown keys, bad payload shapes, and dangling list references all fail
//! here, before any report is processed.

use tracing::warn;

use crate::config::{ConfigFile, ConditionsSpec, RuleSpec};
use crate::error::{EngineError, Result};
use crate::geo;
use crate::lists::AircraftLists;

/// A single action, in the order it was declared.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Callback(String),
    ExpireCallback(String),
    Print,
    /// `None` is the clear sentinel.
    Note(Option<String>),
    Track,
    Webhook { kind: String, target: String },
    Shell(String),
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Callback(_) => "callback",
            Action::ExpireCallback(_) => "expire_callback",
            Action::Print => "print",
            Action::Note(_) => "note",
            Action::Track => "track",
            Action::Webhook { .. } => "webhook",
            Action::Shell(_) => "shell",
        }
    }
}

/// A compiled rule. Conditions are AND-ed; cooldowns are modifiers, not
/// predicates.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub conditions: ConditionsSpec,
    pub actions: Vec<Action>,
    /// Minimum interval between fires for one flight, seconds.
    pub cooldown_flight_secs: f64,
    /// Minimum interval between fires across all flights, seconds.
    pub cooldown_rule_secs: f64,
    /// Pre-computed bounding box (min_lat, max_lat, min_lon, max_lon) when
    /// the rule has a `latlongring` condition; used by the grid index.
    pub ring_bbox: Option<(f64, f64, f64, f64)>,
}

impl Rule {
    pub fn has_proximity(&self) -> bool {
        self.conditions.proximity.is_some()
    }

    pub fn has_time_condition(&self) -> bool {
        self.conditions.min_time.is_some() || self.conditions.max_time.is_some()
    }
}

/// The full compiled rule set, in declaration order. Rule indices are stable
/// and key the per-flight cooldown vectors.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Compile every rule in the config, validating list references and
    /// action payloads. Fails on the first problem.
    pub fn compile(cfg: &ConfigFile, lists: &AircraftLists) -> Result<RuleSet> {
        let mut rules = Vec::with_capacity(cfg.rules.len());

        for (key, body) in &cfg.rules {
            let name = key
                .as_str()
                .ok_or_else(|| EngineError::Config("rule names must be strings".into()))?
                .to_string();

            let spec: RuleSpec = serde_yaml::from_value(body.clone())
                .map_err(|e| EngineError::Config(format!("rule '{name}': {e}")))?;

            validate_conditions(&name, &spec.conditions, lists)?;
            let actions = compile_actions(&name, &spec.actions)?;

            let ring_bbox = spec.conditions.latlongring.map(|(nm, lat, lon)| {
                let (dlat, dlon) = geo::nm_to_lat_lon_offsets(nm, lat);
                (lat - dlat, lat + dlat, lon - dlon, lon + dlon)
            });

            rules.push(Rule {
                cooldown_flight_secs: spec.conditions.cooldown.unwrap_or(0) as f64 * 60.0,
                cooldown_rule_secs: spec.conditions.rule_cooldown.unwrap_or(0) as f64 * 60.0,
                conditions: spec.conditions,
                actions,
                ring_bbox,
                name,
            });
        }

        Ok(RuleSet { rules })
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Rule> {
        self.rules.get(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Names referenced by callback and expire_callback actions.
    pub fn callback_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().flat_map(|r| {
            r.actions.iter().filter_map(|a| match a {
                Action::Callback(n) | Action::ExpireCallback(n) => Some(n.as_str()),
                _ => None,
            })
        })
    }

    /// Webhook kinds referenced by webhook actions.
    pub fn webhook_kinds(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().flat_map(|r| {
            r.actions.iter().filter_map(|a| match a {
                Action::Webhook { kind, .. } => Some(kind.as_str()),
                _ => None,
            })
        })
    }

    /// Rule names carrying a `track` action, for the statistics report.
    pub fn tracked_rules(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter(|r| r.actions.iter().any(|a| matches!(a, Action::Track)))
            .map(|r| r.name.as_str())
    }
}

fn validate_conditions(name: &str, c: &ConditionsSpec, lists: &AircraftLists) -> Result<()> {
    for list_ref in [&c.aircraft_list, &c.exclude_aircraft_list].into_iter().flatten() {
        if !lists.has_list(list_ref) {
            return Err(EngineError::Config(format!(
                "rule '{name}' references unknown aircraft list '{list_ref}'"
            )));
        }
    }

    if c.regions.is_some() && c.transition_regions.is_some() {
        warn!(
            rule = name,
            "rule declares both 'regions' and 'transition_regions'; both must hold"
        );
    }

    if let Some((nm, _, _)) = c.latlongring {
        if nm <= 0.0 {
            return Err(EngineError::Config(format!(
                "rule '{name}': latlongring radius must be positive"
            )));
        }
    }

    for t in [c.min_time, c.max_time].into_iter().flatten() {
        if t > 2359 || t % 100 > 59 {
            return Err(EngineError::Config(format!(
                "rule '{name}': time conditions use HHMM, got {t}"
            )));
        }
    }

    Ok(())
}

/// Compile the action mapping, preserving declaration order. At most one
/// action of each kind survives; the last declaration wins.
fn compile_actions(rule: &str, mapping: &serde_yaml::Mapping) -> Result<Vec<Action>> {
    use serde_yaml::Value;

    let bad = |key: &str, want: &str| {
        EngineError::Config(format!("rule '{rule}': action '{key}' expects {want}"))
    };

    let mut actions = Vec::new();
    for (key, value) in mapping {
        let key = key
            .as_str()
            .ok_or_else(|| EngineError::Config(format!("rule '{rule}': action keys must be strings")))?;

        let action = match key {
            "callback" => Action::Callback(
                value.as_str().ok_or_else(|| bad(key, "a callback name"))?.to_string(),
            ),
            "expire_callback" => Action::ExpireCallback(
                value.as_str().ok_or_else(|| bad(key, "a callback name"))?.to_string(),
            ),
            "print" => match value.as_bool() {
                Some(true) => Action::Print,
                Some(false) => continue,
                None => return Err(bad(key, "a bool")),
            },
            "note" => match value {
                Value::Null => Action::Note(None),
                Value::String(s) => Action::Note(Some(s.clone())),
                _ => return Err(bad(key, "a string or null")),
            },
            "track" => match value.as_bool() {
                Some(true) => Action::Track,
                Some(false) => continue,
                None => return Err(bad(key, "a bool")),
            },
            "webhook" => {
                let (kind, target): (String, String) = serde_yaml::from_value(value.clone())
                    .map_err(|_| bad(key, "[kind, target]"))?;
                Action::Webhook { kind, target }
            }
            "shell" => Action::Shell(
                value.as_str().ok_or_else(|| bad(key, "a command template"))?.to_string(),
            ),
            other => {
                return Err(EngineError::Config(format!(
                    "rule '{rule}': unknown action '{other}'"
                )))
            }
        };
        actions.push(action);
    }

    // Keep only the last declaration of each kind.
    let deduped = actions
        .iter()
        .enumerate()
        .filter(|(i, a)| actions.iter().skip(i + 1).all(|b| b.kind() != a.kind()))
        .map(|(_, a)| a.clone())
        .collect();
    Ok(deduped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
