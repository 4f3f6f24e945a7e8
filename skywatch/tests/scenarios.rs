//! End-to-end scenarios: full engine runs over synthetic report streams.

use std::sync::{Arc, Mutex};

use serde_json::json;

use skywatch::{Engine, RegionFile, RegionSet, WebhookTransport};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// GROUND and AIR: two adjacent, non-overlapping boxes.
fn ground_air() -> RegionSet {
    let yaml = r#"
- name: GROUND
  polygon: [[37.40, -122.20], [37.40, -122.10], [37.50, -122.10], [37.50, -122.20]]
- name: AIR
  polygon: [[37.40, -122.10], [37.40, -122.00], [37.50, -122.00], [37.50, -122.10]]
"#;
    RegionSet::new(vec![RegionFile::from_yaml_str("airport", yaml).unwrap()])
}

fn pt(id: &str, lat: f64, lon: f64, alt: i32, now: f64) -> serde_json::Value {
    json!({"flight": id, "lat": lat, "lon": lon, "alt_baro": alt, "now": now})
}

type CallLog = Arc<Mutex<Vec<(String, Option<String>)>>>;

fn recording_callback(engine: &mut Engine, name: &str) -> CallLog {
    let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
    let calls2 = calls.clone();
    engine.register_callback(name, move |flight, partner| {
        calls2
            .lock()
            .unwrap()
            .push((flight.ident.clone(), partner.map(|p| p.ident.clone())));
    });
    calls
}

// ---------------------------------------------------------------------------
// S1: region transition fires once
// ---------------------------------------------------------------------------

#[test]
fn s1_region_transition_fires_once() {
    let yaml = r#"
rules:
  takeoff:
    conditions:
      transition_regions: [GROUND, AIR]
    actions:
      callback: takeoff_cb
"#;
    let mut engine = Engine::with_regions(yaml, ground_air()).unwrap();
    let calls = recording_callback(&mut engine, "takeoff_cb");
    engine.start().unwrap();

    engine.process_value(&pt("N12345", 37.45, -122.15, 50, 0.0)); // GROUND
    engine.process_value(&pt("N12345", 37.45, -122.14, 80, 5.0)); // GROUND
    engine.process_value(&pt("N12345", 37.45, -122.05, 400, 10.0)); // AIR
    engine.process_value(&pt("N12345", 37.45, -122.04, 900, 15.0)); // AIR

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1, "transition must fire exactly once");
    assert_eq!(calls[0], ("N12345".to_string(), None));
}

// ---------------------------------------------------------------------------
// S2: cooldown suppression
// ---------------------------------------------------------------------------

#[test]
fn s2_cooldown_suppresses_prints() {
    let yaml = r#"
rules:
  low:
    conditions:
      max_alt: 1000
      cooldown: 1
    actions:
      print: true
"#;
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();
    engine.start().unwrap();

    engine.process_value(&pt("N1", 37.0, -122.0, 500, 0.0));
    engine.process_value(&pt("N1", 37.0, -122.0, 500, 30.0)); // within cooldown
    engine.process_value(&pt("N1", 37.0, -122.0, 500, 65.0)); // window lapsed

    assert_eq!(engine.stats().prints_emitted, 2);
}

// ---------------------------------------------------------------------------
// S3: proximity pair, both directions
// ---------------------------------------------------------------------------

#[test]
fn s3_proximity_pair_symmetric() {
    let yaml = r#"
rules:
  prox:
    conditions:
      proximity: [400, 0.3]
    actions:
      callback: prox_cb
"#;
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();
    let calls = recording_callback(&mut engine, "prox_cb");
    engine.start().unwrap();

    // ~0.2nm apart, 200ft vertical separation
    engine.process_value(&pt("A", 35.0, -82.0, 5000, 100.0));
    engine.process_value(&pt("B", 35.003, -82.0, 5200, 101.0));
    engine.process_value(&pt("A", 35.0, -82.0, 5000, 102.0));
    engine.process_value(&pt("B", 35.003, -82.0, 5200, 103.0));

    let calls = calls.lock().unwrap();
    assert_eq!(
        calls.as_slice(),
        &[
            ("B".to_string(), Some("A".to_string())),
            ("A".to_string(), Some("B".to_string())),
            ("B".to_string(), Some("A".to_string())),
        ]
    );
}

#[test]
fn s3_proximity_thresholds_enforced() {
    let yaml = r#"
rules:
  prox:
    conditions:
      proximity: [400, 0.3]
    actions:
      callback: prox_cb
"#;
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();
    let calls = recording_callback(&mut engine, "prox_cb");
    engine.start().unwrap();

    // Same spot but 1000ft apart: no pair.
    engine.process_value(&pt("A", 35.0, -82.0, 5000, 100.0));
    engine.process_value(&pt("B", 35.0, -82.0, 6000, 101.0));
    // 2nm apart at matching altitude: no pair.
    engine.process_value(&pt("C", 36.0, -80.0, 5000, 102.0));
    engine.process_value(&pt("D", 36.033, -80.0, 5000, 103.0));

    assert!(calls.lock().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// S4: expiration callback
// ---------------------------------------------------------------------------

#[test]
fn s4_expire_callback_fires_once() {
    let yaml = r#"
rules:
  x:
    actions:
      expire_callback: gone_cb
"#;
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();
    let calls = recording_callback(&mut engine, "gone_cb");
    engine.start().unwrap();

    engine.process_value(&pt("GHOST", 37.0, -122.0, 1000, 0.0));
    // Stream advances on another aircraft; GHOST goes silent.
    for t in [200.0, 400.0, 650.0] {
        engine.process_value(&pt("FRESH", 38.0, -121.0, 2000, t));
    }

    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("GHOST".to_string(), None)]);
    }
    assert!(engine.store().get("GHOST").is_none());

    // The final sweep drains FRESH but must not re-fire GHOST.
    engine.finish();
    let calls = calls.lock().unwrap();
    let ghost_fires = calls.iter().filter(|(id, _)| id == "GHOST").count();
    assert_eq!(ghost_fires, 1);
    let fresh_fires = calls.iter().filter(|(id, _)| id == "FRESH").count();
    assert_eq!(fresh_fires, 1, "drain fires registered callbacks");
}

// ---------------------------------------------------------------------------
// S5: list + substring exclusion
// ---------------------------------------------------------------------------

#[test]
fn s5_list_and_substring_exclusion() {
    let yaml = r#"
aircraft_lists:
  watchlist: [N12345, N67890]
rules:
  watch:
    conditions:
      aircraft_list: watchlist
      exclude_aircraft_substrs: [N123]
    actions:
      callback: watch_cb
"#;
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();
    let calls = recording_callback(&mut engine, "watch_cb");
    engine.start().unwrap();

    engine.process_value(&pt("N12345", 37.0, -122.0, 1000, 0.0));
    engine.process_value(&pt("N67890", 37.0, -122.0, 1000, 1.0));
    engine.process_value(&pt("N55555", 37.0, -122.0, 1000, 2.0));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.as_slice(), &[("N67890".to_string(), None)]);
}

// ---------------------------------------------------------------------------
// S6: regions [] vs [name]
// ---------------------------------------------------------------------------

#[test]
fn s6_empty_region_list_vs_named() {
    let yaml = r#"
rules:
  nowhere:
    conditions:
      regions: []
    actions:
      callback: nowhere_cb
  pattern:
    conditions:
      regions: [GROUND]
    actions:
      callback: pattern_cb
"#;
    let mut engine = Engine::with_regions(yaml, ground_air()).unwrap();
    let nowhere = recording_callback(&mut engine, "nowhere_cb");
    let pattern = recording_callback(&mut engine, "pattern_cb");
    engine.start().unwrap();

    engine.process_value(&pt("IN", 37.45, -122.15, 100, 0.0)); // inside GROUND
    engine.process_value(&pt("OUT", 40.0, -100.0, 100, 1.0)); // in no region

    assert_eq!(pattern.lock().unwrap().as_slice(), &[("IN".to_string(), None)]);
    assert_eq!(nowhere.lock().unwrap().as_slice(), &[("OUT".to_string(), None)]);
}

// ---------------------------------------------------------------------------
// Grid index transparency
// ---------------------------------------------------------------------------

#[test]
fn grid_index_is_behaviorally_transparent() {
    let run = |spatial_index: bool| {
        let yaml = format!(
            r#"
config:
  spatial_index: {spatial_index}
rules:
  near_sfo:
    conditions:
      latlongring: [30, 37.6, -122.4]
    actions:
      track: true
  anywhere_low:
    conditions:
      max_alt: 2000
    actions:
      track: true
"#
        );
        let mut engine = Engine::with_regions(&yaml, RegionSet::default()).unwrap();
        engine.start().unwrap();

        let points = [
            ("A", 37.60, -122.40, 1500),
            ("B", 40.00, -100.00, 1500),
            ("A", 37.95, -122.40, 3000),
            ("C", 37.58, -122.35, 8000),
            ("B", 40.00, -100.00, 8000),
        ];
        for (i, (id, lat, lon, alt)) in points.iter().enumerate() {
            engine.process_value(&pt(id, *lat, *lon, *alt, 100.0 + i as f64));
        }
        (engine.stats().fires("near_sfo"), engine.stats().fires("anywhere_low"))
    };

    assert_eq!(run(false), run(true), "index must not change matches");
    let (ring, low) = run(true);
    assert_eq!(ring, 3);
    assert_eq!(low, 2);
}

// ---------------------------------------------------------------------------
// Webhook delivery through the worker pool
// ---------------------------------------------------------------------------

struct RecordingTransport(Mutex<Vec<(String, String)>>);

impl WebhookTransport for RecordingTransport {
    fn send(&self, target: &str, message: &str) -> Result<(), String> {
        self.0.lock().unwrap().push((target.into(), message.into()));
        Ok(())
    }
}

#[test]
fn webhook_enqueued_and_delivered() {
    let yaml = r#"
rules:
  alert:
    conditions:
      max_alt: 1000
    actions:
      webhook: [slack, ops-channel]
"#;
    let transport = Arc::new(RecordingTransport(Mutex::new(Vec::new())));
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();
    engine.register_transport("slack", transport.clone());

    let input = format!("{}\n", pt("N1", 37.0, -122.0, 500, 0.0));
    engine.run(std::io::Cursor::new(input)).unwrap(); // run() joins the workers

    assert_eq!(engine.stats().webhooks_enqueued, 1);
    let seen = transport.0.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, "ops-channel");
    assert!(seen[0].1.contains("N1"), "message carries the summary: {}", seen[0].1);
}

// ---------------------------------------------------------------------------
// Notes flow into later callbacks and the report
// ---------------------------------------------------------------------------

#[test]
fn notes_visible_to_later_rules_and_report() {
    let yaml = r#"
rules:
  tagger:
    conditions:
      max_alt: 1000
    actions:
      note: "low pass"
  watcher:
    actions:
      callback: watch_cb
      track: true
"#;
    let mut engine = Engine::with_regions(yaml, RegionSet::default()).unwrap();

    let notes_seen = Arc::new(Mutex::new(Vec::new()));
    let notes2 = notes_seen.clone();
    engine.register_callback("watch_cb", move |flight, _| {
        notes2.lock().unwrap().push(flight.notes.get("tagger").cloned());
    });
    engine.start().unwrap();

    engine.process_value(&pt("N1", 37.0, -122.0, 500, 0.0));

    assert_eq!(
        notes_seen.lock().unwrap().as_slice(),
        &[Some("low pass".to_string())]
    );
    // The fire log for `watcher` carries the note set by `tagger`.
    let report = engine.stats().final_report();
    assert!(report.contains("watcher"), "{report}");
    assert!(report.contains("low pass"), "{report}");
}
