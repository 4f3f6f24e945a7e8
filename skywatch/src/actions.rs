//! Action dispatch.
//!
//! When a rule matches, its actions run synchronously on the driver thread
//! in declared order — except webhook and shell jobs, which are handed to
//! the background worker pool. User callback panics are caught, logged, and
//! swallowed so one bad handler cannot stall the stream.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::flight::{Flight, FlightView};
use crate::rules::{Action, Rule};
use crate::stats::Stats;
use crate::webhook::{ActionWorker, Job, WebhookTransport};

/// A user callback. Receives the matched flight and, for proximity rules,
/// the partner flight.
pub type Handler = Box<dyn Fn(&FlightView, Option<&FlightView>) + Send>;

/// Resolves action kinds to effects. The callback and transport registries
/// are fixed once the engine starts.
pub struct Dispatcher {
    callbacks: HashMap<String, Handler>,
    transports: HashMap<String, Arc<dyn WebhookTransport>>,
    worker: Option<ActionWorker>,
    tz: FixedOffset,
}

impl Dispatcher {
    pub fn new(tz: FixedOffset) -> Dispatcher {
        Dispatcher {
            callbacks: HashMap::new(),
            transports: HashMap::new(),
            worker: None,
            tz,
        }
    }

    pub fn register_callback(&mut self, name: &str, handler: Handler) {
        self.callbacks.insert(name.to_string(), handler);
    }

    pub fn register_transport(&mut self, kind: &str, transport: Arc<dyn WebhookTransport>) {
        self.transports.insert(kind.to_string(), transport);
    }

    pub fn has_callback(&self, name: &str) -> bool {
        self.callbacks.contains_key(name)
    }

    pub fn has_transport(&self, kind: &str) -> bool {
        self.transports.contains_key(kind)
    }

    /// Spin up the worker pool. Idempotent.
    pub fn start_worker(&mut self) {
        if self.worker.is_none() {
            self.worker = Some(ActionWorker::start(self.transports.clone()));
        }
    }

    /// Close the queue and join the workers, draining pending jobs.
    pub fn shutdown_worker(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
    }

    /// Execute a matched rule's actions against the flight.
    pub fn dispatch(
        &self,
        rule: &Rule,
        flight: &mut Flight,
        partner: Option<&FlightView>,
        stats: &mut Stats,
    ) {
        for action in &rule.actions {
            match action {
                Action::Callback(name) => {
                    let view = flight.view();
                    self.invoke(name, &view, partner, stats);
                    stats.callbacks_fired += 1;
                }
                Action::ExpireCallback(name) => {
                    flight.register_expire_callback(name);
                }
                Action::Print => {
                    println!("{}", self.format_line(&rule.name, flight));
                    stats.prints_emitted += 1;
                }
                Action::Note(Some(value)) => {
                    debug!(flight = %flight.ident, rule = %rule.name, note = %value, "setting note");
                    flight.notes.insert(rule.name.clone(), value.clone());
                    stats.notes_set += 1;
                }
                Action::Note(None) => {
                    flight.notes.remove(&rule.name);
                }
                Action::Track => {} // counted through the statistics interface
                Action::Webhook { kind, target } => {
                    let job = Job::Webhook {
                        kind: kind.clone(),
                        target: target.clone(),
                        message: self.format_line(&rule.name, flight),
                    };
                    if self.enqueue(job) {
                        stats.webhooks_enqueued += 1;
                    } else {
                        stats.jobs_dropped += 1;
                    }
                }
                Action::Shell(template) => {
                    let job = Job::Shell {
                        command: expand_template(template, flight),
                    };
                    if self.enqueue(job) {
                        stats.shells_enqueued += 1;
                    } else {
                        stats.jobs_dropped += 1;
                    }
                }
            }
        }
    }

    /// Run the flight's registered expiration callbacks as it is evicted.
    pub fn fire_expire(&self, flight: &Flight, stats: &mut Stats) {
        let view = flight.view();
        for name in flight.expire_callbacks() {
            self.invoke(name, &view, None, stats);
            stats.expire_callbacks_fired += 1;
        }
    }

    fn invoke(&self, name: &str, view: &FlightView, partner: Option<&FlightView>, stats: &mut Stats) {
        let Some(handler) = self.callbacks.get(name) else {
            // Names are validated at startup, so this should not happen.
            warn!(callback = name, "callback not registered");
            return;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(view, partner))).is_err() {
            warn!(callback = name, flight = %view.ident, "callback panicked");
            stats.callback_panics += 1;
        }
    }

    fn enqueue(&self, job: Job) -> bool {
        match &self.worker {
            Some(worker) => worker.try_enqueue(job),
            None => {
                warn!("worker pool not started, dropping job");
                false
            }
        }
    }

    /// One-line summary: time, rule, identifier, altitude + trend, heading,
    /// speed, position, regions, notes.
    fn format_line(&self, rule_name: &str, flight: &Flight) -> String {
        let ts = DateTime::from_timestamp(flight.last.now as i64, 0)
            .map(|t| t.with_timezone(&self.tz).format("%m/%d/%y %H:%M:%S").to_string())
            .unwrap_or_else(|| format!("@{:.0}", flight.last.now));

        let regions = flight
            .current_regions
            .iter()
            .map(|r| r.as_deref().unwrap_or("-"))
            .collect::<Vec<_>>()
            .join(", ");

        let mut line = format!(
            "{ts}: rule {rule_name} matched {} {} [{regions}]",
            flight.last.summary(),
            flight.alt_trend().glyph(),
        );
        if let Some(notes) = flight.notes_joined() {
            line.push(' ');
            line.push_str(&notes);
        }
        line
    }
}

/// Expand `{field}` placeholders in a shell template from flight state.
fn expand_template(template: &str, flight: &Flight) -> String {
    let report = &flight.last;
    let fmt_opt_f = |v: Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
    template
        .replace("{flight_id}", &flight.ident)
        .replace("{lat}", &format!("{:.4}", report.lat))
        .replace("{lon}", &format!("{:.4}", report.lon))
        .replace(
            "{alt}",
            &report.alt_baro.map(|a| a.to_string()).unwrap_or_default(),
        )
        .replace("{gs}", &fmt_opt_f(report.gs))
        .replace("{track}", &fmt_opt_f(report.track))
        .replace("{time}", &format!("{:.0}", report.now))
        .replace("{note}", &flight.notes_joined().unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFile;
    use crate::lists::AircraftLists;
    use crate::regions::RegionSet;
    use crate::report::Report;
    use crate::rules::RuleSet;
    use serde_json::json;
    use std::sync::Mutex;

    fn make_flight() -> Flight {
        let v = json!({"flight": "N12345", "lat": 37.5, "lon": -122.1,
                       "alt_baro": 1200, "gs": 95.0, "track": 310.0, "now": 1700000000.0});
        Flight::new(
            Report::from_json(&v, 0.0).unwrap(),
            &RegionSet::default(),
            4,
        )
    }

    fn one_rule(yaml: &str) -> Rule {
        let cfg = ConfigFile::from_yaml_str(yaml).unwrap();
        let lists = AircraftLists::from_config(&cfg.aircraft_lists);
        RuleSet::compile(&cfg, &lists).unwrap().get(0).unwrap().clone()
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn test_callback_receives_view() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();

        let mut dispatcher = Dispatcher::new(utc());
        dispatcher.register_callback(
            "cb",
            Box::new(move |f, partner| {
                seen2.lock().unwrap().push((f.ident.clone(), partner.is_some()));
            }),
        );

        let rule = one_rule("rules:\n  r:\n    actions: { callback: cb }\n");
        let mut flight = make_flight();
        let mut stats = Stats::new();
        dispatcher.dispatch(&rule, &mut flight, None, &mut stats);

        assert_eq!(seen.lock().unwrap().as_slice(), &[("N12345".to_string(), false)]);
        assert_eq!(stats.callbacks_fired, 1);
    }

    #[test]
    fn test_callback_panic_swallowed() {
        let mut dispatcher = Dispatcher::new(utc());
        dispatcher.register_callback("boom", Box::new(|_, _| panic!("user bug")));

        let rule = one_rule("rules:\n  r:\n    actions: { callback: boom }\n");
        let mut flight = make_flight();
        let mut stats = Stats::new();
        dispatcher.dispatch(&rule, &mut flight, None, &mut stats);
        assert_eq!(stats.callback_panics, 1);
    }

    #[test]
    fn test_note_set_and_clear() {
        let dispatcher = Dispatcher::new(utc());
        let mut flight = make_flight();
        let mut stats = Stats::new();

        let set = one_rule("rules:\n  tagger:\n    actions: { note: dusty }\n");
        dispatcher.dispatch(&set, &mut flight, None, &mut stats);
        assert_eq!(flight.notes.get("tagger").map(String::as_str), Some("dusty"));

        let clear = one_rule("rules:\n  tagger:\n    actions: { note: null }\n");
        dispatcher.dispatch(&clear, &mut flight, None, &mut stats);
        assert!(flight.notes.is_empty());
    }

    #[test]
    fn test_expire_callback_registers_not_fires() {
        let fired = Arc::new(Mutex::new(0u32));
        let fired2 = fired.clone();

        let mut dispatcher = Dispatcher::new(utc());
        dispatcher.register_callback(
            "gone",
            Box::new(move |_, _| *fired2.lock().unwrap() += 1),
        );

        let rule = one_rule("rules:\n  r:\n    actions: { expire_callback: gone }\n");
        let mut flight = make_flight();
        let mut stats = Stats::new();
        dispatcher.dispatch(&rule, &mut flight, None, &mut stats);

        assert_eq!(*fired.lock().unwrap(), 0, "must not fire at match time");
        assert_eq!(flight.expire_callbacks(), &["gone".to_string()]);

        dispatcher.fire_expire(&flight, &mut stats);
        assert_eq!(*fired.lock().unwrap(), 1);
        assert_eq!(stats.expire_callbacks_fired, 1);
    }

    #[test]
    fn test_jobs_dropped_without_worker() {
        let dispatcher = Dispatcher::new(utc());
        let rule = one_rule("rules:\n  r:\n    actions: { webhook: [slack, ops] }\n");
        let mut flight = make_flight();
        let mut stats = Stats::new();
        dispatcher.dispatch(&rule, &mut flight, None, &mut stats);
        assert_eq!(stats.jobs_dropped, 1);
        assert_eq!(stats.webhooks_enqueued, 0);
    }

    #[test]
    fn test_expand_template() {
        let flight = make_flight();
        let cmd = expand_template("notify {flight_id} at {alt} ft ({lat},{lon})", &flight);
        assert_eq!(cmd, "notify N12345 at 1200 ft (37.5000,-122.1000)");
    }

    #[test]
    fn test_format_line() {
        let dispatcher = Dispatcher::new(utc());
        let flight = make_flight();
        let line = dispatcher.format_line("low", &flight);
        assert!(line.contains("rule low matched"), "{line}");
        assert!(line.contains("N12345"), "{line}");
        assert!(line.contains("1200 MSL"), "{line}");
        // 1700000000 is 2023-11-14 22:13:20 UTC
        assert!(line.starts_with("11/14/23 22:13:20"), "{line}");
    }
}
