//! The engine: configuration assembly plus the driver loop.
//!
//! The loop is single-threaded and synchronous. It consumes JSON points in
//! stream order, advances flight state, evaluates rules, and runs the
//! expiration sweep on the stream's own clock — never wall time — so
//! replayed data is deterministic. Cancellation is observed between
//! reports.
//!
//! ```no_run
//! use skywatch::Engine;
//!
//! let mut engine = Engine::from_yaml_file("rules.yaml")?;
//! engine.register_callback("takeoff_cb", |flight, _| {
//!     println!("departure: {}", flight.ident);
//! });
//! let file = std::io::BufReader::new(std::fs::File::open("replay.jsonl")?);
//! engine.run(file)?;
//! println!("{}", engine.stats().final_report());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::HashSet;
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::FixedOffset;
use tracing::{debug, error, info, warn};

use crate::actions::Dispatcher;
use crate::config::{parse_time_zone, ConfigFile};
use crate::error::{EngineError, Result};
use crate::eval::Evaluator;
use crate::flight::FlightView;
use crate::lists::AircraftLists;
use crate::regions::RegionSet;
use crate::report::Report;
use crate::rules::RuleSet;
use crate::stats::Stats;
use crate::store::{FlightStore, DEFAULT_EXPIRY_SECS};
use crate::webhook::{HttpPostTransport, WebhookTransport};

/// Expiration sweep cadence, stream seconds.
pub const SWEEP_INTERVAL_SECS: f64 = 30.0;

/// Reports older than this relative to the stream clock are dropped.
pub const OUT_OF_ORDER_TOLERANCE_SECS: f64 = 60.0;

pub struct Engine {
    regions: RegionSet,
    lists: AircraftLists,
    evaluator: Evaluator,
    store: FlightStore,
    dispatcher: Dispatcher,
    stats: Stats,
    expiry_secs: f64,
    cancel: Arc<AtomicBool>,
    started: bool,
    /// Highest report timestamp seen.
    stream_clock: f64,
    last_sweep: f64,
}

impl Engine {
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Engine> {
        let cfg = ConfigFile::from_yaml_file(path)?;
        let regions = RegionSet::load(&cfg.config.kmls)?;
        Self::build(cfg, regions)
    }

    pub fn from_yaml_str(text: &str) -> Result<Engine> {
        let cfg = ConfigFile::from_yaml_str(text)?;
        let regions = RegionSet::load(&cfg.config.kmls)?;
        Self::build(cfg, regions)
    }

    /// Build with an explicit region set, overriding any files named in the
    /// config. Used by hosts that construct regions programmatically.
    pub fn with_regions(text: &str, regions: RegionSet) -> Result<Engine> {
        let cfg = ConfigFile::from_yaml_str(text)?;
        Self::build(cfg, regions)
    }

    fn build(cfg: ConfigFile, regions: RegionSet) -> Result<Engine> {
        let lists = AircraftLists::from_config(&cfg.aircraft_lists);
        let rules = RuleSet::compile(&cfg, &lists)?;

        let tz = resolve_time_zone(&cfg, &rules)?;

        let expiry_secs = cfg.config.expiry_secs.unwrap_or(DEFAULT_EXPIRY_SECS);
        if !(expiry_secs > 0.0) {
            return Err(EngineError::Config("expiry_secs must be positive".into()));
        }

        let mut stats = Stats::new();
        for rule in rules.tracked_rules() {
            stats.mark_tracked(rule);
        }

        Ok(Engine {
            evaluator: Evaluator::new(rules, cfg.config.spatial_index, tz),
            dispatcher: Dispatcher::new(tz),
            store: FlightStore::new(),
            stats,
            regions,
            lists,
            expiry_secs,
            cancel: Arc::new(AtomicBool::new(false)),
            started: false,
            stream_clock: 0.0,
            last_sweep: 0.0,
        })
    }

    // -- registration (before start) ----------------------------------------

    /// Associate a name used in the configuration with a handler. For
    /// proximity rules the handler also receives the partner flight.
    pub fn register_callback<F>(&mut self, name: &str, handler: F)
    where
        F: Fn(&FlightView, Option<&FlightView>) + Send + 'static,
    {
        self.dispatcher.register_callback(name, Box::new(handler));
    }

    pub fn register_transport(&mut self, kind: &str, transport: Arc<dyn WebhookTransport>) {
        self.dispatcher.register_transport(kind, transport);
    }

    /// Register the default HTTP POST transport under a kind.
    pub fn register_http_transport(&mut self, kind: &str, url: &str) -> Result<()> {
        let transport = HttpPostTransport::new(url)?;
        self.dispatcher.register_transport(kind, Arc::new(transport));
        Ok(())
    }

    /// Flag observed between reports; set it from another thread to stop
    /// the loop after the current report.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    // -- lifecycle -----------------------------------------------------------

    /// Validate registrations against the rule set and start the worker
    /// pool. Called implicitly by `run`; idempotent.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let callbacks: HashSet<String> =
            self.evaluator.rules().callback_names().map(str::to_string).collect();
        for name in &callbacks {
            if !self.dispatcher.has_callback(name) {
                return Err(EngineError::Config(format!(
                    "callback '{name}' is referenced by a rule but not registered"
                )));
            }
        }

        let kinds: HashSet<String> =
            self.evaluator.rules().webhook_kinds().map(str::to_string).collect();
        for kind in &kinds {
            if !self.dispatcher.has_transport(kind) {
                return Err(EngineError::Config(format!(
                    "webhook kind '{kind}' has no registered transport"
                )));
            }
        }

        self.dispatcher.start_worker();
        self.started = true;
        info!(
            rules = self.evaluator.rule_count(),
            region_files = self.regions.file_count(),
            "engine started"
        );
        Ok(())
    }

    /// Drive the engine over a line-oriented JSON source until EOF or
    /// cancellation, then run the final sweep.
    pub fn run<R: BufRead>(&mut self, reader: R) -> Result<()> {
        self.start()?;

        for line in reader.lines() {
            if self.cancel.load(Ordering::Relaxed) {
                info!("cancellation observed, stopping");
                break;
            }
            match line {
                Ok(line) => self.process_line(&line),
                Err(e) => {
                    error!(error = %e, "source read failed, stopping");
                    break;
                }
            }
        }

        self.finish();
        Ok(())
    }

    /// Process one line of input. Malformed JSON drops the report and the
    /// stream continues.
    pub fn process_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => self.process_value(&value),
            Err(e) => {
                self.stats.reports_read += 1;
                self.stats.reports_dropped += 1;
                debug!(error = %e, "JSON parse fail");
            }
        }
    }

    /// Process one already-parsed JSON point.
    pub fn process_value(&mut self, value: &serde_json::Value) {
        self.stats.reports_read += 1;

        let Some(report) = Report::from_json(value, self.stream_clock) else {
            self.stats.reports_dropped += 1;
            debug!("report dropped: missing position or identifier");
            return;
        };

        if report.now < self.stream_clock - OUT_OF_ORDER_TOLERANCE_SECS {
            self.stats.reports_out_of_order += 1;
            debug!(
                ident = %report.ident,
                ts = report.now,
                clock = self.stream_clock,
                "report dropped: out of order"
            );
            return;
        }

        if report.now > self.stream_clock {
            self.stream_clock = report.now;
        }
        let now = report.now;
        let ident = report.ident.clone();

        if self.store.update(report, &self.regions, self.evaluator.rule_count()) {
            self.stats.flights_created += 1;
        }

        self.evaluator.process(
            &mut self.store,
            &ident,
            now,
            &self.lists,
            &self.dispatcher,
            &mut self.stats,
        );

        if self.last_sweep == 0.0 {
            self.last_sweep = self.stream_clock;
        } else if self.stream_clock - self.last_sweep >= SWEEP_INTERVAL_SECS {
            self.sweep(self.stream_clock);
            self.last_sweep = self.stream_clock;
        }
    }

    fn sweep(&mut self, now: f64) {
        for flight in self.store.expire(now, self.expiry_secs) {
            debug!(ident = %flight.ident, "flight expired");
            self.stats.flights_expired += 1;
            self.dispatcher.fire_expire(&flight, &mut self.stats);
        }
    }

    /// Final sweep: drain every remaining flight (firing registered expire
    /// callbacks) and shut the worker pool down. Idempotent.
    pub fn finish(&mut self) {
        for flight in self.store.drain_all() {
            self.stats.flights_expired += 1;
            self.dispatcher.fire_expire(&flight, &mut self.stats);
        }
        self.dispatcher.shutdown_worker();
        self.started = false;
        info!(
            reports = self.stats.reports_read,
            dropped = self.stats.reports_dropped,
            fires = self.stats.rules_fired,
            "stream complete"
        );
    }

    // -- accessors -----------------------------------------------------------

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn store(&self) -> &FlightStore {
        &self.store
    }
}

fn resolve_time_zone(cfg: &ConfigFile, rules: &RuleSet) -> Result<FixedOffset> {
    match &cfg.config.time_zone {
        Some(s) => parse_time_zone(s),
        None => {
            if rules.iter().any(|r| r.has_time_condition()) {
                warn!("min_time/max_time conditions default to UTC; set config.time_zone");
            }
            Ok(FixedOffset::east_opt(0).unwrap())
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
