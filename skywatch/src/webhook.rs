//! Background worker pool for outbound actions.
//!
//! Webhook and shell actions must never block the driver loop, so they are
//! enqueued onto a bounded channel consumed by a small pool of worker
//! threads. Overflow drops the job with a warning — backpressure is a
//! drop-with-log policy, by contract.
//!
//! Webhook transports are registered by kind before the engine starts; the
//! registry is read-only afterwards.

use std::collections::HashMap;
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Jobs queued behind the driver loop.
#[derive(Debug, Clone)]
pub enum Job {
    Webhook {
        kind: String,
        target: String,
        message: String,
    },
    Shell {
        command: String,
    },
}

/// Outbound message transport, registered per webhook kind.
pub trait WebhookTransport: Send + Sync {
    fn send(&self, target: &str, message: &str) -> std::result::Result<(), String>;
}

/// Default transport: POST the message as JSON to a fixed URL.
pub struct HttpPostTransport {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpPostTransport {
    pub fn new(url: &str) -> Result<HttpPostTransport> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EngineError::Config(format!("webhook client: {e}")))?;
        Ok(HttpPostTransport {
            client,
            url: url.to_string(),
        })
    }
}

impl WebhookTransport for HttpPostTransport {
    fn send(&self, target: &str, message: &str) -> std::result::Result<(), String> {
        let payload = serde_json::json!({ "target": target, "text": message });
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Bounded queue depth; jobs beyond it are dropped.
pub const QUEUE_CAPACITY: usize = 1024;

const WORKER_THREADS: usize = 2;

/// The worker pool. Owns the queue sender and the worker threads; dropping
/// it (or calling `shutdown`) closes the queue and joins the workers after
/// they drain it.
pub struct ActionWorker {
    tx: Option<SyncSender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl ActionWorker {
    pub fn start(transports: HashMap<String, Arc<dyn WebhookTransport>>) -> ActionWorker {
        let (tx, rx) = mpsc::sync_channel::<Job>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));
        let transports = Arc::new(transports);

        let handles = (0..WORKER_THREADS)
            .map(|i| {
                let rx = Arc::clone(&rx);
                let transports = Arc::clone(&transports);
                thread::Builder::new()
                    .name(format!("action-worker-{i}"))
                    .spawn(move || worker_loop(rx, transports))
                    .expect("failed to spawn action worker thread")
            })
            .collect();

        ActionWorker {
            tx: Some(tx),
            handles,
        }
    }

    /// Enqueue without blocking. Returns false when the queue is full (the
    /// job is dropped) or the pool is shut down.
    pub fn try_enqueue(&self, job: Job) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        match tx.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                warn!(?job, "action queue full, dropping job");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Close the queue and wait for the workers to drain it.
    pub fn shutdown(&mut self) {
        self.tx.take();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ActionWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    rx: Arc<Mutex<Receiver<Job>>>,
    transports: Arc<HashMap<String, Arc<dyn WebhookTransport>>>,
) {
    loop {
        let job = match rx.lock() {
            Ok(guard) => guard.recv(),
            Err(_) => break,
        };
        match job {
            Ok(job) => run_job(job, &transports),
            Err(_) => break, // queue closed and drained
        }
    }
}

fn run_job(job: Job, transports: &HashMap<String, Arc<dyn WebhookTransport>>) {
    match job {
        Job::Webhook {
            kind,
            target,
            message,
        } => match transports.get(&kind) {
            Some(transport) => {
                if let Err(e) = transport.send(&target, &message) {
                    warn!(%kind, %target, error = %e, "webhook delivery failed");
                } else {
                    debug!(%kind, %target, "webhook delivered");
                }
            }
            None => warn!(%kind, "no transport registered for webhook kind"),
        },
        Job::Shell { command } => {
            let status = Command::new("sh")
                .arg("-c")
                .arg(&command)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(s) if s.success() => debug!(%command, "shell action completed"),
                Ok(s) => warn!(%command, code = ?s.code(), "shell action exited nonzero"),
                Err(e) => warn!(%command, error = %e, "shell action failed to spawn"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Recording(Mutex<Vec<(String, String)>>);

    impl WebhookTransport for Recording {
        fn send(&self, target: &str, message: &str) -> std::result::Result<(), String> {
            self.0.lock().unwrap().push((target.into(), message.into()));
            Ok(())
        }
    }

    #[test]
    fn test_jobs_delivered_to_transport() {
        let recorder = Arc::new(Recording(Mutex::new(Vec::new())));
        let mut transports: HashMap<String, Arc<dyn WebhookTransport>> = HashMap::new();
        transports.insert("slack".into(), recorder.clone());

        let mut worker = ActionWorker::start(transports);
        assert!(worker.try_enqueue(Job::Webhook {
            kind: "slack".into(),
            target: "ops".into(),
            message: "low pass".into(),
        }));
        worker.shutdown();

        let seen = recorder.0.lock().unwrap();
        assert_eq!(seen.as_slice(), &[("ops".to_string(), "low pass".to_string())]);
    }

    #[test]
    fn test_unknown_kind_is_swallowed() {
        let mut worker = ActionWorker::start(HashMap::new());
        assert!(worker.try_enqueue(Job::Webhook {
            kind: "pager".into(),
            target: "oncall".into(),
            message: "x".into(),
        }));
        worker.shutdown(); // must not hang or panic
    }

    #[test]
    fn test_enqueue_after_shutdown() {
        let mut worker = ActionWorker::start(HashMap::new());
        worker.shutdown();
        assert!(!worker.try_enqueue(Job::Shell { command: "true".into() }));
    }

    #[test]
    fn test_shell_job_runs() {
        let mut worker = ActionWorker::start(HashMap::new());
        assert!(worker.try_enqueue(Job::Shell { command: "true".into() }));
        assert!(worker.try_enqueue(Job::Shell { command: "false".into() })); // nonzero: logged
        worker.shutdown();
    }
}
