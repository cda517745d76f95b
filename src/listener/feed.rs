//! Change feed worker.
//!
//! The host's change feed is a single, ordered stream of object updates.
//! `ChangeFeed` owns a dedicated worker thread that takes events off a
//! bounded queue and dispatches them one at a time, in delivery order.
//! Delivery applies backpressure instead of dropping: an update that never
//! reaches the dispatcher is a missed trigger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{ExecutionError, ListenerError, ListenerResult};
use crate::listener::dispatcher::{DispatchReport, Dispatcher};
use crate::object::{DeviceSnapshot, UpdatePair, VariableSnapshot};

/// One update delivered by the host's change feed.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChangeEvent {
    Device(UpdatePair<DeviceSnapshot>),
    Variable(UpdatePair<VariableSnapshot>),
}

impl ChangeEvent {
    /// Runs this event through the dispatcher on the calling thread.
    pub fn dispatch(&self, dispatcher: &Dispatcher) -> DispatchReport {
        match self {
            Self::Device(pair) => dispatcher.on_device_updated(&pair.old, &pair.new),
            Self::Variable(pair) => dispatcher.on_variable_updated(&pair.old, &pair.new),
        }
    }
}

#[derive(Debug)]
enum FeedMsg {
    Event(Box<ChangeEvent>),
    Drain(Sender<()>),
}

fn disconnected() -> ListenerError {
    ExecutionError::Disconnected {
        path: "change_feed".to_string(),
    }
    .into()
}

/// Background dispatcher for the change feed.
#[derive(Debug)]
pub struct ChangeFeed {
    tx: Option<Sender<FeedMsg>>,
    join: Option<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
    dropped_reports: Arc<AtomicU64>,
}

impl ChangeFeed {
    /// Starts the worker thread.
    ///
    /// When `reports` is given, every dispatch report is forwarded to it
    /// with `try_send`; reports that do not fit are counted and dropped.
    pub fn spawn(
        dispatcher: Arc<Dispatcher>,
        cfg: &EngineConfig,
        reports: Option<Sender<DispatchReport>>,
    ) -> ListenerResult<Self> {
        let (tx, rx) = bounded::<FeedMsg>(cfg.feed_queue_capacity.max(1));
        let processed = Arc::new(AtomicU64::new(0));
        let dropped_reports = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            dispatcher,
            processed: Arc::clone(&processed),
            dropped_reports: Arc::clone(&dropped_reports),
            reports,
        };
        let join = thread::Builder::new()
            .name("changewatch-feed".to_string())
            .spawn(move || worker.run(&rx))
            .map_err(|e| ListenerError::internal(format!("spawn change feed worker: {e}")))?;

        Ok(Self {
            tx: Some(tx),
            join: Some(join),
            processed,
            dropped_reports,
        })
    }

    /// Queues an event, blocking while the queue is full.
    pub fn deliver(&self, event: ChangeEvent) -> ListenerResult<()> {
        let tx = self.tx.as_ref().ok_or_else(disconnected)?;
        tx.send(FeedMsg::Event(Box::new(event)))
            .map_err(|_| disconnected())
    }

    /// Blocks until every event delivered before this call was dispatched.
    pub fn drain(&self) -> ListenerResult<()> {
        let tx = self.tx.as_ref().ok_or_else(disconnected)?;
        let (ack_tx, ack_rx) = bounded::<()>(1);
        tx.send(FeedMsg::Drain(ack_tx)).map_err(|_| disconnected())?;
        ack_rx.recv().map_err(|_| disconnected())
    }

    /// Number of events dispatched so far.
    #[must_use]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Reports dropped because the report channel was full or closed.
    #[must_use]
    pub fn dropped_reports(&self) -> u64 {
        self.dropped_reports.load(Ordering::Relaxed)
    }

    /// Closes the queue and waits for queued events to finish.
    pub fn shutdown(mut self) -> ListenerResult<()> {
        self.close()
    }

    fn close(&mut self) -> ListenerResult<()> {
        drop(self.tx.take());
        if let Some(handle) = self.join.take() {
            handle
                .join()
                .map_err(|_| ListenerError::internal("change feed worker panicked"))?;
        }
        Ok(())
    }
}

impl Drop for ChangeFeed {
    fn drop(&mut self) {
        // The feed holds the only sender, so the worker exits once the queue
        // is empty and joining cannot deadlock.
        if let Err(err) = self.close() {
            warn!("{err}");
        }
    }
}

struct Worker {
    dispatcher: Arc<Dispatcher>,
    processed: Arc<AtomicU64>,
    dropped_reports: Arc<AtomicU64>,
    reports: Option<Sender<DispatchReport>>,
}

impl Worker {
    fn run(self, rx: &Receiver<FeedMsg>) {
        for msg in rx {
            match msg {
                FeedMsg::Event(event) => {
                    let report = event.dispatch(&self.dispatcher);
                    self.processed.fetch_add(1, Ordering::Relaxed);
                    self.forward(report);
                }
                FeedMsg::Drain(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        debug!("change feed closed after {} events", self.processed.load(Ordering::Relaxed));
    }

    fn forward(&self, report: DispatchReport) {
        let Some(reports) = &self.reports else {
            return;
        };
        match reports.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped_reports.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
