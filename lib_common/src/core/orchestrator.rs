//! # Orchestrator
//!
//! The coordinator of the flag monitor. It owns at most one running feed
//! monitor, the [`FlagStateStore`] and the actuator, and is the only task that
//! touches any of them, so none of them need a lock.
//!
//! The UI side talks to it through an [`OrchestratorHandle`]:
//! - feed selection is a `watch` channel the orchestrator follows,
//! - requests that need an answer (test a color, change the bulb address)
//!   travel on an `mpsc` channel and are answered on a `oneshot`,
//! - a [`StatusSnapshot`] is republished on a `watch` channel after every
//!   change and on every connectivity tick.
//!
//! Switching feeds stops the old monitor and waits for it before the new one
//! is spawned. Each monitor gets a fresh update channel, so nothing the old
//! monitor queued can reach the actuator after the switch.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::flag_state::FlagStateStore;
use crate::actuators::{ActuatorGateway, ColorTables};
use crate::ingestors::monitor::{MonitorContext, MonitorFactory};
use crate::ingestors::types::{ConnectionState, FeedKind, FlagCode, Update};
use crate::loggers::LogSink;

pub const CONNECTIVITY_INTERVAL: Duration = Duration::from_secs(5);
pub const STOP_TIMEOUT: Duration = Duration::from_secs(5);

const UPDATE_CHANNEL_CAPACITY: usize = 64;
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// The flag currently shown by the actuator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentStatus {
    pub feed: FeedKind,
    pub code: FlagCode,
    pub label: String,
    pub hex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub active_feed: FeedKind,
    pub feed_connected: bool,
    pub actuator_connected: bool,
    pub current: Option<CurrentStatus>,
}

impl StatusSnapshot {
    fn idle(feed: FeedKind) -> Self {
        Self {
            active_feed: feed,
            feed_connected: false,
            actuator_connected: false,
            current: None,
        }
    }
}

#[derive(Debug)]
pub enum OrchestratorRequest {
    /// Shows the color for `code` in the active feed's table. Answers whether
    /// the code was known and the actuator is connected afterwards.
    TestColor {
        code: FlagCode,
        responder: oneshot::Sender<bool>,
    },
    /// Points the actuator at `address` and reconnects. Answers whether the
    /// reconnect succeeded.
    UpdateAddress {
        address: String,
        responder: oneshot::Sender<bool>,
    },
}

struct ActiveMonitor {
    kind: FeedKind,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    updates: mpsc::Receiver<Update>,
    connection: ConnectionState,
    updates_closed: bool,
}

pub struct Orchestrator<A: ActuatorGateway> {
    factory: Box<dyn MonitorFactory>,
    actuator: A,
    colors: Arc<ColorTables>,
    store: FlagStateStore,
    log: LogSink,
    selection: watch::Receiver<FeedKind>,
    requests: mpsc::Receiver<OrchestratorRequest>,
    status: watch::Sender<StatusSnapshot>,
    active: Option<ActiveMonitor>,
    active_kind: FeedKind,
    current: Option<CurrentStatus>,
    connectivity_interval: Duration,
    stop_timeout: Duration,
}

impl<A: ActuatorGateway + 'static> Orchestrator<A> {
    pub fn new(
        factory: Box<dyn MonitorFactory>,
        actuator: A,
        colors: Arc<ColorTables>,
        initial: FeedKind,
        log: LogSink,
    ) -> (Self, OrchestratorHandle) {
        let (selection_tx, selection_rx) = watch::channel(initial);
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::idle(initial));

        let orchestrator = Self {
            factory,
            actuator,
            colors,
            store: FlagStateStore::new(),
            log,
            selection: selection_rx,
            requests: request_rx,
            status: status_tx,
            active: None,
            active_kind: initial,
            current: None,
            connectivity_interval: CONNECTIVITY_INTERVAL,
            stop_timeout: STOP_TIMEOUT,
        };
        let handle = OrchestratorHandle {
            selection: Arc::new(selection_tx),
            requests: request_tx,
            status: status_rx,
        };
        (orchestrator, handle)
    }

    pub fn with_timings(mut self, connectivity_interval: Duration, stop_timeout: Duration) -> Self {
        self.connectivity_interval = connectivity_interval;
        self.stop_timeout = stop_timeout;
        self
    }

    /// Runs until `shutdown` is cancelled, then stops the active monitor.
    pub async fn run(mut self, shutdown: CancellationToken) {
        self.log.info("Connecting to bulb...");
        match self.actuator.connect().await {
            Ok(alias) => self.log.info(&format!("Connected to bulb: {alias}")),
            Err(e) => self.log.error(&format!("Error connecting to bulb: {e}")),
        }

        let initial = *self.selection.borrow_and_update();
        self.switch_to(initial).await;

        let mut ticker = tokio::time::interval(self.connectivity_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut selection_open = true;
        let mut requests_open = true;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => break,

                changed = self.selection.changed(), if selection_open => match changed {
                    Ok(()) => {
                        let kind = *self.selection.borrow_and_update();
                        if kind != self.active_kind || self.active.is_none() {
                            self.switch_to(kind).await;
                        }
                    }
                    Err(_) => selection_open = false,
                },

                update = next_update(&mut self.active) => match update {
                    Some(update) => self.handle_update(update).await,
                    None => {
                        if let Some(active) = self.active.as_mut() {
                            active.updates_closed = true;
                        }
                    }
                },

                request = self.requests.recv(), if requests_open => match request {
                    Some(request) => self.handle_request(request).await,
                    None => requests_open = false,
                },

                _ = ticker.tick() => self.check_connectivity().await,
            }
        }

        self.stop_active().await;
        self.publish();
        self.log.info("Orchestrator stopped");
    }

    async fn switch_to(&mut self, kind: FeedKind) {
        self.stop_active().await;

        self.active_kind = kind;
        self.current = None;
        self.actuator.set_active_feed_kind(kind);
        self.log.info(&format!("Switching to {kind} feed"));

        let mut monitor = match self.factory.create(kind) {
            Ok(monitor) => monitor,
            Err(e) => {
                self.log.error(&format!("Failed to start {kind} monitor: {e}"));
                self.publish();
                return;
            }
        };

        if let Some(code) = self.store.last_seen(kind).cloned() {
            self.apply_code(kind, code).await;
        }

        let (tx, rx) = mpsc::channel(UPDATE_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let connection = monitor.connection();
        let ctx = MonitorContext::new(tx, cancel.clone(), self.log.clone());
        let handle = tokio::spawn(async move { monitor.run(ctx).await });

        self.active = Some(ActiveMonitor {
            kind,
            cancel,
            handle,
            updates: rx,
            connection,
            updates_closed: false,
        });
        self.publish();
    }

    /// Cancels the active monitor and waits for its task, aborting it if it
    /// outlives `stop_timeout`. Its queued updates are discarded.
    async fn stop_active(&mut self) {
        let Some(mut active) = self.active.take() else {
            return;
        };

        active.cancel.cancel();
        active.updates.close();

        match tokio::time::timeout(self.stop_timeout, &mut active.handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::warn!("{} monitor task ended abnormally: {}", active.kind, e),
            Err(_) => {
                self.log.warn(&format!(
                    "{} monitor did not stop within {}s; aborting",
                    active.kind,
                    self.stop_timeout.as_secs()
                ));
                active.handle.abort();
                let _ = active.handle.await;
            }
        }
        log::debug!("{} monitor stopped", active.kind);
    }

    async fn handle_update(&mut self, update: Update) {
        if update.feed_kind != self.active_kind {
            log::debug!("Ignoring {} update while {} is active", update.feed_kind, self.active_kind);
            return;
        }
        let Some(code) = update.flag_code() else {
            return;
        };
        if !self.store.should_emit(update.feed_kind, &code) {
            return;
        }
        self.apply_code(update.feed_kind, code).await;
    }

    /// Resolves `code` and drives the actuator. Returns `false` for codes
    /// missing from the feed's table; those never reach the actuator.
    async fn apply_code(&mut self, kind: FeedKind, code: FlagCode) -> bool {
        let Some(color) = self.colors.lookup(kind, &code).cloned() else {
            self.log.warn(&format!("[{kind}] Unknown status code: {code}"));
            return false;
        };

        self.log.info(&format!("[{}] Status: {} (code: {})", kind, color.label, code));
        self.current = Some(CurrentStatus {
            feed: kind,
            code: code.clone(),
            label: color.label,
            hex: color.hex,
        });
        self.actuator.set_color(&code, &self.log).await;
        self.publish();
        true
    }

    async fn handle_request(&mut self, request: OrchestratorRequest) {
        match request {
            OrchestratorRequest::TestColor { code, responder } => {
                self.log.info(&format!("Testing color for code {code}"));
                let applied = self.apply_code(self.active_kind, code).await;
                let _ = responder.send(applied && self.actuator.is_connected());
            }
            OrchestratorRequest::UpdateAddress { address, responder } => {
                let address = address.trim().to_string();
                if address.is_empty() {
                    let _ = responder.send(false);
                    return;
                }
                self.log.info(&format!("Bulb address changed to {address}"));
                self.actuator.update_address(address);
                let connected = match self.actuator.connect().await {
                    Ok(alias) => {
                        self.log.info(&format!("Connected to bulb: {alias}"));
                        true
                    }
                    Err(e) => {
                        self.log.error(&format!("Error connecting to bulb: {e}"));
                        false
                    }
                };
                self.publish();
                let _ = responder.send(connected);
            }
        }
    }

    /// Restarts a monitor whose task ended on its own, retries a monitor that
    /// failed to build, and republishes the snapshot.
    async fn check_connectivity(&mut self) {
        let restart = match &self.active {
            Some(active) => active.handle.is_finished(),
            None => true,
        };
        if restart {
            self.log.warn(&format!("{} monitor is not running; restarting", self.active_kind));
            self.switch_to(self.active_kind).await;
        }
        self.publish();
    }

    fn publish(&self) {
        let snapshot = StatusSnapshot {
            active_feed: self.active_kind,
            feed_connected: self
                .active
                .as_ref()
                .is_some_and(|active| active.connection.is_connected()),
            actuator_connected: self.actuator.is_connected(),
            current: self.current.clone(),
        };
        self.status.send_replace(snapshot);
    }
}

async fn next_update(active: &mut Option<ActiveMonitor>) -> Option<Update> {
    match active {
        Some(active) if !active.updates_closed => active.updates.recv().await,
        _ => std::future::pending().await,
    }
}

/// The UI-side handle. Cheap to clone; every clone drives the same
/// orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle {
    selection: Arc<watch::Sender<FeedKind>>,
    requests: mpsc::Sender<OrchestratorRequest>,
    status: watch::Receiver<StatusSnapshot>,
}

impl OrchestratorHandle {
    pub fn select_feed(&self, kind: FeedKind) {
        self.selection.send_replace(kind);
    }

    pub fn selected_feed(&self) -> FeedKind {
        *self.selection.borrow()
    }

    pub async fn test_color(&self, code: FlagCode) -> bool {
        self.ask(|responder| OrchestratorRequest::TestColor { code, responder })
            .await
    }

    pub async fn update_address(&self, address: impl Into<String>) -> bool {
        let address = address.into();
        self.ask(|responder| OrchestratorRequest::UpdateAddress { address, responder })
            .await
    }

    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StatusSnapshot> {
        self.status.clone()
    }

    async fn ask<F>(&self, build: F) -> bool
    where
        F: FnOnce(oneshot::Sender<bool>) -> OrchestratorRequest,
    {
        let (responder, reply) = oneshot::channel();
        if self.requests.send(build(responder)).await.is_err() {
            return false;
        }
        reply.await.unwrap_or(false)
    }
}
