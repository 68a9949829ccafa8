//! Session driver
//!
//! The engine's API is not thread-safe, so the adapter runs on exactly one
//! task. [`SessionContext`] owns the adapter and pumps it with a periodic
//! iterate tick: every tick drains the input queue in arrival order,
//! applies each input, delivers the produced effects and publishes a fresh
//! [`SessionSnapshot`]. Engine callbacks and the UI talk to it through a
//! cloneable [`SessionHandle`].
//!
//! ```rust,no_run
//! use softphone_core::{AccountConfig, AdapterBuilder, RecordingEngine, UserRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let handle = AdapterBuilder::new().start(RecordingEngine::new())?;
//!
//! handle.request(UserRequest::Login(AccountConfig::new("sip:alice@example.org")))?;
//! let snapshot = handle.sync().await?;
//! println!("{}", snapshot.registration_text());
//!
//! let last = handle.shutdown().await?;
//! assert!(!last.is_call_active);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::adapter::{SessionAdapter, UserRequest};
use crate::effects::{EffectEmitter, EffectSubscription, SessionEffect};
use crate::error::{AdapterError, AdapterResult};
use crate::events::EngineEvent;
use crate::snapshot::SessionSnapshot;

/// One entry of the driver's input queue
#[derive(Debug)]
pub enum SessionInput {
    /// Engine notification
    Event(EngineEvent),
    /// User request
    Request(UserRequest),
    /// Reply with the snapshot once everything queued before is applied
    Sync(oneshot::Sender<SessionSnapshot>),
    /// Stop after everything queued before is applied
    Shutdown(oneshot::Sender<SessionSnapshot>),
}

/// Owner of the adapter and its iterate loop
pub struct SessionContext {
    adapter: SessionAdapter,
    inputs: mpsc::UnboundedReceiver<SessionInput>,
    effect_tx: broadcast::Sender<SessionEffect>,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    emitter: Arc<EffectEmitter>,
    /// A countdown was ticking at the previous iteration
    counting_down: bool,
}

impl SessionContext {
    /// Create the driver and the handle that feeds it
    pub fn new(adapter: SessionAdapter) -> (Self, SessionHandle) {
        let (input_tx, inputs) = mpsc::unbounded_channel();
        let (effect_tx, _) = broadcast::channel(adapter.config().effect_channel_capacity);
        let (snapshot_tx, snapshot_rx) = watch::channel(adapter.snapshot());
        let emitter = Arc::new(EffectEmitter::new());

        let handle = SessionHandle {
            inputs: input_tx,
            effect_tx: effect_tx.clone(),
            snapshots: snapshot_rx,
            emitter: emitter.clone(),
        };
        let context = Self {
            adapter,
            inputs,
            effect_tx,
            snapshot_tx,
            emitter,
            counting_down: false,
        };
        (context, handle)
    }

    /// Spawn the iterate loop on the current tokio runtime
    pub fn start(adapter: SessionAdapter) -> SessionHandle {
        let (context, handle) = Self::new(adapter);
        tokio::spawn(context.run());
        handle
    }

    /// Run the iterate loop until shutdown or until every handle is dropped
    pub async fn run(mut self) {
        let period = self.adapter.config().iterate_interval();
        info!(period_ms = period.as_millis() as u64, "Session driver started");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if !self.iterate().await {
                break;
            }
        }

        debug!(stats = ?self.adapter.stats(), "Session driver stopped");
    }

    /// Process everything queued so far; `false` once the driver must stop
    async fn iterate(&mut self) -> bool {
        let mut processed = 0usize;
        loop {
            match self.inputs.try_recv() {
                Ok(SessionInput::Event(event)) => {
                    self.adapter.apply(event);
                    processed += 1;
                }
                Ok(SessionInput::Request(request)) => {
                    // Rejections are logged by the adapter.
                    let _ = self.adapter.handle_request(request);
                    processed += 1;
                }
                Ok(SessionInput::Sync(reply)) => {
                    let snapshot = self.publish().await;
                    processed = 0;
                    let _ = reply.send(snapshot);
                }
                Ok(SessionInput::Shutdown(reply)) => {
                    let snapshot = self.publish().await;
                    let _ = reply.send(snapshot);
                    return false;
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    self.publish().await;
                    return false;
                }
            }
        }

        // One more publish after the last countdown reaches zero
        let counting_down = self.adapter.has_running_countdown();
        if processed > 0 || counting_down || self.counting_down {
            self.publish().await;
        }
        self.counting_down = counting_down;
        true
    }

    /// Deliver pending effects and publish the current snapshot
    async fn publish(&mut self) -> SessionSnapshot {
        for effect in self.adapter.take_effects() {
            // No receiver is fine; observers may use the emitter only.
            let _ = self.effect_tx.send(effect.clone());
            self.emitter.emit(effect).await;
        }
        let snapshot = self.adapter.snapshot();
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }
}

/// Cloneable handle to a running session driver
#[derive(Clone)]
pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    effect_tx: broadcast::Sender<SessionEffect>,
    snapshots: watch::Receiver<SessionSnapshot>,
    emitter: Arc<EffectEmitter>,
}

impl SessionHandle {
    /// Queue an engine notification; never blocks
    pub fn notify(&self, event: impl Into<EngineEvent>) -> AdapterResult<()> {
        self.send(SessionInput::Event(event.into()))
    }

    /// Queue a user request; never blocks
    ///
    /// The outcome shows up as effects and in the next snapshot.
    pub fn request(&self, request: UserRequest) -> AdapterResult<()> {
        self.send(SessionInput::Request(request))
    }

    /// Wait until everything queued so far is applied
    pub async fn sync(&self) -> AdapterResult<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionInput::Sync(tx))?;
        rx.await.map_err(|_| AdapterError::SessionClosed)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Register an effect observer
    pub fn subscribe(&self, subscription: EffectSubscription) -> uuid::Uuid {
        self.emitter.subscribe(subscription)
    }

    pub fn unsubscribe(&self, subscription_id: uuid::Uuid) -> bool {
        self.emitter.unsubscribe(subscription_id)
    }

    /// Broadcast receiver of every effect from now on
    pub fn effects(&self) -> broadcast::Receiver<SessionEffect> {
        self.effect_tx.subscribe()
    }

    /// Stop the driver once everything queued so far is applied
    pub async fn shutdown(&self) -> AdapterResult<SessionSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(SessionInput::Shutdown(tx))?;
        let snapshot = rx.await.map_err(|_| AdapterError::SessionClosed)?;
        info!("Session driver shut down");
        Ok(snapshot)
    }

    pub fn is_closed(&self) -> bool {
        self.inputs.is_closed()
    }

    fn send(&self, input: SessionInput) -> AdapterResult<()> {
        self.inputs
            .send(input)
            .map_err(|_| AdapterError::SessionClosed)
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.is_closed())
            .field("subscriptions", &self.emitter.subscription_count())
            .finish()
    }
}
