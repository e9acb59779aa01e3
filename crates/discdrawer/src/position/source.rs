//! The position source.
//!
//! [`PositionSource`] owns a [`LocationProvider`] and runs a pump task that
//! handles the provider's events one at a time, in arrival order:
//!
//! - authorization changes update an observable value and drive the
//!   provider (granted: start updating if tracking was requested; denied:
//!   stop updating; undetermined: ask for permission),
//! - fixes are published to the latest-position value and to every open
//!   [`PositionStream`], but only while authorization is granted and
//!   tracking is requested,
//! - every open [`UpdateStream`] sees fixes and authorization changes
//!   interleaved in the order the pump handled them,
//! - failures are logged and broadcast as [`SensorFault`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{AuthorizationState, LocationProvider, Position, ProviderEvent, SensorFault};

/// Capacity of the sensor fault side channel.
const FAULT_CHANNEL_CAPACITY: usize = 32;

/// State shared between the source and its pump task.
#[derive(Debug, Default)]
struct Shared {
    tracking: AtomicBool,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SourceUpdate>>>,
}

impl Shared {
    fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SourceUpdate> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn publish(&self, update: SourceUpdate) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Drop subscribers whose stream has been dropped.
        subscribers.retain(|tx| tx.send(update).is_ok());
    }
}

/// One thing a [`PositionSource`] delivered to its subscribers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceUpdate {
    /// A published fix.
    Position(Position),
    /// The authorization state changed.
    Authorization(AuthorizationState),
}

/// Fixes and authorization changes in the order they happened.
///
/// A fix that was published while access was granted always arrives before
/// the revocation that followed it. Same lifetime rules as
/// [`PositionStream`].
#[derive(Debug)]
pub struct UpdateStream {
    rx: mpsc::UnboundedReceiver<SourceUpdate>,
}

impl UpdateStream {
    /// Wait for the next update.
    ///
    /// Returns `None` once the source has shut down. Cancel-safe.
    pub async fn next(&mut self) -> Option<SourceUpdate> {
        self.rx.recv().await
    }

    /// Take the next already-delivered update without waiting.
    pub fn try_next(&mut self) -> Option<SourceUpdate> {
        self.rx.try_recv().ok()
    }
}

/// An ordered stream of positions.
///
/// Yields every fix published after the stream was opened, in the order the
/// sensor produced them. The stream cannot be rewound; it ends only when the
/// [`PositionSource`] is dropped. Pausing tracking pauses the stream without
/// ending it.
#[derive(Debug)]
pub struct PositionStream {
    updates: UpdateStream,
}

impl PositionStream {
    /// Wait for the next position.
    ///
    /// Returns `None` once the source has shut down. Cancel-safe.
    pub async fn next(&mut self) -> Option<Position> {
        loop {
            if let SourceUpdate::Position(position) = self.updates.next().await? {
                return Some(position);
            }
        }
    }

    /// Take the next already-delivered position without waiting.
    pub fn try_next(&mut self) -> Option<Position> {
        loop {
            if let SourceUpdate::Position(position) = self.updates.try_next()? {
                return Some(position);
            }
        }
    }
}

/// Wraps a location provider with observable state and position streams.
#[derive(Debug)]
pub struct PositionSource {
    provider: Arc<dyn LocationProvider>,
    shared: Arc<Shared>,
    authorization: watch::Receiver<AuthorizationState>,
    latest: watch::Receiver<Option<Position>>,
    faults: broadcast::Sender<SensorFault>,
    pump: JoinHandle<()>,
}

impl PositionSource {
    /// Attach to a provider and start handling its events.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        let shared = Arc::new(Shared::default());
        let (auth_tx, authorization) = watch::channel(AuthorizationState::Undetermined);
        let (latest_tx, latest) = watch::channel(None);
        let (faults, _) = broadcast::channel(FAULT_CHANNEL_CAPACITY);
        let (delegate, events) = mpsc::unbounded_channel();

        debug!(provider = provider.name(), "Attaching position source");
        provider.attach(delegate);

        let pump = tokio::spawn(pump(
            Arc::clone(&provider),
            Arc::clone(&shared),
            events,
            auth_tx,
            latest_tx,
            faults.clone(),
        ));

        Self {
            provider,
            shared,
            authorization,
            latest,
            faults,
            pump,
        }
    }

    /// The name of the underlying provider.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// The latest known authorization state.
    #[must_use]
    pub fn current_authorization(&self) -> AuthorizationState {
        *self.authorization.borrow()
    }

    /// The most recent published position, if any.
    #[must_use]
    pub fn latest(&self) -> Option<Position> {
        *self.latest.borrow()
    }

    /// Subscribe to sensor fault notifications.
    #[must_use]
    pub fn faults(&self) -> broadcast::Receiver<SensorFault> {
        self.faults.subscribe()
    }

    /// Check if tracking has been requested and not stopped since.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.shared.is_tracking()
    }

    /// Open a stream of positions published from now on.
    #[must_use]
    pub fn positions(&self) -> PositionStream {
        PositionStream {
            updates: self.updates(),
        }
    }

    /// Open a stream of fixes and authorization changes from now on.
    #[must_use]
    pub fn updates(&self) -> UpdateStream {
        UpdateStream {
            rx: self.shared.subscribe(),
        }
    }

    /// Start or continue tracking.
    ///
    /// Idempotent. If permission is undetermined the platform prompt is
    /// triggered and streaming begins once it is granted; if permission is
    /// denied nothing is emitted until it is granted later.
    pub fn request_tracking(&self) {
        let already = self.shared.tracking.swap(true, Ordering::SeqCst);
        match self.provider.authorization_status() {
            AuthorizationState::Undetermined => {
                info!("Location authorization not specified - requesting authorization");
                self.provider.request_authorization();
            }
            AuthorizationState::Granted => {
                if !already {
                    debug!(provider = self.provider.name(), "Starting location updates");
                }
                self.provider.start_updating();
            }
            AuthorizationState::Denied => {
                debug!("Tracking requested while location authorization is denied");
            }
        }
    }

    /// Stop tracking and release the sensor.
    ///
    /// A later [`request_tracking`](Self::request_tracking) resumes emission.
    pub fn stop_tracking(&self) {
        if self.shared.tracking.swap(false, Ordering::SeqCst) {
            debug!(provider = self.provider.name(), "Stopping location updates");
        }
        self.provider.stop_updating();
    }
}

impl Drop for PositionSource {
    fn drop(&mut self) {
        self.shared.tracking.store(false, Ordering::SeqCst);
        self.provider.stop_updating();
        self.pump.abort();
    }
}

async fn pump(
    provider: Arc<dyn LocationProvider>,
    shared: Arc<Shared>,
    mut events: mpsc::UnboundedReceiver<ProviderEvent>,
    authorization: watch::Sender<AuthorizationState>,
    latest: watch::Sender<Option<Position>>,
    faults: broadcast::Sender<SensorFault>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ProviderEvent::AuthorizationChanged(state) => {
                let previous = authorization.send_replace(state);
                if previous != state {
                    info!(from = %previous, to = %state, "Location authorization changed");
                    shared.publish(SourceUpdate::Authorization(state));
                }
                match state {
                    AuthorizationState::Granted => {
                        if shared.is_tracking() {
                            provider.start_updating();
                        }
                    }
                    AuthorizationState::Denied => {
                        provider.stop_updating();
                    }
                    AuthorizationState::Undetermined => {
                        if shared.is_tracking() {
                            provider.request_authorization();
                        }
                    }
                }
            }
            ProviderEvent::Located(position) => {
                if !authorization.borrow().is_granted() || !shared.is_tracking() {
                    trace!(%position, "Dropping fix received while not tracking");
                    continue;
                }
                trace!(
                    %position,
                    accuracy = ?position.horizontal_accuracy(),
                    "Publishing fix"
                );
                latest.send_replace(Some(position));
                shared.publish(SourceUpdate::Position(position));
            }
            ProviderEvent::Failed(message) => {
                warn!(provider = provider.name(), error = %message, "Location sensor fault");
                // No receivers is fine; faults are advisory.
                let _ = faults.send(SensorFault {
                    provider: provider.name(),
                    message,
                    at: Utc::now(),
                });
            }
        }
    }
    debug!(provider = provider.name(), "Provider delegate closed");
}
