//! Simulated location provider.
//!
//! Behaves like a device location manager without any hardware: it answers
//! the permission prompt with a scripted decision, only delivers fixes while
//! updating, and can replay a recorded [`Track`] at a fixed interval. A
//! [`SimulatorHandle`] lets callers inject fixes, faults and permission
//! changes directly.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::{AuthorizationState, LocationProvider, Position, ProviderDelegate, ProviderEvent};
use crate::error::{Error, Result};

/// Default delay between replayed track points.
pub const DEFAULT_REPLAY_INTERVAL: Duration = Duration::from_secs(1);

/// One recorded sample of a track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Latitude in decimal degrees.
    pub latitude: f64,
    /// Longitude in decimal degrees.
    pub longitude: f64,
    /// Horizontal accuracy in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub horizontal_accuracy: Option<f64>,
    /// Replay this sample as a signal loss instead of a fix.
    #[serde(default)]
    pub signal_lost: bool,
}

/// A recorded sequence of samples, loaded from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Samples in the order they were recorded.
    pub points: Vec<TrackPoint>,
}

impl Track {
    /// Load a track from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if any
    /// sample has invalid coordinates.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let track: Self = serde_json::from_str(&data)?;
        for point in &track.points {
            Position::new(point.latitude, point.longitude)?;
        }
        Ok(track)
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Check if the track has no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[derive(Debug)]
struct SimState {
    authorization: AuthorizationState,
    prompt_answer: AuthorizationState,
    delegate: Option<ProviderDelegate>,
    updating: bool,
    starts: usize,
    cursor: usize,
    replay: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<SimState>,
    track: Track,
    interval: Duration,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn send(state: &SimState, event: ProviderEvent) {
        if let Some(delegate) = &state.delegate {
            if delegate.send(event).is_err() {
                trace!("Simulated provider delegate closed");
            }
        }
    }
}

/// A deterministic [`LocationProvider`].
#[derive(Debug)]
pub struct SimulatedProvider {
    inner: Arc<Inner>,
}

impl SimulatedProvider {
    /// A provider whose permission is already granted.
    #[must_use]
    pub fn granted() -> (Self, SimulatorHandle) {
        Self::build(
            AuthorizationState::Granted,
            AuthorizationState::Granted,
            Track::default(),
            DEFAULT_REPLAY_INTERVAL,
        )
    }

    /// A provider whose permission is already denied.
    #[must_use]
    pub fn denied() -> (Self, SimulatorHandle) {
        Self::build(
            AuthorizationState::Denied,
            AuthorizationState::Denied,
            Track::default(),
            DEFAULT_REPLAY_INTERVAL,
        )
    }

    /// A provider that has not been authorized yet and answers the
    /// permission prompt with `answer`.
    #[must_use]
    pub fn prompting(answer: AuthorizationState) -> (Self, SimulatorHandle) {
        Self::build(
            AuthorizationState::Undetermined,
            answer,
            Track::default(),
            DEFAULT_REPLAY_INTERVAL,
        )
    }

    /// A granted provider that replays `track` while updating, one sample
    /// every `interval`.
    #[must_use]
    pub fn replaying(track: Track, interval: Duration) -> (Self, SimulatorHandle) {
        Self::build(
            AuthorizationState::Granted,
            AuthorizationState::Granted,
            track,
            interval,
        )
    }

    fn build(
        authorization: AuthorizationState,
        prompt_answer: AuthorizationState,
        track: Track,
        interval: Duration,
    ) -> (Self, SimulatorHandle) {
        let inner = Arc::new(Inner {
            state: Mutex::new(SimState {
                authorization,
                prompt_answer,
                delegate: None,
                updating: false,
                starts: 0,
                cursor: 0,
                replay: None,
            }),
            track,
            interval,
        });
        let handle = SimulatorHandle {
            inner: Arc::clone(&inner),
        };
        (Self { inner }, handle)
    }
}

impl LocationProvider for SimulatedProvider {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn authorization_status(&self) -> AuthorizationState {
        self.inner.lock().authorization
    }

    fn attach(&self, delegate: ProviderDelegate) {
        let mut state = self.inner.lock();
        state.delegate = Some(delegate);
        let current = state.authorization;
        Inner::send(&state, ProviderEvent::AuthorizationChanged(current));
    }

    fn request_authorization(&self) {
        let mut state = self.inner.lock();
        if state.authorization != AuthorizationState::Undetermined {
            return;
        }
        debug!(answer = %state.prompt_answer, "Simulated permission prompt answered");
        state.authorization = state.prompt_answer;
        let answer = state.authorization;
        Inner::send(&state, ProviderEvent::AuthorizationChanged(answer));
    }

    fn start_updating(&self) {
        let mut state = self.inner.lock();
        if state.updating || !state.authorization.is_granted() {
            return;
        }
        state.updating = true;
        state.starts += 1;

        if state.cursor < self.inner.track.len() {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    state.replay = Some(runtime.spawn(replay(Arc::clone(&self.inner))));
                }
                Err(_) => warn!("No runtime available, track replay disabled"),
            }
        }
    }

    fn stop_updating(&self) {
        let mut state = self.inner.lock();
        state.updating = false;
        if let Some(replay) = state.replay.take() {
            replay.abort();
        }
    }
}

async fn replay(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.interval);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let mut state = inner.lock();
        if !state.updating {
            break;
        }
        let Some(point) = inner.track.points.get(state.cursor) else {
            debug!("Simulated track finished");
            break;
        };
        state.cursor += 1;
        let event = if point.signal_lost {
            ProviderEvent::Failed("simulated signal loss".to_string())
        } else {
            match Position::new(point.latitude, point.longitude) {
                Ok(p) => {
                    let p = match point.horizontal_accuracy {
                        Some(acc) => p.with_accuracy(acc),
                        None => p,
                    };
                    ProviderEvent::Located(p)
                }
                Err(e) => ProviderEvent::Failed(e.to_string()),
            }
        };
        Inner::send(&state, event);
    }
}

/// Controls a [`SimulatedProvider`] from the outside.
#[derive(Debug, Clone)]
pub struct SimulatorHandle {
    inner: Arc<Inner>,
}

impl SimulatorHandle {
    /// Deliver a fix, as the sensor would. Ignored while not updating.
    pub fn emit(&self, position: Position) {
        let state = self.inner.lock();
        if state.updating {
            Inner::send(&state, ProviderEvent::Located(position));
        }
    }

    /// Report a sensor failure.
    pub fn fail(&self, message: impl Into<String>) {
        let state = self.inner.lock();
        Inner::send(&state, ProviderEvent::Failed(message.into()));
    }

    /// Change the permission state, as the user would in system settings.
    pub fn set_authorization(&self, authorization: AuthorizationState) {
        let mut state = self.inner.lock();
        state.authorization = authorization;
        if !authorization.is_granted() {
            state.updating = false;
            if let Some(replay) = state.replay.take() {
                replay.abort();
            }
        }
        Inner::send(&state, ProviderEvent::AuthorizationChanged(authorization));
    }

    /// Check if the provider is currently delivering fixes.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.inner.lock().updating
    }

    /// How many times updating has been started.
    #[must_use]
    pub fn start_count(&self) -> usize {
        self.inner.lock().starts
    }

    /// Number of track samples replayed so far.
    #[must_use]
    pub fn replayed(&self) -> usize {
        self.inner.lock().cursor
    }
}

/// Build a simulated provider from a track file.
///
/// # Errors
///
/// Returns an error if the track cannot be loaded or is empty.
pub fn from_track_file(path: impl AsRef<Path>, interval: Duration) -> Result<SimulatedProvider> {
    let track = Track::load(path.as_ref())?;
    if track.is_empty() {
        return Err(Error::provider(
            "simulated",
            format!("track {} has no points", path.as_ref().display()),
        ));
    }
    Ok(SimulatedProvider::replaying(track, interval).0)
}
