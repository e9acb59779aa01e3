//! Location sensing.
//!
//! This module defines the position value type, the authorization model and
//! the [`LocationProvider`] seam that platform backends implement. The
//! [`PositionSource`] wraps one provider and turns its delegate-style events
//! into observable state plus ordered, asynchronous position streams.
//!
//! Providers:
//! - [`GpsdProvider`] reads fixes from a running `gpsd` daemon.
//! - [`SimulatedProvider`] replays a recorded track or positions injected
//!   through a [`SimulatorHandle`].

pub mod gpsd;
pub mod simulated;
pub mod source;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::{Error, Result};

pub use gpsd::{GpsdConfig, GpsdProvider};
pub use simulated::{SimulatedProvider, SimulatorHandle, Track, TrackPoint};
pub use source::{PositionSource, PositionStream, SourceUpdate, UpdateStream};

/// A single location fix.
///
/// Positions are produced by providers and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    latitude: f64,
    longitude: f64,
    horizontal_accuracy: Option<f64>,
    recorded_at: DateTime<Utc>,
}

impl Position {
    /// Create a position from WGS-84 coordinates in decimal degrees.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCoordinate`] if either value is not finite or
    /// lies outside the valid range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite()
            || !longitude.is_finite()
            || !(-90.0..=90.0).contains(&latitude)
            || !(-180.0..=180.0).contains(&longitude)
        {
            return Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
            horizontal_accuracy: None,
            recorded_at: Utc::now(),
        })
    }

    /// Attach a horizontal accuracy radius in meters.
    ///
    /// Sensors report a negative radius for an invalid fix; negative and
    /// non-finite values are treated as unknown.
    #[must_use]
    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.horizontal_accuracy = (meters.is_finite() && meters >= 0.0).then_some(meters);
        self
    }

    /// Set the time the fix was taken.
    #[must_use]
    pub fn recorded_at_time(mut self, at: DateTime<Utc>) -> Self {
        self.recorded_at = at;
        self
    }

    /// Latitude in decimal degrees.
    #[must_use]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in decimal degrees.
    #[must_use]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Horizontal accuracy radius in meters, if the sensor reported one.
    #[must_use]
    pub fn horizontal_accuracy(&self) -> Option<f64> {
        self.horizontal_accuracy
    }

    /// When the fix was taken.
    #[must_use]
    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Location permission state as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    /// The user has not been asked yet.
    #[default]
    Undetermined,
    /// Location access is allowed.
    Granted,
    /// Location access is denied or restricted.
    Denied,
}

impl AuthorizationState {
    /// Check if positions may be streamed in this state.
    #[must_use]
    pub fn is_granted(self) -> bool {
        matches!(self, Self::Granted)
    }
}

impl std::fmt::Display for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Undetermined => write!(f, "undetermined"),
            Self::Granted => write!(f, "granted"),
            Self::Denied => write!(f, "denied"),
        }
    }
}

/// A transient sensor problem, such as signal loss.
///
/// Faults are reported on a side channel and never end a position stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorFault {
    /// Name of the provider that reported the fault.
    pub provider: &'static str,
    /// Description of the fault.
    pub message: String,
    /// When the fault was reported.
    pub at: DateTime<Utc>,
}

/// Events a provider delivers to its delegate.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    /// The platform permission state changed (also sent once on attach).
    AuthorizationChanged(AuthorizationState),
    /// A new fix is available.
    Located(Position),
    /// Determining the location failed; updates may resume later.
    Failed(String),
}

/// Channel on which a provider reports [`ProviderEvent`]s.
pub type ProviderDelegate = mpsc::UnboundedSender<ProviderEvent>;

/// A platform location backend.
///
/// The interface mirrors a delegate-based location manager: commands are
/// fire-and-forget and their results arrive later as [`ProviderEvent`]s on
/// the attached delegate, in the order the provider produced them.
pub trait LocationProvider: Send + Sync + std::fmt::Debug {
    /// The name of this provider (for logging/debugging).
    fn name(&self) -> &'static str;

    /// The permission state as currently known to the provider.
    fn authorization_status(&self) -> AuthorizationState;

    /// Attach the delegate channel.
    ///
    /// Implementations report the current authorization state right away.
    fn attach(&self, delegate: ProviderDelegate);

    /// Ask the platform for location permission.
    fn request_authorization(&self);

    /// Begin delivering fixes. Calling this while already updating is a no-op.
    fn start_updating(&self);

    /// Stop delivering fixes and release the underlying sensor.
    fn stop_updating(&self);
}
