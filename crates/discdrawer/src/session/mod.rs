//! Measurement sessions.
//!
//! A [`MeasurementSession`] measures one throw for one disc. It owns two
//! scoped resources for its whole lifetime: a tracking lease on the
//! [`PositionSource`] and a [`SleepGuard`]. Both are released when the
//! session completes its work or is dropped, whatever state it is in.
//!
//! Positions and authorization changes arrive on one ordered
//! [`UpdateStream`] and are consumed one at a time through
//! [`MeasurementSession::next_update`]; [`MeasurementSession::mark`] first
//! applies anything already delivered, so a mark always sees the latest fix.

pub mod state;

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::catalog::{DiscRef, MeasuredThrow};
use crate::error::{Error, Result};
use crate::position::{AuthorizationState, Position, PositionSource, SourceUpdate, UpdateStream};
use crate::power::{IdleTimer, SleepGuard};
use crate::storage::ThrowStore;

pub use state::{
    Accuracy, Effect, Input, Marker, MarkerLabel, Measurement, NotReady, Phase, SessionState,
};

/// Result of a mark action.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    /// The mark could not be taken; nothing changed.
    NotReady(NotReady),
    /// The start of the throw was marked.
    Started(Marker),
    /// The end was marked and the distance frozen.
    Completed {
        /// The measured distance in meters.
        distance_m: f64,
    },
    /// The throw was persisted.
    Saved(MeasuredThrow),
    /// The session is saved or a save is already running.
    Ignored,
}

/// Something the session observed while waiting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SessionUpdate {
    /// A new fix arrived.
    Position {
        /// The fix.
        position: Position,
        /// Recomputed live distance, when the start is marked.
        live_distance_m: Option<f64>,
    },
    /// The location permission changed.
    Authorization(AuthorizationState),
}

/// Keeps the position source tracking until released.
#[derive(Debug)]
struct TrackingLease {
    source: Arc<PositionSource>,
    active: bool,
}

impl TrackingLease {
    fn acquire(source: Arc<PositionSource>) -> Self {
        source.request_tracking();
        Self {
            source,
            active: true,
        }
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.source.stop_tracking();
        }
    }
}

impl Drop for TrackingLease {
    fn drop(&mut self) {
        self.release();
    }
}

/// One throw measurement for one disc.
#[derive(Debug)]
pub struct MeasurementSession {
    disc: DiscRef,
    measurement: Measurement,
    store: Arc<dyn ThrowStore>,
    updates: UpdateStream,
    tracking: TrackingLease,
    sleep: SleepGuard,
}

impl MeasurementSession {
    /// Open a session: start tracking and keep the device awake.
    ///
    /// `disc` is passed to the store unchanged when the throw is saved.
    #[must_use]
    pub fn open(
        disc: DiscRef,
        source: Arc<PositionSource>,
        store: Arc<dyn ThrowStore>,
        idle_timer: Arc<dyn IdleTimer>,
    ) -> Self {
        // subscribe before tracking starts so no fix is missed; a change
        // racing with this read is replayed from the stream
        let updates = source.updates();
        let current = source.current_authorization();

        let sleep = SleepGuard::acquire(idle_timer);
        let tracking = TrackingLease::acquire(source);
        info!(disc_id = %disc, authorization = %current, "Measurement session opened");

        Self {
            disc,
            measurement: Measurement::new(current),
            store,
            updates,
            tracking,
            sleep,
        }
    }

    /// The disc being measured.
    #[must_use]
    pub fn disc(&self) -> DiscRef {
        self.disc
    }

    /// The current workflow state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        self.measurement.state()
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.measurement.phase()
    }

    /// Live distance while awaiting the end, the frozen distance afterwards.
    #[must_use]
    pub fn live_distance_m(&self) -> Option<f64> {
        self.measurement.distance_m()
    }

    /// Accuracy of the latest fix.
    #[must_use]
    pub fn accuracy(&self) -> Accuracy {
        self.measurement.accuracy()
    }

    /// The permission state as last observed.
    #[must_use]
    pub fn authorization(&self) -> AuthorizationState {
        self.measurement.authorization()
    }

    /// The start marker, once set.
    #[must_use]
    pub fn start_marker(&self) -> Option<&Marker> {
        self.measurement.start_marker()
    }

    /// The end marker, once set.
    #[must_use]
    pub fn end_marker(&self) -> Option<&Marker> {
        self.measurement.end_marker()
    }

    /// Check if the mark button should be enabled.
    #[must_use]
    pub fn can_mark(&self) -> bool {
        self.measurement.can_mark()
    }

    /// Label for the mark button.
    #[must_use]
    pub fn button_title(&self) -> &'static str {
        self.measurement.button_title()
    }

    /// Check if the session still holds its tracking lease.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.tracking.active
    }

    /// Wait for the next position or authorization change and apply it.
    ///
    /// Returns `None` once the position source has shut down. Cancel-safe:
    /// dropping the future before it completes loses nothing.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let update = self.updates.next().await?;
        Some(self.apply_update(update))
    }

    /// Mark the start, mark the end, or save, depending on the phase.
    ///
    /// Not-ready marks are reported as [`MarkOutcome::NotReady`], never as
    /// errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Persistence`] if saving fails. The session stays
    /// completed with its frozen distance so the save can be retried.
    pub async fn mark(&mut self) -> Result<MarkOutcome> {
        self.drain_pending();

        match self.measurement.apply(Input::Mark(Utc::now())) {
            Effect::NotReady(reason) => {
                debug!(disc_id = %self.disc, %reason, "Mark ignored");
                Ok(MarkOutcome::NotReady(reason))
            }
            Effect::Started(marker) => {
                info!(
                    disc_id = %self.disc,
                    position = %marker.position,
                    "Start of throw marked"
                );
                Ok(MarkOutcome::Started(marker))
            }
            Effect::Completed { distance_m } => {
                self.tracking.release();
                info!(disc_id = %self.disc, distance_m, "End of throw marked");
                Ok(MarkOutcome::Completed { distance_m })
            }
            Effect::Persist { distance_m } => self.save(distance_m).await,
            Effect::None | Effect::LiveDistance(_) | Effect::Saved(_) => Ok(MarkOutcome::Ignored),
        }
    }

    /// Close the session without saving.
    pub fn discard(mut self) {
        info!(disc_id = %self.disc, phase = %self.phase(), "Measurement session discarded");
        self.release_resources();
    }

    async fn save(&mut self, distance_m: f64) -> Result<MarkOutcome> {
        let timestamp = Utc::now();
        // if this future is dropped here the save stays in flight and further
        // marks are ignored, since the record may already exist
        let outcome = self
            .store
            .create_measurement_record(distance_m, timestamp, self.disc)
            .await;

        match outcome {
            Ok(record) => {
                self.measurement.apply(Input::SaveSucceeded(record.clone()));
                info!(
                    disc_id = %self.disc,
                    distance_m,
                    throw_id = record.id,
                    "Measured throw saved"
                );
                self.release_resources();
                Ok(MarkOutcome::Saved(record))
            }
            Err(e) => {
                self.measurement.apply(Input::SaveFailed);
                error!(disc_id = %self.disc, distance_m, error = %e, "Failed to save measured throw");
                Err(Error::Persistence(e))
            }
        }
    }

    fn drain_pending(&mut self) {
        while let Some(update) = self.updates.try_next() {
            self.apply_update(update);
        }
    }

    fn apply_update(&mut self, update: SourceUpdate) -> SessionUpdate {
        match update {
            SourceUpdate::Position(position) => self.on_position(position),
            SourceUpdate::Authorization(state) => self.on_authorization(state),
        }
    }

    fn on_authorization(&mut self, state: AuthorizationState) -> SessionUpdate {
        if state != self.measurement.authorization() {
            info!(disc_id = %self.disc, authorization = %state, "Session authorization changed");
        }
        self.measurement.apply(Input::Authorization(state));
        SessionUpdate::Authorization(state)
    }

    fn on_position(&mut self, position: Position) -> SessionUpdate {
        let live_distance_m = match self.measurement.apply(Input::Position(position)) {
            Effect::LiveDistance(d) => Some(d),
            _ => None,
        };
        SessionUpdate::Position {
            position,
            live_distance_m,
        }
    }

    fn release_resources(&mut self) {
        self.tracking.release();
        self.sleep.release();
    }
}
