//! The measurement workflow as a pure state machine.
//!
//! [`Measurement::apply`] is the only way the workflow changes. It performs
//! no I/O; the returned [`Effect`] tells the caller what to do next (stop
//! tracking, persist a record).

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::MeasuredThrow;
use crate::geo::{distance_m, meters_to_feet};
use crate::position::{AuthorizationState, Position};

/// Which end of the throw a marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerLabel {
    /// Where the throw was released.
    Start,
    /// Where the disc landed.
    End,
}

impl std::fmt::Display for MarkerLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => write!(f, "Start"),
            Self::End => write!(f, "End"),
        }
    }
}

/// A position captured by a mark action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marker {
    /// Start or end.
    pub label: MarkerLabel,
    /// The fix that was current when the user marked.
    pub position: Position,
    /// When the user marked.
    pub marked_at: DateTime<Utc>,
}

/// Workflow state of one measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// Waiting for the user to mark where the throw starts.
    AwaitingStart,
    /// Start marked; live distance follows the incoming positions.
    AwaitingEnd {
        /// The start marker.
        start: Marker,
        /// Distance from the start to the latest position, in meters.
        live_distance_m: f64,
    },
    /// Both ends marked; the distance is frozen and ready to save.
    Completed {
        /// The start marker.
        start: Marker,
        /// The end marker.
        end: Marker,
        /// The frozen distance in meters.
        distance_m: f64,
    },
    /// The throw has been persisted. Terminal.
    Saved {
        /// The start marker.
        start: Marker,
        /// The end marker.
        end: Marker,
        /// The persisted record.
        record: MeasuredThrow,
    },
}

impl SessionState {
    /// The lifecycle phase of this state.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self {
            Self::AwaitingStart => Phase::AwaitingStart,
            Self::AwaitingEnd { .. } => Phase::AwaitingEnd,
            Self::Completed { .. } => Phase::Completed,
            Self::Saved { .. } => Phase::Saved,
        }
    }
}

/// Lifecycle phase, ordered from first to last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No markers yet.
    AwaitingStart,
    /// Start marked.
    AwaitingEnd,
    /// Both markers set, not saved.
    Completed,
    /// Persisted.
    Saved,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingStart => write!(f, "awaiting start"),
            Self::AwaitingEnd => write!(f, "awaiting end"),
            Self::Completed => write!(f, "completed"),
            Self::Saved => write!(f, "saved"),
        }
    }
}

/// Why a mark action could not be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotReady {
    /// No position has arrived yet.
    NoPosition,
    /// Location access is not granted.
    AuthorizationDenied,
}

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoPosition => write!(f, "waiting for a location fix"),
            Self::AuthorizationDenied => write!(f, "location access is not granted"),
        }
    }
}

/// Horizontal accuracy of the current fix, for display.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Accuracy {
    /// The sensor reported an accuracy radius.
    Known {
        /// Radius in meters.
        meters: f64,
    },
    /// No fix, or the fix carried no accuracy.
    Unknown,
}

impl Accuracy {
    /// Accuracy of an optional fix.
    #[must_use]
    pub fn of(position: Option<&Position>) -> Self {
        match position.and_then(Position::horizontal_accuracy) {
            Some(meters) => Self::Known { meters },
            None => Self::Unknown,
        }
    }

    /// Radius rounded to the nearest foot.
    #[must_use]
    pub fn feet(self) -> Option<f64> {
        match self {
            Self::Known { meters } => Some(meters_to_feet(meters).round()),
            Self::Unknown => None,
        }
    }

    /// Radius in meters, if known.
    #[must_use]
    pub fn meters(self) -> Option<f64> {
        match self {
            Self::Known { meters } => Some(meters),
            Self::Unknown => None,
        }
    }
}

/// Something that happened to a measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    /// A new fix, in arrival order.
    Position(Position),
    /// The location permission changed.
    Authorization(AuthorizationState),
    /// The user pressed the mark button at the given time.
    Mark(DateTime<Utc>),
    /// The requested save produced this record.
    SaveSucceeded(MeasuredThrow),
    /// The requested save failed.
    SaveFailed,
}

/// What the caller must do after an input was applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Nothing changed that the caller needs to act on.
    None,
    /// A mark was requested but could not be taken; state is unchanged.
    NotReady(NotReady),
    /// The live distance was recomputed.
    LiveDistance(f64),
    /// The start marker was set.
    Started(Marker),
    /// The end marker was set and the distance frozen. Tracking should stop.
    Completed {
        /// The frozen distance in meters.
        distance_m: f64,
    },
    /// The caller must persist a throw of this distance and report back with
    /// [`Input::SaveSucceeded`] or [`Input::SaveFailed`].
    Persist {
        /// The frozen distance in meters.
        distance_m: f64,
    },
    /// The save succeeded; the measurement is finished.
    Saved(MeasuredThrow),
}

/// A single throw measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    state: SessionState,
    latest: Option<Position>,
    authorization: AuthorizationState,
    save_in_flight: bool,
}

impl Measurement {
    /// Start a measurement with the given permission state.
    #[must_use]
    pub fn new(authorization: AuthorizationState) -> Self {
        Self {
            state: SessionState::AwaitingStart,
            latest: None,
            authorization,
            save_in_flight: false,
        }
    }

    /// The current workflow state.
    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// The most recent fix seen by this measurement.
    #[must_use]
    pub fn latest(&self) -> Option<&Position> {
        self.latest.as_ref()
    }

    /// The permission state as last reported.
    #[must_use]
    pub fn authorization(&self) -> AuthorizationState {
        self.authorization
    }

    /// Check if a save has been requested and not yet answered.
    #[must_use]
    pub fn save_in_flight(&self) -> bool {
        self.save_in_flight
    }

    /// Live distance while awaiting the end, the frozen distance afterwards.
    #[must_use]
    pub fn distance_m(&self) -> Option<f64> {
        match &self.state {
            SessionState::AwaitingStart => None,
            SessionState::AwaitingEnd {
                live_distance_m, ..
            } => Some(*live_distance_m),
            SessionState::Completed { distance_m, .. } => Some(*distance_m),
            SessionState::Saved { record, .. } => Some(record.distance_m),
        }
    }

    /// The start marker, once set.
    #[must_use]
    pub fn start_marker(&self) -> Option<&Marker> {
        match &self.state {
            SessionState::AwaitingStart => None,
            SessionState::AwaitingEnd { start, .. }
            | SessionState::Completed { start, .. }
            | SessionState::Saved { start, .. } => Some(start),
        }
    }

    /// The end marker, once set.
    #[must_use]
    pub fn end_marker(&self) -> Option<&Marker> {
        match &self.state {
            SessionState::Completed { end, .. } | SessionState::Saved { end, .. } => Some(end),
            _ => None,
        }
    }

    /// Accuracy of the latest fix.
    #[must_use]
    pub fn accuracy(&self) -> Accuracy {
        Accuracy::of(self.latest.as_ref())
    }

    /// Check if a mark action would do something right now.
    #[must_use]
    pub fn can_mark(&self) -> bool {
        match self.state {
            SessionState::AwaitingStart | SessionState::AwaitingEnd { .. } => {
                self.authorization.is_granted() && self.latest.is_some()
            }
            SessionState::Completed { .. } => !self.save_in_flight,
            SessionState::Saved { .. } => false,
        }
    }

    /// Label for the mark button in the current state.
    #[must_use]
    pub fn button_title(&self) -> &'static str {
        match self.state {
            SessionState::AwaitingStart => "Mark Starting Location",
            SessionState::AwaitingEnd { .. } => "Mark Ending Location",
            SessionState::Completed { .. } | SessionState::Saved { .. } => "Save Throw",
        }
    }

    /// Apply one input and report what the caller must do.
    pub fn apply(&mut self, input: Input) -> Effect {
        match input {
            Input::Position(position) => self.on_position(position),
            Input::Authorization(state) => {
                self.authorization = state;
                Effect::None
            }
            Input::Mark(at) => self.on_mark(at),
            Input::SaveSucceeded(record) => self.on_saved(record),
            Input::SaveFailed => {
                // stays Completed with the frozen distance
                self.save_in_flight = false;
                Effect::None
            }
        }
    }

    fn on_position(&mut self, position: Position) -> Effect {
        if !self.authorization.is_granted() {
            return Effect::None;
        }
        match &mut self.state {
            SessionState::AwaitingStart => {
                self.latest = Some(position);
                Effect::None
            }
            SessionState::AwaitingEnd {
                start,
                live_distance_m,
            } => {
                self.latest = Some(position);
                *live_distance_m = distance_m(&start.position, &position);
                Effect::LiveDistance(*live_distance_m)
            }
            // markers are frozen once the end is set
            SessionState::Completed { .. } | SessionState::Saved { .. } => Effect::None,
        }
    }

    fn current_fix(&self) -> Result<Position, NotReady> {
        if !self.authorization.is_granted() {
            return Err(NotReady::AuthorizationDenied);
        }
        self.latest.ok_or(NotReady::NoPosition)
    }

    fn on_mark(&mut self, at: DateTime<Utc>) -> Effect {
        match &self.state {
            SessionState::AwaitingStart => match self.current_fix() {
                Err(reason) => Effect::NotReady(reason),
                Ok(position) => {
                    let start = Marker {
                        label: MarkerLabel::Start,
                        position,
                        marked_at: at,
                    };
                    self.state = SessionState::AwaitingEnd {
                        start,
                        live_distance_m: 0.0,
                    };
                    Effect::Started(start)
                }
            },
            SessionState::AwaitingEnd { start, .. } => match self.current_fix() {
                Err(reason) => Effect::NotReady(reason),
                Ok(position) => {
                    let start = *start;
                    let end = Marker {
                        label: MarkerLabel::End,
                        position,
                        marked_at: at,
                    };
                    let distance_m = distance_m(&start.position, &position);
                    self.state = SessionState::Completed {
                        start,
                        end,
                        distance_m,
                    };
                    Effect::Completed { distance_m }
                }
            },
            SessionState::Completed { distance_m, .. } => {
                if self.save_in_flight {
                    return Effect::None;
                }
                self.save_in_flight = true;
                Effect::Persist {
                    distance_m: *distance_m,
                }
            }
            SessionState::Saved { .. } => Effect::None,
        }
    }

    fn on_saved(&mut self, record: MeasuredThrow) -> Effect {
        let SessionState::Completed { start, end, .. } = self.state else {
            return Effect::None;
        };
        if !std::mem::take(&mut self.save_in_flight) {
            return Effect::None;
        }
        self.state = SessionState::Saved {
            start,
            end,
            record: record.clone(),
        };
        Effect::Saved(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DiscRef;

    fn fix(lat: f64, lon: f64) -> Position {
        Position::new(lat, lon).unwrap()
    }

    fn granted() -> Measurement {
        Measurement::new(AuthorizationState::Granted)
    }

    fn record(distance_m: f64) -> MeasuredThrow {
        MeasuredThrow {
            id: 1,
            disc: DiscRef::new(3),
            distance_m,
            thrown_at: Utc::now(),
        }
    }

    fn completed(distance_lon: f64) -> Measurement {
        let mut m = granted();
        m.apply(Input::Position(fix(37.3349, -122.0090)));
        m.apply(Input::Mark(Utc::now()));
        m.apply(Input::Position(fix(37.3349, distance_lon)));
        m.apply(Input::Mark(Utc::now()));
        assert_eq!(m.phase(), Phase::Completed);
        m
    }

    #[test]
    fn test_initial_state() {
        let m = granted();
        assert_eq!(m.state(), &SessionState::AwaitingStart);
        assert!(m.distance_m().is_none());
        assert!(!m.can_mark());
        assert_eq!(m.button_title(), "Mark Starting Location");
        assert_eq!(m.accuracy(), Accuracy::Unknown);
    }

    #[test]
    fn test_mark_without_position_is_not_ready() {
        let mut m = granted();
        let effect = m.apply(Input::Mark(Utc::now()));
        assert_eq!(effect, Effect::NotReady(NotReady::NoPosition));
        assert_eq!(m.phase(), Phase::AwaitingStart);
    }

    #[test]
    fn test_mark_start_uses_latest_position() {
        let mut m = granted();
        m.apply(Input::Position(fix(1.0, 1.0)));
        m.apply(Input::Position(fix(2.0, 2.0)));
        assert!(m.can_mark());

        let Effect::Started(start) = m.apply(Input::Mark(Utc::now())) else {
            panic!("expected start");
        };
        assert_eq!(start.label, MarkerLabel::Start);
        assert_eq!(start.position.latitude(), 2.0);
        assert_eq!(m.phase(), Phase::AwaitingEnd);
        assert_eq!(m.distance_m(), Some(0.0));
        assert_eq!(m.button_title(), "Mark Ending Location");
    }

    #[test]
    fn test_live_distance_follows_positions() {
        let mut m = granted();
        m.apply(Input::Position(fix(37.3349, -122.0090)));
        m.apply(Input::Mark(Utc::now()));

        let Effect::LiveDistance(d) = m.apply(Input::Position(fix(37.3349, -122.0100))) else {
            panic!("expected live distance");
        };
        assert!((d - 88.7).abs() < 0.5);
        assert_eq!(m.distance_m(), Some(d));
        assert_eq!(m.phase(), Phase::AwaitingEnd);
    }

    #[test]
    fn test_mark_end_freezes_distance() {
        let mut m = completed(-122.0100);
        let frozen = m.distance_m().unwrap();
        assert!((frozen - 88.7).abs() < 0.5);
        assert!(m.end_marker().is_some());

        let effect = m.apply(Input::Position(fix(37.3349, -122.0200)));
        assert_eq!(effect, Effect::None);
        assert_eq!(m.distance_m(), Some(frozen));
        assert_eq!(m.end_marker().unwrap().position.longitude(), -122.0100);
    }

    #[test]
    fn test_end_marked_without_movement_is_zero() {
        let mut m = granted();
        m.apply(Input::Position(fix(5.0, 5.0)));
        m.apply(Input::Mark(Utc::now()));
        let effect = m.apply(Input::Mark(Utc::now()));
        assert_eq!(effect, Effect::Completed { distance_m: 0.0 });
    }

    #[test]
    fn test_save_requested_once() {
        let mut m = completed(-122.0100);
        let distance = m.distance_m().unwrap();

        assert_eq!(
            m.apply(Input::Mark(Utc::now())),
            Effect::Persist {
                distance_m: distance
            }
        );
        assert!(m.save_in_flight());
        assert!(!m.can_mark());
        assert_eq!(m.apply(Input::Mark(Utc::now())), Effect::None);
    }

    #[test]
    fn test_save_success_is_terminal() {
        let mut m = completed(-122.0100);
        m.apply(Input::Mark(Utc::now()));
        let saved = record(m.distance_m().unwrap());

        assert_eq!(
            m.apply(Input::SaveSucceeded(saved.clone())),
            Effect::Saved(saved)
        );
        assert_eq!(m.phase(), Phase::Saved);
        assert!(!m.can_mark());
        assert_eq!(m.apply(Input::Mark(Utc::now())), Effect::None);
        assert_eq!(m.phase(), Phase::Saved);
    }

    #[test]
    fn test_save_failure_allows_retry() {
        let mut m = completed(-122.0100);
        let distance = m.distance_m().unwrap();
        m.apply(Input::Mark(Utc::now()));

        m.apply(Input::SaveFailed);
        assert_eq!(m.phase(), Phase::Completed);
        assert_eq!(m.distance_m(), Some(distance));
        assert!(m.can_mark());
        assert_eq!(
            m.apply(Input::Mark(Utc::now())),
            Effect::Persist {
                distance_m: distance
            }
        );
    }

    #[test]
    fn test_unrequested_save_result_is_ignored() {
        let mut m = completed(-122.0100);
        assert_eq!(m.apply(Input::SaveSucceeded(record(1.0))), Effect::None);
        assert_eq!(m.phase(), Phase::Completed);

        let mut fresh = granted();
        assert_eq!(fresh.apply(Input::SaveSucceeded(record(1.0))), Effect::None);
        assert_eq!(fresh.phase(), Phase::AwaitingStart);
    }

    #[test]
    fn test_denied_blocks_marking() {
        let mut m = Measurement::new(AuthorizationState::Denied);
        m.apply(Input::Position(fix(1.0, 1.0)));
        assert!(m.latest().is_none());
        assert_eq!(
            m.apply(Input::Mark(Utc::now())),
            Effect::NotReady(NotReady::AuthorizationDenied)
        );
        assert_eq!(m.phase(), Phase::AwaitingStart);
    }

    #[test]
    fn test_revocation_freezes_live_distance() {
        let mut m = granted();
        m.apply(Input::Position(fix(37.3349, -122.0090)));
        m.apply(Input::Mark(Utc::now()));
        m.apply(Input::Position(fix(37.3349, -122.0095)));
        let before = m.distance_m();

        m.apply(Input::Authorization(AuthorizationState::Denied));
        m.apply(Input::Position(fix(37.3349, -122.0100)));
        assert_eq!(m.distance_m(), before);
        assert!(!m.can_mark());
        assert_eq!(
            m.apply(Input::Mark(Utc::now())),
            Effect::NotReady(NotReady::AuthorizationDenied)
        );

        m.apply(Input::Authorization(AuthorizationState::Granted));
        assert!(m.can_mark());
        assert!(matches!(
            m.apply(Input::Mark(Utc::now())),
            Effect::Completed { .. }
        ));
    }

    #[test]
    fn test_saving_does_not_need_location() {
        let mut m = completed(-122.0100);
        m.apply(Input::Authorization(AuthorizationState::Denied));
        assert!(matches!(
            m.apply(Input::Mark(Utc::now())),
            Effect::Persist { .. }
        ));
    }

    #[test]
    fn test_phase_never_regresses() {
        let inputs = [
            Input::Mark(Utc::now()),
            Input::Position(fix(1.0, 1.0)),
            Input::Authorization(AuthorizationState::Denied),
            Input::Mark(Utc::now()),
            Input::Authorization(AuthorizationState::Granted),
            Input::Position(fix(1.0, 1.0001)),
            Input::Mark(Utc::now()),
            Input::Position(fix(1.0, 1.0002)),
            Input::Mark(Utc::now()),
            Input::SaveFailed,
            Input::Mark(Utc::now()),
            Input::Mark(Utc::now()),
            Input::SaveSucceeded(record(11.1)),
            Input::Mark(Utc::now()),
        ];
        let mut m = granted();
        let mut previous = m.phase();
        for input in inputs {
            m.apply(input);
            let phase = m.phase();
            assert!(phase >= previous, "{previous} -> {phase}");
            // no skipped phases
            assert!(phase as u8 <= previous as u8 + 1);
            previous = phase;
        }
        assert_eq!(previous, Phase::Saved);
    }

    #[test]
    fn test_accuracy_rounds_to_feet() {
        let mut m = granted();
        m.apply(Input::Position(fix(1.0, 1.0).with_accuracy(4.9)));
        assert_eq!(m.accuracy(), Accuracy::Known { meters: 4.9 });
        assert_eq!(m.accuracy().feet(), Some(16.0));

        m.apply(Input::Position(fix(1.0, 1.0)));
        assert_eq!(m.accuracy(), Accuracy::Unknown);
        assert!(m.accuracy().feet().is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Phase::AwaitingEnd.to_string(), "awaiting end");
        assert_eq!(MarkerLabel::Start.to_string(), "Start");
        assert_eq!(NotReady::NoPosition.to_string(), "waiting for a location fix");
    }
}
