//! Interactive measurement loop for `ddraw measure`.
//!
//! Reads commands line by line: an empty line (Enter) presses the mark
//! button, `q` discards the session. Live distance, accuracy and sensor
//! faults are written as they arrive.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::broadcast;

use crate::catalog::MeasuredThrow;
use crate::error::{Error, Result};
use crate::geo::Units;
use crate::position::{AuthorizationState, SensorFault};
use crate::session::{MarkOutcome, MeasurementSession, Phase, SessionUpdate};

/// How an interactive session ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEnd {
    /// The throw was saved.
    Saved(MeasuredThrow),
    /// The user quit, or input ended, before saving.
    Discarded,
}

/// One-line status of a session.
#[must_use]
pub fn status_line(session: &MeasurementSession, units: Units) -> String {
    let distance = session
        .live_distance_m()
        .map_or_else(|| "--".to_string(), |d| units.format_distance(d));
    let accuracy = units.format_accuracy(session.accuracy().meters());
    let action = if session.can_mark() {
        session.button_title().to_string()
    } else {
        format!("{} (unavailable)", session.button_title())
    };
    format!("[{}] distance {distance} | accuracy {accuracy} | Enter: {action}", session.phase())
}

enum Event {
    Update(Option<SessionUpdate>),
    Fault(Option<SensorFault>),
    Line(std::io::Result<Option<String>>),
}

/// Drive a session from line-based input until it is saved or discarded.
///
/// The session is not discarded here; on [`SessionEnd::Discarded`] the
/// caller decides what to do with it.
///
/// # Errors
///
/// Returns an error if input or output fails, if the position source shuts
/// down, or if saving fails for a reason other than a retryable store error.
pub async fn run<R, W>(
    session: &mut MeasurementSession,
    mut faults: broadcast::Receiver<SensorFault>,
    input: R,
    out: &mut W,
    units: Units,
) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    let mut faults_open = true;
    writeln!(out, "{}", status_line(session, units))?;

    loop {
        let waiting = session.phase() < Phase::Completed;
        let event = tokio::select! {
            update = session.next_update(), if waiting => Event::Update(update),
            fault = faults.recv(), if faults_open => match fault {
                Ok(fault) => Event::Fault(Some(fault)),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => Event::Fault(None),
            },
            line = lines.next_line() => Event::Line(line),
        };

        match event {
            Event::Update(None) => return Err(Error::PositionStreamClosed),
            Event::Update(Some(SessionUpdate::Authorization(state))) => match state {
                AuthorizationState::Denied => writeln!(
                    out,
                    "Location access denied; measuring is paused until it is granted"
                )?,
                AuthorizationState::Granted => writeln!(out, "Location access granted")?,
                AuthorizationState::Undetermined => {}
            },
            Event::Update(Some(SessionUpdate::Position { .. })) => {
                writeln!(out, "{}", status_line(session, units))?;
            }
            Event::Fault(None) => faults_open = false,
            Event::Fault(Some(fault)) => {
                writeln!(out, "Location problem: {}", fault.message)?;
            }
            Event::Line(line) => {
                let Some(line) = line? else {
                    return Ok(SessionEnd::Discarded);
                };
                if line.trim().eq_ignore_ascii_case("q") {
                    return Ok(SessionEnd::Discarded);
                }
                if let Some(end) = press_mark(session, out, units).await? {
                    return Ok(end);
                }
            }
        }
    }
}

async fn press_mark<W: Write>(
    session: &mut MeasurementSession,
    out: &mut W,
    units: Units,
) -> Result<Option<SessionEnd>> {
    match session.mark().await {
        Ok(MarkOutcome::NotReady(reason)) => {
            writeln!(out, "Not ready: {reason}")?;
        }
        Ok(MarkOutcome::Started(marker)) => {
            writeln!(out, "Start marked at {}", marker.position)?;
        }
        Ok(MarkOutcome::Completed { distance_m }) => {
            writeln!(
                out,
                "End marked. Throw distance: {}. Press Enter to save, q to discard",
                units.format_distance(distance_m)
            )?;
        }
        Ok(MarkOutcome::Saved(record)) => {
            writeln!(
                out,
                "Saved throw #{}: {}",
                record.id,
                units.format_distance(record.distance_m)
            )?;
            return Ok(Some(SessionEnd::Saved(record)));
        }
        Ok(MarkOutcome::Ignored) => {}
        Err(e) if e.is_retryable() => {
            writeln!(out, "{e}. Press Enter to retry, q to discard")?;
        }
        Err(e) => return Err(e),
    }
    writeln!(out, "{}", status_line(session, units))?;
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use tokio::io::{AsyncWriteExt, BufReader};

    use crate::catalog::DiscRef;
    use crate::error::StoreError;
    use crate::position::{Position, PositionSource, SimulatedProvider};
    use crate::power::NoopIdleTimer;
    use crate::storage::ThrowStore;

    #[derive(Debug)]
    struct AcceptingStore;

    #[async_trait]
    impl ThrowStore for AcceptingStore {
        async fn create_measurement_record(
            &self,
            distance_m: f64,
            timestamp: DateTime<Utc>,
            disc: DiscRef,
        ) -> std::result::Result<MeasuredThrow, StoreError> {
            Ok(MeasuredThrow {
                id: 7,
                disc,
                distance_m,
                thrown_at: timestamp,
            })
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_status_line() {
        let (provider, _handle) = SimulatedProvider::granted();
        let source = Arc::new(PositionSource::new(Arc::new(provider)));
        settle().await;
        let session = MeasurementSession::open(
            DiscRef::new(1),
            source,
            Arc::new(AcceptingStore),
            Arc::new(NoopIdleTimer),
        );
        let line = status_line(&session, Units::Feet);
        assert!(line.contains("awaiting start"));
        assert!(line.contains("accuracy Unknown"));
        assert!(line.contains("Mark Starting Location (unavailable)"));
    }

    #[tokio::test]
    async fn test_quit_discards() {
        let (provider, _handle) = SimulatedProvider::granted();
        let source = Arc::new(PositionSource::new(Arc::new(provider)));
        let mut session = MeasurementSession::open(
            DiscRef::new(1),
            source.clone(),
            Arc::new(AcceptingStore),
            Arc::new(NoopIdleTimer),
        );

        let mut out = Vec::new();
        let input = BufReader::new(&b"q\n"[..]);
        let end = run(&mut session, source.faults(), input, &mut out, Units::Feet)
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Discarded);
    }

    #[tokio::test]
    async fn test_full_measurement() {
        let (provider, handle) = SimulatedProvider::granted();
        let source = Arc::new(PositionSource::new(Arc::new(provider)));
        settle().await;
        let mut session = MeasurementSession::open(
            DiscRef::new(4),
            source.clone(),
            Arc::new(AcceptingStore),
            Arc::new(NoopIdleTimer),
        );
        let faults = source.faults();
        let (mut keyboard, input) = tokio::io::duplex(64);

        let driver = tokio::spawn(async move {
            settle().await;
            handle.emit(Position::new(37.3349, -122.0090).unwrap().with_accuracy(3.0));
            settle().await;
            keyboard.write_all(b"\n").await.unwrap();
            settle().await;
            handle.fail("signal lost");
            handle.emit(Position::new(37.3349, -122.0100).unwrap());
            settle().await;
            keyboard.write_all(b"\n").await.unwrap();
            settle().await;
            keyboard.write_all(b"\n").await.unwrap();
            keyboard
        });

        let mut out = Vec::new();
        let end = run(&mut session, faults, BufReader::new(input), &mut out, Units::Meters)
            .await
            .unwrap();
        drop(driver.await.unwrap());

        let SessionEnd::Saved(record) = end else {
            panic!("expected a saved throw");
        };
        assert_eq!(record.disc, DiscRef::new(4));
        assert!((record.distance_m - 88.7).abs() < 0.5);

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Start marked at"));
        assert!(text.contains("Location problem: signal lost"));
        assert!(text.contains("End marked. Throw distance: 88."));
        assert!(text.contains("Saved throw #7"));
    }
}
