//! `gpsd` location provider.
//!
//! Connects to a `gpsd` daemon over TCP, enables JSON watch mode and turns
//! `TPV` (time-position-velocity) reports into fixes. `gpsd` has no
//! permission model of its own, so the permission prompt is answered by
//! probing the daemon: reachable means granted, unreachable means denied
//! until a later probe reaches it.
//!
//! Loss of fix and dropped connections are reported as provider failures;
//! the reader reconnects after a delay and resumes delivering fixes.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{AuthorizationState, LocationProvider, Position, ProviderDelegate, ProviderEvent};

/// Command that switches a `gpsd` client connection to JSON streaming.
const WATCH_COMMAND: &[u8] = b"?WATCH={\"enable\":true,\"json\":true};\n";

/// NMEA mode for a 2D fix.
const MODE_2D: u8 = 2;

/// Connection settings for [`GpsdProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpsdConfig {
    /// Host running `gpsd`.
    pub host: String,
    /// TCP port of `gpsd`.
    pub port: u16,
    /// Delay before reconnecting after the connection drops.
    pub reconnect_delay: Duration,
    /// Minimum fix mode accepted as a position (2 = 2D, 3 = 3D).
    pub min_fix_mode: u8,
}

impl Default for GpsdConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2947,
            reconnect_delay: Duration::from_secs(2),
            min_fix_mode: MODE_2D,
        }
    }
}

impl GpsdConfig {
    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What a single `gpsd` report line means for tracking.
#[derive(Debug, Clone, PartialEq)]
enum Reading {
    /// A usable fix.
    Fix(Position),
    /// A TPV report without a usable fix.
    NoFix,
}

#[derive(Debug, Deserialize)]
struct Report {
    class: String,
    #[serde(default)]
    mode: u8,
    lat: Option<f64>,
    lon: Option<f64>,
    eph: Option<f64>,
    epx: Option<f64>,
    epy: Option<f64>,
    time: Option<String>,
}

/// Interpret one line of `gpsd` JSON output.
///
/// Returns `None` for anything that is not a TPV report.
fn parse_report(line: &str, min_fix_mode: u8) -> Option<Reading> {
    let report: Report = match serde_json::from_str(line) {
        Ok(report) => report,
        Err(e) => {
            trace!(error = %e, "Ignoring unparseable gpsd line");
            return None;
        }
    };
    if report.class != "TPV" {
        return None;
    }
    if report.mode < min_fix_mode {
        return Some(Reading::NoFix);
    }
    let (Some(lat), Some(lon)) = (report.lat, report.lon) else {
        return Some(Reading::NoFix);
    };
    let Ok(mut position) = Position::new(lat, lon) else {
        return Some(Reading::NoFix);
    };

    let accuracy = report.eph.or(match (report.epx, report.epy) {
        (Some(x), Some(y)) => Some(x.max(y)),
        (x, y) => x.or(y),
    });
    if let Some(accuracy) = accuracy {
        position = position.with_accuracy(accuracy);
    }
    if let Some(time) = report
        .time
        .as_deref()
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
    {
        position = position.recorded_at_time(time.with_timezone(&Utc));
    }
    Some(Reading::Fix(position))
}

#[derive(Debug, Default)]
struct GpsdState {
    authorization: AuthorizationState,
    delegate: Option<ProviderDelegate>,
    probe: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

/// A [`LocationProvider`] backed by a `gpsd` daemon.
#[derive(Debug)]
pub struct GpsdProvider {
    config: GpsdConfig,
    state: Arc<Mutex<GpsdState>>,
}

impl GpsdProvider {
    /// Create a provider for the given daemon.
    #[must_use]
    pub fn new(config: GpsdConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(GpsdState::default())),
        }
    }

    /// The connection settings.
    #[must_use]
    pub fn config(&self) -> &GpsdConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, GpsdState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<GpsdState>) -> MutexGuard<'_, GpsdState> {
    state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

fn notify(state: &GpsdState, event: ProviderEvent) {
    if let Some(delegate) = &state.delegate {
        let _ = delegate.send(event);
    }
}

impl LocationProvider for GpsdProvider {
    fn name(&self) -> &'static str {
        "gpsd"
    }

    fn authorization_status(&self) -> AuthorizationState {
        self.lock().authorization
    }

    fn attach(&self, delegate: ProviderDelegate) {
        let mut state = self.lock();
        state.delegate = Some(delegate);
        let current = state.authorization;
        notify(&state, ProviderEvent::AuthorizationChanged(current));
    }

    fn request_authorization(&self) {
        let mut state = self.lock();
        if state.authorization != AuthorizationState::Undetermined || state.probe.is_some() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, cannot probe gpsd");
            return;
        };
        let shared = Arc::clone(&self.state);
        state.probe = Some(runtime.spawn(probe_authorization(self.config.clone(), shared)));
    }

    fn start_updating(&self) {
        let mut state = self.lock();
        if state.reader.is_some() || !state.authorization.is_granted() {
            return;
        }
        let Some(delegate) = state.delegate.clone() else {
            warn!("gpsd provider started before a delegate was attached");
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available, cannot start gpsd reader");
            return;
        };
        debug!(address = %self.config.address(), "Starting gpsd reader");
        state.reader = Some(runtime.spawn(read_reports(self.config.clone(), delegate)));
    }

    fn stop_updating(&self) {
        if let Some(reader) = self.lock().reader.take() {
            debug!("Stopping gpsd reader");
            reader.abort();
        }
    }
}

impl Drop for GpsdProvider {
    fn drop(&mut self) {
        let mut state = self.lock();
        if let Some(reader) = state.reader.take() {
            reader.abort();
        }
        if let Some(probe) = state.probe.take() {
            probe.abort();
        }
    }
}

/// Probe the daemon until it answers.
///
/// The first failure denies access; later probes run every
/// `reconnect_delay` so access is granted again once `gpsd` comes up.
async fn probe_authorization(config: GpsdConfig, shared: Arc<Mutex<GpsdState>>) {
    let address = config.address();
    loop {
        let outcome = TcpStream::connect(&address).await;
        {
            let mut state = lock(&shared);
            match outcome {
                Ok(_) => {
                    state.probe = None;
                    info!(%address, "gpsd reachable, location access granted");
                    state.authorization = AuthorizationState::Granted;
                    notify(&state, ProviderEvent::AuthorizationChanged(AuthorizationState::Granted));
                    return;
                }
                Err(e) if state.authorization != AuthorizationState::Denied => {
                    warn!(%address, error = %e, "gpsd unreachable, location access denied");
                    state.authorization = AuthorizationState::Denied;
                    notify(&state, ProviderEvent::Failed(format!("gpsd unreachable: {e}")));
                    notify(&state, ProviderEvent::AuthorizationChanged(AuthorizationState::Denied));
                }
                Err(e) => trace!(%address, error = %e, "gpsd still unreachable"),
            }
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// Read reports until aborted, reconnecting whenever the connection drops.
async fn read_reports(config: GpsdConfig, delegate: ProviderDelegate) {
    let address = config.address();
    loop {
        match stream_session(&address, config.min_fix_mode, &delegate).await {
            Ok(()) => {
                let _ = delegate.send(ProviderEvent::Failed("gpsd closed the connection".to_string()));
            }
            Err(e) => {
                let _ = delegate.send(ProviderEvent::Failed(format!("gpsd connection error: {e}")));
            }
        }
        if delegate.is_closed() {
            debug!("Delegate closed, stopping gpsd reader");
            return;
        }
        tokio::time::sleep(config.reconnect_delay).await;
    }
}

/// One connection: enable watch mode and forward readings until EOF.
async fn stream_session(
    address: &str,
    min_fix_mode: u8,
    delegate: &ProviderDelegate,
) -> std::io::Result<()> {
    let mut stream = TcpStream::connect(address).await?;
    stream.write_all(WATCH_COMMAND).await?;
    debug!(%address, "gpsd watch enabled");

    let mut lines = BufReader::new(stream).lines();
    let mut has_fix = false;
    while let Some(line) = lines.next_line().await? {
        match parse_report(&line, min_fix_mode) {
            Some(Reading::Fix(position)) => {
                has_fix = true;
                if delegate.send(ProviderEvent::Located(position)).is_err() {
                    return Ok(());
                }
            }
            Some(Reading::NoFix) => {
                // report the transition, not every report without a fix
                if has_fix {
                    has_fix = false;
                    let _ = delegate.send(ProviderEvent::Failed("gpsd lost fix".to_string()));
                }
            }
            None => {}
        }
    }
    Ok(())
}
