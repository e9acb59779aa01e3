//! `discdrawer` - A disc golf bag catalog with GPS-measured throws
//!
//! This library provides the disc catalog and its `SQLite` storage, location
//! providers and the position source built on them, and the measurement
//! session that turns a stream of fixes into one saved throw distance.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod geo;
pub mod logging;
pub mod position;
pub mod power;
pub mod session;
pub mod storage;

pub use catalog::{Disc, DiscRef, MeasuredThrow, NewDisc};
pub use config::Config;
pub use error::{Error, Result, StoreError};
pub use geo::{distance_m, Units};
pub use logging::init_logging;
pub use position::{AuthorizationState, LocationProvider, Position, PositionSource, SensorFault};
pub use power::{IdleTimer, SleepGuard};
pub use session::{MarkOutcome, MeasurementSession, Phase, SessionState};
pub use storage::{SqliteThrowStore, Storage, StorageStats, ThrowStore};
