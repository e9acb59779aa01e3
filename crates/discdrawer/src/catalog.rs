//! Catalog types for discdrawer.
//!
//! A catalog entry is a disc in the user's bag. Measured throws reference
//! exactly one disc through a [`DiscRef`], a non-owning lookup key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::meters_to_feet;

/// Opaque reference to a catalog entry.
///
/// The measurement subsystem passes this through to the store without
/// resolving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DiscRef(i64);

impl DiscRef {
    /// Wrap a raw catalog id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// The raw catalog id.
    #[must_use]
    pub const fn id(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for DiscRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fields needed to add a disc to the catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewDisc {
    /// Mold name.
    pub name: String,
    /// Manufacturer.
    pub manufacturer: Option<String>,
    /// Plastic blend.
    pub plastic: Option<String>,
    /// Disc type (putter, midrange, fairway driver, distance driver).
    pub disc_type: Option<String>,
    /// Speed flight number.
    pub speed: f64,
    /// Glide flight number.
    pub glide: f64,
    /// Turn flight number.
    pub turn: f64,
    /// Fade flight number.
    pub fade: f64,
    /// Weight in grams.
    pub weight: Option<i32>,
    /// Wear condition.
    pub condition: Option<String>,
    /// Stability class.
    pub stability: Option<String>,
    /// Whether the disc is currently in the bag.
    pub in_bag: bool,
}

/// A disc stored in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disc {
    /// Catalog reference for this disc.
    pub id: DiscRef,
    /// When the disc was added.
    pub created_at: DateTime<Utc>,
    /// The disc's catalog fields.
    #[serde(flatten)]
    pub fields: NewDisc,
}

impl Disc {
    /// Manufacturer for display, `N/A` when missing or blank.
    #[must_use]
    pub fn manufacturer_or_na(&self) -> &str {
        non_blank(self.fields.manufacturer.as_deref()).unwrap_or("N/A")
    }

    /// Plastic for display, `N/A` when missing or blank.
    #[must_use]
    pub fn plastic_or_na(&self) -> &str {
        non_blank(self.fields.plastic.as_deref()).unwrap_or("N/A")
    }

    /// Disc type, defaulting to `Putter`.
    #[must_use]
    pub fn disc_type(&self) -> &str {
        self.fields.disc_type.as_deref().unwrap_or("Putter")
    }

    /// Condition, defaulting to `Great`.
    #[must_use]
    pub fn condition(&self) -> &str {
        self.fields.condition.as_deref().unwrap_or("Great")
    }

    /// Stability, defaulting to `Stable`.
    #[must_use]
    pub fn stability(&self) -> &str {
        self.fields.stability.as_deref().unwrap_or("Stable")
    }

    /// Flight numbers formatted as `speed | glide | turn | fade`.
    #[must_use]
    pub fn flight_numbers(&self) -> String {
        format!(
            "{} | {} | {} | {}",
            self.fields.speed, self.fields.glide, self.fields.turn, self.fields.fade
        )
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// A persisted throw measurement.
///
/// Created once by a saved measurement session and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredThrow {
    /// Storage id of this record.
    pub id: i64,
    /// The disc that was thrown.
    pub disc: DiscRef,
    /// Measured distance in meters.
    pub distance_m: f64,
    /// When the throw was saved.
    pub thrown_at: DateTime<Utc>,
}

impl MeasuredThrow {
    /// Distance converted to feet.
    #[must_use]
    pub fn distance_feet(&self) -> f64 {
        meters_to_feet(self.distance_m)
    }
}
