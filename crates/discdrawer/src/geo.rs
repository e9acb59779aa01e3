//! Geodesic distance and unit conversion.
//!
//! Distances are computed with Vincenty's inverse formula on the WGS-84
//! ellipsoid. At throw distances (10-100 m) a spherical model is biased by a
//! few tenths of a percent depending on latitude, which is visible once the
//! result is shown in feet, so the ellipsoidal solution is preferred. The
//! spherical haversine distance remains available and is used when the
//! Vincenty iteration fails to converge (nearly antipodal points).
//!
//! All distances are straight-line ground distances between two fixes; the
//! actual flight path of the disc is not modelled.

use serde::{Deserialize, Serialize};

use crate::position::Position;

/// WGS-84 semi-major axis in meters.
const WGS84_A: f64 = 6_378_137.0;

/// WGS-84 flattening.
const WGS84_F: f64 = 1.0 / 298.257_223_563;

/// WGS-84 semi-minor axis in meters.
const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);

/// Mean Earth radius in meters (IUGG).
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_008.8;

/// Meters to international feet.
pub const METERS_TO_FEET: f64 = 3.280_84;

const VINCENTY_MAX_ITERATIONS: usize = 200;
const VINCENTY_CONVERGENCE: f64 = 1e-12;

/// Ground distance in meters between two positions.
///
/// Symmetric, and zero for identical coordinates.
#[must_use]
pub fn distance_m(a: &Position, b: &Position) -> f64 {
    distance_between(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}

/// Ground distance in meters between two coordinate pairs in degrees.
///
/// The pair is put in a fixed order first, so swapping the points gives the
/// bit-identical result.
#[must_use]
pub fn distance_between(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let ((lat1, lon1), (lat2, lon2)) = ordered((lat1, lon1), (lat2, lon2));
    vincenty_m(lat1, lon1, lat2, lon2).unwrap_or_else(|| haversine_between(lat1, lon1, lat2, lon2))
}

fn ordered(a: (f64, f64), b: (f64, f64)) -> ((f64, f64), (f64, f64)) {
    if a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1)).is_gt() {
        (b, a)
    } else {
        (a, b)
    }
}

/// Great-circle distance in meters on a sphere of mean Earth radius.
#[must_use]
pub fn haversine_m(a: &Position, b: &Position) -> f64 {
    haversine_between(a.latitude(), a.longitude(), b.latitude(), b.longitude())
}

fn haversine_between(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let ((lat1, lon1), (lat2, lon2)) = ordered((lat1, lon1), (lat2, lon2));
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Vincenty inverse solution on WGS-84.
///
/// Returns `None` when the iteration does not converge.
#[must_use]
#[allow(clippy::many_single_char_names, clippy::similar_names)]
pub fn vincenty_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> Option<f64> {
    let l = (lon2 - lon1).to_radians();
    let u1 = ((1.0 - WGS84_F) * lat1.to_radians().tan()).atan();
    let u2 = ((1.0 - WGS84_F) * lat2.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            // coincident points
            return Some(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // equatorial line: cos_sq_alpha == 0
        let cos_2sigma_m = if cos_sq_alpha == 0.0 {
            0.0
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = WGS84_F / 16.0 * cos_sq_alpha * (4.0 + WGS84_F * (4.0 - 3.0 * cos_sq_alpha));

        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * WGS84_F
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))));

        if (lambda - previous).abs() < VINCENTY_CONVERGENCE {
            let u_sq = cos_sq_alpha * (WGS84_A.powi(2) - WGS84_B.powi(2)) / WGS84_B.powi(2);
            let a = 1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = b
                * sin_sigma
                * (cos_2sigma_m
                    + b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m.powi(2))
                            - b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma.powi(2))
                                * (-3.0 + 4.0 * cos_2sigma_m.powi(2))));
            return Some(WGS84_B * a * (sigma - delta_sigma));
        }
    }
    None
}

/// Convert meters to feet.
#[must_use]
pub fn meters_to_feet(meters: f64) -> f64 {
    meters * METERS_TO_FEET
}

/// Units used when presenting distances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// International feet.
    #[default]
    Feet,
    /// Meters.
    Meters,
}

impl Units {
    /// Format a distance given in meters, with two decimals and a unit suffix.
    #[must_use]
    pub fn format_distance(self, meters: f64) -> String {
        match self {
            Self::Feet => format!("{:.2} ft", meters_to_feet(meters)),
            Self::Meters => format!("{meters:.2} m"),
        }
    }

    /// Format a sensor accuracy radius, rounded to a whole unit.
    #[must_use]
    pub fn format_accuracy(self, meters: Option<f64>) -> String {
        match (self, meters) {
            (_, None) => "Unknown".to_string(),
            (Self::Feet, Some(m)) => format!("±{}ft", meters_to_feet(m).round()),
            (Self::Meters, Some(m)) => format!("±{}m", m.round()),
        }
    }
}

impl std::fmt::Display for Units {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feet => write!(f, "feet"),
            Self::Meters => write!(f, "meters"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(lat: f64, lon: f64) -> Position {
        Position::new(lat, lon).unwrap()
    }

    #[test]
    fn test_zero_distance_identity() {
        for (lat, lon) in [(37.3349, -122.009), (0.0, 0.0), (-45.5, 170.25), (89.9, 10.0)] {
            let p = pos(lat, lon);
            assert_eq!(distance_m(&p, &p), 0.0);
            assert_eq!(haversine_m(&p, &p), 0.0);
        }
    }

    #[test]
    fn test_distance_symmetry() {
        let pairs = [
            ((37.3349, -122.009), (37.3349, -122.010)),
            ((51.5007, -0.1246), (51.5010, -0.1240)),
            ((-33.8568, 151.2153), (-33.8570, 151.2160)),
            ((0.0, 179.9995), (0.0, -179.9995)),
        ];
        for ((lat1, lon1), (lat2, lon2)) in pairs {
            let a = pos(lat1, lon1);
            let b = pos(lat2, lon2);
            assert_eq!(distance_m(&a, &b), distance_m(&b, &a));
            assert_eq!(haversine_m(&a, &b), haversine_m(&b, &a));
        }
    }

    #[test]
    #[allow(clippy::cast_precision_loss)]
    fn test_distance_symmetry_is_exact_over_many_pairs() {
        // deterministic spread of throw-scale pairs
        let mut seed: u64 = 0x9e37_79b9_7f4a_7c15;
        let mut next = || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            (seed >> 11) as f64 / (1u64 << 53) as f64
        };
        for _ in 0..2_000 {
            let lat = next() * 160.0 - 80.0;
            let lon = next() * 358.0 - 179.0;
            let a = pos(lat, lon);
            let b = pos(lat + next() * 0.002 - 0.001, lon + next() * 0.002 - 0.001);
            assert_eq!(distance_between(lat, lon, b.latitude(), b.longitude()), distance_m(&a, &b));
            assert_eq!(distance_m(&a, &b), distance_m(&b, &a), "{a} / {b}");
        }
    }

    #[test]
    fn test_short_east_west_distance() {
        let start = pos(37.3349, -122.0090);
        let end = pos(37.3349, -122.0100);
        let d = distance_m(&start, &end);
        assert!((d - 88.7).abs() < 0.5, "distance was {d}");
    }

    #[test]
    fn test_ellipsoid_differs_from_sphere_at_throw_scale() {
        let start = pos(37.3349, -122.0090);
        let end = pos(37.3349, -122.0100);
        let ellipsoidal = distance_m(&start, &end);
        let spherical = haversine_m(&start, &end);
        assert!((ellipsoidal - spherical).abs() > 0.05);
        assert!((ellipsoidal - spherical).abs() < 1.0);
    }

    #[test]
    fn test_known_long_distance() {
        // Flinders Peak to Buninyong, the classic Vincenty test line.
        let d = distance_between(
            -(37.0 + 57.0 / 60.0 + 3.72030 / 3600.0),
            144.0 + 25.0 / 60.0 + 29.52440 / 3600.0,
            -(37.0 + 39.0 / 60.0 + 10.15610 / 3600.0),
            143.0 + 55.0 / 60.0 + 35.38390 / 3600.0,
        );
        assert!((d - 54_972.271).abs() < 0.01, "distance was {d}");
    }

    #[test]
    fn test_one_degree_of_latitude_on_meridian() {
        let d = distance_between(0.0, 0.0, 1.0, 0.0);
        assert!((d - 110_574.4).abs() < 1.0, "distance was {d}");
    }

    #[test]
    fn test_near_antipodal_distance_is_finite() {
        let d = distance_between(0.0, 0.0, 0.5, 179.7);
        assert!(d.is_finite());
        assert!(d > 19_900_000.0);
    }

    #[test]
    fn test_meters_to_feet() {
        assert!((meters_to_feet(1.0) - 3.28084).abs() < 1e-12);
        assert_eq!(meters_to_feet(0.0), 0.0);
    }

    #[test]
    fn test_format_distance() {
        assert_eq!(Units::Feet.format_distance(100.0), "328.08 ft");
        assert_eq!(Units::Meters.format_distance(88.7), "88.70 m");
    }

    #[test]
    fn test_format_accuracy() {
        assert_eq!(Units::Feet.format_accuracy(None), "Unknown");
        assert_eq!(Units::Feet.format_accuracy(Some(5.0)), "±16ft");
        assert_eq!(Units::Meters.format_accuracy(Some(4.6)), "±5m");
    }

    #[test]
    fn test_units_default_and_display() {
        assert_eq!(Units::default(), Units::Feet);
        assert_eq!(Units::Meters.to_string(), "meters");
    }
}
