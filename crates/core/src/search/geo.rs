//! Geodesic distance and the distance-search query.
//!
//! Distances are measured on the WGS84 ellipsoid with Vincenty's inverse
//! formula. Nearly antipodal pairs, where the iteration may not converge,
//! fall back to the haversine distance on a sphere of mean Earth radius.

use crate::config::{
    EARTH_MEAN_RADIUS_M, METERS_PER_KILOMETER, VINCENTY_CONVERGENCE, VINCENTY_MAX_ITERATIONS,
    WGS84_FLATTENING, WGS84_SEMI_MAJOR_AXIS_M,
};
use crate::publication::GeoPoint;
use std::fmt;

/// Geodesic distance in meters between two points.
pub fn geodesic_distance_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    if a == b {
        return 0.0;
    }
    match vincenty_inverse(a, b) {
        Some(d) if d.is_finite() => d,
        _ => haversine_m(a, b),
    }
}

/// Converts a radius in kilometers to meters.
pub fn kilometers_to_meters(km: f64) -> f64 {
    km * METERS_PER_KILOMETER
}

fn vincenty_inverse(a: &GeoPoint, b: &GeoPoint) -> Option<f64> {
    let f = WGS84_FLATTENING;
    let major = WGS84_SEMI_MAJOR_AXIS_M;
    let minor = major * (1.0 - f);

    let l = (b.longitude - a.longitude).to_radians();
    let u1 = ((1.0 - f) * a.latitude.to_radians().tan()).atan();
    let u2 = ((1.0 - f) * b.latitude.to_radians().tan()).atan();
    let (sin_u1, cos_u1) = u1.sin_cos();
    let (sin_u2, cos_u2) = u2.sin_cos();

    let mut lambda = l;
    for _ in 0..VINCENTY_MAX_ITERATIONS {
        let (sin_lambda, cos_lambda) = lambda.sin_cos();
        let sin_sigma = ((cos_u2 * sin_lambda).powi(2)
            + (cos_u1 * sin_u2 - sin_u1 * cos_u2 * cos_lambda).powi(2))
        .sqrt();
        if sin_sigma == 0.0 {
            return Some(0.0);
        }
        let cos_sigma = sin_u1 * sin_u2 + cos_u1 * cos_u2 * cos_lambda;
        let sigma = sin_sigma.atan2(cos_sigma);
        let sin_alpha = cos_u1 * cos_u2 * sin_lambda / sin_sigma;
        let cos_sq_alpha = 1.0 - sin_alpha * sin_alpha;
        // Equatorial lines have cos²α = 0.
        let cos_2sigma_m = if cos_sq_alpha == 0.0 {
            0.0
        } else {
            cos_sigma - 2.0 * sin_u1 * sin_u2 / cos_sq_alpha
        };
        let c = f / 16.0 * cos_sq_alpha * (4.0 + f * (4.0 - 3.0 * cos_sq_alpha));
        let previous = lambda;
        lambda = l
            + (1.0 - c)
                * f
                * sin_alpha
                * (sigma
                    + c * sin_sigma
                        * (cos_2sigma_m
                            + c * cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)));

        if lambda.abs() > std::f64::consts::PI {
            return None;
        }
        if (lambda - previous).abs() < VINCENTY_CONVERGENCE {
            let u_sq = cos_sq_alpha * (major * major - minor * minor) / (minor * minor);
            let big_a =
                1.0 + u_sq / 16384.0 * (4096.0 + u_sq * (-768.0 + u_sq * (320.0 - 175.0 * u_sq)));
            let big_b = u_sq / 1024.0 * (256.0 + u_sq * (-128.0 + u_sq * (74.0 - 47.0 * u_sq)));
            let delta_sigma = big_b
                * sin_sigma
                * (cos_2sigma_m
                    + big_b / 4.0
                        * (cos_sigma * (-1.0 + 2.0 * cos_2sigma_m * cos_2sigma_m)
                            - big_b / 6.0
                                * cos_2sigma_m
                                * (-3.0 + 4.0 * sin_sigma * sin_sigma)
                                * (-3.0 + 4.0 * cos_2sigma_m * cos_2sigma_m)));
            return Some(minor * big_a * (sigma - delta_sigma));
        }
    }
    None
}

fn haversine_m(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let d_phi = (b.latitude - a.latitude).to_radians();
    let d_lambda = (b.longitude - a.longitude).to_radians();
    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_MEAN_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// A validated "within `max_distance_km` of `center`" search on a point attribute.
pub struct GeoQuery<T> {
    pub center: GeoPoint,
    pub max_distance_km: f64,
    /// Path of the point attribute searched.
    pub attribute: &'static str,
    pub(crate) point: fn(&T) -> GeoPoint,
}

impl<T> GeoQuery<T> {
    /// Search radius in meters, the unit distances are measured in.
    pub fn radius_meters(&self) -> f64 {
        kilometers_to_meters(self.max_distance_km)
    }
}

impl<T> Clone for GeoQuery<T> {
    fn clone(&self) -> Self {
        Self {
            center: self.center,
            max_distance_km: self.max_distance_km,
            attribute: self.attribute,
            point: self.point,
        }
    }
}

impl<T> fmt::Debug for GeoQuery<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeoQuery")
            .field("center", &self.center)
            .field("max_distance_km", &self.max_distance_km)
            .field("attribute", &self.attribute)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(latitude: f64, longitude: f64) -> GeoPoint {
        GeoPoint::new(latitude, longitude).unwrap()
    }

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(geodesic_distance_m(&p(12.5, -40.0), &p(12.5, -40.0)), 0.0);
    }

    #[test]
    fn test_one_degree_along_equator() {
        let d = geodesic_distance_m(&p(0.0, 0.0), &p(0.0, 1.0));
        assert!((d - 111_319.49).abs() < 0.5, "got {}", d);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = geodesic_distance_m(&p(0.0, 0.0), &p(1.0, 0.0));
        assert!((d - 110_574.4).abs() < 1.0, "got {}", d);
    }

    #[test]
    fn test_diagonal_near_equator() {
        let d = geodesic_distance_m(&p(0.0, 0.0), &p(0.1, 0.1));
        assert!(d > 15_600.0 && d < 15_700.0, "got {}", d);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = p(-34.6037, -58.3816);
        let b = p(40.4168, -3.7038);
        let ab = geodesic_distance_m(&a, &b);
        let ba = geodesic_distance_m(&b, &a);
        assert!((ab - ba).abs() < 1e-3);
    }

    #[test]
    fn test_antipodal_falls_back() {
        let d = geodesic_distance_m(&p(0.0, 0.0), &p(0.5, 179.7));
        assert!(d > 19_900_000.0 && d < 20_100_000.0, "got {}", d);
    }

    #[test]
    fn test_kilometers_to_meters_is_exact() {
        assert_eq!(kilometers_to_meters(1.0), 1000.0);
        assert_eq!(kilometers_to_meters(15.7), 15_700.0);
    }
}
