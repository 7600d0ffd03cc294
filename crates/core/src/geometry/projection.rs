//! Spherical mercator projection.
//!
//! Coordinates are `[x, y]` pairs: longitude/latitude in degrees on the
//! geographic side, meters on the projected side (EPSG:3857).

use std::f64::consts::PI;

/// WGS84 semi-major axis, the sphere radius used by web mercator.
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Latitude beyond which web mercator is undefined.
pub const MAX_LATITUDE: f64 = 85.051_128_779_8;

/// Well-known id of geographic WGS84.
pub const WGS84: u32 = 4326;

/// Conversion between a projected reference and geographic coordinates.
pub trait Projection {
    /// Geographic `[lon, lat]` to projected `[x, y]`.
    fn forward(&self, lon_lat: [f64; 2]) -> [f64; 2];

    /// Projected `[x, y]` to geographic `[lon, lat]`.
    fn inverse(&self, xy: [f64; 2]) -> [f64; 2];
}

/// Spherical (web) mercator, EPSG:3857 / 102100.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalMercator;

impl Projection for SphericalMercator {
    fn forward(&self, [lon, lat]: [f64; 2]) -> [f64; 2] {
        let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let x = EARTH_RADIUS_M * lon.to_radians();
        let y = EARTH_RADIUS_M * (PI / 4.0 + lat.to_radians() / 2.0).tan().ln();
        [x, y]
    }

    fn inverse(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        let lon = (x / EARTH_RADIUS_M).to_degrees();
        let lat = (PI / 2.0 - 2.0 * (-y / EARTH_RADIUS_M).exp().atan()).to_degrees();
        [lon, lat]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f64; 2], b: [f64; 2], eps: f64) -> bool {
        (a[0] - b[0]).abs() < eps && (a[1] - b[1]).abs() < eps
    }

    #[test]
    fn test_origin_maps_to_origin() {
        assert!(close(SphericalMercator.forward([0.0, 0.0]), [0.0, 0.0], 1e-9));
        assert!(close(SphericalMercator.inverse([0.0, 0.0]), [0.0, 0.0], 1e-9));
    }

    #[test]
    fn test_known_extent_corner() {
        let [x, y] = SphericalMercator.forward([180.0, MAX_LATITUDE]);
        assert!((x - 20_037_508.342_789_244).abs() < 1e-3);
        assert!((y - 20_037_508.342_789_244).abs() < 1.0);
    }

    #[test]
    fn test_inverse_undoes_forward() {
        for point in [[-105.55, 20.0], [-7.12, 60.73], [139.69, 35.68], [-58.38, -34.6]] {
            let back = SphericalMercator.inverse(SphericalMercator.forward(point));
            assert!(close(back, point, 1e-9), "{point:?} -> {back:?}");
        }
    }

    #[test]
    fn test_forward_clamps_poles() {
        let [_, y] = SphericalMercator.forward([0.0, 90.0]);
        assert!(y.is_finite());
    }
}
