//! Multi-resolution geohash tags for feature documents.
//!
//! Each feature with a usable geometry carries the prefixes of length 3..=8 of
//! the geohash of its centroid, stored as `geohash3` .. `geohash8`. Density
//! aggregation bins on these fields.

use geo::Centroid;
use serde::{Deserialize, Serialize};

/// Coarsest stored tag.
pub const MIN_PRECISION: u8 = 3;

/// Finest stored tag.
pub const MAX_PRECISION: u8 = 8;

/// Document field holding the tag of the given precision.
pub fn tag_field(precision: u8) -> String {
    format!("geohash{precision}")
}

/// Geohash prefixes of one feature's centroid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeohashTags {
    pub geohash3: String,
    pub geohash4: String,
    pub geohash5: String,
    pub geohash6: String,
    pub geohash7: String,
    pub geohash8: String,
}

impl GeohashTags {
    /// Tags for a `lon, lat` point. `None` if the point cannot be encoded.
    pub fn from_point(lon: f64, lat: f64) -> Option<Self> {
        if !lon.is_finite() || !lat.is_finite() {
            return None;
        }
        let hash = ::geohash::encode(::geohash::Coord { x: lon, y: lat }, MAX_PRECISION as usize).ok()?;
        let prefix = |len: usize| hash.get(..len).map(str::to_string);
        Some(Self {
            geohash3: prefix(3)?,
            geohash4: prefix(4)?,
            geohash5: prefix(5)?,
            geohash6: prefix(6)?,
            geohash7: prefix(7)?,
            geohash8: prefix(8)?,
        })
    }

    /// Tags for the centroid of a GeoJSON geometry.
    ///
    /// Returns `None` for geometries that cannot be converted or have no
    /// centroid (e.g. empty collections).
    pub fn from_geometry(geometry: &geojson::Geometry) -> Option<Self> {
        let geometry = geo::Geometry::<f64>::try_from(geometry.value.clone()).ok()?;
        let centroid = geometry.centroid()?;
        Self::from_point(centroid.x(), centroid.y())
    }

    /// The tag at `precision`, if it is one of the stored lengths.
    pub fn get(&self, precision: u8) -> Option<&str> {
        let tag = match precision {
            3 => &self.geohash3,
            4 => &self.geohash4,
            5 => &self.geohash5,
            6 => &self.geohash6,
            7 => &self.geohash7,
            8 => &self.geohash8,
            _ => return None,
        };
        Some(tag)
    }
}
