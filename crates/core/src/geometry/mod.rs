//! Geometry normalization and spatial filter shapes.
//!
//! Request geometries arrive in several forms:
//! - a JSON envelope `{"xmin":..,"ymin":..,"xmax":..,"ymax":..,"spatialReference":{"wkid":..}}`
//! - a comma separated `xmin,ymin,xmax,ymax` string, always geographic
//! - an already decoded JSON object
//!
//! All of them end up as a geographic [`Envelope`] and then as an envelope
//! [`Shape`] whose two points are upper-left `(xmin, ymax)` and lower-right
//! `(xmax, ymin)`. The engine's envelope encoding depends on that order.

pub mod geohash;
pub mod projection;

use geo::{Coord, LineString, Polygon, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use geohash::GeohashTags;
pub use projection::{Projection, SphericalMercator, WGS84};

/// Errors raised while turning a request geometry into a filter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    /// Neither JSON nor a 4-field bbox string.
    #[error("unparseable geometry: {0}")]
    Unparseable(String),

    /// Valid JSON that does not describe an envelope.
    #[error("not an envelope: {0}")]
    NotAnEnvelope(String),

    /// A coordinate that is not a finite number.
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// Polygon coordinates with the wrong nesting or too few positions.
    #[error("invalid polygon: {0}")]
    InvalidPolygon(String),
}

/// A geometry request parameter: raw text or an already decoded object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GeometryParam {
    Text(String),
    Object(Value),
}

impl From<&str> for GeometryParam {
    fn from(value: &str) -> Self {
        GeometryParam::Text(value.to_string())
    }
}

impl From<Value> for GeometryParam {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => GeometryParam::Text(s),
            other => GeometryParam::Object(other),
        }
    }
}

impl std::fmt::Display for GeometryParam {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeometryParam::Text(s) => f.write_str(s),
            GeometryParam::Object(v) => write!(f, "{v}"),
        }
    }
}

/// Axis-aligned bounding box tagged with its spatial reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub wkid: u32,
}

impl Envelope {
    /// A geographic (WGS84) envelope.
    pub fn geographic(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self { xmin, ymin, xmax, ymax, wkid: WGS84 }
    }

    pub fn is_geographic(&self) -> bool {
        self.wkid == WGS84
    }

    /// Bring the envelope into geographic coordinates.
    ///
    /// Only the min and max corners are inverse-projected, each on its own.
    pub fn to_geographic(self, projection: &impl Projection) -> Self {
        if self.is_geographic() {
            return self;
        }
        let [xmin, ymin] = projection.inverse([self.xmin, self.ymin]);
        let [xmax, ymax] = projection.inverse([self.xmax, self.ymax]);
        Self::geographic(xmin, ymin, xmax, ymax)
    }

    /// The envelope filter shape of this box, corners in canonical order.
    pub fn to_shape(self) -> Shape {
        convert_extent([self.xmin, self.ymin, self.xmax, self.ymax])
    }
}

/// Spatial filter shape in the engine's GeoJSON-like encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Shape {
    /// `[[xmin, ymax], [xmax, ymin]]`
    Envelope { coordinates: [[f64; 2]; 2] },
    /// Rings of `[x, y]` positions, outer ring first.
    Polygon { coordinates: Vec<Vec<[f64; 2]>> },
}

impl Shape {
    /// The shape as a `geo` geometry, for in-process intersection tests.
    pub fn to_geo(&self) -> geo::Geometry<f64> {
        match self {
            Shape::Envelope { coordinates: [[xmin, ymax], [xmax, ymin]] } => {
                geo::Geometry::Rect(Rect::new(Coord { x: *xmin, y: *ymin }, Coord { x: *xmax, y: *ymax }))
            }
            Shape::Polygon { coordinates } => {
                let mut rings = coordinates
                    .iter()
                    .map(|ring| LineString::from(ring.iter().map(|[x, y]| Coord { x: *x, y: *y }).collect::<Vec<_>>()));
                let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
                geo::Geometry::Polygon(Polygon::new(exterior, rings.collect()))
            }
        }
    }
}

/// Build the canonical envelope shape from `[xmin, ymin, xmax, ymax]`.
///
/// Always yields upper-left then lower-right, whatever the input order.
pub fn convert_extent(coords: [f64; 4]) -> Shape {
    let [x1, y1, x2, y2] = coords;
    let (xmin, xmax) = (x1.min(x2), x1.max(x2));
    let (ymin, ymax) = (y1.min(y2), y1.max(y2));
    Shape::Envelope { coordinates: [[xmin, ymax], [xmax, ymin]] }
}

/// Parse a request geometry into an envelope in its own reference.
///
/// Tries JSON first, then a 4-field comma split tagged as geographic. The
/// offending input is logged on failure.
pub fn parse_geometry(param: &GeometryParam) -> Result<Envelope, GeometryError> {
    let parsed = match param {
        GeometryParam::Text(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => envelope_from_value(&value),
            Err(_) => envelope_from_bbox(text),
        },
        GeometryParam::Object(value) => envelope_from_value(value),
    };

    if let Err(err) = &parsed {
        tracing::error!(geometry = %param, error = %err, "error building bbox from query");
    }
    parsed
}

/// Parse, reproject and canonicalize a free-form geometry into a filter shape.
pub fn create_extent(param: &GeometryParam) -> Result<Shape, GeometryError> {
    let envelope = parse_geometry(param)?.to_geographic(&SphericalMercator);
    Ok(envelope.to_shape())
}

/// Read literal polygon coordinates (`[[[x, y], ...], ...]`) without any
/// normalization.
pub fn parse_polygon(param: &GeometryParam) -> Result<Shape, GeometryError> {
    let rings: Vec<Vec<Vec<f64>>> = match param {
        GeometryParam::Text(text) => serde_json::from_str(text),
        GeometryParam::Object(value) => serde_json::from_value(value.clone()),
    }
    .map_err(|e| GeometryError::InvalidPolygon(e.to_string()))?;

    if rings.is_empty() {
        return Err(GeometryError::InvalidPolygon("no rings".into()));
    }

    let mut coordinates = Vec::with_capacity(rings.len());
    for (i, ring) in rings.into_iter().enumerate() {
        if ring.len() < 4 {
            return Err(GeometryError::InvalidPolygon(format!("ring {i} has fewer than 4 positions")));
        }
        let positions = ring
            .into_iter()
            .map(|position| match position.as_slice() {
                [x, y, ..] if x.is_finite() && y.is_finite() => Ok([*x, *y]),
                _ => Err(GeometryError::InvalidPolygon(format!("bad position in ring {i}: {position:?}"))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        coordinates.push(positions);
    }

    Ok(Shape::Polygon { coordinates })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    xmin: Coordinate,
    ymin: Coordinate,
    xmax: Coordinate,
    ymax: Coordinate,
    #[serde(default)]
    spatial_reference: Option<RawSpatialReference>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSpatialReference {
    wkid: Option<u32>,
    latest_wkid: Option<u32>,
}

/// Coordinates may be numbers or numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Coordinate {
    Number(f64),
    Text(String),
}

impl Coordinate {
    fn value(&self) -> Result<f64, GeometryError> {
        let value = match self {
            Coordinate::Number(n) => *n,
            Coordinate::Text(s) => parse_number(s)?,
        };
        if value.is_finite() { Ok(value) } else { Err(GeometryError::InvalidCoordinate(value.to_string())) }
    }
}

fn parse_number(text: &str) -> Result<f64, GeometryError> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| GeometryError::InvalidCoordinate(text.to_string()))
}

fn envelope_from_value(value: &Value) -> Result<Envelope, GeometryError> {
    let raw: RawEnvelope =
        serde_json::from_value(value.clone()).map_err(|_| GeometryError::NotAnEnvelope(value.to_string()))?;

    let wkid = raw
        .spatial_reference
        .and_then(|sr| sr.wkid.or(sr.latest_wkid))
        .unwrap_or(WGS84);

    Ok(Envelope { xmin: raw.xmin.value()?, ymin: raw.ymin.value()?, xmax: raw.xmax.value()?, ymax: raw.ymax.value()?, wkid })
}

fn envelope_from_bbox(text: &str) -> Result<Envelope, GeometryError> {
    let fields: Vec<&str> = text.split(',').collect();
    let [xmin, ymin, xmax, ymax] = fields.as_slice() else {
        return Err(GeometryError::Unparseable(text.to_string()));
    };
    let envelope = Envelope::geographic(parse_number(xmin)?, parse_number(ymin)?, parse_number(xmax)?, parse_number(ymax)?);
    if [envelope.xmin, envelope.ymin, envelope.xmax, envelope.ymax].iter().all(|v| v.is_finite()) {
        Ok(envelope)
    } else {
        Err(GeometryError::InvalidCoordinate(text.to_string()))
    }
}
