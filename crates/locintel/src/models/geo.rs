use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A `[longitude, latitude]` pair, in that order as geojson requires
pub type Position = [f64; 2];

/// The geometry types the overlay can draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

impl Geometry {
    /// Every vertex of the geometry: the coordinate of a point, every ring vertex
    /// of a polygon or multipolygon.
    pub fn vertices(&self) -> Box<dyn Iterator<Item = &Position> + '_> {
        match self {
            Geometry::Point(position) => Box::new(std::iter::once(position)),
            Geometry::Polygon(rings) => Box::new(rings.iter().flatten()),
            Geometry::MultiPolygon(polygons) => Box::new(polygons.iter().flatten().flatten()),
        }
    }
}

/// Display metadata attached to a feature.
///
/// Anything the geocoder sends beyond `name` and `category` is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct Feature {
    pub geometry: Geometry,
    #[serde(default)]
    pub properties: FeatureProperties,
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            geometry,
            properties: FeatureProperties::default(),
        }
    }

    pub fn point(longitude: f64, latitude: f64) -> Self {
        Self::new(Geometry::Point([longitude, latitude]))
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.properties.name = Some(name.into());
        self
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.properties.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "FeatureCollection")]
pub struct FeatureCollection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            name: None,
            features,
        }
    }

    pub fn named<S: Into<String>>(name: S, features: Vec<Feature>) -> Self {
        Self {
            name: Some(name.into()),
            features,
        }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The smallest box containing every vertex of every feature, `None` when empty
    pub fn bounds(&self) -> Option<BoundingBox> {
        let mut vertices = self.features.iter().flat_map(|f| f.geometry.vertices());
        let first = vertices.next()?;
        Some(vertices.fold(BoundingBox::around(first), |mut bounds, vertex| {
            bounds.include(vertex);
            bounds
        }))
    }
}

/// An axis aligned box in degrees. The antimeridian is not special cased.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BoundingBox {
    /// A degenerate box covering a single position
    pub fn around(position: &Position) -> Self {
        let [longitude, latitude] = *position;
        Self {
            west: longitude,
            south: latitude,
            east: longitude,
            north: latitude,
        }
    }

    pub fn include(&mut self, position: &Position) {
        let [longitude, latitude] = *position;
        self.west = self.west.min(longitude);
        self.east = self.east.max(longitude);
        self.south = self.south.min(latitude);
        self.north = self.north.max(latitude);
    }

    pub fn center(&self) -> Position {
        [(self.west + self.east) / 2.0, (self.south + self.north) / 2.0]
    }

    /// The larger of the longitude and latitude extents
    pub fn span(&self) -> f64 {
        (self.east - self.west).max(self.north - self.south)
    }
}

/// What the geocode gateway hands back for one query.
///
/// On the wire this is `{"success": true, "query", "features": [...], "count"}` or
/// `{"success": false, "reason"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeocodePayload", into = "GeocodePayload")]
pub enum GeocodeResponse {
    Success { query: String, features: Vec<Feature> },
    Failure { reason: String },
}

impl GeocodeResponse {
    pub fn success<S: Into<String>>(query: S, features: Vec<Feature>) -> Self {
        GeocodeResponse::Success {
            query: query.into(),
            features,
        }
    }

    pub fn failure<S: Into<String>>(reason: S) -> Self {
        GeocodeResponse::Failure {
            reason: reason.into(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            GeocodeResponse::Success { features, .. } => features.len(),
            GeocodeResponse::Failure { .. } => 0,
        }
    }

    /// The successful result as a collection named after the query
    pub fn into_collection(self) -> Result<FeatureCollection, String> {
        match self {
            GeocodeResponse::Success { query, features } => {
                Ok(FeatureCollection::named(query, features))
            }
            GeocodeResponse::Failure { reason } => Err(reason),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct GeocodePayload {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    features: Option<Vec<Feature>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

impl TryFrom<GeocodePayload> for GeocodeResponse {
    type Error = String;

    fn try_from(payload: GeocodePayload) -> Result<Self, Self::Error> {
        if payload.success {
            let features = payload
                .features
                .ok_or_else(|| "successful geocode response without features".to_string())?;
            Ok(GeocodeResponse::Success {
                query: payload.query.unwrap_or_default(),
                features,
            })
        } else {
            Ok(GeocodeResponse::Failure {
                reason: payload
                    .reason
                    .unwrap_or_else(|| "Unknown geocoding failure".to_string()),
            })
        }
    }
}

impl From<GeocodeResponse> for GeocodePayload {
    fn from(response: GeocodeResponse) -> Self {
        match response {
            GeocodeResponse::Success { query, features } => GeocodePayload {
                success: true,
                query: Some(query),
                count: Some(features.len()),
                features: Some(features),
                reason: None,
            },
            GeocodeResponse::Failure { reason } => GeocodePayload {
                success: false,
                query: None,
                features: None,
                count: None,
                reason: Some(reason),
            },
        }
    }
}
