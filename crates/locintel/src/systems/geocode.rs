use async_trait::async_trait;
use indoc::indoc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::time::Duration;

use crate::errors::{GatewayError, ToolError, ToolResult};
use crate::models::geo::{Feature, FeatureProperties, GeocodeResponse, Geometry};
use crate::models::tool::{Tool, ToolCall};
use crate::systems::System;

pub const NOMINATIM_DEFAULT_HOST: &str = "https://nominatim.openstreetmap.org";
pub const DEFAULT_USER_AGENT: &str = concat!("locintel/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_LIMIT: u32 = 5;

/// Turns a free-text query into geographic features.
///
/// Implementations never fail: any problem is reported as
/// [`GeocodeResponse::Failure`] with a human readable reason.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn geocode(&self, query: &str) -> GeocodeResponse;
}

#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub host: String,
    pub user_agent: String,
    pub limit: u32,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            host: NOMINATIM_DEFAULT_HOST.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Gateway backed by the OpenStreetMap Nominatim search API
pub struct NominatimGateway {
    client: Client,
    config: NominatimConfig,
}

#[derive(Deserialize)]
struct NominatimResponse {
    #[serde(default)]
    features: Vec<NominatimFeature>,
}

#[derive(Deserialize)]
struct NominatimFeature {
    geometry: Value,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl NominatimFeature {
    /// None when the geometry is not one the overlay can draw
    fn into_feature(self) -> Option<Feature> {
        let geometry = match serde_json::from_value::<Geometry>(self.geometry) {
            Ok(geometry) => geometry,
            Err(err) => {
                tracing::debug!(error = %err, "skipping feature with unsupported geometry");
                return None;
            }
        };

        let mut extra = self.properties;
        let name = take_string(&mut extra, "display_name");
        let category = take_string(&mut extra, "category").or_else(|| {
            extra
                .get("type")
                .and_then(Value::as_str)
                .map(str::to_string)
        });

        Some(Feature {
            geometry,
            properties: FeatureProperties {
                name,
                category,
                extra,
            },
        })
    }
}

fn take_string(properties: &mut Map<String, Value>, key: &str) -> Option<String> {
    match properties.remove(key) {
        Some(Value::String(value)) => Some(value),
        Some(other) => {
            properties.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

impl NominatimGateway {
    pub fn new(config: NominatimConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(config.user_agent.clone())
            .build()?;

        Ok(Self { client, config })
    }

    /// Run the search and decode every drawable feature
    pub async fn search(&self, query: &str) -> Result<Vec<Feature>, GatewayError> {
        let url = format!("{}/search", self.config.host.trim_end_matches('/'));
        let limit = self.config.limit.to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", query),
                ("format", "geojson"),
                ("polygon_geojson", "1"),
                ("limit", limit.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let decoded: NominatimResponse = serde_json::from_str(&body)?;
        Ok(decoded
            .features
            .into_iter()
            .filter_map(NominatimFeature::into_feature)
            .collect())
    }
}

#[async_trait]
impl Gateway for NominatimGateway {
    async fn geocode(&self, query: &str) -> GeocodeResponse {
        match self.search(query).await {
            Ok(features) => {
                tracing::debug!(query, count = features.len(), "geocoded");
                GeocodeResponse::success(query, features)
            }
            Err(err) => {
                tracing::warn!(query, error = %err, "geocode failed");
                GeocodeResponse::failure(err.to_string())
            }
        }
    }
}

/// Exposes a [`Gateway`] to the agent as the `search` tool
pub struct GeocodeSystem {
    tools: Vec<Tool>,
    gateway: Box<dyn Gateway>,
}

impl GeocodeSystem {
    pub fn new(gateway: Box<dyn Gateway>) -> Self {
        let search_tool = Tool::new(
            "search",
            indoc! {r#"
                Find places on the map matching a free-text query, such as a landmark,
                an address, or a kind of place near a locality ("cafes in Hauz Khas").
                Returns the matching features as geojson, which are drawn on the map.
            "#},
            json!({
                "type": "object",
                "required": ["query"],
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "What to look for, including the locality when known."
                    }
                }
            }),
        );

        Self {
            tools: vec![search_tool],
            gateway,
        }
    }

    async fn search(&self, params: Value) -> ToolResult<Value> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|query| !query.is_empty())
            .ok_or_else(|| ToolError::InvalidParameters("Missing 'query' parameter".into()))?;

        match self.gateway.geocode(query).await {
            GeocodeResponse::Failure { reason } => Err(ToolError::ExecutionError(reason)),
            success => serde_json::to_value(success)
                .map_err(|e| ToolError::ExecutionError(e.to_string())),
        }
    }
}

#[async_trait]
impl System for GeocodeSystem {
    fn name(&self) -> &str {
        "geocode"
    }

    fn description(&self) -> &str {
        "Looks up places and shows them on the map."
    }

    fn instructions(&self) -> &str {
        indoc! {r#"
            Use the search tool whenever the user asks where something is or wants
            places suggested. Issue one search per distinct kind of place. Every
            result is drawn on the map, so describe the results briefly instead of
            listing coordinates.
        "#}
    }

    fn tools(&self) -> &[Tool] {
        &self.tools
    }

    async fn call(&self, tool_call: ToolCall) -> ToolResult<Value> {
        match tool_call.name.as_str() {
            "search" => self.search(tool_call.arguments).await,
            _ => Err(ToolError::ToolNotFound(tool_call.name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn nominatim_body() -> Value {
        json!({
            "type": "FeatureCollection",
            "licence": "Data © OpenStreetMap contributors, ODbL 1.0.",
            "features": [
                {
                    "type": "Feature",
                    "properties": {
                        "place_id": 1,
                        "display_name": "Lodhi Garden, New Delhi, India",
                        "category": "leisure",
                        "type": "park",
                        "importance": 0.52
                    },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[77.21, 28.59], [77.23, 28.59], [77.23, 28.60], [77.21, 28.59]]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"display_name": "Rajpath", "type": "primary"},
                    "geometry": {
                        "type": "LineString",
                        "coordinates": [[77.20, 28.61], [77.23, 28.61]]
                    }
                },
                {
                    "type": "Feature",
                    "properties": {"display_name": "Deer Park", "type": "park"},
                    "geometry": {"type": "Point", "coordinates": [77.19, 28.55]}
                }
            ]
        })
    }

    async fn setup_gateway(response: ResponseTemplate) -> (MockServer, NominatimGateway) {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("q", "parks in Delhi"))
            .and(query_param("format", "geojson"))
            .and(query_param("polygon_geojson", "1"))
            .and(query_param("limit", "5"))
            .and(header("User-Agent", "locintel-tests"))
            .respond_with(response)
            .mount(&mock_server)
            .await;

        let gateway = NominatimGateway::new(NominatimConfig {
            host: mock_server.uri(),
            user_agent: "locintel-tests".to_string(),
            limit: 5,
        })
        .unwrap();
        (mock_server, gateway)
    }

    struct StaticGateway(GeocodeResponse);

    #[async_trait]
    impl Gateway for StaticGateway {
        async fn geocode(&self, _query: &str) -> GeocodeResponse {
            self.0.clone()
        }
    }

    #[tokio::test]
    async fn test_search_decodes_drawable_features() {
        let (_server, gateway) =
            setup_gateway(ResponseTemplate::new(200).set_body_json(nominatim_body())).await;

        let response = gateway.geocode("parks in Delhi").await;

        let collection = response.into_collection().unwrap();
        assert_eq!(collection.name.as_deref(), Some("parks in Delhi"));
        // The LineString is skipped
        assert_eq!(collection.len(), 2);

        let garden = &collection.features[0].properties;
        assert_eq!(garden.name.as_deref(), Some("Lodhi Garden, New Delhi, India"));
        assert_eq!(garden.category.as_deref(), Some("leisure"));
        assert_eq!(garden.extra["place_id"], json!(1));

        let deer_park = &collection.features[1].properties;
        assert_eq!(deer_park.category.as_deref(), Some("park"));
    }

    #[tokio::test]
    async fn test_status_error_becomes_failure() {
        let (_server, gateway) = setup_gateway(ResponseTemplate::new(503)).await;

        let response = gateway.geocode("parks in Delhi").await;

        assert_eq!(
            response,
            GeocodeResponse::failure("Nominatim API error: 503")
        );
    }

    #[tokio::test]
    async fn test_garbage_body_becomes_failure() {
        let (_server, gateway) =
            setup_gateway(ResponseTemplate::new(200).set_body_string("<html>")).await;

        match gateway.geocode("parks in Delhi").await {
            GeocodeResponse::Failure { reason } => {
                assert!(reason.starts_with("Could not decode Nominatim response"))
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_system_returns_wire_response() {
        let system = GeocodeSystem::new(Box::new(StaticGateway(GeocodeResponse::success(
            "park",
            vec![Feature::point(77.2, 28.6)],
        ))));

        let output = system
            .call(ToolCall::new("search", json!({"query": "park"})))
            .await
            .unwrap();

        assert_eq!(output["success"], json!(true));
        assert_eq!(output["count"], json!(1));
        assert_eq!(output["query"], json!("park"));
    }

    #[tokio::test]
    async fn test_system_maps_failure_to_execution_error() {
        let system = GeocodeSystem::new(Box::new(StaticGateway(GeocodeResponse::failure(
            "Nominatim API error: 503",
        ))));

        let err = system
            .call(ToolCall::new("search", json!({"query": "park"})))
            .await
            .unwrap_err();

        assert_eq!(err.reason(), "Nominatim API error: 503");
    }

    #[tokio::test]
    async fn test_system_rejects_bad_calls() {
        let system = GeocodeSystem::new(Box::new(StaticGateway(GeocodeResponse::failure("unused"))));

        let missing = system.call(ToolCall::new("search", json!({"query": "  "}))).await;
        assert!(matches!(missing, Err(ToolError::InvalidParameters(_))));

        let unknown = system.call(ToolCall::new("reverse", json!({}))).await;
        assert_eq!(unknown, Err(ToolError::ToolNotFound("reverse".into())));
    }
}
