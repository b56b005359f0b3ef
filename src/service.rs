use geo::{Geometry, MultiPolygon};
use geojson::GeoJson;
use log::info;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("feature service request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed service response: {0}")]
    Malformed(String),
    #[error("empty result set")]
    Empty,
    #[error("bad feature geometry: {0}")]
    Geometry(#[from] geojson::Error),
}

/// A county record: its attribute map plus polygon geometry.
#[derive(Debug, Clone)]
pub struct Feature {
    pub attributes: Map<String, Value>,
    pub geometry: MultiPolygon<f64>,
}

impl Feature {
    pub fn value_of(&self, key: &str) -> Option<f64> {
        self.attributes.get(key).and_then(Value::as_f64)
    }

    pub fn text_of(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Aggregate statistics over the valid (non-null, non-negative) population
/// of one attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregates {
    pub stddev: f64,
    pub max: f64,
}

/// Seam over the remote feature layer. One full-fetch for geometry and two
/// statistics queries; each call is a fresh round trip, nothing is cached.
pub trait FeatureService: Send + Sync {
    /// Every feature with geometry and all attributes.
    fn fetch_features(&self) -> Result<Vec<Feature>, ServiceError>;
    /// All valid values of `attribute` (filter: `IS NOT NULL AND >= 0`).
    fn fetch_values(&self, attribute: &str) -> Result<Vec<f64>, ServiceError>;
    /// Standard deviation and maximum over the same filtered population.
    fn fetch_aggregates(&self, attribute: &str) -> Result<Aggregates, ServiceError>;
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    features: Vec<QueryFeature>,
}

#[derive(Deserialize)]
struct QueryFeature {
    attributes: Map<String, Value>,
}

/// Client for an ArcGIS-style FeatureServer layer query endpoint.
pub struct RestClient {
    http: reqwest::blocking::Client,
    query_url: String,
}

impl RestClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            query_url: format!("{}/query", endpoint.trim_end_matches('/')),
        }
    }

    fn valid_filter(attribute: &str) -> String {
        format!("{attribute} IS NOT NULL AND {attribute} >= 0")
    }
}

impl FeatureService for RestClient {
    fn fetch_features(&self) -> Result<Vec<Feature>, ServiceError> {
        let text = self
            .http
            .get(&self.query_url)
            .query(&[
                ("where", "1=1"),
                ("outFields", "*"),
                ("returnGeometry", "true"),
                ("f", "geojson"),
            ])
            .send()?
            .error_for_status()?
            .text()?;
        let raw: GeoJson = text.parse()?;
        let features = features_from_geojson(raw)?;
        info!("feature count: {}", features.len());
        Ok(features)
    }

    fn fetch_values(&self, attribute: &str) -> Result<Vec<f64>, ServiceError> {
        let where_clause = Self::valid_filter(attribute);
        let resp: QueryResponse = self
            .http
            .get(&self.query_url)
            .query(&[
                ("where", where_clause.as_str()),
                ("outFields", attribute),
                ("returnGeometry", "false"),
                ("f", "json"),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        let values: Vec<f64> = resp
            .features
            .iter()
            .filter_map(|f| f.attributes.get(attribute).and_then(Value::as_f64))
            .collect();
        info!("{attribute}: {} valid values", values.len());
        Ok(values)
    }

    fn fetch_aggregates(&self, attribute: &str) -> Result<Aggregates, ServiceError> {
        let where_clause = Self::valid_filter(attribute);
        let out_statistics = json!([
            {
                "onStatisticField": attribute,
                "outStatisticFieldName": "stddev_value",
                "statisticType": "stddev"
            },
            {
                "onStatisticField": attribute,
                "outStatisticFieldName": "max_value",
                "statisticType": "max"
            }
        ])
        .to_string();
        let resp: QueryResponse = self
            .http
            .get(&self.query_url)
            .query(&[
                ("where", where_clause.as_str()),
                ("outStatistics", out_statistics.as_str()),
                ("f", "json"),
            ])
            .send()?
            .error_for_status()?
            .json()?;
        parse_aggregates(&resp)
    }
}

fn parse_aggregates(resp: &QueryResponse) -> Result<Aggregates, ServiceError> {
    let first = resp.features.first().ok_or(ServiceError::Empty)?;
    let stat = |name: &str| {
        first
            .attributes
            .get(name)
            .and_then(Value::as_f64)
            .ok_or_else(|| ServiceError::Malformed(format!("missing statistic {name}")))
    };
    Ok(Aggregates {
        stddev: stat("stddev_value")?,
        max: stat("max_value")?,
    })
}

fn features_from_geojson(raw: GeoJson) -> Result<Vec<Feature>, ServiceError> {
    let mut features = Vec::new();
    if let GeoJson::FeatureCollection(fc) = raw {
        for feature in fc.features {
            let attributes = feature.properties.unwrap_or_default();
            let Some(gj) = feature.geometry else { continue };
            let geom: Geometry<f64> = gj.value.try_into()?;
            let geometry = match geom {
                Geometry::Polygon(p) => p.into(),
                Geometry::MultiPolygon(m) => m,
                _ => continue,
            };
            features.push(Feature { attributes, geometry });
        }
    }
    if features.is_empty() {
        return Err(ServiceError::Empty);
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn aggregates_parse_from_statistics_row() {
        let resp: QueryResponse = serde_json::from_str(
            r#"{"features":[{"attributes":{"stddev_value":1200.5,"max_value":50000}}]}"#,
        )
        .unwrap();
        let agg = parse_aggregates(&resp).unwrap();
        assert_eq!(agg.stddev, 1200.5);
        assert_eq!(agg.max, 50000.0);
    }

    #[test]
    fn empty_statistics_row_is_an_error() {
        let resp: QueryResponse = serde_json::from_str(r#"{"features":[]}"#).unwrap();
        assert!(matches!(parse_aggregates(&resp), Err(ServiceError::Empty)));
    }

    #[test]
    fn missing_statistic_field_is_malformed() {
        let resp: QueryResponse =
            serde_json::from_str(r#"{"features":[{"attributes":{"stddev_value":7}}]}"#).unwrap();
        assert!(matches!(parse_aggregates(&resp), Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn geojson_features_keep_attributes_and_polygons() {
        let gj = GeoJson::from_str(
            r#"{
              "type": "FeatureCollection",
              "features": [
                {
                  "type": "Feature",
                  "properties": {"NAME": "Ada", "POPULATION": 494967},
                  "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,1.0],[0.0,0.0]]]
                  }
                },
                {
                  "type": "Feature",
                  "properties": {"NAME": "NoGeometry"},
                  "geometry": null
                }
              ]
            }"#,
        )
        .unwrap();
        let features = features_from_geojson(gj).unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0].text_of("NAME"), Some("Ada"));
        assert_eq!(features[0].value_of("POPULATION"), Some(494967.0));
        assert_eq!(features[0].geometry.0.len(), 1);
    }
}
