// Copyright 2026 Polarmap Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Incident marker source: a GeoJSON-like feature collection.
//!
//! Each feature carries a point geometry (`[lon, lat]`) and free-form
//! properties. After a successful fetch the wrapping source annotates every
//! feature with its polar vector from the map center and recomputes the
//! shared [`polarmap_core::bounds::MapBoundsTracker`], so the renderer never
//! touches the projector per frame.

use std::path::PathBuf;

use log::debug;
use polarmap_core::bounds::MapMarker;
use polarmap_core::collector::FetchError;
use polarmap_core::geo::{GeoPoint, PolarVector};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct IncidentGeometry {
    /// `[lon, lat]`, GeoJSON axis order.
    pub coordinates: [f64; 2],
}

/// One incident marker.
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentFeature {
    pub geometry: IncidentGeometry,
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Polar vector from the map center, attached during a bounds pass.
    #[serde(skip)]
    pub polar_vector: Option<PolarVector>,
}

impl IncidentFeature {
    /// Marker color from the feed's styling properties, if present.
    #[must_use]
    pub fn marker_color(&self) -> Option<&str> {
        self.properties.get("marker-color").and_then(|v| v.as_str())
    }

    /// Human-readable description from the feed properties, if present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.properties.get("description").and_then(|v| v.as_str())
    }
}

impl MapMarker for IncidentFeature {
    fn position(&self) -> GeoPoint {
        GeoPoint::new(self.geometry.coordinates[0], self.geometry.coordinates[1])
    }

    fn set_polar_vector(&mut self, vector: PolarVector) {
        self.polar_vector = Some(vector);
    }
}

/// Incident feature collection.
#[derive(Debug, Clone, Deserialize)]
pub struct IncidentCollection {
    #[serde(default)]
    pub features: Vec<IncidentFeature>,
}

/// Where the incident data comes from.
#[derive(Debug, Clone)]
pub enum IncidentFeed {
    /// Remote GeoJSON feed.
    Url(String),
    /// Bundled sample file, used when no feed URL is configured.
    SampleFile(PathBuf),
}

/// Client for the incident feed.
pub struct IncidentClient {
    http: reqwest::Client,
    feed: IncidentFeed,
}

impl std::fmt::Debug for IncidentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncidentClient")
            .field("feed", &self.feed)
            .finish_non_exhaustive()
    }
}

impl IncidentClient {
    #[must_use]
    pub fn new(feed: IncidentFeed) -> Self {
        Self {
            http: reqwest::Client::new(),
            feed,
        }
    }

    /// Fetch the current feature collection.
    pub async fn fetch(&self) -> Result<IncidentCollection, FetchError> {
        match &self.feed {
            IncidentFeed::Url(url) => {
                debug!("fetching incidents from {url}");
                let response = self
                    .http
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| FetchError::Transport(e.to_string()))?;
                response
                    .json::<IncidentCollection>()
                    .await
                    .map_err(|e| FetchError::InvalidPayload(e.to_string()))
            }
            IncidentFeed::SampleFile(path) => {
                debug!("reading incident sample from {}", path.display());
                let text = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| FetchError::Transport(e.to_string()))?;
                serde_json::from_str(&text).map_err(|e| FetchError::InvalidPayload(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polarmap_core::bounds::MapBoundsTracker;

    const SAMPLE_JSON: &str = r##"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-87.62, 41.89]},
                "properties": {"marker-color": "#e74c3c", "description": "Stolen bike"}
            },
            {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [-87.70, 41.80]},
                "properties": {}
            }
        ]
    }"##;

    #[test]
    fn test_parse_feature_collection() {
        let collection: IncidentCollection = serde_json::from_str(SAMPLE_JSON).unwrap();

        assert_eq!(collection.features.len(), 2);
        let first = &collection.features[0];
        assert_eq!(first.marker_color(), Some("#e74c3c"));
        assert_eq!(first.description(), Some("Stolen bike"));
        assert!(first.polar_vector.is_none());

        let second = &collection.features[1];
        assert!(second.marker_color().is_none());
    }

    #[test]
    fn test_empty_collection_tolerated() {
        let collection: IncidentCollection = serde_json::from_str(r#"{"features": []}"#).unwrap();
        assert!(collection.features.is_empty());
    }

    #[test]
    fn test_bounds_pass_annotates_features() {
        let mut collection: IncidentCollection = serde_json::from_str(SAMPLE_JSON).unwrap();
        let center = GeoPoint::new(-87.65, 41.85);

        let mut bounds = MapBoundsTracker::new();
        let max = bounds.recompute(&mut collection.features, center);

        assert!(max > 0.0);
        for feature in &collection.features {
            let vector = feature.polar_vector.expect("feature missing polar vector");
            assert!(vector.distance <= max);
        }
    }
}
