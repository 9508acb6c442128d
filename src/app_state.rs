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

//! Application state: the collector, the map layout, and the interaction
//! state (active incident marker, weather probe).
//!
//! Everything a renderer or status loop needs lives here behind explicit
//! accessors; there are no globals. The canvas y-axis flip (geographic north
//! is up, canvas y grows down) is applied exactly once, in
//! [`AppState::project_marker`] and its inverse inside
//! [`AppState::place_weather_probe`].

use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use polarmap_core::bounds::MapBoundsTracker;
use polarmap_core::collector::DataCollector;
use polarmap_core::geo::{to_canvas_point, to_geo_point, CanvasPoint, GeoPoint, PolarVector, Scale};

use crate::sources::{
    IncidentCollection, IncidentFeature, SourceData, SunTimes, WeatherClient, WeatherQuery,
    WeatherReport, INCIDENTS, SUN, WEATHER,
};

/// Canvas geometry: the map is a circle of `radius` centered at `center`.
#[derive(Debug, Clone, Copy)]
pub struct MapLayout {
    pub center: CanvasPoint,
    pub radius: f64,
}

impl MapLayout {
    /// Layout for a square canvas of `size` pixels with `padding` pixels
    /// between the circle and each edge.
    #[must_use]
    pub fn new(size: f64, padding: f64) -> Self {
        Self {
            center: CanvasPoint::new(size / 2.0, size / 2.0),
            radius: (size - padding) / 2.0,
        }
    }
}

/// The incident marker the user currently has selected.
#[derive(Debug, Clone)]
pub struct ActiveIncident {
    pub index: usize,
    pub feature: IncidentFeature,
}

/// A point-query weather result pinned to a canvas position.
#[derive(Debug, Clone)]
pub struct WeatherProbe {
    pub canvas: CanvasPoint,
    pub location: GeoPoint,
    pub report: WeatherReport,
}

/// Central application state.
pub struct AppState {
    collector: DataCollector<SourceData>,
    bounds: Arc<Mutex<MapBoundsTracker>>,
    layout: MapLayout,
    weather_client: Arc<WeatherClient>,
    active_incident: Option<ActiveIncident>,
    probe: Option<WeatherProbe>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("layout", &self.layout)
            .field("active_incident", &self.active_incident.as_ref().map(|a| a.index))
            .field("has_probe", &self.probe.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(
        collector: DataCollector<SourceData>,
        bounds: Arc<Mutex<MapBoundsTracker>>,
        layout: MapLayout,
        weather_client: Arc<WeatherClient>,
    ) -> Self {
        Self {
            collector,
            bounds,
            layout,
            weather_client,
            active_incident: None,
            probe: None,
        }
    }

    #[must_use]
    pub fn collector(&self) -> &DataCollector<SourceData> {
        &self.collector
    }

    #[must_use]
    pub fn layout(&self) -> MapLayout {
        self.layout
    }

    /// Cached primary weather report, if resolved.
    #[must_use]
    pub fn weather(&self) -> Option<WeatherReport> {
        self.collector
            .get_data(WEATHER)
            .ok()
            .flatten()
            .and_then(|d| d.as_weather().cloned())
    }

    /// Cached sun times, if resolved.
    #[must_use]
    pub fn sun(&self) -> Option<SunTimes> {
        self.collector
            .get_data(SUN)
            .ok()
            .flatten()
            .and_then(|d| d.as_sun().cloned())
    }

    /// Cached incident collection, if resolved.
    #[must_use]
    pub fn incidents(&self) -> Option<IncidentCollection> {
        self.collector
            .get_data(INCIDENTS)
            .ok()
            .flatten()
            .and_then(|d| d.as_incidents().cloned())
    }

    #[must_use]
    pub fn active_incident(&self) -> Option<&ActiveIncident> {
        self.active_incident.as_ref()
    }

    #[must_use]
    pub fn weather_probe(&self) -> Option<&WeatherProbe> {
        self.probe.as_ref()
    }

    /// Select (or with `None`, deselect) an incident marker by index into
    /// the cached collection.
    ///
    /// Re-selecting the current marker is a no-op. An index that does not
    /// resolve to a cached feature clears the selection.
    pub fn set_active_incident(&mut self, index: Option<usize>) {
        if self.active_incident.as_ref().map(|a| a.index) == index {
            return;
        }

        match index {
            None => {
                debug!("cleared active incident");
                self.active_incident = None;
            }
            Some(i) => {
                let feature = self
                    .incidents()
                    .and_then(|c| c.features.get(i).cloned());
                match feature {
                    Some(feature) => {
                        info!(
                            "selected incident {} at {:.4},{:.4}",
                            i,
                            feature.geometry.coordinates[0],
                            feature.geometry.coordinates[1]
                        );
                        self.active_incident = Some(ActiveIncident { index: i, feature });
                    }
                    None => {
                        warn!("ignoring selection of missing incident index {i}");
                        self.active_incident = None;
                    }
                }
            }
        }
    }

    /// Project an annotated marker vector onto the canvas, with the y-axis
    /// flip for screen coordinates.
    #[must_use]
    pub fn project_marker(&self, vector: PolarVector) -> CanvasPoint {
        let scale = Scale {
            input_max: self.bounds.lock().expect("bounds lock poisoned").max_distance(),
            output_max: self.layout.radius,
        };
        let raw = to_canvas_point(vector, scale, self.layout.center);
        CanvasPoint::new(raw.x, 2.0 * self.layout.center.y - raw.y)
    }

    /// Query current weather at a canvas position and pin the result there.
    ///
    /// The canvas position is inverted through the map projection into
    /// geographic coordinates. Requires the primary weather source to have
    /// resolved coordinates, since those anchor the projection.
    pub async fn place_weather_probe(
        &mut self,
        canvas: CanvasPoint,
    ) -> Result<&WeatherProbe, Box<dyn std::error::Error>> {
        let center_geo = self
            .weather()
            .and_then(|r| r.coord())
            .ok_or("map center unknown: weather coordinates not resolved yet")?;
        let max_distance = self.bounds.lock().expect("bounds lock poisoned").max_distance();

        // Undo the screen y-flip before inverting the projection.
        let mirrored = CanvasPoint::new(canvas.x, 2.0 * self.layout.center.y - canvas.y);
        let location = to_geo_point(
            mirrored,
            self.layout.center,
            center_geo,
            self.layout.radius,
            max_distance,
        );

        let report = self.weather_client.fetch(&WeatherQuery::At(location)).await?;
        info!(
            "weather probe at {:.4},{:.4}: {}",
            location.lat,
            location.lon,
            report.headline()
        );

        Ok(self.probe.insert(WeatherProbe { canvas, location, report }))
    }

    /// Tear down the collector's refresh timers.
    pub fn shutdown(&self) {
        self.collector.shutdown();
    }
}
