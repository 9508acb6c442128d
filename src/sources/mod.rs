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

//! The application's data sources and their collector wiring.
//!
//! Three sources feed the map:
//!
//! - `weather`: current conditions for the configured location; its reported
//!   coordinates define the map center
//! - `sun`: sunrise/sunset times at the map center; defers until weather has
//!   resolved coordinates
//! - `incidents`: marker feature collection; defers likewise, and recomputes
//!   the shared map bounds after every successful fetch

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use polarmap_core::bounds::MapBoundsTracker;
use polarmap_core::collector::{
    CollectorError, DataCollector, FetchInput, Fetched, SourceSnapshot, SourceSpec,
};
use polarmap_core::geo::GeoPoint;

use crate::config::AppConfig;

pub mod incidents;
pub mod sun;
pub mod weather;

pub use incidents::{IncidentClient, IncidentCollection, IncidentFeature, IncidentFeed};
pub use sun::{SunClient, SunTimes};
pub use weather::{WeatherClient, WeatherQuery, WeatherReport};

/// Source names, as registered with the collector.
pub const WEATHER: &str = "weather";
pub const SUN: &str = "sun";
pub const INCIDENTS: &str = "incidents";

/// Payload union cached by the collector; one variant per source.
#[derive(Debug, Clone)]
pub enum SourceData {
    Weather(WeatherReport),
    Sun(SunTimes),
    Incidents(IncidentCollection),
}

impl SourceData {
    #[must_use]
    pub fn as_weather(&self) -> Option<&WeatherReport> {
        match self {
            Self::Weather(report) => Some(report),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_sun(&self) -> Option<&SunTimes> {
        match self {
            Self::Sun(times) => Some(times),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_incidents(&self) -> Option<&IncidentCollection> {
        match self {
            Self::Incidents(collection) => Some(collection),
            _ => None,
        }
    }
}

/// The map center: the weather source's reported coordinates, if resolved.
#[must_use]
pub fn weather_center(sources: &SourceSnapshot<SourceData>) -> Option<GeoPoint> {
    sources
        .get(WEATHER)
        .and_then(SourceData::as_weather)
        .and_then(WeatherReport::coord)
}

/// Register the three map sources with the collector.
///
/// `sun` and `incidents` declare a dependency on `weather` and defer until
/// the map center is known. The incident source recomputes `bounds` inside
/// its fetch, so consumers only ever see a bounds value consistent with the
/// cached marker set.
pub fn register_all(
    collector: &DataCollector<SourceData>,
    config: &AppConfig,
    bounds: Arc<Mutex<MapBoundsTracker>>,
    weather_client: Arc<WeatherClient>,
) -> Result<(), CollectorError> {
    let refresh = Duration::from_secs(config.refresh_secs);
    let slow_refresh = Duration::from_secs(config.slow_refresh_secs);

    let query = WeatherQuery::ByName(config.location.clone());
    let client = Arc::clone(&weather_client);
    collector.register(
        SourceSpec::new(WEATHER, move |_input: FetchInput<SourceData>| {
            let client = Arc::clone(&client);
            let query = query.clone();
            async move {
                let report = client.fetch(&query).await?;
                Ok(Fetched::Value(SourceData::Weather(report)))
            }
        })
        .with_interval(refresh),
    )?;

    let sun_client = Arc::new(SunClient::new());
    collector.register(
        SourceSpec::new(SUN, move |input: FetchInput<SourceData>| {
            let client = Arc::clone(&sun_client);
            async move {
                let Some(center) = weather_center(&input.sources) else {
                    return Ok(Fetched::Deferred);
                };
                let times = client.fetch(center).await?;
                Ok(Fetched::Value(SourceData::Sun(times)))
            }
        })
        .with_interval(slow_refresh)
        .depends_on(WEATHER),
    )?;

    let feed = match &config.incidents_url {
        Some(url) => IncidentFeed::Url(url.clone()),
        None => IncidentFeed::SampleFile(PathBuf::from(&config.incidents_sample_path)),
    };
    let incident_client = Arc::new(IncidentClient::new(feed));
    collector.register(
        SourceSpec::new(INCIDENTS, move |input: FetchInput<SourceData>| {
            let client = Arc::clone(&incident_client);
            let bounds = Arc::clone(&bounds);
            async move {
                let Some(center) = weather_center(&input.sources) else {
                    return Ok(Fetched::Deferred);
                };
                let mut collection = client.fetch().await?;
                // Annotate markers and refresh the shared bounds before the
                // new collection becomes visible to readers.
                bounds
                    .lock()
                    .expect("bounds lock poisoned")
                    .recompute(&mut collection.features, center);
                Ok(Fetched::Value(SourceData::Incidents(collection)))
            }
        })
        .with_interval(slow_refresh)
        .depends_on(WEATHER),
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_at(lon: f64, lat: f64) -> WeatherReport {
        serde_json::from_str(&format!(
            r#"{{"coord": {{"lon": {lon}, "lat": {lat}}}, "name": "Test", "cod": 200}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_source_data_accessors() {
        let data = SourceData::Weather(report_at(-87.65, 41.85));
        assert!(data.as_weather().is_some());
        assert!(data.as_sun().is_none());
        assert!(data.as_incidents().is_none());
    }

    #[tokio::test]
    async fn test_registration_wires_dependencies() {
        // Exercise the dependency declarations without any network: weather
        // missing means sun and incidents stay deferred through a full pass.
        let config = AppConfig {
            openweathermap_api_key: Some("unused".to_string()),
            ..Default::default()
        };
        let collector: DataCollector<SourceData> = DataCollector::new();
        let bounds = Arc::new(Mutex::new(MapBoundsTracker::new()));
        let client = Arc::new(WeatherClient::new("unused".to_string(), config.units.clone()));

        register_all(&collector, &config, bounds, client).unwrap();

        // All three names are known to the collector, nothing cached yet.
        for name in [WEATHER, SUN, INCIDENTS] {
            assert!(collector.get_data(name).unwrap().is_none());
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let config = AppConfig::default();
        let collector: DataCollector<SourceData> = DataCollector::new();
        let bounds = Arc::new(Mutex::new(MapBoundsTracker::new()));
        let client = Arc::new(WeatherClient::new(String::new(), config.units.clone()));

        register_all(&collector, &config, Arc::clone(&bounds), Arc::clone(&client)).unwrap();
        let err = register_all(&collector, &config, bounds, client).unwrap_err();
        assert!(matches!(err, CollectorError::DuplicateName(_)));
    }
}
