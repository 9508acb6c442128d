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

//! OpenWeatherMap current-weather client.
//!
//! Queries are either by location name or by coordinates. The provider's own
//! "city not found" answer (`cod == 404`) is a valid payload carrying
//! displayable text, not a fetch error; only transport and decode problems
//! are reported as [`FetchError`].

use log::debug;
use polarmap_core::collector::FetchError;
use polarmap_core::geo::GeoPoint;
use serde::Deserialize;

/// Current-weather endpoint.
pub const WEATHER_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";

/// Geographic coordinates as the provider reports them.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Coord {
    pub lon: f64,
    pub lat: f64,
}

/// One entry of the provider's `weather` array.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherCondition {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SysInfo {
    #[serde(default)]
    pub country: Option<String>,
}

/// The provider's status code: a number on success, a string on its own
/// error answers.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ProviderCode {
    Number(i64),
    Text(String),
}

impl ProviderCode {
    fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.parse().ok(),
        }
    }
}

/// Current-weather response.
///
/// All fields are optional: a `cod == 404` answer carries only the status
/// code and a message.
#[derive(Debug, Clone, Deserialize)]
pub struct WeatherReport {
    #[serde(default)]
    pub coord: Option<Coord>,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sys: Option<SysInfo>,
    #[serde(default)]
    pub cod: Option<ProviderCode>,
    /// Free-form provider message; a string on error answers, occasionally
    /// numeric on success, hence the loose type.
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

impl WeatherReport {
    /// Whether this is the provider's own "not found" answer.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.cod.as_ref().and_then(ProviderCode::as_i64) == Some(404)
    }

    /// Coordinates of the reported location, if present.
    #[must_use]
    pub fn coord(&self) -> Option<GeoPoint> {
        self.coord.map(|c| GeoPoint::new(c.lon, c.lat))
    }

    fn message_text(&self) -> String {
        match &self.message {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "unknown error".to_string(),
        }
    }

    /// One-line summary for display, covering the not-found case too.
    #[must_use]
    pub fn headline(&self) -> String {
        if self.is_not_found() {
            return format!("Error getting weather data: {}", self.message_text());
        }

        let name = self.name.as_deref().unwrap_or("(unnamed)");
        let country = self
            .sys
            .as_ref()
            .and_then(|s| s.country.as_deref())
            .unwrap_or("??");
        let description = self
            .weather
            .first()
            .map_or("no description", |w| w.description.as_str());

        format!("{name} ({country}) Status: {description}")
    }
}

/// Weather query parameterization.
#[derive(Debug, Clone)]
pub enum WeatherQuery {
    /// "City,countrycode" style location query.
    ByName(String),
    /// Coordinate query, used by the pointer-interaction probe.
    At(GeoPoint),
}

/// HTTP client for the current-weather endpoint.
pub struct WeatherClient {
    http: reqwest::Client,
    api_key: String,
    units: String,
}

impl std::fmt::Debug for WeatherClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherClient")
            .field("units", &self.units)
            .finish_non_exhaustive()
    }
}

impl WeatherClient {
    #[must_use]
    pub fn new(api_key: String, units: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            units,
        }
    }

    fn build_url(&self, query: &WeatherQuery) -> String {
        match query {
            WeatherQuery::ByName(location) => format!(
                "{WEATHER_ENDPOINT}?q={location}&appid={}&units={}",
                self.api_key, self.units
            ),
            WeatherQuery::At(point) => format!(
                "{WEATHER_ENDPOINT}?appid={}&units={}&lat={}&lon={}",
                self.api_key, self.units, point.lat, point.lon
            ),
        }
    }

    /// Fetch current weather for a query.
    ///
    /// Provider-level errors (like 404 city-not-found) come back as a
    /// parsed [`WeatherReport`], never as `Err`.
    pub async fn fetch(&self, query: &WeatherQuery) -> Result<WeatherReport, FetchError> {
        let url = self.build_url(query);
        debug!("fetching weather for {query:?}");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        response
            .json::<WeatherReport>()
            .await
            .map_err(|e| FetchError::InvalidPayload(e.to_string()))
    }
}
