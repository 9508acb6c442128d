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

//! Sunrise/sunset times client (sunrise-sunset.org).
//!
//! Keyed by the weather source's coordinates; the source that wraps this
//! client defers until those are available.

use log::debug;
use polarmap_core::collector::FetchError;
use polarmap_core::geo::GeoPoint;
use serde::Deserialize;

/// Sun-times endpoint.
pub const SUN_ENDPOINT: &str = "https://api.sunrise-sunset.org/json";

#[derive(Debug, Clone, Deserialize)]
pub struct SunResults {
    pub sunrise: String,
    pub sunset: String,
    #[serde(default)]
    pub solar_noon: Option<String>,
    /// "HH:MM:SS" by default, plain seconds with `formatted=0`.
    #[serde(default)]
    pub day_length: Option<serde_json::Value>,
}

/// Sun-times response.
#[derive(Debug, Clone, Deserialize)]
pub struct SunTimes {
    pub results: SunResults,
    pub status: String,
}

impl SunTimes {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == "OK"
    }

    /// One-line summary for display.
    #[must_use]
    pub fn headline(&self) -> String {
        format!("Sunrise {} / Sunset {}", self.results.sunrise, self.results.sunset)
    }
}

/// HTTP client for the sun-times endpoint.
pub struct SunClient {
    http: reqwest::Client,
}

impl std::fmt::Debug for SunClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SunClient").finish_non_exhaustive()
    }
}

impl Default for SunClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SunClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Fetch sun times for a location.
    pub async fn fetch(&self, location: GeoPoint) -> Result<SunTimes, FetchError> {
        let url = format!("{SUN_ENDPOINT}?lat={}&lng={}", location.lat, location.lon);
        debug!("fetching sun times at {:.4},{:.4}", location.lat, location.lon);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        response
            .json::<SunTimes>()
            .await
            .map_err(|e| FetchError::InvalidPayload(e.to_string()))
    }
}
