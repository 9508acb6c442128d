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

//! Application configuration management.
//!
//! Persistent configuration in TOML format via `confy`. The weather API key
//! can come from the `OPENWEATHERMAP_API_KEY` environment variable, which
//! takes precedence over the config file.

use serde::{Deserialize, Serialize};

/// Location queried when nothing else is configured. The incident provider
/// is seeded with Chicago data, so the map defaults there too.
pub const DEFAULT_LOCATION: &str = "Chicago,us";

/// Application configuration stored in TOML format.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Location query for the primary weather source ("City,countrycode").
    #[serde(default = "default_location")]
    pub location: String,

    /// Measurement units for the weather provider ("imperial" or "metric").
    #[serde(default = "default_units")]
    pub units: String,

    /// OpenWeatherMap API key (optional, env var takes precedence).
    #[serde(default)]
    pub openweathermap_api_key: Option<String>,

    /// Default refresh period for sources without an override, in seconds.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,

    /// Refresh period for the sun-times and incident sources, in seconds.
    #[serde(default = "default_slow_refresh_secs")]
    pub slow_refresh_secs: u64,

    /// Incident feed URL; falls back to the bundled sample file when unset.
    #[serde(default)]
    pub incidents_url: Option<String>,

    /// Path of the bundled incident sample used without a feed URL.
    #[serde(default = "default_incidents_sample")]
    pub incidents_sample_path: String,

    /// Canvas size in pixels (the map is a circle inscribed in this square,
    /// minus padding).
    #[serde(default = "default_canvas_size")]
    pub canvas_size: f64,

    /// Padding between the canvas edge and the map circle, in pixels.
    #[serde(default = "default_canvas_padding")]
    pub canvas_padding: f64,
}

// Default value functions for serde
fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}

fn default_units() -> String {
    "imperial".to_string()
}

fn default_refresh_secs() -> u64 {
    30
}

fn default_slow_refresh_secs() -> u64 {
    60
}

fn default_incidents_sample() -> String {
    "data/chicago-bikewise-sample.json".to_string()
}

fn default_canvas_size() -> f64 {
    800.0
}

fn default_canvas_padding() -> f64 {
    100.0
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            location: default_location(),
            units: default_units(),
            openweathermap_api_key: None,
            refresh_secs: default_refresh_secs(),
            slow_refresh_secs: default_slow_refresh_secs(),
            incidents_url: None,
            incidents_sample_path: default_incidents_sample(),
            canvas_size: default_canvas_size(),
            canvas_padding: default_canvas_padding(),
        }
    }
}

impl AppConfig {
    /// Load configuration from disk, creating the default file if missing.
    pub fn load() -> Result<Self, confy::ConfyError> {
        confy::load("polarmap", "config")
    }

    /// Resolve the weather API key: environment variable first, then the
    /// config file.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Ok(key) = std::env::var("OPENWEATHERMAP_API_KEY") {
            if !key.is_empty() {
                return Some(key);
            }
        }

        self.openweathermap_api_key
            .clone()
            .filter(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.location, "Chicago,us");
        assert_eq!(config.units, "imperial");
        assert_eq!(config.refresh_secs, 30);
        assert_eq!(config.slow_refresh_secs, 60);
        assert!(config.incidents_url.is_none());
    }

    #[test]
    fn test_blank_config_key_is_ignored() {
        let config = AppConfig {
            openweathermap_api_key: Some(String::new()),
            ..Default::default()
        };
        // Only meaningful when the env var is also unset, but a blank config
        // value must never win over it either way.
        assert_ne!(config.resolve_api_key(), Some(String::new()));
    }
}
