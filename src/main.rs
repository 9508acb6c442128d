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

//! Radial weather map data engine.
//!
//! Headless driver for the polarmap data layer: registers the weather, sun,
//! and incident sources, runs the initial fetch pass, then prints a 1 Hz
//! status line until interrupted. A renderer sits on top of [`AppState`];
//! this binary exercises everything below it.

mod app_state;
mod config;
mod sources;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use log::{info, warn};
use polarmap_core::bounds::MapBoundsTracker;
use polarmap_core::collector::DataCollector;
use polarmap_core::geo::CanvasPoint;
use tokio::time::MissedTickBehavior;

use app_state::{AppState, MapLayout};
use config::AppConfig;
use sources::{SourceData, WeatherClient, INCIDENTS, SUN};

#[derive(Parser, Debug)]
#[command(name = "polarmap", version, about = "Radial weather map data engine")]
struct Cli {
    /// Location query ("City,countrycode"); overrides the config file
    #[arg(long)]
    location: Option<String>,

    /// Measurement units ("imperial" or "metric"); overrides the config file
    #[arg(long)]
    units: Option<String>,

    /// Weather refresh period in seconds; overrides the config file
    #[arg(long)]
    refresh_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if let Some(location) = cli.location {
        config.location = location;
    }
    if let Some(units) = cli.units {
        config.units = units;
    }
    if let Some(refresh_secs) = cli.refresh_secs {
        config.refresh_secs = refresh_secs;
    }

    let api_key = config.resolve_api_key().unwrap_or_else(|| {
        warn!("no OpenWeatherMap API key configured; weather requests will be rejected");
        String::new()
    });

    let weather_client = Arc::new(WeatherClient::new(api_key, config.units.clone()));
    let bounds = Arc::new(Mutex::new(MapBoundsTracker::new()));
    let collector: DataCollector<SourceData> = DataCollector::new();
    sources::register_all(&collector, &config, Arc::clone(&bounds), Arc::clone(&weather_client))?;

    info!("starting polarmap for '{}'", config.location);
    collector.update_all().await?;

    let layout = MapLayout::new(config.canvas_size, config.canvas_padding);
    let mut state = AppState::new(collector, bounds, layout, weather_client);

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut centered = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !centered && state.weather().and_then(|r| r.coord()).is_some() {
                    centered = true;
                    on_first_center(&mut state, &config).await;
                }
                println!("{}", render_status(&state));
            }

            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, shutting down");
                state.shutdown();
                break;
            }
        }
    }

    Ok(())
}

/// First time the weather source resolves coordinates: pull the dependent
/// sources immediately instead of waiting out their timers, and drop a
/// weather probe at the bottom of the map.
async fn on_first_center(state: &mut AppState, config: &AppConfig) {
    info!("map center resolved, refreshing dependent sources");

    for name in [SUN, INCIDENTS] {
        if let Err(e) = state.collector().update(name).await {
            warn!("initial refresh of '{name}' failed: {e}");
        }
    }

    let probe_at = CanvasPoint::new(config.canvas_size / 2.0, config.canvas_size - 25.0);
    if let Err(e) = state.place_weather_probe(probe_at).await {
        warn!("initial weather probe failed: {e}");
    }
}

/// One status line summarizing every cached source.
fn render_status(state: &AppState) -> String {
    let Some(weather) = state.weather() else {
        return "waiting for first weather update...".to_string();
    };

    let mut line = weather.headline();
    if weather.is_not_found() {
        return line;
    }

    if let Ok(Some(at)) = state.collector().get_update_time(sources::WEATHER) {
        let secs = (Utc::now() - at).num_seconds();
        line.push_str(&format!(" | updated {secs}s ago"));
    }
    if let Some(sun) = state.sun() {
        line.push_str(&format!(" | {}", sun.headline()));
    }
    if let Some(incidents) = state.incidents() {
        line.push_str(&format!(" | {} incidents", incidents.features.len()));
    }
    if let Some(probe) = state.weather_probe() {
        line.push_str(&format!(" | probe: {}", probe.report.headline()));
    }

    line
}
