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

//! Core library for radial map applications: scheduled remote data
//! collection plus polar-coordinate projection.
//!
//! The library is organized in three independent layers:
//!
//! - **Collector layer**: named data sources with per-source refresh timers,
//!   declared dependencies, request coalescing, and stale-on-failure caching
//! - **Geo layer**: pure bidirectional math between geographic coordinates,
//!   polar vectors, and a bounded circular canvas
//! - **Bounds layer**: maximum-distance tracking over a marker set, used to
//!   scale the projection
//!
//! # Quick Start
//!
//! Register sources with the [`collector::DataCollector`], run the initial
//! pass, and poll cached values from the render loop:
//!
//! ```no_run
//! use std::time::Duration;
//! use polarmap_core::collector::{DataCollector, Fetched, FetchInput, SourceSpec};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let collector: DataCollector<String> = DataCollector::new();
//!
//!     collector.register(
//!         SourceSpec::new("weather", |_input: FetchInput<String>| async {
//!             Ok(Fetched::Value("light rain".to_string()))
//!         })
//!         .with_interval(Duration::from_secs(30)),
//!     )?;
//!
//!     collector.update_all().await?;
//!
//!     loop {
//!         if let Some(weather) = collector.get_data("weather")? {
//!             println!("current conditions: {weather}");
//!         }
//!         tokio::time::sleep(Duration::from_secs(1)).await;
//!     }
//! }
//! ```
//!
//! # Projection
//!
//! The geo layer is plain functions over value types:
//!
//! ```
//! use polarmap_core::geo::{to_canvas_point, to_polar_vector, CanvasPoint, GeoPoint, Scale};
//!
//! let center = GeoPoint::new(-87.63, 41.88);
//! let marker = GeoPoint::new(-87.10, 42.30);
//!
//! let vector = to_polar_vector(center, marker);
//! let pixel = to_canvas_point(
//!     vector,
//!     Scale { input_max: 1.0, output_max: 300.0 },
//!     CanvasPoint::new(400.0, 300.0),
//! );
//! assert!(pixel.x > 400.0 && pixel.y > 300.0);
//! ```

pub mod bounds;
pub mod collector;
pub mod geo;

pub use bounds::{MapBoundsTracker, MapMarker};
pub use collector::{
    CollectorError, DataCollector, FetchError, FetchInput, Fetched, SourceSpec,
    DEFAULT_REFRESH_INTERVAL,
};
pub use geo::{
    rescale, to_canvas_point, to_geo_point, to_polar_vector, CanvasPoint, GeoPoint, PolarVector,
    Scale,
};
