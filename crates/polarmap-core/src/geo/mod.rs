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

//! Polar projection between geographic coordinates and a circular canvas.
//!
//! The projection treats longitude/latitude as a flat plane: the displacement
//! between two points becomes a [`PolarVector`] (distance in degrees of arc,
//! bearing counter-clockwise from the positive x-axis), which is then
//! linearly rescaled onto the canvas radius. [`to_geo_point`] is the exact
//! inverse and backs pointer interaction.
//!
//! Canvas y-axis inversion (geographic "up" vs. canvas "down") is the
//! caller's responsibility, applied once after [`to_canvas_point`].

use std::f64::consts::{FRAC_PI_2, PI, TAU};

/// A geographic point in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }
}

/// A (distance, bearing) displacement in a 2D plane.
///
/// The bearing is measured counter-clockwise from the positive x-axis and
/// normalized to `[0, 2π)`. The distance carries the unit of whatever plane
/// produced it (degrees of arc for geographic input, pixels for canvas
/// input).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolarVector {
    pub distance: f64,
    /// Bearing in radians, `[0, 2π)`.
    pub bearing: f64,
}

/// A point on the drawing surface, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanvasPoint {
    pub x: f64,
    pub y: f64,
}

impl CanvasPoint {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Linear rescale parameters: domain `[0, input_max]` maps to range
/// `[0, output_max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    pub input_max: f64,
    pub output_max: f64,
}

/// Rescale `value` from `[0, input_max]` to `[0, output_max]`.
///
/// A zero-width domain degrades to a rescale factor of 0 rather than a
/// division by zero.
#[must_use]
pub fn rescale(value: f64, input_max: f64, output_max: f64) -> f64 {
    if input_max == 0.0 {
        0.0
    } else {
        value / input_max * output_max
    }
}

/// Polar vector for a planar displacement `(dx, dy)`.
///
/// Quadrant correction over the raw arctangent:
/// - `dx < 0` adds π (quadrants II/III)
/// - `dx > 0 && dy < 0` adds 2π (quadrant IV)
/// - `dx == 0` is resolved explicitly to π/2 or 3π/2 by the sign of `dy`
/// - a zero displacement yields distance 0 with bearing 0 by convention
fn polar_between(dx: f64, dy: f64) -> PolarVector {
    let distance = (dx * dx + dy * dy).sqrt();

    let bearing = if dx == 0.0 {
        if dy > 0.0 {
            FRAC_PI_2
        } else if dy < 0.0 {
            3.0 * FRAC_PI_2
        } else {
            0.0 // degenerate: no displacement
        }
    } else {
        let mut angle = (dy / dx).atan();
        if dx < 0.0 {
            angle += PI;
        } else if dy < 0.0 {
            angle += TAU;
        }
        // dy == -0.0 with dx > 0 lands on TAU exactly; fold back into range
        if angle >= TAU {
            angle -= TAU;
        }
        angle
    };

    PolarVector { distance, bearing }
}

/// Polar vector from `origin` to `target` in geographic degrees.
#[must_use]
pub fn to_polar_vector(origin: GeoPoint, target: GeoPoint) -> PolarVector {
    polar_between(target.lon - origin.lon, target.lat - origin.lat)
}

/// Project a polar vector onto the canvas around `origin`.
///
/// The vector's distance is rescaled from `[0, scale.input_max]` (real-world
/// span) to `[0, scale.output_max]` (canvas radius), then converted to
/// Cartesian offsets. No axis flip is applied here.
#[must_use]
pub fn to_canvas_point(vector: PolarVector, scale: Scale, origin: CanvasPoint) -> CanvasPoint {
    let scaled = rescale(vector.distance, scale.input_max, scale.output_max);
    CanvasPoint {
        x: origin.x + scaled * vector.bearing.cos(),
        y: origin.y + scaled * vector.bearing.sin(),
    }
}

/// Invert a canvas position back into geographic coordinates.
///
/// Computes the polar vector from `map_center_canvas` to `canvas_point`,
/// rescales its distance from `[0, canvas_radius]` to
/// `[0, max_geo_distance]`, and applies it from `map_center_geo`.
#[must_use]
pub fn to_geo_point(
    canvas_point: CanvasPoint,
    map_center_canvas: CanvasPoint,
    map_center_geo: GeoPoint,
    canvas_radius: f64,
    max_geo_distance: f64,
) -> GeoPoint {
    let vector = polar_between(
        canvas_point.x - map_center_canvas.x,
        canvas_point.y - map_center_canvas.y,
    );
    let distance = rescale(vector.distance, canvas_radius, max_geo_distance);
    GeoPoint {
        lon: map_center_geo.lon + distance * vector.bearing.cos(),
        lat: map_center_geo.lat + distance * vector.bearing.sin(),
    }
}
