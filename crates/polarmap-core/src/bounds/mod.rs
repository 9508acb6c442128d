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

//! Map bounds derived from the current marker set.
//!
//! [`MapBoundsTracker`] remembers the largest polar distance spanned by the
//! markers around the map center. The renderer uses that maximum as the
//! real-world domain when scaling distances onto the canvas radius, so it is
//! recomputed wholesale whenever the marker source refreshes, never
//! incrementally and never per frame.

use crate::geo::{to_polar_vector, GeoPoint, PolarVector};

/// Trait for marker records that can carry their computed polar vector.
///
/// Implemented by the application's marker type so [`MapBoundsTracker`] can
/// annotate each record during a bounds pass; the renderer then reads the
/// stored vector every frame instead of re-invoking the projector.
pub trait MapMarker {
    /// Geographic position of the marker.
    fn position(&self) -> GeoPoint;

    /// Store the polar vector computed from the map center.
    fn set_polar_vector(&mut self, vector: PolarVector);
}

/// Tracks the maximum real-world distance spanned by the marker set.
#[derive(Debug, Clone, Default)]
pub struct MapBoundsTracker {
    max_distance: f64,
}

impl MapBoundsTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The largest marker distance observed by the last recompute.
    #[must_use]
    pub fn max_distance(&self) -> f64 {
        self.max_distance
    }

    /// Recompute the maximum distance over `markers` as seen from `origin`.
    ///
    /// Every marker is annotated with its polar vector as a side effect. An
    /// empty marker set leaves the previous maximum untouched so the
    /// projector never sees a zero-width domain from a transient empty
    /// refresh.
    pub fn recompute<M: MapMarker>(&mut self, markers: &mut [M], origin: GeoPoint) -> f64 {
        if markers.is_empty() {
            return self.max_distance;
        }

        let mut max = 0.0_f64;
        for marker in markers.iter_mut() {
            let vector = to_polar_vector(origin, marker.position());
            max = max.max(vector.distance);
            marker.set_polar_vector(vector);
        }

        self.max_distance = max;
        max
    }
}
