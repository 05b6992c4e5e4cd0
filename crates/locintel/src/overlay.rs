use serde::{Deserialize, Serialize};

use crate::models::geo::{BoundingBox, FeatureCollection, Position};

/// Where the map is looking
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub center: Position,
    pub zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            center: [77.2088, 28.6139],
            zoom: 12.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayConfig {
    pub initial: Viewport,
    pub min_zoom: f64,
    pub max_zoom: f64,
    /// Fraction of the framed extent added as margin around the features
    pub padding: f64,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            initial: Viewport::default(),
            min_zoom: 1.0,
            max_zoom: 16.0,
            padding: 0.1,
        }
    }
}

/// The geographic layer shown on the map
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayState {
    pub features: FeatureCollection,
    pub viewport: Viewport,
}

/// Outcome of a [`OverlaySynchronizer::sync`]
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayChange {
    pub feature_count: usize,
    /// The viewport the map was asked to move to, if any
    pub transition: Option<Viewport>,
}

/// The map widget the overlay is drawn on
pub trait MapSurface: Send {
    /// Replace every drawn feature with this collection
    fn show(&mut self, features: &FeatureCollection);

    /// Animate the camera so the bounds are in view
    fn fly_to(&mut self, viewport: &Viewport, bounds: &BoundingBox);
}

/// Keeps the overlay a pure function of the aggregated features.
///
/// A new state is built in full before it replaces the old one, and the map
/// surface only ever sees complete snapshots.
pub struct OverlaySynchronizer {
    config: OverlayConfig,
    state: OverlayState,
    surface: Option<Box<dyn MapSurface>>,
}

impl OverlaySynchronizer {
    pub fn new(config: OverlayConfig) -> Self {
        let state = OverlayState {
            features: FeatureCollection::default(),
            viewport: config.initial,
        };
        Self {
            config,
            state,
            surface: None,
        }
    }

    pub fn with_surface(mut self, surface: Box<dyn MapSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn features(&self) -> &FeatureCollection {
        &self.state.features
    }

    pub fn viewport(&self) -> &Viewport {
        &self.state.viewport
    }

    /// Replace the overlay with `features` and frame them.
    ///
    /// An empty collection clears the overlay and leaves the viewport alone.
    pub fn sync(&mut self, features: &FeatureCollection) -> OverlayChange {
        let bounds = features.bounds();
        let transition = bounds.map(|bounds| self.fit(&bounds));

        self.state = OverlayState {
            features: features.clone(),
            viewport: transition.unwrap_or(self.state.viewport),
        };

        if let Some(surface) = self.surface.as_mut() {
            surface.show(&self.state.features);
            if let (Some(viewport), Some(bounds)) = (transition.as_ref(), bounds.as_ref()) {
                surface.fly_to(viewport, bounds);
            }
        }

        OverlayChange {
            feature_count: self.state.features.len(),
            transition,
        }
    }

    /// Empty the overlay without moving the map
    pub fn clear(&mut self) {
        self.sync(&FeatureCollection::default());
    }

    /// The viewport centered on `bounds` at the closest zoom that still shows all of it
    pub fn fit(&self, bounds: &BoundingBox) -> Viewport {
        let span = bounds.span() * (1.0 + self.config.padding);
        let zoom = if span > f64::EPSILON {
            (360.0 / span).log2()
        } else {
            self.config.max_zoom
        };

        Viewport {
            center: bounds.center(),
            zoom: zoom.clamp(self.config.min_zoom, self.config.max_zoom),
        }
    }
}
