//! Coordinate scaling from normalized screen points to device points.
//!
//! Inbound gestures carry coordinates normalized to `0.0..=1.0`. Taps scale
//! straight onto the device size. Swipes are mapped through the current
//! orientation, which decides which axis lands on width and which on height.

use serde::{Deserialize, Serialize};

/// Interface orientation, using WDA's wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Orientation {
    #[default]
    #[serde(rename = "PORTRAIT")]
    Portrait,
    /// Home button on the right.
    #[serde(rename = "LANDSCAPE")]
    Landscape,
    /// Home button on the left.
    #[serde(rename = "UIA_DEVICE_ORIENTATION_LANDSCAPERIGHT")]
    LandscapeRight,
    #[serde(rename = "UIA_DEVICE_ORIENTATION_PORTRAIT_UPSIDEDOWN")]
    PortraitUpsideDown,
}

/// Device size in points (portrait frame).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSize {
    pub width: f64,
    pub height: f64,
}

/// A point normalized to the viewer's frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f64,
    pub y: f64,
}

impl NormalizedPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Scale straight onto the device size, ignoring orientation.
    pub fn to_device(self, size: DeviceSize) -> DevicePoint {
        DevicePoint {
            x: self.x * size.width,
            y: self.y * size.height,
        }
    }
}

/// A point in device points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

/// Inbound swipe, normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwipeParams {
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    /// Press duration before dragging, in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
}

/// Body of `wda/dragfromtoforduration`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaledSwipe {
    pub from_x: f64,
    pub from_y: f64,
    pub to_x: f64,
    pub to_y: f64,
    pub duration: f64,
}

/// Map a normalized viewer point to device points through the orientation.
/// Only swipes go through this; taps use [`NormalizedPoint::to_device`].
pub fn scale_point(orientation: Orientation, point: NormalizedPoint, size: DeviceSize) -> DevicePoint {
    let (x, y) = match orientation {
        Orientation::Portrait => (point.x, point.y),
        Orientation::PortraitUpsideDown => (1.0 - point.x, 1.0 - point.y),
        Orientation::Landscape => (1.0 - point.y, point.x),
        Orientation::LandscapeRight => (point.y, 1.0 - point.x),
    };
    DevicePoint {
        x: x * size.width,
        y: y * size.height,
    }
}

/// Scale both ends of a swipe.
pub fn scale_swipe(orientation: Orientation, params: SwipeParams, size: DeviceSize) -> ScaledSwipe {
    let from = scale_point(orientation, NormalizedPoint::new(params.from_x, params.from_y), size);
    let to = scale_point(orientation, NormalizedPoint::new(params.to_x, params.to_y), size);
    ScaledSwipe {
        from_x: from.x,
        from_y: from.y,
        to_x: to.x,
        to_y: to.y,
        duration: params.duration.unwrap_or(0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IPHONE_X: DeviceSize = DeviceSize {
        width: 375.0,
        height: 812.0,
    };

    #[test]
    fn portrait_is_identity_scaling() {
        let p = scale_point(Orientation::Portrait, NormalizedPoint::new(0.5, 0.25), IPHONE_X);
        assert_eq!(p, DevicePoint { x: 187.5, y: 203.0 });
    }

    #[test]
    fn upside_down_mirrors_both_axes() {
        let p = scale_point(
            Orientation::PortraitUpsideDown,
            NormalizedPoint::new(0.0, 0.0),
            IPHONE_X,
        );
        assert_eq!(p, DevicePoint { x: 375.0, y: 812.0 });
    }

    #[test]
    fn landscape_swaps_axes() {
        // Viewer's top-left corner sits at the device's top-right in LANDSCAPE.
        let p = scale_point(Orientation::Landscape, NormalizedPoint::new(0.0, 0.0), IPHONE_X);
        assert_eq!(p, DevicePoint { x: 375.0, y: 0.0 });

        let p = scale_point(
            Orientation::LandscapeRight,
            NormalizedPoint::new(0.0, 0.0),
            IPHONE_X,
        );
        assert_eq!(p, DevicePoint { x: 0.0, y: 812.0 });
    }

    #[test]
    fn to_device_ignores_orientation() {
        let p = NormalizedPoint::new(0.1, 0.2).to_device(IPHONE_X);
        assert!((p.x - 37.5).abs() < 1e-9);
        assert!((p.y - 162.4).abs() < 1e-9);
    }

    #[test]
    fn swipe_defaults_duration_to_zero() {
        let swipe = scale_swipe(
            Orientation::Portrait,
            SwipeParams {
                from_x: 0.1,
                from_y: 0.5,
                to_x: 0.9,
                to_y: 0.5,
                duration: None,
            },
            DeviceSize {
                width: 100.0,
                height: 200.0,
            },
        );
        assert_eq!(swipe.from_x, 10.0);
        assert_eq!(swipe.to_x, 90.0);
        assert_eq!(swipe.from_y, 100.0);
        assert_eq!(swipe.duration, 0.0);
    }

    #[test]
    fn orientation_uses_wda_names() {
        let o: Orientation = serde_json::from_str(r#""LANDSCAPE""#).unwrap();
        assert_eq!(o, Orientation::Landscape);
        let json = serde_json::to_string(&Orientation::LandscapeRight).unwrap();
        assert_eq!(json, r#""UIA_DEVICE_ORIENTATION_LANDSCAPERIGHT""#);
    }
}
