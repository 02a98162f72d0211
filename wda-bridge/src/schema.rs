//! Response schemas for the WebDriverAgent endpoints the bridge reads.
//!
//! WDA wraps every payload in `{"value": ..., "sessionId": ...}`. Only the
//! fields the bridge needs are modelled; anything else is ignored. A payload
//! that does not fit becomes `BridgeError::MalformedResponse`.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{BridgeError, BridgeResult};

/// W3C element key used by newer WDA builds alongside the legacy `ELEMENT`.
pub const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Bundle id of the iOS home screen.
pub const SPRINGBOARD_BUNDLE_ID: &str = "com.apple.springboard";

/// Decode a backend payload, naming the endpoint on failure.
pub fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> BridgeResult<T> {
    serde_json::from_slice(body).map_err(|e| BridgeError::malformed(endpoint, e.to_string()))
}

/// Generic `{"value": T}` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WdaValue<T> {
    pub value: T,
}

/// `GET /status`
#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

/// `POST /session`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSessionResponse {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    pub value: CreatedSession,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedSession {
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
    pub capabilities: Capabilities,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Capabilities {
    pub device: String,
    #[serde(rename = "sdkVersion")]
    pub sdk_version: String,
}

impl CreateSessionResponse {
    /// Session id from the top level, falling back to the one inside `value`.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id
            .as_deref()
            .or(self.value.session_id.as_deref())
    }
}

/// `GET /session/{id}/window/size`, in points.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct WindowSize {
    pub width: f64,
    pub height: f64,
}

/// `GET /session/{id}/wda/screen`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ScreenInfo {
    pub scale: f64,
}

/// `GET /session/{id}/wda/batteryInfo`
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BatteryInfo {
    /// Charge level in `0.0..=1.0`.
    pub level: f64,
    /// UIDevice battery state code (1 unplugged, 2 charging, 3 full).
    pub state: i64,
}

/// `GET /session/{id}/wda/activeAppInfo`
#[derive(Debug, Clone, Deserialize)]
pub struct ActiveAppInfo {
    #[serde(rename = "bundleId")]
    pub bundle_id: String,
}

/// An element handle as returned by `element/active` and `elements`.
#[derive(Debug, Clone, Deserialize)]
pub struct ElementRef {
    #[serde(rename = "ELEMENT", default)]
    legacy: Option<String>,
    #[serde(rename = "element-6066-11e4-a52e-4f735466cecf", default)]
    w3c: Option<String>,
}

impl ElementRef {
    pub fn id(&self) -> Option<&str> {
        self.legacy.as_deref().or(self.w3c.as_deref())
    }
}
