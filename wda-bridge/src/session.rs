//! Automation session lifecycle and the command surface built on it.
//!
//! One [`SessionManager`] per device. It owns the session id, the device
//! geometry and the current orientation. Every change of session identity
//! bumps a generation counter; responses that arrive after the generation
//! moved on are discarded instead of applied.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{BridgeError, BridgeResult};
use crate::facts::{BatteryFact, CapabilityFact, Destination, Fact, SizeFact};
use crate::gateway::{BackendRequest, Gateway};
use crate::geometry::{DeviceSize, Orientation};
use crate::ports::FactSink;
use crate::schema::{
    ActiveAppInfo, BatteryInfo, CreateSessionResponse, ElementRef, ScreenInfo, StatusResponse,
    WdaValue, WindowSize, SPRINGBOARD_BUNDLE_ID,
};
use crate::watchdog::WatchdogHandle;

/// Local view of the automation session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub session_id: Option<String>,
    pub device_size: Option<DeviceSize>,
    pub orientation: Orientation,
    generation: u64,
}

impl Session {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Everything a gesture needs to address the device.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub session_id: String,
    pub size: DeviceSize,
    pub orientation: Orientation,
}

pub struct SessionManager {
    serial: String,
    gateway: Gateway,
    facts: Arc<dyn FactSink>,
    state: Mutex<Session>,
    watchdog: Mutex<Option<WatchdogHandle>>,
}

impl SessionManager {
    pub fn new(serial: impl Into<String>, gateway: Gateway, facts: Arc<dyn FactSink>) -> Self {
        Self {
            serial: serial.into(),
            gateway,
            facts,
            state: Mutex::new(Session::default()),
            watchdog: Mutex::new(None),
        }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Watchdog to close once the session is deleted.
    pub fn attach_watchdog(&self, handle: WatchdogHandle) {
        *self.watchdog.lock() = Some(handle);
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn snapshot(&self) -> Session {
        self.state.lock().clone()
    }

    pub fn session_id(&self) -> BridgeResult<String> {
        self.state
            .lock()
            .session_id
            .clone()
            .ok_or(BridgeError::NoSession)
    }

    /// Session id, device size and orientation, or why gestures can't run.
    pub fn geometry(&self) -> BridgeResult<Geometry> {
        let state = self.state.lock();
        let session_id = state.session_id.clone().ok_or(BridgeError::NoSession)?;
        let size = state.device_size.ok_or(BridgeError::NoDeviceSize)?;
        Ok(Geometry {
            session_id,
            size,
            orientation: state.orientation,
        })
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Reuse the backend's session or create one, then read the geometry.
    pub async fn start_session(&self) -> BridgeResult<DeviceSize> {
        let generation = self.state.lock().generation;

        info!(serial = %self.serial, "Verifying WDA session status");
        let status: StatusResponse = self
            .gateway
            .send(BackendRequest::get("/status"))
            .await?
            .decode("/status")?;

        if let Some(session_id) = status.session_id {
            info!(%session_id, "Reusing existing WDA session");
            self.adopt(generation, session_id)?;
            return self.size().await;
        }

        // Unlocks the device and brings up the springboard before the session starts.
        self.home_btn().await?;

        info!(serial = %self.serial, "Starting WDA session");
        let created: CreateSessionResponse = self
            .gateway
            .send(BackendRequest::post("/session", json!({ "capabilities": {} })))
            .await?
            .decode("/session")?;
        let session_id = created
            .session_id()
            .ok_or_else(|| BridgeError::malformed("/session", "missing sessionId"))?
            .to_string();

        self.adopt(generation, session_id.clone())?;
        let capabilities = &created.value.capabilities;
        self.publish(Fact::SdkIosVersion(CapabilityFact {
            serial: self.serial.clone(),
            os_name: capabilities.device.clone(),
            sdk_version: capabilities.sdk_version.clone(),
        }));
        info!(%session_id, sdk_version = %capabilities.sdk_version, "WDA session started");

        self.report_battery(&session_id).await?;
        self.size().await
    }

    /// Forget the session locally, then delete it on the backend.
    pub async fn stop_session(&self) -> BridgeResult<()> {
        let captured = {
            let mut state = self.state.lock();
            let captured = state.session_id.take();
            if captured.is_some() {
                state.device_size = None;
                state.generation += 1;
            }
            captured
        };
        let Some(session_id) = captured else {
            debug!("No WDA session to stop");
            return Ok(());
        };

        info!(%session_id, "Stopping WDA session");
        self.gateway
            .send(BackendRequest::delete(format!("/session/{session_id}")))
            .await?;

        let watchdog = self.watchdog.lock().clone();
        if let Some(watchdog) = watchdog {
            watchdog.disconnect();
        }
        Ok(())
    }

    /// Query window size and screen scale; publish the pixel size.
    pub async fn size(&self) -> BridgeResult<DeviceSize> {
        let (session_id, generation) = {
            let state = self.state.lock();
            let id = state.session_id.clone().ok_or(BridgeError::NoSession)?;
            (id, state.generation)
        };

        info!(%session_id, "Getting device window size");
        let window: WdaValue<WindowSize> = self
            .gateway
            .send(BackendRequest::get(format!("/session/{session_id}/window/size")))
            .await?
            .decode("window/size")?;
        let screen: WdaValue<ScreenInfo> = self
            .gateway
            .send(BackendRequest::get(format!("/session/{session_id}/wda/screen")))
            .await?
            .decode("wda/screen")?;

        let size = DeviceSize {
            width: window.value.width,
            height: window.value.height,
        };
        {
            let mut state = self.state.lock();
            if state.generation != generation {
                return Err(BridgeError::Stale {
                    session_id: Some(session_id),
                });
            }
            state.device_size = Some(size);
        }

        let scale = screen.value.scale;
        self.publish(Fact::SizeIosDevice(SizeFact {
            serial: self.serial.clone(),
            height_px: (size.height * scale).round() as u32,
            width_px: (size.width * scale).round() as u32,
        }));
        Ok(size)
    }

    fn adopt(&self, generation: u64, session_id: String) -> BridgeResult<()> {
        let mut state = self.state.lock();
        if state.generation != generation {
            debug!(%session_id, "Session changed while starting; discarding");
            return Err(BridgeError::Stale {
                session_id: Some(session_id),
            });
        }
        state.session_id = Some(session_id);
        state.generation += 1;
        Ok(())
    }

    async fn report_battery(&self, session_id: &str) -> BridgeResult<()> {
        let reply = self
            .gateway
            .send_tolerant(BackendRequest::get(format!(
                "/session/{session_id}/wda/batteryInfo"
            )))
            .await;
        let battery = match reply.and_then(|r| r.decode::<WdaValue<BatteryInfo>>("wda/batteryInfo")) {
            Ok(battery) => battery.value,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Battery query failed");
                return Ok(());
            }
        };
        self.publish(Fact::BatteryIosEvent(BatteryFact::from_reading(
            &self.serial,
            battery.level,
            battery.state,
        )));
        Ok(())
    }

    fn publish(&self, fact: Fact) {
        self.facts.send(Destination::Global, fact);
    }

    // ── Commands ───────────────────────────────────────────────────────

    /// Type into the focused element. Local failures are only logged.
    pub async fn type_key(&self, text: &str) -> BridgeResult<()> {
        if text.is_empty() {
            return Ok(());
        }
        let session_id = self.session_id()?;
        let body = json!({ "value": text.chars().map(String::from).collect::<Vec<_>>() });
        debug!(chars = text.chars().count(), "Typing keys");

        match self.type_into_active_element(&session_id, &body).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) if e.status() == Some(404) => {
                debug!("No active element; typing through wda/keys");
                let fallback = self
                    .gateway
                    .send_tolerant(BackendRequest::post(
                        format!("/session/{session_id}/wda/keys"),
                        body,
                    ))
                    .await;
                match fallback {
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => {
                        error!(error = %e, "Typing through wda/keys failed");
                        Ok(())
                    }
                    Ok(_) => Ok(()),
                }
            }
            Err(e) => {
                error!(error = %e, "Typing failed");
                Ok(())
            }
        }
    }

    async fn type_into_active_element(&self, session_id: &str, body: &Value) -> BridgeResult<()> {
        let app: WdaValue<ActiveAppInfo> = self
            .gateway
            .send_tolerant(BackendRequest::get(format!(
                "/session/{session_id}/wda/activeAppInfo"
            )))
            .await?
            .decode("wda/activeAppInfo")?;
        if app.value.bundle_id == SPRINGBOARD_BUNDLE_ID {
            debug!("Ignoring typeKey as springboard is active");
            return Ok(());
        }

        let active: WdaValue<ElementRef> = self
            .gateway
            .send_tolerant(BackendRequest::get(format!(
                "/session/{session_id}/element/active"
            )))
            .await?
            .decode("element/active")?;
        let element = active
            .value
            .id()
            .ok_or_else(|| BridgeError::malformed("element/active", "missing element id"))?;

        self.gateway
            .send_tolerant(BackendRequest::post(
                format!("/session/{session_id}/element/{element}/value"),
                body.clone(),
            ))
            .await?;
        Ok(())
    }

    pub async fn home_btn(&self) -> BridgeResult<()> {
        self.gateway
            .send(BackendRequest::post_empty("/wda/homescreen"))
            .await?;
        Ok(())
    }

    pub async fn rotation(&self, orientation: Orientation) -> BridgeResult<()> {
        self.state.lock().orientation = orientation;
        let session_id = self.session_id()?;
        self.gateway
            .send(BackendRequest::post(
                format!("/session/{session_id}/orientation"),
                json!({ "orientation": orientation }),
            ))
            .await?;
        Ok(())
    }

    pub async fn open_url(&self, url: &str) -> BridgeResult<()> {
        let session_id = self.session_id()?;
        self.gateway
            .send(BackendRequest::post(
                format!("/session/{session_id}/url"),
                json!({ "url": url }),
            ))
            .await?;
        Ok(())
    }

    pub async fn press_button(&self, name: &str) -> BridgeResult<()> {
        let session_id = self.session_id()?;
        self.gateway
            .send(BackendRequest::post(
                format!("/session/{session_id}/wda/pressButton"),
                json!({ "name": name }),
            ))
            .await?;
        Ok(())
    }

    pub async fn app_activate(&self, bundle_id: &str) -> BridgeResult<()> {
        let session_id = self.session_id()?;
        self.gateway
            .send(BackendRequest::post(
                format!("/session/{session_id}/wda/apps/activate"),
                json!({ "bundleId": bundle_id }),
            ))
            .await?;
        Ok(())
    }

    /// Toggle the lock state. Returns whether the device was locked before.
    pub async fn press_power(&self) -> BridgeResult<bool> {
        let session_id = self.session_id()?;
        let locked: WdaValue<bool> = self
            .gateway
            .send(BackendRequest::get(format!("/session/{session_id}/wda/locked")))
            .await?
            .decode("wda/locked")?;
        let action = if locked.value { "unlock" } else { "lock" };
        self.gateway
            .send(BackendRequest::post_empty(format!(
                "/session/{session_id}/wda/{action}"
            )))
            .await?;
        Ok(locked.value)
    }

    /// Accessibility tree of the foreground app, verbatim.
    pub async fn get_tree_elements(&self) -> BridgeResult<Value> {
        self.gateway
            .send(BackendRequest::get("/source?format=json"))
            .await?
            .json("/source")
    }

    /// Click the first element whose label matches. Misses are only logged.
    pub async fn tap_device_tree_element(&self, label: &str) -> BridgeResult<()> {
        let session_id = self.session_id()?;
        match self.click_labelled(&session_id, label).await {
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                error!(error = %e, label, "Tapping tree element failed");
                Ok(())
            }
            Ok(()) => Ok(()),
        }
    }

    async fn click_labelled(&self, session_id: &str, label: &str) -> BridgeResult<()> {
        let found: WdaValue<Vec<ElementRef>> = self
            .gateway
            .send_tolerant(BackendRequest::post(
                format!("/session/{session_id}/elements"),
                json!({ "using": "link text", "value": format!("label={label}") }),
            ))
            .await?
            .decode("elements")?;
        let element = found
            .value
            .first()
            .and_then(ElementRef::id)
            .ok_or_else(|| BridgeError::ElementNotFound {
                label: label.to_string(),
            })?;

        self.gateway
            .send_tolerant(BackendRequest::post(
                format!("/session/{session_id}/element/{element}/click"),
                json!({}),
            ))
            .await?;
        Ok(())
    }

    /// Screenshot payload, verbatim.
    pub async fn screenshot(&self) -> BridgeResult<Value> {
        self.gateway
            .send(BackendRequest::get("/screenshot"))
            .await?
            .json("/screenshot")
    }
}
