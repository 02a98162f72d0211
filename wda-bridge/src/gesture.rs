//! Gesture composition from primitive touch events.
//!
//! | Inbound           | Condition                      | Backend call            |
//! |-------------------|--------------------------------|-------------------------|
//! | `tap`             | records the down point         | none                    |
//! | `swipe`           | marks the gesture as a move    | `wda/dragfromtoforduration` |
//! | `touch_up`        | no move, held ≤ 1000 ms        | `wda/tap/0`             |
//! | `touch_up`        | no move, held > 1000 ms        | `wda/touchAndHold`      |
//! | `double_click`    | no move                        | `wda/doubleTap`         |
//!
//! A new down-event replaces the previous one; there is no queue.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;
use tracing::debug;

use crate::error::BridgeResult;
use crate::gateway::BackendRequest;
use crate::geometry::{scale_swipe, DevicePoint, NormalizedPoint, SwipeParams};
use crate::session::SessionManager;

/// Holds longer than this become a touch-and-hold.
pub const LONG_PRESS_THRESHOLD: Duration = Duration::from_millis(1000);

/// Hold duration sent with a touch-and-hold, in seconds.
pub const TOUCH_AND_HOLD_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct GestureState {
    pub touch_down: NormalizedPoint,
    pub is_move: bool,
    pub down_at: Option<Instant>,
}

/// What a release turned into.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GestureAction {
    Tap(DevicePoint),
    TouchAndHold(DevicePoint),
    DoubleTap(DevicePoint),
}

pub struct GestureComposer {
    session: Arc<SessionManager>,
    state: Mutex<GestureState>,
}

impl GestureComposer {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            state: Mutex::new(GestureState::default()),
        }
    }

    pub fn state(&self) -> GestureState {
        *self.state.lock()
    }

    /// Touch down. No backend call until release.
    pub fn tap(&self, point: NormalizedPoint) {
        *self.state.lock() = GestureState {
            touch_down: point,
            is_move: false,
            down_at: Some(Instant::now()),
        };
    }

    pub async fn swipe(&self, params: SwipeParams) -> BridgeResult<()> {
        self.state.lock().is_move = true;
        let geometry = self.session.geometry()?;
        let scaled = scale_swipe(geometry.orientation, params, geometry.size);
        self.session
            .gateway()
            .send(BackendRequest::post(
                format!("/session/{}/wda/dragfromtoforduration", geometry.session_id),
                json!(scaled),
            ))
            .await?;
        Ok(())
    }

    /// Release. Returns `None` when the gesture was a swipe.
    pub async fn touch_up(&self) -> BridgeResult<Option<GestureAction>> {
        let GestureState {
            touch_down,
            is_move,
            down_at,
        } = self.state();
        if is_move {
            debug!("Touch up after swipe; nothing to send");
            return Ok(None);
        }

        let geometry = self.session.geometry()?;
        let at = touch_down.to_device(geometry.size);
        let held = down_at.map(|t| t.elapsed());
        let session_id = geometry.session_id;

        let (request, action) = match held {
            Some(held) if held > LONG_PRESS_THRESHOLD => (
                BackendRequest::post(
                    format!("/session/{session_id}/wda/touchAndHold"),
                    json!({ "x": at.x, "y": at.y, "duration": TOUCH_AND_HOLD_SECS }),
                ),
                GestureAction::TouchAndHold(at),
            ),
            _ => (
                BackendRequest::post(
                    format!("/session/{session_id}/wda/tap/0"),
                    json!({ "x": at.x, "y": at.y }),
                ),
                GestureAction::Tap(at),
            ),
        };
        self.session.gateway().send(request).await?;
        Ok(Some(action))
    }

    pub async fn double_click(&self) -> BridgeResult<Option<GestureAction>> {
        let GestureState {
            touch_down,
            is_move,
            ..
        } = self.state();
        if is_move {
            return Ok(None);
        }

        let geometry = self.session.geometry()?;
        let at = touch_down.to_device(geometry.size);
        self.session
            .gateway()
            .send(BackendRequest::post(
                format!("/session/{}/wda/doubleTap", geometry.session_id),
                json!({ "x": at.x, "y": at.y }),
            ))
            .await?;
        Ok(Some(GestureAction::DoubleTap(at)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::gateway::Method;
    use crate::geometry::Orientation;
    use crate::test_support::{Harness, ScriptedTransport};

    async fn composer(harness: &Harness) -> GestureComposer {
        let t = &harness.transport;
        t.respond(Method::Get, "/status", r#"{"value":{},"sessionId":"S1"}"#);
        t.respond(
            Method::Get,
            "/session/S1/window/size",
            r#"{"value":{"width":375,"height":812}}"#,
        );
        t.respond(Method::Get, "/session/S1/wda/screen", r#"{"value":{"scale":3}}"#);

        let session = SessionManager::new("udid-1", harness.gateway.clone(), harness.sink.clone());
        session.start_session().await.unwrap();
        GestureComposer::new(session.shared())
    }

    /// Test: quick release becomes a tap at scaled coordinates.
    #[tokio::test(start_paused = true)]
    async fn quick_release_taps() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;

        gestures.tap(NormalizedPoint::new(0.5, 0.25));
        tokio::time::advance(Duration::from_millis(200)).await;
        let action = gestures.touch_up().await.unwrap();

        let at = DevicePoint { x: 187.5, y: 203.0 };
        assert_eq!(action, Some(GestureAction::Tap(at)));
        assert_eq!(
            harness.transport.last_body(Method::Post, "/session/S1/wda/tap/0"),
            Some(json!({ "x": 187.5, "y": 203.0 }))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn release_at_threshold_is_still_a_tap() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;

        gestures.tap(NormalizedPoint::new(0.1, 0.1));
        tokio::time::advance(LONG_PRESS_THRESHOLD).await;

        assert!(matches!(
            gestures.touch_up().await.unwrap(),
            Some(GestureAction::Tap(_))
        ));
    }

    /// Test: holding past one second becomes touch-and-hold with duration 1.
    #[tokio::test(start_paused = true)]
    async fn long_hold_becomes_touch_and_hold() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;

        gestures.tap(NormalizedPoint::new(0.5, 0.5));
        tokio::time::advance(Duration::from_millis(1500)).await;
        let action = gestures.touch_up().await.unwrap();

        assert!(matches!(action, Some(GestureAction::TouchAndHold(_))));
        let body = harness
            .transport
            .last_body(Method::Post, "/session/S1/wda/touchAndHold")
            .unwrap();
        assert_eq!(body["duration"], 1.0);
        assert_eq!(body["x"], 187.5);
        assert_eq!(harness.transport.count(Method::Post, "/session/S1/wda/tap/0"), 0);
    }

    #[tokio::test]
    async fn release_without_down_is_a_tap() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;

        assert!(matches!(
            gestures.touch_up().await.unwrap(),
            Some(GestureAction::Tap(DevicePoint { x, y })) if x == 0.0 && y == 0.0
        ));
    }

    /// Test: a swipe suppresses the tap on release.
    #[tokio::test]
    async fn swipe_then_release_sends_no_tap() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;

        gestures.tap(NormalizedPoint::new(0.2, 0.2));
        gestures
            .swipe(SwipeParams {
                from_x: 0.2,
                from_y: 0.2,
                to_x: 0.8,
                to_y: 0.2,
                duration: Some(0.1),
            })
            .await
            .unwrap();
        let action = gestures.touch_up().await.unwrap();

        assert_eq!(action, None);
        assert_eq!(harness.transport.count(Method::Post, "/session/S1/wda/tap/0"), 0);
        assert_eq!(
            harness
                .transport
                .last_body(Method::Post, "/session/S1/wda/dragfromtoforduration"),
            Some(json!({
                "fromX": 75.0, "fromY": 162.4, "toX": 300.0, "toY": 162.4, "duration": 0.1
            }))
        );
        assert_eq!(gestures.double_click().await.unwrap(), None);
    }

    #[tokio::test]
    async fn double_click_uses_last_down_point() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;

        gestures.tap(NormalizedPoint::new(0.5, 0.25));
        let action = gestures.double_click().await.unwrap();

        assert_eq!(
            action,
            Some(GestureAction::DoubleTap(DevicePoint { x: 187.5, y: 203.0 }))
        );
        assert_eq!(
            harness.transport.count(Method::Post, "/session/S1/wda/doubleTap"),
            1
        );
    }

    #[tokio::test]
    async fn taps_ignore_rotation() {
        let harness = Harness::new(ScriptedTransport::new());
        let gestures = composer(&harness).await;
        gestures
            .session
            .rotation(Orientation::Landscape)
            .await
            .unwrap();

        gestures.tap(NormalizedPoint::new(0.5, 0.25));
        let action = gestures.touch_up().await.unwrap();
        assert_eq!(
            action,
            Some(GestureAction::Tap(DevicePoint { x: 187.5, y: 203.0 }))
        );

        let action = gestures.double_click().await.unwrap();
        assert_eq!(
            action,
            Some(GestureAction::DoubleTap(DevicePoint { x: 187.5, y: 203.0 }))
        );
        assert_eq!(
            harness.transport.last_body(Method::Post, "/session/S1/wda/doubleTap"),
            Some(json!({ "x": 187.5, "y": 203.0 }))
        );
    }

    #[tokio::test]
    async fn gestures_without_session_are_dropped() {
        let harness = Harness::new(ScriptedTransport::new());
        let session = SessionManager::new("udid-1", harness.gateway.clone(), harness.sink.clone());
        let gestures = GestureComposer::new(session.shared());

        gestures.tap(NormalizedPoint::new(0.5, 0.5));
        let err = gestures.touch_up().await.unwrap_err();

        assert!(matches!(err, BridgeError::NoSession));
        assert!(harness.transport.requests().is_empty());
        assert_eq!(harness.lifecycle.fatal_count(), 0);
    }
}
