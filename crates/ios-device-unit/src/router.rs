//! Inbound message router
//!
//! Reads one JSON message per line and dispatches it to the bridge:
//!
//! ```text
//! {"type":"Tap","channel":"tx-1","x":0.5,"y":0.5}
//! {"type":"TouchUp","channel":"tx-1"}
//! {"type":"LogcatStart","channel":"tx-2","device":{"bundleName":"com.example.App"}}
//! ```
//!
//! Replies go to the message's channel. Commands that hit a fatal path never
//! get a reply; local failures are logged and dropped.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, error, warn};
use wda_bridge::devicelog::DeviceContext;
use wda_bridge::facts::{Destination, Fact, ReplyFact};
use wda_bridge::ports::{FactSink, GroupInfo};
use wda_bridge::{
    BridgeResult, GestureComposer, LogCaptureManager, NormalizedPoint, Orientation,
    SessionManager, SwipeParams,
};

use crate::group::SharedGroup;

/// Commands understood by the unit.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum Command {
    // ── Log capture and group ──
    LogcatStart {
        #[serde(default)]
        device: Option<DeviceContext>,
    },
    LogcatStop,
    GroupChange,
    GroupJoin {
        group: String,
        #[serde(default)]
        owner: Option<String>,
    },
    GroupLeave,

    // ── Session ──
    StartSession,
    StopSession,
    Size,

    // ── Automation ──
    TypeKey {
        text: String,
    },
    HomeButton,
    Rotation {
        orientation: Orientation,
    },
    OpenUrl {
        url: String,
    },
    PressButton {
        name: String,
    },
    AppActivate {
        #[serde(rename = "bundleId")]
        bundle_id: String,
    },
    PressPower,
    GetTreeElements,
    TapDeviceTreeElement {
        label: String,
    },
    Screenshot,

    // ── Gestures ──
    Tap {
        x: f64,
        y: f64,
    },
    Swipe(SwipeParams),
    TouchUp,
    DoubleClick,
}

/// A command plus the channel replies go to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Message {
    pub channel: String,
    #[serde(flatten)]
    pub command: Command,
}

pub struct Router {
    serial: String,
    session: Arc<SessionManager>,
    gestures: GestureComposer,
    logs: LogCaptureManager,
    group: SharedGroup,
    sink: Arc<dyn FactSink>,
}

impl Router {
    pub fn new(
        session: Arc<SessionManager>,
        logs: LogCaptureManager,
        group: SharedGroup,
        sink: Arc<dyn FactSink>,
    ) -> Self {
        Self {
            serial: session.serial().to_string(),
            gestures: GestureComposer::new(session.clone()),
            session,
            logs,
            group,
            sink,
        }
    }

    /// Serve messages until the input closes.
    pub async fn serve<R: AsyncBufRead + Unpin>(&self, input: R) -> Result<()> {
        let mut lines = input.lines();
        while let Some(line) = lines
            .next_line()
            .await
            .context("Failed to read inbound message")?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Message>(line) {
                Ok(message) => self.handle(message).await,
                Err(e) => warn!("Ignoring malformed inbound message: {e}"),
            }
        }
        Ok(())
    }

    pub async fn handle(&self, message: Message) {
        let Message { channel, command } = message;
        debug!(%channel, ?command, "Inbound message");
        match self.dispatch(&channel, command).await {
            Ok(Some(body)) => self.sink.send(
                Destination::channel(channel),
                Fact::Reply(ReplyFact::okay(&self.serial, body)),
            ),
            Ok(None) => {}
            Err(e) if e.is_fatal() => error!(%channel, "Command aborted: {e}"),
            Err(e) => warn!(%channel, "Command failed: {e}"),
        }
    }

    /// Run one command. `Some(body)` is sent back as a reply.
    async fn dispatch(&self, channel: &str, command: Command) -> BridgeResult<Option<String>> {
        match command {
            Command::LogcatStart { device } => {
                self.logs.start(channel, device).await?;
                return Ok(Some("success".into()));
            }
            Command::LogcatStop => self.logs.stop().await,
            Command::GroupChange => self.logs.set_channel(channel),
            Command::GroupJoin { group, owner } => self.group.join(GroupInfo { group, owner }),
            Command::GroupLeave => {
                self.group.leave();
            }

            Command::StartSession => {
                let size = self.session.start_session().await?;
                return Ok(Some(format!("{}x{}", size.width, size.height)));
            }
            Command::StopSession => self.session.stop_session().await?,
            Command::Size => {
                let size = self.session.size().await?;
                return Ok(Some(format!("{}x{}", size.width, size.height)));
            }

            Command::TypeKey { text } => self.session.type_key(&text).await?,
            Command::HomeButton => self.session.home_btn().await?,
            Command::Rotation { orientation } => self.session.rotation(orientation).await?,
            Command::OpenUrl { url } => self.session.open_url(&url).await?,
            Command::PressButton { name } => self.session.press_button(&name).await?,
            Command::AppActivate { bundle_id } => self.session.app_activate(&bundle_id).await?,
            Command::PressPower => {
                self.session.press_power().await?;
            }
            Command::GetTreeElements => {
                let tree = self.session.get_tree_elements().await?;
                return Ok(Some(tree.to_string()));
            }
            Command::TapDeviceTreeElement { label } => {
                self.session.tap_device_tree_element(&label).await?
            }
            Command::Screenshot => {
                let shot = self.session.screenshot().await?;
                return Ok(Some(shot.to_string()));
            }

            Command::Tap { x, y } => self.gestures.tap(NormalizedPoint::new(x, y)),
            Command::Swipe(params) => self.gestures.swipe(params).await?,
            Command::TouchUp => {
                self.gestures.touch_up().await?;
            }
            Command::DoubleClick => {
                self.gestures.double_click().await?;
            }
        }
        Ok(None)
    }
}
