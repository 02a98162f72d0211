//! WDA device-unit bridge
//!
//! This library drives an iOS device through WebDriverAgent and keeps the
//! unit honest about device health:
//! - `gateway`: every backend request, with fatal escalation on transport failure
//! - `session`: session start/reuse/stop and the automation command surface
//! - `gesture`: tap / long-press / double-tap composition from down/up events
//! - `watchdog`: liveness of the MJPEG socket with bounded reconnect
//! - `devicelog`: device log capture subprocess tied to group membership
//! - `escalation`: the single choke point for unrecoverable faults
//!
//! # Wiring
//!
//! ```text
//! router ──▶ SessionManager ──┐
//!        ──▶ GestureComposer ─┼─▶ Gateway ──▶ WDA (HTTP)
//!                             │      │
//! Watchdog ──▶ WDA (MJPEG)    │      ▼
//!      └──────────────────────┴─▶ EscalationPolicy ─▶ Notifier, Lifecycle
//!
//! group events ──▶ LogCaptureManager ──▶ log process ──▶ FactSink
//! ```
//!
//! The bus, group bookkeeping, notifier and lifecycle are consumed through
//! the traits in [`ports`].

pub mod config;
pub mod devicelog;
pub mod error;
pub mod escalation;
pub mod facts;
pub mod gateway;
pub mod geometry;
pub mod gesture;
pub mod ports;
pub mod schema;
pub mod session;
pub mod watchdog;

#[cfg(test)]
mod test_support;

pub use config::BridgeConfig;
pub use devicelog::{DeviceContext, LogCaptureManager};
pub use error::{BridgeError, BridgeResult, FatalReason, TransportError};
pub use escalation::{EscalationPolicy, SharedEscalation};
pub use facts::{Destination, Fact};
pub use gateway::{Gateway, HttpTransport, Transport};
pub use geometry::{NormalizedPoint, Orientation, SwipeParams};
pub use gesture::{GestureAction, GestureComposer};
pub use session::SessionManager;
pub use watchdog::{TcpConnector, Watchdog, WatchdogHandle};
