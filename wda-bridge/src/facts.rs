//! Facts the bridge publishes outward.
//!
//! Field order of every fact struct is part of the wire contract and must
//! not be rearranged.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Category tag attached to every captured log line.
pub const LOG_CATEGORY: &str = "device:log:cat";

/// Where a fact is published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "name")]
pub enum Destination {
    /// Cluster-wide channel (capabilities, battery, size, presence).
    Global,
    /// A specific channel: a group channel or a reply channel.
    Channel(String),
}

impl Destination {
    pub fn channel(name: impl Into<String>) -> Self {
        Self::Channel(name.into())
    }
}

/// Battery charging status as reported to the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatteryStatus {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "charging")]
    Charging,
    #[serde(rename = "-")]
    Unknown,
}

impl BatteryStatus {
    /// Map a UIDevice battery state code.
    pub fn from_state(state: i64) -> Self {
        match state {
            3 => Self::Full,
            2 => Self::Charging,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFact {
    pub serial: String,
    pub os_name: String,
    pub sdk_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryFact {
    pub serial: String,
    pub health: String,
    pub source: String,
    pub status: BatteryStatus,
    pub level_percent: u32,
    pub temperature: String,
    pub voltage: u32,
}

impl BatteryFact {
    /// Build from a raw battery reading (`level` in `0.0..=1.0`).
    pub fn from_reading(serial: &str, level: f64, state: i64) -> Self {
        let level_percent = (level * 100.0).floor().clamp(0.0, 100.0) as u32;
        Self {
            serial: serial.to_string(),
            health: "good".to_string(),
            source: "usb".to_string(),
            status: BatteryStatus::from_state(state),
            level_percent,
            temperature: "n/a".to_string(),
            voltage: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeFact {
    pub serial: String,
    pub height_px: u32,
    pub width_px: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntryFact {
    pub serial: String,
    pub timestamp_seconds: f64,
    pub stream_id: u32,
    pub line_id: u32,
    pub level: u8,
    pub category: String,
    pub text: String,
}

impl LogEntryFact {
    /// A log line captured now from process `pid`.
    pub fn captured(serial: &str, pid: u32, text: String) -> Self {
        Self {
            serial: serial.to_string(),
            timestamp_seconds: Utc::now().timestamp_millis() as f64 / 1000.0,
            stream_id: pid,
            line_id: pid,
            level: 1,
            category: LOG_CATEGORY.to_string(),
            text,
        }
    }
}

/// Reply to an inbound command, sent on the requester's channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyFact {
    pub serial: String,
    pub success: bool,
    pub body: String,
}

impl ReplyFact {
    pub fn okay(serial: &str, body: impl Into<String>) -> Self {
        Self {
            serial: serial.to_string(),
            success: true,
            body: body.into(),
        }
    }
}

/// Device presence as seen by this unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    TemporarilyUnavailable,
    Absent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceFact {
    pub serial: String,
    pub presence: Presence,
    pub reason: String,
}

/// Everything the bridge publishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Fact {
    SdkIosVersion(CapabilityFact),
    BatteryIosEvent(BatteryFact),
    SizeIosDevice(SizeFact),
    DeviceLogcatEntry(LogEntryFact),
    Reply(ReplyFact),
    DevicePresence(PresenceFact),
}

impl Fact {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SdkIosVersion(_) => "SdkIosVersion",
            Self::BatteryIosEvent(_) => "BatteryIosEvent",
            Self::SizeIosDevice(_) => "SizeIosDevice",
            Self::DeviceLogcatEntry(_) => "DeviceLogcatEntry",
            Self::Reply(_) => "Reply",
            Self::DevicePresence(_) => "DevicePresence",
        }
    }
}
