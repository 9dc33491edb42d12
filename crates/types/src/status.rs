//! Pod lifecycle enums.
//!
//! `DesiredStatus` is the caller's intent, written only by the pod service.
//! `ActualStatus` is the reconciler's last observation, written only by the
//! reconciler. Keeping the two enums distinct makes that ownership split a
//! type-level fact instead of a convention.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when parsing a status string from the store fails.
#[derive(Debug, Error)]
#[error("unrecognized {kind} value: {value}")]
pub struct StatusParseError {
    pub kind: &'static str,
    pub value: String,
}

/// Caller intent for a pod's lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesiredStatus {
    Running,
    Stopped,
    Deleted,
}

impl DesiredStatus {
    pub const ALL: [DesiredStatus; 3] = [
        DesiredStatus::Running,
        DesiredStatus::Stopped,
        DesiredStatus::Deleted,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DesiredStatus::Running => "running",
            DesiredStatus::Stopped => "stopped",
            DesiredStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesiredStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(DesiredStatus::Running),
            "stopped" => Ok(DesiredStatus::Stopped),
            "deleted" => Ok(DesiredStatus::Deleted),
            other => Err(StatusParseError {
                kind: "desired_status",
                value: other.to_string(),
            }),
        }
    }
}

/// The reconciler's last observation of a pod's backing container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualStatus {
    Pending,
    Running,
    Stopped,
    Exited,
    Error,
    Unknown,
}

impl ActualStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActualStatus::Pending => "pending",
            ActualStatus::Running => "running",
            ActualStatus::Stopped => "stopped",
            ActualStatus::Exited => "exited",
            ActualStatus::Error => "error",
            ActualStatus::Unknown => "unknown",
        }
    }

    /// A pod is ready only while its container is observed running.
    pub fn is_ready(&self) -> bool {
        matches!(self, ActualStatus::Running)
    }
}

impl fmt::Display for ActualStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActualStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActualStatus::Pending),
            "running" => Ok(ActualStatus::Running),
            "stopped" => Ok(ActualStatus::Stopped),
            "exited" => Ok(ActualStatus::Exited),
            "error" => Ok(ActualStatus::Error),
            "unknown" => Ok(ActualStatus::Unknown),
            other => Err(StatusParseError {
                kind: "actual_status",
                value: other.to_string(),
            }),
        }
    }
}

/// Event types appended to the pod event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    Started,
    Stopped,
    Restarted,
    Deleted,
    Error,
    HealthCheckFailed,
    ConfigChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::Started => "started",
            EventType::Stopped => "stopped",
            EventType::Restarted => "restarted",
            EventType::Deleted => "deleted",
            EventType::Error => "error",
            EventType::HealthCheckFailed => "health_check_failed",
            EventType::ConfigChanged => "config_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(EventType::Created),
            "started" => Ok(EventType::Started),
            "stopped" => Ok(EventType::Stopped),
            "restarted" => Ok(EventType::Restarted),
            "deleted" => Ok(EventType::Deleted),
            "error" => Ok(EventType::Error),
            "health_check_failed" => Ok(EventType::HealthCheckFailed),
            "config_changed" => Ok(EventType::ConfigChanged),
            other => Err(StatusParseError {
                kind: "event_type",
                value: other.to_string(),
            }),
        }
    }
}
