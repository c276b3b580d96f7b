//! ---
//! ta_section: "02-data-model"
//! ta_subsection: "module"
//! ta_type: "source"
//! ta_scope: "code"
//! ta_description: "Enumerations exchanged at the remote-call boundary."
//! ta_version: "v0.1.0"
//! ta_owner: "tbd"
//! ---
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Logical driving-stack subsystem whose lifecycle is tracked independently.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ServiceKind {
    #[default]
    Unknown,
    Trajectory,
    Navigation,
    Inference,
}

impl ServiceKind {
    /// Kinds the store seeds with an explicit entry at construction.
    pub const TRACKED: [ServiceKind; 3] = [
        ServiceKind::Trajectory,
        ServiceKind::Navigation,
        ServiceKind::Inference,
    ];
}

/// Run state attached to each [`ServiceKind`].
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ServiceRunState {
    #[default]
    Unknown,
    Initializing,
    Running,
    Stopped,
    Error,
}

/// Vehicle-level autonomy mode. Exactly one value exists process-wide.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum IntegrationState {
    #[default]
    Unknown,
    Initializing,
    Idle,
    AvLimited,
    Av,
    Manual,
    RemoteControl,
    Error,
    Shutdown,
}

/// Severity tag carried by a trace event.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TraceSeverity {
    #[default]
    Unknown,
    Debug,
    Info,
    Error,
}

impl TraceSeverity {
    /// Values a generated event may carry.
    pub const EMITTED: [TraceSeverity; 3] = [
        TraceSeverity::Debug,
        TraceSeverity::Info,
        TraceSeverity::Error,
    ];
}

/// Kind of occurrence a trace event describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TraceEventType {
    #[default]
    Unknown,
    FunctionCall,
    LogMessage,
}

impl TraceEventType {
    /// Values a generated event may carry.
    pub const EMITTED: [TraceEventType; 2] =
        [TraceEventType::FunctionCall, TraceEventType::LogMessage];
}

bitflags! {
    /// Subsystems a trace event concerns.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TraceGroups: u32 {
        const TRAJECTORY = 1;
        const NAVIGATION = 2;
        const INFERENCE = 4;
        const SAFETY_CRITICAL = 8;
    }
}

impl TraceGroups {
    /// The four single-group masks generated events are drawn from.
    pub const SINGLE: [TraceGroups; 4] = [
        TraceGroups::TRAJECTORY,
        TraceGroups::NAVIGATION,
        TraceGroups::INFERENCE,
        TraceGroups::SAFETY_CRITICAL,
    ];

    /// True when exactly one group bit is set.
    pub fn is_single_group(&self) -> bool {
        self.bits().count_ones() == 1
    }
}
