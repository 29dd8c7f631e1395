use serde::{Deserialize, Serialize};

use super::object_reference::ObjectReference;
use super::{Metadata, Object};

/// A core Event as emitted by the api-server: a single observation about
/// another object, such as a failed pod creation due to quota exhaustion.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub metadata: Metadata,
    pub involved_object: ObjectReference,
    pub reason: String,
    #[serde(rename = "type")]
    pub type_: EventType,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub reporting_controller: String,
}

impl Object for Event {
    fn kind(&self) -> &'static str {
        "Event"
    }

    fn name(&self) -> &String {
        &self.metadata.name
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

/// Reasons the attribution subsystem reacts to. Anything else is ignored.
pub const REASON_FAILED_CREATE: &str = "FailedCreate";
pub const REASON_PRESENT_ERROR: &str = "PresentError";
