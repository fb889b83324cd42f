//! Domain types for the transport-management API.
//!
//! Two families of shapes come back from the service: ABAP-serializer
//! payloads (`asx:abap`) with leaf fields as text-only child elements, used
//! by the transport check, and `tm:`/`chkrun:` attribute-based documents used
//! by the request/task hierarchy and release reports. The structs here are
//! the normalized forms of both; parsing lives in the parent module.

use serde::Serialize;

/// Message severity returned by the service, one letter per level.
///
/// Error, Abort, and eXception are fatal for a transport check; everything
/// else is informational. Codes outside the known alphabet map to `Unknown`
/// and are treated as non-fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Success,
    Info,
    Warning,
    Error,
    Abort,
    Exception,
    Unknown,
}

impl Severity {
    /// Parse a severity code (`"E"`, `"W"`, ...) as the service sends it.
    pub fn from_code(code: &str) -> Self {
        match code.trim().chars().next().map(|c| c.to_ascii_uppercase()) {
            Some('S') => Severity::Success,
            Some('I') => Severity::Info,
            Some('W') => Severity::Warning,
            Some('E') => Severity::Error,
            Some('A') => Severity::Abort,
            Some('X') => Severity::Exception,
            _ => Severity::Unknown,
        }
    }

    /// Whether a message of this severity makes a transport check fail.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Severity::Error | Severity::Abort | Severity::Exception)
    }
}

/// A structured message returned by the transport check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub severity: Severity,
    /// Language key (`SPRSL`)
    pub language: String,
    /// Message class (`ARBGB`)
    pub message_class: String,
    /// Message number within the class
    pub number: u32,
    /// Substitution variables in document order
    pub variables: Vec<String>,
    /// Rendered message text
    pub text: String,
}

impl Message {
    /// Delegates to [`Severity::is_fatal`]; `check` uses this to decide
    /// whether to fail the whole call.
    pub fn is_fatal(&self) -> bool {
        self.severity.is_fatal()
    }
}

/// Header identifying a transport request or task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportHeader {
    /// Transport number (`TRKORR`), e.g. `NPLK900042`
    pub number: String,
    /// Function code (`TRFUNCTION`)
    pub function: String,
    /// Status code (`TRSTATUS`)
    pub status: String,
    /// Target system (`TARSYSTEM`)
    pub target_system: String,
    /// Owning user (`AS4USER`)
    pub owner: String,
    /// Creation date (`AS4DATE`)
    pub date: String,
    /// Creation time (`AS4TIME`)
    pub time: String,
    /// Free-text description (`AS4TEXT`)
    pub description: String,
    /// Client id (`CLIENT`)
    pub client: String,
}

/// Key of the object a lock was checked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LockObjectKey {
    pub name: String,
    pub object_type: String,
    pub pgmid: String,
}

/// An existing lock on the checked object: the holding request plus the task
/// headers already recording it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportLock {
    pub header: TransportHeader,
    pub tasks: Vec<TransportHeader>,
    pub object_key: LockObjectKey,
}

/// Result of a transport check for one object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransportCheckResult {
    /// Package the object belongs to (`DEVCLASS`)
    pub dev_class: String,
    /// Suggested request description (`CTEXT`)
    pub text: String,
    /// Recording flag (`RECORDING`, `"X"` when changes are recorded)
    pub recording: String,
    /// Whether only existing requests may be used (`EXISTING_REQ_ONLY`)
    pub existing_request_only: String,
    /// Namespace of the object (`NAMESPACE`)
    pub namespace: String,
    /// Result code (`RESULT`)
    pub result: String,
    /// Non-fatal messages returned alongside the result
    pub messages: Vec<Message>,
    /// Present when the object is already locked by a request
    pub lock: Option<TransportLock>,
    /// Candidate requests the object could be recorded into
    pub transports: Vec<TransportHeader>,
}

/// An `atom:link` relation attached to a request or task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

/// An object recorded in a task (`tm:abap_object`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportObject {
    pub pgmid: String,
    pub object_type: String,
    pub name: String,
    pub info: String,
}

/// A task within a transport request, typically one per developer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportTask {
    pub number: String,
    pub owner: String,
    pub description: String,
    pub status: String,
    pub uri: String,
    pub links: Vec<Link>,
    pub objects: Vec<TransportObject>,
}

/// A transport request: task-shaped on the wire, plus its subordinate tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportRequest {
    /// The request's own header, links, and object list
    #[serde(flatten)]
    pub task: TransportTask,
    /// Subordinate tasks, each with a number distinct from the request's
    pub tasks: Vec<TransportTask>,
}

/// A target system owning modifiable and released requests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportTarget {
    pub name: String,
    pub description: String,
    pub modifiable: Vec<TransportRequest>,
    pub released: Vec<TransportRequest>,
}

/// All transports of one user, split by category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportsOfUser {
    pub workbench: Vec<TransportTarget>,
    pub customizing: Vec<TransportTarget>,
}

/// Outcome of one release check report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ReleaseStatus {
    Released,
    /// The release was aborted because a check failed (`abortrelapifail`)
    AbortRelApiFail,
    /// Any status string the service may add in the future
    Other(String),
}

impl ReleaseStatus {
    pub fn from_code(code: &str) -> Self {
        match code {
            "released" => ReleaseStatus::Released,
            "abortrelapifail" => ReleaseStatus::AbortRelApiFail,
            other => ReleaseStatus::Other(other.to_string()),
        }
    }
}

/// A message attached to a release report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseMessage {
    pub uri: String,
    pub severity: Severity,
    pub short_text: String,
}

/// One check report produced by a release action.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReleaseReport {
    pub reporter: String,
    pub triggering_uri: String,
    pub status: ReleaseStatus,
    pub status_text: String,
    pub messages: Vec<ReleaseMessage>,
}

/// Confirmation of an ownership change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportOwnerResponse {
    pub target_user: String,
    pub number: String,
}

/// Confirmation that a user was added to a transport as a new task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransportAddUserResponse {
    pub number: String,
    pub target_user: String,
    pub uri: String,
    pub action: String,
}

/// A user known to the system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemUser {
    pub id: String,
    pub title: String,
}
