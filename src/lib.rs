//! Client for the SAP ADT change and transport system (CTS) HTTP/XML API.
//!
//! This crate talks to the transport-management endpoints of an ABAP system:
//! checking whether an object can be recorded into a transport request,
//! creating requests, listing a user's requests and tasks, deleting,
//! releasing, reassigning ownership, and adding collaborators.
//!
//! The moving parts are a CSRF-aware HTTP session ([`AdtSession`]) that every
//! operation goes through, an XML normalizer ([`xml`]) that resolves the wire
//! format's single-vs-array ambiguity into ordered sequences, and the
//! protocol client ([`TransportClient`]) implementing the operations on top
//! of both. All state lives in memory for the lifetime of a client instance.
//!
//! # Example
//! ```ignore
//! let mut client = TransportClient::connect("http://vhcalnplci.local:8000", "DEVELOPER", "secret")?;
//! let transports = client.list_for_user("DEVELOPER", true).await?;
//! for target in &transports.workbench {
//!     println!("{}: {} modifiable", target.name, target.modifiable.len());
//! }
//! ```

pub mod error;
pub mod http;
pub mod session;
pub mod transport;
pub mod xml;

// Re-export commonly used types
pub use error::{AdtError, Result};
pub use http::{BasicAuth, HttpClient, HttpRequest, HttpResponse, MockHttpClient, ReqwestHttpClient};
pub use session::{AdtRequest, AdtSession, FETCH_CSRF_TOKEN};
pub use transport::{
    Message, ReleaseReport, ReleaseStatus, Severity, SystemUser, TransportCheckResult,
    TransportClient, TransportHeader, TransportLock, TransportRequest, TransportTarget,
    TransportTask, TransportsOfUser,
};
