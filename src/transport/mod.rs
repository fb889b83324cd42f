//! Transport-management operations against the ADT CTS endpoints.
//!
//! Each operation validates its inputs, issues exactly one exchange through
//! the session, and parses the response with the XML normalizer. Operations
//! are independent of each other; the only shared state is the session's
//! token and cookie. There is no retry anywhere in this module: re-running a
//! failed release with a stronger flag is a caller decision, because a
//! failing release can have side effects (triggered ATC runs) that must not
//! be repeated silently.

mod types;

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{AdtError, Result};
use crate::http::{HttpClient, ReqwestHttpClient};
use crate::session::{AdtRequest, AdtSession};
use crate::xml::{self, XmlNode};

pub use types::{
    Link, LockObjectKey, Message, ReleaseMessage, ReleaseReport, ReleaseStatus, Severity,
    SystemUser, TransportAddUserResponse, TransportCheckResult, TransportHeader, TransportLock,
    TransportObject, TransportOwnerResponse, TransportRequest, TransportTarget, TransportTask,
    TransportsOfUser,
};

const ADT_ROOT: &str = "/sap/bc/adt";
const CHECK_CONTENT_TYPE: &str =
    "application/vnd.sap.as+xml; charset=UTF-8; dataname=com.sap.adt.transport.service.checkData";
const CREATE_CONTENT_TYPE: &str =
    "application/vnd.sap.as+xml; charset=UTF-8; dataname=com.sap.adt.CreateCorrectionRequest";

/// Client for the change and transport system API.
///
/// Wraps one [`AdtSession`]; all methods take `&mut self` because every
/// exchange may update the session's CSRF token and cookie.
pub struct TransportClient<C: HttpClient = ReqwestHttpClient> {
    session: AdtSession<C>,
}

impl TransportClient<ReqwestHttpClient> {
    /// Connect to a system with the default reqwest-backed HTTP client.
    pub fn connect(
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self::new(AdtSession::new(
            ReqwestHttpClient::new(),
            base_url,
            username,
            password,
        )?))
    }
}

impl<C: HttpClient> TransportClient<C> {
    pub fn new(session: AdtSession<C>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &AdtSession<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut AdtSession<C> {
        &mut self.session
    }

    /// Check whether an object can be recorded into a transport request.
    ///
    /// `dev_class` may be empty when the package is not known yet; the usual
    /// `operation` is `"I"` (insert). Warning and Info messages come back as
    /// data; any Error/Abort/eXception message fails the call with
    /// [`AdtError::ServiceRejected`] carrying that message's text, and no
    /// partial result is returned.
    ///
    /// A missing or malformed lock block parses to `lock: None`. That
    /// deliberately conflates "not locked" with "lock substructure we could
    /// not read"; changing it would change client-visible semantics.
    pub async fn check(
        &mut self,
        object_uri: &str,
        dev_class: &str,
        operation: &str,
    ) -> Result<TransportCheckResult> {
        validate_object_uri(object_uri)?;
        let body = abap_values_xml(&[
            ("DEVCLASS", dev_class),
            ("OPERATION", operation),
            ("URI", object_uri),
        ]);
        let response = self
            .session
            .exchange(
                AdtRequest::post(format!("{ADT_ROOT}/cts/transportchecks"))
                    .header("Accept", CHECK_CONTENT_TYPE)
                    .header("Content-Type", CHECK_CONTENT_TYPE)
                    .body(body),
            )
            .await?;

        let doc = xml::parse(&response.body)?;
        let data = xml::xml_node(&doc, &["asx:abap", "asx:values", "DATA"])?;

        let messages = parse_messages(data);
        if let Some(fatal) = messages.iter().find(|m| m.is_fatal()) {
            tracing::debug!(text = %fatal.text, "Transport check rejected by service");
            return Err(AdtError::ServiceRejected(fatal.text.clone()));
        }

        Ok(TransportCheckResult {
            dev_class: data.child_text("DEVCLASS").to_string(),
            text: data.child_text("CTEXT").to_string(),
            recording: data.child_text("RECORDING").to_string(),
            existing_request_only: data.child_text("EXISTING_REQ_ONLY").to_string(),
            namespace: data.child_text("NAMESPACE").to_string(),
            result: data.child_text("RESULT").to_string(),
            messages,
            lock: extract_lock(data),
            transports: xml::xml_array(data, &["REQUESTS", "CTS_REQUEST"])
                .into_iter()
                .filter_map(|r| r.first_child("REQ_HEADER"))
                .map(parse_header)
                .collect(),
        })
    }

    /// Create a transport request and return its number.
    ///
    /// The service answers with a plain-text resource URI; the number is its
    /// final path segment.
    pub async fn create(
        &mut self,
        reference_uri: &str,
        request_text: &str,
        dev_class: &str,
        operation: &str,
    ) -> Result<String> {
        validate_object_uri(reference_uri)?;
        let body = abap_values_xml(&[
            ("DEVCLASS", dev_class),
            ("REQUEST_TEXT", request_text),
            ("REF", reference_uri),
            ("OPERATION", operation),
        ]);
        let response = self
            .session
            .exchange(
                AdtRequest::post(format!("{ADT_ROOT}/cts/transports"))
                    .header("Accept", "text/plain")
                    .header("Content-Type", CREATE_CONTENT_TYPE)
                    .body(body),
            )
            .await?;

        let number = response
            .body
            .trim()
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        tracing::debug!(number = %number, "Created transport request");
        Ok(number)
    }

    /// List a user's transport requests, grouped into workbench and
    /// customizing targets.
    pub async fn list_for_user(&mut self, user: &str, targets: bool) -> Result<TransportsOfUser> {
        if user.trim().is_empty() {
            return Err(AdtError::InvalidReference("user id is empty".to_string()));
        }
        let response = self
            .session
            .exchange(
                AdtRequest::get(format!("{ADT_ROOT}/cts/transportrequests"))
                    .query("user", user)
                    .query("targets", if targets { "true" } else { "false" }),
            )
            .await?;

        let doc = xml::parse(&response.body)?;
        Ok(TransportsOfUser {
            workbench: xml::xml_array(&doc, &["tm:root", "tm:workbench", "tm:target"])
                .into_iter()
                .map(parse_target)
                .collect(),
            customizing: xml::xml_array(&doc, &["tm:root", "tm:customizing", "tm:target"])
                .into_iter()
                .map(parse_target)
                .collect(),
        })
    }

    /// Delete a modifiable transport request.
    pub async fn delete(&mut self, transport_number: &str) -> Result<()> {
        validate_transport_number(transport_number)?;
        self.session
            .exchange(
                AdtRequest::delete(format!("{ADT_ROOT}/cts/transportrequests/{transport_number}"))
                    .header("Accept", "application/*"),
            )
            .await?;
        Ok(())
    }

    /// Release a transport request.
    ///
    /// Exactly one release action is issued per call, selected by precedence:
    /// `ignore_atc_findings` wins over `ignore_locks`, which wins over the
    /// normal release. Escalating to a stronger action after a failed report
    /// is the caller's decision; this method never retries.
    pub async fn release(
        &mut self,
        transport_number: &str,
        ignore_locks: bool,
        ignore_atc_findings: bool,
    ) -> Result<Vec<ReleaseReport>> {
        validate_transport_number(transport_number)?;
        let action = if ignore_atc_findings {
            "relObjigchkatc"
        } else if ignore_locks {
            "relwithignlock"
        } else {
            "newreleasejobs"
        };
        tracing::debug!(number = %transport_number, action, "Releasing transport");
        let response = self
            .session
            .exchange(
                AdtRequest::post(format!(
                    "{ADT_ROOT}/cts/transportrequests/{transport_number}/{action}"
                ))
                .header("Accept", "application/*"),
            )
            .await?;

        let doc = xml::parse(&response.body)?;
        let reports = xml::xml_array(&doc, &["tm:root", "tm:releasereports", "chkrun:checkReport"])
            .into_iter()
            .map(|report| {
                let attrs = xml::xml_attrs(report);
                ReleaseReport {
                    reporter: attr(&attrs, "chkrun:reporter"),
                    triggering_uri: attr(&attrs, "chkrun:triggeringUri"),
                    status: ReleaseStatus::from_code(&attr(&attrs, "chkrun:status")),
                    status_text: attr(&attrs, "chkrun:statusText"),
                    messages: xml::xml_array(
                        report,
                        &["chkrun:checkMessageList", "chkrun:checkMessage"],
                    )
                    .into_iter()
                    .map(|message| {
                        let attrs = xml::xml_attrs(message);
                        ReleaseMessage {
                            uri: attr(&attrs, "chkrun:uri"),
                            severity: Severity::from_code(&attr(&attrs, "chkrun:type")),
                            short_text: attr(&attrs, "chkrun:shortText"),
                        }
                    })
                    .collect(),
                }
            })
            .collect();
        Ok(reports)
    }

    /// Change the owner of a transport request.
    pub async fn set_owner(
        &mut self,
        transport_number: &str,
        target_user: &str,
    ) -> Result<TransportOwnerResponse> {
        validate_transport_number(transport_number)?;
        let response = self
            .session
            .exchange(
                AdtRequest::put(format!("{ADT_ROOT}/cts/transportrequests/{transport_number}"))
                    .header("Accept", "application/*")
                    .query("targetuser", target_user),
            )
            .await?;

        let doc = xml::parse(&response.body)?;
        let attrs = xml::xml_attrs(xml::xml_node(&doc, &["tm:root"])?);
        Ok(TransportOwnerResponse {
            target_user: attr(&attrs, "tm:targetuser"),
            number: attr(&attrs, "tm:number"),
        })
    }

    /// Add a user to a transport request as a new task.
    ///
    /// The body is a small literal document, not built through the
    /// normalizer; that layer only handles the server-to-client direction.
    pub async fn add_user(
        &mut self,
        transport_number: &str,
        user: &str,
    ) -> Result<TransportAddUserResponse> {
        validate_transport_number(transport_number)?;
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"ASCII\"?>\n\
             <tm:root xmlns:tm=\"http://www.sap.com/cts/adt/tm\" tm:number=\"{}\" \
             tm:targetuser=\"{}\" tm:useraction=\"newtask\"/>",
            xml_escape(transport_number),
            xml_escape(user)
        );
        let response = self
            .session
            .exchange(
                AdtRequest::post(format!(
                    "{ADT_ROOT}/cts/transportrequests/{transport_number}/tasks"
                ))
                .header("Accept", "application/*")
                .header("Content-Type", "text/plain")
                .body(body),
            )
            .await?;

        let doc = xml::parse(&response.body)?;
        let attrs = xml::xml_attrs(xml::xml_node(&doc, &["tm:root"])?);
        Ok(TransportAddUserResponse {
            number: attr(&attrs, "tm:number"),
            target_user: attr(&attrs, "tm:targetuser"),
            uri: attr(&attrs, "tm:uri"),
            action: attr(&attrs, "tm:useraction"),
        })
    }

    /// List the users known to the system.
    pub async fn system_users(&mut self) -> Result<Vec<SystemUser>> {
        let response = self
            .session
            .exchange(
                AdtRequest::get(format!("{ADT_ROOT}/system/users"))
                    .header("Accept", "application/*"),
            )
            .await?;

        let doc = xml::parse(&response.body)?;
        Ok(xml::xml_array(&doc, &["atom:feed", "atom:entry"])
            .into_iter()
            .map(|entry| SystemUser {
                id: entry.child_text("atom:id").to_string(),
                title: entry.child_text("atom:title").to_string(),
            })
            .collect())
    }
}

// ============================================================================
// Input validation
// ============================================================================

/// Transport numbers look like `NPLK900042`: 10 characters, a letter, two
/// word characters, then `k`/`K`.
fn validate_transport_number(number: &str) -> Result<()> {
    let b = number.as_bytes();
    let valid = b.len() == 10
        && b[0].is_ascii_alphabetic()
        && is_word(b[1])
        && is_word(b[2])
        && b[3].eq_ignore_ascii_case(&b'k');
    if valid {
        Ok(())
    } else {
        Err(AdtError::InvalidReference(format!(
            "Invalid transport number: {number}"
        )))
    }
}

fn is_word(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'_'
}

/// Object references must be ADT-relative URIs.
fn validate_object_uri(uri: &str) -> Result<()> {
    if uri.starts_with("/sap/bc/adt/") {
        Ok(())
    } else {
        Err(AdtError::InvalidReference(format!("Invalid object URL: {uri}")))
    }
}

// ============================================================================
// Response parsing helpers
// ============================================================================

fn attr(attrs: &HashMap<String, String>, key: &str) -> String {
    attrs.get(key).cloned().unwrap_or_default()
}

fn parse_header(node: &XmlNode) -> TransportHeader {
    TransportHeader {
        number: node.child_text("TRKORR").to_string(),
        function: node.child_text("TRFUNCTION").to_string(),
        status: node.child_text("TRSTATUS").to_string(),
        target_system: node.child_text("TARSYSTEM").to_string(),
        owner: node.child_text("AS4USER").to_string(),
        date: node.child_text("AS4DATE").to_string(),
        time: node.child_text("AS4TIME").to_string(),
        description: node.child_text("AS4TEXT").to_string(),
        client: node.child_text("CLIENT").to_string(),
    }
}

fn parse_messages(data: &XmlNode) -> Vec<Message> {
    xml::xml_array(data, &["MESSAGES", "CTS_MESSAGE"])
        .into_iter()
        .map(|m| Message {
            severity: Severity::from_code(m.child_text("SEVERITY")),
            language: m.child_text("SPRSL").to_string(),
            message_class: m.child_text("ARBGB").to_string(),
            number: {
                let raw = m.child_text("MSGNR").trim();
                raw.parse().unwrap_or_else(|_| {
                    tracing::debug!(msgnr = raw, "Message number is not numeric, keeping 0");
                    0
                })
            },
            variables: xml::xml_array(m, &["VARIABLES", "CTS_VARIABLE"])
                .into_iter()
                .map(|v| v.child_text("VARIABLE").to_string())
                .collect(),
            text: m.child_text("TEXT").to_string(),
        })
        .collect()
}

/// Extract the lock block of a check response.
///
/// Any failure to navigate the lock substructure yields `None`. This is
/// documented policy, not an oversight: a malformed lock block is reported
/// as "not locked" so that the conflation stays stable for callers.
fn extract_lock(data: &XmlNode) -> Option<TransportLock> {
    let lock = xml::xml_node(data, &["LOCKS", "CTS_OBJECT_LOCK"]).ok()?;
    let holder = xml::xml_node(lock, &["LOCK_HOLDER"]).ok()?;
    let header = parse_header(xml::xml_node(holder, &["REQ_HEADER"]).ok()?);
    // TASK_HEADERS is a serializer table: one wrapper, one row per task.
    let tasks = xml::xml_array(holder, &["TASK_HEADERS"])
        .into_iter()
        .flat_map(|t| xml::xml_array(t, &["CTS_TASK_HEADER"]))
        .map(parse_header)
        .collect();
    let key = xml::xml_node(lock, &["OBJECT_KEY"]).ok()?;
    Some(TransportLock {
        header,
        tasks,
        object_key: LockObjectKey {
            name: key.child_text("OBJ_NAME").to_string(),
            object_type: key.child_text("OBJECT").to_string(),
            pgmid: key.child_text("PGMID").to_string(),
        },
    })
}

fn parse_link(node: &XmlNode) -> Link {
    let attrs = xml::xml_attrs(node);
    Link {
        href: attr(&attrs, "href"),
        rel: attr(&attrs, "rel"),
        link_type: attr(&attrs, "type"),
    }
}

fn parse_object(node: &XmlNode) -> TransportObject {
    let attrs = xml::xml_attrs(node);
    TransportObject {
        pgmid: attr(&attrs, "tm:pgmid"),
        object_type: attr(&attrs, "tm:type"),
        name: attr(&attrs, "tm:name"),
        info: attr(&attrs, "tm:obj_info"),
    }
}

fn parse_task(node: &XmlNode) -> TransportTask {
    let attrs = xml::xml_attrs(node);
    TransportTask {
        number: attr(&attrs, "tm:number"),
        owner: attr(&attrs, "tm:owner"),
        description: attr(&attrs, "tm:desc"),
        status: attr(&attrs, "tm:status"),
        uri: attr(&attrs, "tm:uri"),
        links: xml::xml_array(node, &["atom:link"])
            .into_iter()
            .map(parse_link)
            .collect(),
        objects: xml::xml_array(node, &["tm:abap_object"])
            .into_iter()
            .map(parse_object)
            .collect(),
    }
}

fn parse_request(node: &XmlNode) -> TransportRequest {
    TransportRequest {
        task: parse_task(node),
        tasks: xml::xml_array(node, &["tm:task"])
            .into_iter()
            .map(parse_task)
            .collect(),
    }
}

fn parse_target(node: &XmlNode) -> TransportTarget {
    let attrs = xml::xml_attrs(node);
    TransportTarget {
        name: attr(&attrs, "tm:name"),
        description: attr(&attrs, "tm:desc"),
        modifiable: xml::xml_array(node, &["tm:modifiable", "tm:request"])
            .into_iter()
            .map(parse_request)
            .collect(),
        released: xml::xml_array(node, &["tm:released", "tm:request"])
            .into_iter()
            .map(parse_request)
            .collect(),
    }
}

// ============================================================================
// Request bodies
// ============================================================================

/// Serialize leaf fields into the ABAP serializer envelope the check and
/// create endpoints expect.
fn abap_values_xml(fields: &[(&str, &str)]) -> String {
    let mut body = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <asx:abap xmlns:asx=\"http://www.sap.com/abapxml\" version=\"1.0\">\
         <asx:values><DATA>",
    );
    for (name, value) in fields {
        let _ = write!(body, "<{name}>{}</{name}>", xml_escape(value));
    }
    body.push_str("</DATA></asx:values></asx:abap>");
    body
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_number_validation() {
        assert!(validate_transport_number("NPLK900042").is_ok());
        assert!(validate_transport_number("a1_k567890").is_ok());
        assert!(validate_transport_number("nplK900042").is_ok());

        // wrong length
        assert!(validate_transport_number("NPLK90004").is_err());
        assert!(validate_transport_number("NPLK9000421").is_err());
        assert!(validate_transport_number("").is_err());
        // wrong shape
        assert!(validate_transport_number("1PLK900042").is_err());
        assert!(validate_transport_number("NPLX900042").is_err());
        assert!(validate_transport_number("N-LK900042").is_err());
    }

    #[test]
    fn test_object_uri_validation() {
        assert!(validate_object_uri("/sap/bc/adt/oo/classes/zcl_foo").is_ok());
        assert!(validate_object_uri("").is_err());
        assert!(validate_object_uri("oo/classes/zcl_foo").is_err());
        assert!(validate_object_uri("http://host/sap/bc/adt/oo/classes/zcl_foo").is_err());
    }

    #[test]
    fn test_abap_values_body_is_escaped() {
        let body = abap_values_xml(&[("REQUEST_TEXT", "fix <everything> & more")]);
        assert!(body.starts_with("<?xml"));
        assert!(body.contains(
            "<DATA><REQUEST_TEXT>fix &lt;everything&gt; &amp; more</REQUEST_TEXT></DATA>"
        ));
    }
}
