//! HTTP session handling for the ADT service.
//!
//! One [`AdtSession`] owns the connection configuration for a system: base
//! URL, basic-auth credentials, the CSRF token, the session cookie, and the
//! stateful/stateless flag. Every protocol operation funnels through
//! [`AdtSession::exchange`], which keeps the token and cookie current.
//!
//! SAP's CSRF double-submit protocol: the first call carries the literal
//! `fetch` token, the server answers with a real one, and that token is then
//! echoed on every state-changing call for the rest of the session. The
//! session-type header independently opts into "stateful" mode, which pins a
//! backend work process to this session.
//!
//! Token and cookie are mutable state read and written on every exchange.
//! A multi-threaded embedding must serialize exchanges per session (the
//! `&mut self` receiver enforces this for safe Rust); concurrent exchanges
//! through shared interior mutability would race on token adoption.

use crate::error::{AdtError, Result};
use crate::http::{BasicAuth, HttpClient, HttpRequest, HttpResponse};

/// Sentinel token value asking the server to mint a real CSRF token.
pub const FETCH_CSRF_TOKEN: &str = "fetch";
const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
const SESSION_TYPE_HEADER: &str = "X-sap-adt-sessiontype";

/// A single request to issue through the session, built up fluently.
///
/// # Example
/// ```ignore
/// let request = AdtRequest::get("/sap/bc/adt/cts/transportrequests")
///     .query("user", "ANNA")
///     .header("Accept", "application/*");
/// let response = session.exchange(request).await?;
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdtRequest {
    pub(crate) method: String,
    pub(crate) path: String,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) query: Vec<(String, String)>,
    pub(crate) body: Option<String>,
}

impl AdtRequest {
    fn new(method: &str, path: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            path: path.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new("GET", path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new("POST", path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new("PUT", path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new("DELETE", path)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// An authenticated HTTP session against one ADT system.
#[derive(Clone)]
pub struct AdtSession<C: HttpClient> {
    client: C,
    base_url: String,
    auth: BasicAuth,
    csrf_token: String,
    cookie: Option<String>,
    stateful: bool,
}

impl<C: HttpClient> AdtSession<C> {
    /// Create a session for the given system.
    ///
    /// # Errors
    /// Fails when base URL, username, or password is empty.
    pub fn new(
        client: C,
        base_url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let username = username.into();
        let password = password.into();
        if base_url.is_empty() || username.is_empty() || password.is_empty() {
            return Err(AdtError::Other(anyhow::anyhow!(
                "Invalid session configuration: url, login and password are required"
            )));
        }
        Ok(Self {
            client,
            base_url,
            auth: BasicAuth { username, password },
            csrf_token: FETCH_CSRF_TOKEN.to_string(),
            cookie: None,
            stateful: false,
        })
    }

    /// The CSRF token currently held (the `fetch` sentinel until the server
    /// has minted one).
    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// The user this session authenticates as.
    pub fn username(&self) -> &str {
        &self.auth.username
    }

    pub fn stateful(&self) -> bool {
        self.stateful
    }

    /// Switch between stateful and stateless mode.
    ///
    /// Only changes the session-type header sent on the next exchange; no
    /// request is issued here.
    pub fn set_stateful(&mut self, stateful: bool) {
        self.stateful = stateful;
    }

    /// Issue one HTTP request, updating cookie and CSRF token from the
    /// response.
    ///
    /// Caller headers take precedence over the session defaults. The cookie
    /// is adopted from any delivered response; the CSRF token is adopted only
    /// while the held token is still the `fetch` sentinel, and never
    /// overwritten afterwards. A response that errors before delivery leaves
    /// both untouched.
    ///
    /// # Errors
    /// Network failures propagate unchanged; non-2xx statuses surface as
    /// [`AdtError::Transport`] after the state update. No retries happen at
    /// this layer.
    pub async fn exchange(&mut self, request: AdtRequest) -> Result<HttpResponse> {
        let mut headers: Vec<(String, String)> = vec![
            ("Accept".to_string(), "*/*".to_string()),
            ("Cache-Control".to_string(), "no-cache".to_string()),
            (
                SESSION_TYPE_HEADER.to_string(),
                if self.stateful { "stateful" } else { "" }.to_string(),
            ),
            (CSRF_TOKEN_HEADER.to_string(), self.csrf_token.clone()),
        ];
        if let Some(cookie) = &self.cookie {
            headers.push(("Cookie".to_string(), cookie.clone()));
        }
        for (name, value) in request.headers {
            headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(&name));
            headers.push((name, value));
        }

        tracing::debug!(
            method = %request.method,
            path = %request.path,
            stateful = self.stateful,
            "Issuing ADT request"
        );

        let response = self
            .client
            .execute(
                &HttpRequest {
                    endpoint: self.base_url.clone(),
                    method: request.method,
                    path: request.path,
                    headers,
                    query: request.query,
                    body: request.body,
                },
                &self.auth,
            )
            .await?;

        if let Some(cookie) = response.header("set-cookie") {
            self.cookie = Some(cookie.to_string());
        }
        if let Some(token) = response.header(CSRF_TOKEN_HEADER) {
            if self.csrf_token == FETCH_CSRF_TOKEN {
                tracing::trace!("Adopted CSRF token from response");
                self.csrf_token = token.to_string();
            }
        }

        if !(200..300).contains(&response.status) {
            return Err(AdtError::Transport {
                status: response.status,
                body: response.body,
            });
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::MockHttpClient;

    fn session(mock: &MockHttpClient) -> AdtSession<MockHttpClient> {
        AdtSession::new(mock.clone(), "http://vhcalnplci.local:8000", "DEVELOPER", "secret")
            .unwrap()
    }

    #[tokio::test]
    async fn test_first_token_is_adopted_later_tokens_are_not() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /ping", &[("x-csrf-token", "token-one")], "");
        mock.add_ok("GET /ping", &[("x-csrf-token", "token-two")], "");

        let mut session = session(&mock);
        assert_eq!(session.csrf_token(), FETCH_CSRF_TOKEN);

        session.exchange(AdtRequest::get("/ping")).await.unwrap();
        assert_eq!(session.csrf_token(), "token-one");

        session.exchange(AdtRequest::get("/ping")).await.unwrap();
        assert_eq!(session.csrf_token(), "token-one");

        // the second request already carried the adopted token
        let calls = mock.get_calls();
        assert_eq!(calls[0].header("x-csrf-token"), Some("fetch"));
        assert_eq!(calls[1].header("x-csrf-token"), Some("token-one"));
    }

    #[tokio::test]
    async fn test_cookie_is_stored_and_sent_back() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /ping", &[("set-cookie", "SAP_SESSIONID=abc; path=/")], "");
        mock.add_ok("GET /ping", &[], "");

        let mut session = session(&mock);
        session.exchange(AdtRequest::get("/ping")).await.unwrap();
        session.exchange(AdtRequest::get("/ping")).await.unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls[0].header("Cookie"), None);
        assert_eq!(calls[1].header("Cookie"), Some("SAP_SESSIONID=abc; path=/"));
    }

    #[tokio::test]
    async fn test_stateful_flag_only_changes_the_header() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /ping", &[], "");
        mock.add_ok("GET /ping", &[], "");

        let mut session = session(&mock);
        session.exchange(AdtRequest::get("/ping")).await.unwrap();
        session.set_stateful(true);
        assert_eq!(mock.call_count(), 1); // flipping the flag sends nothing
        session.exchange(AdtRequest::get("/ping")).await.unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls[0].header("X-sap-adt-sessiontype"), Some(""));
        assert_eq!(calls[1].header("X-sap-adt-sessiontype"), Some("stateful"));
    }

    #[tokio::test]
    async fn test_caller_headers_override_defaults() {
        let mock = MockHttpClient::new();
        mock.add_ok("GET /ping", &[], "");

        let mut session = session(&mock);
        session
            .exchange(AdtRequest::get("/ping").header("Accept", "text/plain"))
            .await
            .unwrap();

        let calls = mock.get_calls();
        assert_eq!(calls[0].header("Accept"), Some("text/plain"));
        assert_eq!(
            calls[0].headers.iter().filter(|(k, _)| k == "Accept").count(),
            1
        );
    }

    #[tokio::test]
    async fn test_non_2xx_becomes_transport_error_after_state_update() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "GET /ping",
            Ok(HttpResponse {
                status: 403,
                headers: vec![("x-csrf-token".to_string(), "real-token".to_string())],
                body: "CSRF token validation failed".to_string(),
            }),
        );

        let mut session = session(&mock);
        let err = session.exchange(AdtRequest::get("/ping")).await.unwrap_err();
        assert!(matches!(err, AdtError::Transport { status: 403, .. }));
        // the token from the failed response was still adopted
        assert_eq!(session.csrf_token(), "real-token");
    }

    #[test]
    fn test_empty_configuration_is_rejected() {
        let mock = MockHttpClient::new();
        assert!(AdtSession::new(mock.clone(), "", "user", "pw").is_err());
        assert!(AdtSession::new(mock.clone(), "http://host", "", "pw").is_err());
        assert!(AdtSession::new(mock, "http://host", "user", "").is_err());
    }
}
