//! Authenticated JSON transport used by provider drivers.
//!
//! Every call applies the caller's header options, forces JSON
//! `Accept`/`Content-Type`, signs the request through the [`AuthRegistry`]
//! and treats any status outside the accepted set as an error carrying the
//! response body verbatim. There is no retry here; the monitor owns retry
//! policy.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue};
use reqwest::{Client, Method, Request, StatusCode};
use serde::Serialize;
use tracing::{debug, error};

use crate::auth::{AuthRegistry, Credential};
use crate::error::{ClientError, ClientResult};

const APPLICATION_JSON: &str = "application/json";

/// Connection pool and timeout settings shared by all calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Idle connections kept per host.
    pub max_idle_connections: usize,
    pub idle_connection_timeout: Duration,
    /// Covers TCP connect and the TLS handshake.
    pub tls_handshake_timeout: Duration,
    /// Accept self-signed certificates. Provider instances are commonly
    /// self-hosted behind private CAs; turn off when they are not.
    pub insecure_skip_verify: bool,
    /// Status codes treated as success. Empty means any 2xx.
    pub accepted_statuses: Vec<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_idle_connections: 20,
            idle_connection_timeout: Duration::from_secs(30),
            tls_handshake_timeout: Duration::from_secs(30),
            insecure_skip_verify: true,
            accepted_statuses: Vec::new(),
        }
    }
}

/// Pooled HTTP client that signs requests with instance credentials.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
    auth: Arc<AuthRegistry>,
    accepted_statuses: Arc<[u16]>,
}

impl HttpClient {
    pub fn new(config: &ClientConfig, auth: Arc<AuthRegistry>) -> ClientResult<Self> {
        let inner = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.tls_handshake_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.idle_connection_timeout)
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        Ok(Self {
            inner,
            auth,
            accepted_statuses: Arc::from(config.accepted_statuses.as_slice()),
        })
    }

    /// GET `url` with query `params` and extra header `options`.
    pub async fn get(
        &self,
        url: &str,
        cred: Option<&Credential>,
        params: &[(&str, &str)],
        options: &[(&str, &str)],
    ) -> ClientResult<Bytes> {
        let result = self.get_inner(url, cred, params, options).await;
        match &result {
            Ok(body) => debug!(%url, ?cred, ?params, bytes = body.len(), "GET succeeded"),
            Err(e) => error!(%url, ?cred, ?params, error = %e, "GET failed"),
        }
        result
    }

    async fn get_inner(
        &self,
        url: &str,
        cred: Option<&Credential>,
        params: &[(&str, &str)],
        options: &[(&str, &str)],
    ) -> ClientResult<Bytes> {
        if url.is_empty() {
            return Err(ClientError::EmptyUrl);
        }

        let mut builder = self.inner.request(Method::GET, url);
        if !params.is_empty() {
            builder = builder.query(params);
        }
        let mut req = builder.build().map_err(ClientError::from_build)?;

        apply_options(&mut req, options)?;
        // Explicitly declare JSON data accepted.
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

        self.auth.authorize(&mut req, cred)?;
        self.send(req).await
    }

    /// POST `body` as JSON to `url`. `None` sends no payload.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        cred: Option<&Credential>,
        body: Option<&B>,
        options: &[(&str, &str)],
    ) -> ClientResult<Bytes> {
        let result = self.post_inner(url, cred, body, options).await;
        match &result {
            Ok(resp) => debug!(%url, ?cred, bytes = resp.len(), "POST succeeded"),
            Err(e) => error!(%url, ?cred, error = %e, "POST failed"),
        }
        result
    }

    async fn post_inner<B: Serialize + ?Sized>(
        &self,
        url: &str,
        cred: Option<&Credential>,
        body: Option<&B>,
        options: &[(&str, &str)],
    ) -> ClientResult<Bytes> {
        if url.is_empty() {
            return Err(ClientError::EmptyUrl);
        }

        let mut builder = self.inner.request(Method::POST, url);
        if let Some(body) = body {
            let content = serde_json::to_vec(body)?;
            debug!(%url, bytes = content.len(), "POST body encoded");
            builder = builder.body(content);
        }
        let mut req = builder.build().map_err(ClientError::from_build)?;

        apply_options(&mut req, options)?;
        let headers = req.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        headers.insert(ACCEPT, HeaderValue::from_static(APPLICATION_JSON));

        self.auth.authorize(&mut req, cred)?;
        self.send(req).await
    }

    async fn send(&self, req: Request) -> ClientResult<Bytes> {
        let method = req.method().to_string();
        let res = self.inner.execute(req).await?;

        // Read the body either way: on failure it carries the server's message.
        let status = res.status();
        let url = res.url().to_string();
        let body = res.bytes().await?;

        if !self.accepts(status) {
            return Err(ClientError::Status {
                method,
                url,
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(body)
    }

    fn accepts(&self, status: StatusCode) -> bool {
        if self.accepted_statuses.is_empty() {
            status.is_success()
        } else {
            self.accepted_statuses.contains(&status.as_u16())
        }
    }
}

fn apply_options(req: &mut Request, options: &[(&str, &str)]) -> ClientResult<()> {
    for (key, value) in options {
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| ClientError::InvalidHeader(key.to_string()))?;
        let value =
            HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(key.to_string()))?;
        req.headers_mut().append(name, value);
    }
    Ok(())
}
