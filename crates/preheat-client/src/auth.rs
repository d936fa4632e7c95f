//! Credential registry.
//!
//! An [`AuthHandler`] signs an outgoing request for one auth mode. The
//! [`AuthRegistry`] maps mode names to handlers; [`AuthRegistry::with_defaults`]
//! installs the four modes provider instances can be configured with.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::Request;
use reqwest::header::{AUTHORIZATION, HeaderName, HeaderValue};

use crate::error::AuthError;

pub const AUTH_MODE_NONE: &str = "NONE";
pub const AUTH_MODE_BASIC: &str = "BASIC";
pub const AUTH_MODE_OAUTH: &str = "OAUTH";
pub const AUTH_MODE_CUSTOM: &str = "CUSTOM";

/// Auth mode plus its opaque payload.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    pub mode: String,
    pub data: HashMap<String, String>,
}

impl Credential {
    pub fn new(mode: impl Into<String>, data: HashMap<String, String>) -> Self {
        Self {
            mode: mode.into(),
            data,
        }
    }

    fn field(&self, field: &'static str) -> Result<&str, AuthError> {
        self.data
            .get(field)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| AuthError::MissingField {
                mode: self.mode.clone(),
                field,
            })
    }
}

// Values are secrets; only the keys are printed.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.data.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("Credential")
            .field("mode", &self.mode)
            .field("data", &keys)
            .finish()
    }
}

/// Signs an outgoing request for one auth mode.
pub trait AuthHandler: Send + Sync {
    /// The mode name this handler is registered under.
    fn mode(&self) -> &str;

    /// Mutate the request (usually its headers) before it is sent.
    fn authorize(&self, req: &mut Request, cred: &Credential) -> Result<(), AuthError>;
}

/// Maps auth mode names to handlers.
#[derive(Clone, Default)]
pub struct AuthRegistry {
    handlers: HashMap<String, Arc<dyn AuthHandler>>,
}

impl fmt::Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRegistry")
            .field("modes", &self.modes())
            .finish()
    }
}

impl AuthRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `NONE`, `BASIC`, `OAUTH` and `CUSTOM` handlers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NoneAuthHandler));
        registry.register(Arc::new(BasicAuthHandler));
        registry.register(Arc::new(OAuthHandler));
        registry.register(Arc::new(CustomAuthHandler));
        registry
    }

    /// Register a handler under its mode, replacing any previous one.
    pub fn register(&mut self, handler: Arc<dyn AuthHandler>) {
        self.handlers.insert(handler.mode().to_string(), handler);
    }

    pub fn resolve(&self, mode: &str) -> Option<Arc<dyn AuthHandler>> {
        self.handlers.get(mode).cloned()
    }

    /// Registered mode names, sorted.
    pub fn modes(&self) -> Vec<String> {
        let mut modes: Vec<String> = self.handlers.keys().cloned().collect();
        modes.sort();
        modes
    }

    /// Sign `req` with `cred`. No credential leaves the request untouched.
    pub fn authorize(&self, req: &mut Request, cred: Option<&Credential>) -> Result<(), AuthError> {
        let Some(cred) = cred else {
            return Ok(());
        };
        let handler = self
            .resolve(&cred.mode)
            .ok_or_else(|| AuthError::UnknownMode(cred.mode.clone()))?;
        handler.authorize(req, cred)
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue, AuthError> {
    let mut value =
        HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeader(name.to_string()))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Sends the request unchanged.
#[derive(Debug)]
pub struct NoneAuthHandler;

impl AuthHandler for NoneAuthHandler {
    fn mode(&self) -> &str {
        AUTH_MODE_NONE
    }

    fn authorize(&self, _req: &mut Request, _cred: &Credential) -> Result<(), AuthError> {
        Ok(())
    }
}

/// `username` / `password` as an `Authorization: Basic` header.
#[derive(Debug)]
pub struct BasicAuthHandler;

impl AuthHandler for BasicAuthHandler {
    fn mode(&self) -> &str {
        AUTH_MODE_BASIC
    }

    fn authorize(&self, req: &mut Request, cred: &Credential) -> Result<(), AuthError> {
        let username = cred.field("username")?;
        let password = cred.field("password")?;
        let token = STANDARD.encode(format!("{username}:{password}"));
        let value = header_value(AUTHORIZATION.as_str(), &format!("Basic {token}"))?;
        req.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// `token` as an `Authorization: Bearer` header.
#[derive(Debug)]
pub struct OAuthHandler;

impl AuthHandler for OAuthHandler {
    fn mode(&self) -> &str {
        AUTH_MODE_OAUTH
    }

    fn authorize(&self, req: &mut Request, cred: &Credential) -> Result<(), AuthError> {
        let token = cred.field("token")?;
        let value = header_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        req.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

/// Arbitrary `header_key: header_value` pair.
#[derive(Debug)]
pub struct CustomAuthHandler;

impl AuthHandler for CustomAuthHandler {
    fn mode(&self) -> &str {
        AUTH_MODE_CUSTOM
    }

    fn authorize(&self, req: &mut Request, cred: &Credential) -> Result<(), AuthError> {
        let key = cred.field("header_key")?;
        let raw = cred.field("header_value")?;
        let name = HeaderName::from_bytes(key.as_bytes())
            .map_err(|_| AuthError::InvalidHeader(key.to_string()))?;
        let value = header_value(key, raw)?;
        req.headers_mut().insert(name, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Method;

    fn request() -> Request {
        Request::new(Method::GET, "http://127.0.0.1/_ping".parse().unwrap())
    }

    fn cred(mode: &str, pairs: &[(&str, &str)]) -> Credential {
        Credential::new(
            mode,
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn defaults_register_all_modes() {
        let registry = AuthRegistry::with_defaults();
        assert_eq!(registry.modes(), ["BASIC", "CUSTOM", "NONE", "OAUTH"]);
        assert!(registry.resolve("BASIC").is_some());
        assert!(registry.resolve("KERBEROS").is_none());
    }

    #[test]
    fn basic_sets_authorization_header() {
        let registry = AuthRegistry::with_defaults();
        let mut req = request();
        let cred = cred("BASIC", &[("username", "admin"), ("password", "Passw0rd")]);

        registry.authorize(&mut req, Some(&cred)).unwrap();

        let header = req.headers().get(AUTHORIZATION).unwrap();
        assert_eq!(header.to_str().unwrap(), "Basic YWRtaW46UGFzc3cwcmQ=");
        assert!(header.is_sensitive());
    }

    #[test]
    fn basic_without_password_fails() {
        let registry = AuthRegistry::with_defaults();
        let mut req = request();
        let err = registry
            .authorize(&mut req, Some(&cred("BASIC", &[("username", "admin")])))
            .unwrap_err();
        assert!(matches!(err, AuthError::MissingField { field: "password", .. }));
        assert!(req.headers().get(AUTHORIZATION).is_none());
    }

    #[test]
    fn oauth_sets_bearer_token() {
        let registry = AuthRegistry::with_defaults();
        let mut req = request();
        registry
            .authorize(&mut req, Some(&cred("OAUTH", &[("token", "abc123")])))
            .unwrap();
        assert_eq!(
            req.headers().get(AUTHORIZATION).unwrap().to_str().unwrap(),
            "Bearer abc123"
        );
    }

    #[test]
    fn custom_sets_named_header() {
        let registry = AuthRegistry::with_defaults();
        let mut req = request();
        registry
            .authorize(
                &mut req,
                Some(&cred(
                    "CUSTOM",
                    &[("header_key", "X-Api-Key"), ("header_value", "k-42")],
                )),
            )
            .unwrap();
        assert_eq!(req.headers().get("x-api-key").unwrap().to_str().unwrap(), "k-42");
    }

    #[test]
    fn unknown_mode_is_an_error() {
        let registry = AuthRegistry::with_defaults();
        let mut req = request();
        let err = registry
            .authorize(&mut req, Some(&cred("KERBEROS", &[])))
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownMode(m) if m == "KERBEROS"));
    }

    #[test]
    fn missing_credential_sends_unauthenticated() {
        let registry = AuthRegistry::new();
        let mut req = request();
        registry.authorize(&mut req, None).unwrap();
        assert!(req.headers().is_empty());
    }

    #[test]
    fn debug_redacts_secret_values() {
        let cred = cred("BASIC", &[("username", "admin"), ("password", "Passw0rd")]);
        let printed = format!("{cred:?}");
        assert!(printed.contains("password"));
        assert!(!printed.contains("Passw0rd"));
    }
}
