//! Request authentication for network MCP transports.
//!
//! Authentication is expressed as an ordered [`HeaderPipeline`] of pure
//! [`HeaderTransform`]s. The SSE transport runs the pipeline once for every
//! outbound HTTP request (the event-stream GET and each JSON-RPC POST), so
//! per-request artifacts such as HMAC signatures and short-lived JWTs are
//! always fresh.
//!
//! Two schemes are supported:
//!
//! - `secret_key`: HMAC-SHA256 over `METHOD\nPATH\nTIMESTAMP\nsha256(body)`,
//!   sent as `X-Signature` (hex) and `X-Timestamp` (unix seconds).
//! - `jwt`: an HS256 token with `iat`/`exp`/`jti` claims, sent as
//!   `Authorization: Bearer <token>`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::McpError;

type HmacSha256 = Hmac<Sha256>;

/// Header map threaded through the pipeline. Ordered so that output is
/// deterministic and easy to assert on.
pub type Headers = BTreeMap<String, String>;

pub const SIGNATURE_HEADER: &str = "X-Signature";
pub const TIMESTAMP_HEADER: &str = "X-Timestamp";
pub const AUTHORIZATION_HEADER: &str = "Authorization";

/// Accepted clock difference when verifying an HMAC timestamp.
pub const DEFAULT_HMAC_MAX_SKEW_SECS: i64 = 300;
/// Lifetime of a minted JWT.
pub const DEFAULT_JWT_TTL_SECS: i64 = 300;
/// Leeway applied to `exp`/`iat` when verifying a JWT.
pub const DEFAULT_JWT_LEEWAY_SECS: i64 = 30;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Pipeline
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The parts of an outbound HTTP request that authentication may cover.
#[derive(Debug, Clone, Copy)]
pub struct OutboundRequest<'a> {
    pub method: &'a str,
    /// Path plus query string, e.g. `/message?sessionId=abc`.
    pub path: &'a str,
    pub body: &'a [u8],
}

impl<'a> OutboundRequest<'a> {
    pub fn new(method: &'a str, path: &'a str, body: &'a [u8]) -> Self {
        Self { method, path, body }
    }
}

/// A pure function from existing headers to augmented headers.
///
/// Implementations hold no mutable state, so one transform may be applied
/// concurrently to independent requests.
pub trait HeaderTransform: Send + Sync {
    /// Short name for logging.
    fn name(&self) -> &'static str;

    fn apply(&self, request: &OutboundRequest<'_>, headers: Headers) -> Headers;
}

/// An ordered list of header transforms, applied first to last.
#[derive(Clone, Default)]
pub struct HeaderPipeline {
    stages: Vec<Arc<dyn HeaderTransform>>,
}

impl HeaderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage and return the pipeline (builder style).
    pub fn then(mut self, stage: Arc<dyn HeaderTransform>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn push(&mut self, stage: Arc<dyn HeaderTransform>) {
        self.stages.push(stage);
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Stage names in application order.
    pub fn names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run every stage in order, starting from an empty header map.
    pub fn headers_for(&self, request: &OutboundRequest<'_>) -> Headers {
        self.apply(request, Headers::new())
    }

    pub fn apply(&self, request: &OutboundRequest<'_>, headers: Headers) -> Headers {
        self.stages
            .iter()
            .fold(headers, |acc, stage| stage.apply(request, acc))
    }
}

impl fmt::Debug for HeaderPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderPipeline")
            .field("stages", &self.names())
            .finish()
    }
}

/// Fixed headers merged into every request (existing keys are overwritten).
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(pub Headers);

impl HeaderTransform for StaticHeaders {
    fn name(&self) -> &'static str {
        "static"
    }

    fn apply(&self, _request: &OutboundRequest<'_>, mut headers: Headers) -> Headers {
        headers.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        headers
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Scheme selection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Supported authentication schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// HMAC-SHA256 request signing with a shared secret.
    SecretKey,
    /// HS256 bearer token signed with a shared secret.
    Jwt,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SecretKey => "secret_key",
            Self::Jwt => "jwt",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "secret_key" => Ok(Self::SecretKey),
            "jwt" => Ok(Self::Jwt),
            other => Err(McpError::Configuration(format!(
                "unsupported auth type \"{other}\" (expected \"secret_key\" or \"jwt\")"
            ))),
        }
    }
}

/// Build the middleware for `scheme` keyed with `secret`.
pub fn create_auth_middleware(
    scheme: AuthScheme,
    secret: &str,
) -> Result<Arc<dyn HeaderTransform>, McpError> {
    Ok(match scheme {
        AuthScheme::SecretKey => Arc::new(HmacAuth::new(secret)?),
        AuthScheme::Jwt => Arc::new(JwtAuth::new(secret)?),
    })
}

/// Like [`create_auth_middleware`], but JWTs carry `client_name` as `iss`.
pub fn client_auth_middleware(
    scheme: AuthScheme,
    secret: &str,
    client_name: &str,
) -> Result<Arc<dyn HeaderTransform>, McpError> {
    match scheme {
        AuthScheme::Jwt => Ok(Arc::new(JwtAuth::new(secret)?.with_issuer(client_name))),
        AuthScheme::SecretKey => create_auth_middleware(scheme, secret),
    }
}

fn check_secret(secret: &[u8]) -> Result<(), McpError> {
    if secret.is_empty() {
        return Err(McpError::Configuration("auth secret must not be empty".into()));
    }
    Ok(())
}

/// Why a signature or token was rejected by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("malformed credential: {0}")]
    Malformed(String),

    #[error("signature mismatch")]
    BadSignature,

    #[error("credential expired")]
    Expired,

    #[error("credential not yet valid")]
    NotYetValid,
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

fn mac_for(secret: &[u8]) -> HmacSha256 {
    HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HMAC
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HMAC-SHA256 request signing.
#[derive(Clone)]
pub struct HmacAuth {
    secret: Vec<u8>,
    max_skew_secs: i64,
}

impl HmacAuth {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, McpError> {
        let secret = secret.as_ref();
        check_secret(secret)?;
        Ok(Self {
            secret: secret.to_vec(),
            max_skew_secs: DEFAULT_HMAC_MAX_SKEW_SECS,
        })
    }

    /// Override the clock difference tolerated by [`verify`](Self::verify).
    pub fn with_max_skew(mut self, secs: i64) -> Self {
        self.max_skew_secs = secs;
        self
    }

    /// The string that gets signed.
    pub fn canonical(request: &OutboundRequest<'_>, timestamp: i64) -> String {
        let body_digest = hex::encode(Sha256::digest(request.body));
        format!(
            "{}\n{}\n{}\n{}",
            request.method.to_ascii_uppercase(),
            request.path,
            timestamp,
            body_digest
        )
    }

    /// Hex signature of `request` at `timestamp`.
    pub fn sign(&self, request: &OutboundRequest<'_>, timestamp: i64) -> String {
        let mut mac = mac_for(&self.secret);
        mac.update(Self::canonical(request, timestamp).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Attach signature headers computed at a fixed `timestamp`.
    pub fn apply_at(
        &self,
        request: &OutboundRequest<'_>,
        mut headers: Headers,
        timestamp: i64,
    ) -> Headers {
        headers.insert(SIGNATURE_HEADER.into(), self.sign(request, timestamp));
        headers.insert(TIMESTAMP_HEADER.into(), timestamp.to_string());
        headers
    }

    /// Server-side check: recompute and compare in constant time, and
    /// reject timestamps further than the skew window from `now`.
    pub fn verify(
        &self,
        request: &OutboundRequest<'_>,
        timestamp: i64,
        signature_hex: &str,
        now: i64,
    ) -> Result<(), AuthRejection> {
        if now.abs_diff(timestamp) > self.max_skew_secs.max(0) as u64 {
            return Err(AuthRejection::Expired);
        }
        let provided = hex::decode(signature_hex)
            .map_err(|e| AuthRejection::Malformed(format!("signature is not hex: {e}")))?;
        let mut mac = mac_for(&self.secret);
        mac.update(Self::canonical(request, timestamp).as_bytes());
        let expected = mac.finalize().into_bytes();
        if bool::from(expected.as_slice().ct_eq(&provided[..])) {
            Ok(())
        } else {
            Err(AuthRejection::BadSignature)
        }
    }
}

impl HeaderTransform for HmacAuth {
    fn name(&self) -> &'static str {
        "hmac"
    }

    fn apply(&self, request: &OutboundRequest<'_>, headers: Headers) -> Headers {
        self.apply_at(request, headers, now_unix())
    }
}

impl fmt::Debug for HmacAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacAuth")
            .field("secret", &"<redacted>")
            .field("max_skew_secs", &self.max_skew_secs)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JWT
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Claims carried by a minted token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JwtClaims {
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

#[derive(Deserialize)]
struct JwtHeader {
    alg: String,
}

/// HS256 bearer tokens, minted fresh for each request.
#[derive(Clone)]
pub struct JwtAuth {
    secret: Vec<u8>,
    ttl_secs: i64,
    leeway_secs: i64,
    issuer: Option<String>,
}

impl JwtAuth {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, McpError> {
        let secret = secret.as_ref();
        check_secret(secret)?;
        Ok(Self {
            secret: secret.to_vec(),
            ttl_secs: DEFAULT_JWT_TTL_SECS,
            leeway_secs: DEFAULT_JWT_LEEWAY_SECS,
            issuer: None,
        })
    }

    pub fn with_ttl(mut self, secs: i64) -> Self {
        self.ttl_secs = secs;
        self
    }

    pub fn with_leeway(mut self, secs: i64) -> Self {
        self.leeway_secs = secs;
        self
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    /// Mint a token issued at `now` (unix seconds).
    pub fn token_at(&self, now: i64) -> String {
        let mut claims = serde_json::json!({
            "iat": now,
            "exp": now.saturating_add(self.ttl_secs),
            "jti": uuid::Uuid::new_v4().to_string(),
        });
        if let Some(iss) = &self.issuer {
            claims["iss"] = serde_json::Value::String(iss.clone());
        }

        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        let signing_input = format!("{header}.{payload}");
        let signature = self.signature(&signing_input);
        format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
    }

    fn signature(&self, signing_input: &str) -> Vec<u8> {
        let mut mac = mac_for(&self.secret);
        mac.update(signing_input.as_bytes());
        mac.finalize().into_bytes().to_vec()
    }

    /// Verify signature, algorithm and time claims at `now`.
    pub fn verify(&self, token: &str, now: i64) -> Result<JwtClaims, AuthRejection> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthRejection::Malformed("expected three segments".into()));
        };

        let decode = |segment: &str| {
            URL_SAFE_NO_PAD
                .decode(segment)
                .map_err(|e| AuthRejection::Malformed(format!("bad base64: {e}")))
        };

        let header: JwtHeader = serde_json::from_slice(&decode(header)?)
            .map_err(|e| AuthRejection::Malformed(format!("bad header: {e}")))?;
        if header.alg != "HS256" {
            return Err(AuthRejection::Malformed(format!("unsupported alg {}", header.alg)));
        }

        let expected = self.signature(&token[..token.len() - signature.len() - 1]);
        let provided = decode(signature)?;
        if !bool::from(expected.as_slice().ct_eq(&provided[..])) {
            return Err(AuthRejection::BadSignature);
        }

        let claims: JwtClaims = serde_json::from_slice(&decode(payload)?)
            .map_err(|e| AuthRejection::Malformed(format!("bad claims: {e}")))?;
        if now > claims.exp.saturating_add(self.leeway_secs) {
            return Err(AuthRejection::Expired);
        }
        if claims.iat > now.saturating_add(self.leeway_secs) {
            return Err(AuthRejection::NotYetValid);
        }
        Ok(claims)
    }
}

impl HeaderTransform for JwtAuth {
    fn name(&self) -> &'static str {
        "jwt"
    }

    fn apply(&self, _request: &OutboundRequest<'_>, mut headers: Headers) -> Headers {
        headers.insert(
            AUTHORIZATION_HEADER.into(),
            format!("Bearer {}", self.token_at(now_unix())),
        );
        headers
    }
}

impl fmt::Debug for JwtAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtAuth")
            .field("secret", &"<redacted>")
            .field("ttl_secs", &self.ttl_secs)
            .field("leeway_secs", &self.leeway_secs)
            .field("issuer", &self.issuer)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
