//! # Access Control
//!
//! Mutating requests pass three gates in order: the allow-list, the
//! client certificate requirement and basic authentication. Read-only
//! requests are never checked.

use std::net::{IpAddr, ToSocketAddrs};
use std::sync::{Arc, RwLock};

use axum::{
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::{RestApiConfig, VerifyClient};
use crate::dcs::Cluster;

/// Realm announced in `WWW-Authenticate`.
pub const AUTH_REALM: &str = "pgha";

/// Inserted into request extensions by the TLS terminator once the peer
/// certificate has been verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientCertificate;

// ==================
// Networks
// ==================

/// An address or CIDR block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Network {
    addr: IpAddr,
    prefix: u8,
}

impl Network {
    pub fn host(addr: IpAddr) -> Self {
        let addr = addr.to_canonical();
        let prefix = if addr.is_ipv4() { 32 } else { 128 };
        Self { addr, prefix }
    }

    /// `10.0.0.0/8`, `::1` or `192.168.0.7`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        match raw.split_once('/') {
            None => raw.parse::<IpAddr>().ok().map(Self::host),
            Some((addr, prefix)) => {
                let addr: IpAddr = addr.parse().ok()?;
                let prefix: u8 = prefix.parse().ok()?;
                let max = if addr.is_ipv4() { 32 } else { 128 };
                (prefix <= max).then_some(Self { addr, prefix })
            }
        }
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip.to_canonical()) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                (u32::from(net) ^ u32::from(ip)) & mask == 0
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                (u128::from(net) ^ u128::from(ip)) & mask == 0
            }
            _ => false,
        }
    }
}

/// Resolve a host name or literal address to networks.
fn resolve_blocking(host: &str) -> Vec<Network> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return vec![Network::host(addr)];
    }
    match (host, 0u16).to_socket_addrs() {
        Ok(addrs) => addrs.map(|addr| Network::host(addr.ip())).collect(),
        Err(err) => {
            warn!(host, error = %err, "cannot resolve allowlist host");
            Vec::new()
        }
    }
}

async fn resolve(host: &str) -> Vec<Network> {
    if let Ok(addr) = host.parse::<IpAddr>() {
        return vec![Network::host(addr)];
    }
    match tokio::net::lookup_host((host, 0u16)).await {
        Ok(addrs) => addrs.map(|addr| Network::host(addr.ip())).collect(),
        Err(err) => {
            warn!(host, error = %err, "cannot resolve member host");
            Vec::new()
        }
    }
}

// ==================
// Denials
// ==================

/// Why a mutating request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    NotAllowed,
    CertificateRequired,
    NoAuthHeader,
    NotAuthenticated,
}

impl AccessDenied {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AccessDenied::NotAllowed | AccessDenied::CertificateRequired => StatusCode::FORBIDDEN,
            AccessDenied::NoAuthHeader | AccessDenied::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            AccessDenied::NotAllowed => "Access is denied",
            AccessDenied::CertificateRequired => "client certificate required",
            AccessDenied::NoAuthHeader => "no auth header received",
            AccessDenied::NotAuthenticated => "not authenticated",
        }
    }
}

impl IntoResponse for AccessDenied {
    fn into_response(self) -> Response {
        let mut response = (self.status_code(), self.message()).into_response();
        if self.status_code() == StatusCode::UNAUTHORIZED {
            let challenge = format!("Basic realm=\"{}\"", AUTH_REALM);
            if let Ok(value) = HeaderValue::from_str(&challenge) {
                response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
            }
        }
        response
    }
}

// ==================
// Policy
// ==================

/// Listener-level settings derived from the `restapi` section.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    allowlist: Vec<Network>,
    include_members: bool,
    /// `Basic <base64(user:password)>`
    expected_auth: Option<String>,
    verify_client: Option<VerifyClient>,
    /// Value for the `Server` header
    pub server_header: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl AccessPolicy {
    /// Build from configuration. Allow-list entries that are neither an
    /// address nor a resolvable host are logged and skipped. Blocking.
    pub fn from_config(config: &RestApiConfig) -> Self {
        let mut allowlist = Vec::new();
        for entry in &config.allowlist {
            match Network::parse(entry) {
                Some(network) => allowlist.push(network),
                None if entry.contains('/') => {
                    warn!(entry = %entry, "invalid allowlist entry ignored");
                }
                None => {
                    let resolved = resolve_blocking(entry.trim());
                    if resolved.is_empty() {
                        warn!(entry = %entry, "invalid allowlist entry ignored");
                    }
                    allowlist.extend(resolved);
                }
            }
        }

        let expected_auth = config.authentication.as_ref().map(|auth| {
            format!(
                "Basic {}",
                STANDARD.encode(format!("{}:{}", auth.username, auth.password))
            )
        });

        let verify_client = match config.verify_client() {
            VerifyClient::None => None,
            mode => Some(mode),
        };

        Self {
            allowlist,
            include_members: config.allowlist_include_members,
            expected_auth,
            verify_client,
            server_header: config.server_tokens().header_value(),
            extra_headers: config
                .extra_headers()
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Only methods that change state are checked.
    pub fn applies_to(method: &Method) -> bool {
        matches!(
            *method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    fn restricts_clients(&self) -> bool {
        !self.allowlist.is_empty() || self.include_members
    }

    async fn client_allowed(&self, client: Option<IpAddr>, cluster: Option<&Cluster>) -> bool {
        let Some(client) = client else {
            return false;
        };
        if self.allowlist.iter().any(|network| network.contains(client)) {
            return true;
        }
        if !self.include_members {
            return false;
        }
        let hosts: Vec<String> = cluster
            .map(|cluster| {
                cluster
                    .members
                    .iter()
                    .filter_map(|member| member.api_host().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        for host in hosts {
            if resolve(&host).await.iter().any(|network| network.contains(client)) {
                return true;
            }
        }
        false
    }

    fn authenticated(&self, headers: &HeaderMap) -> Result<(), AccessDenied> {
        let Some(expected) = &self.expected_auth else {
            return Ok(());
        };
        let received = headers
            .get(header::AUTHORIZATION)
            .ok_or(AccessDenied::NoAuthHeader)?;
        if bool::from(received.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(AccessDenied::NotAuthenticated)
        }
    }

    /// Run every gate for a mutating request.
    pub async fn check(
        &self,
        client: Option<IpAddr>,
        headers: &HeaderMap,
        has_certificate: bool,
        cluster: Option<&Cluster>,
    ) -> Result<(), AccessDenied> {
        if self.restricts_clients() && !self.client_allowed(client, cluster).await {
            return Err(AccessDenied::NotAllowed);
        }
        if self.verify_client.is_some() && !has_certificate {
            return Err(AccessDenied::CertificateRequired);
        }
        self.authenticated(headers)
    }
}

/// Swappable policy; replaced wholesale on reload.
#[derive(Debug, Default)]
pub struct PolicyCell {
    inner: RwLock<Arc<AccessPolicy>>,
}

impl PolicyCell {
    pub fn new(policy: AccessPolicy) -> Self {
        Self {
            inner: RwLock::new(Arc::new(policy)),
        }
    }

    pub fn load(&self) -> Arc<AccessPolicy> {
        match self.inner.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn store(&self, policy: AccessPolicy) {
        let mut slot = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Arc::new(policy);
    }
}
