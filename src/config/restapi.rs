//! REST API listener configuration
//!
//! Everything under the `restapi` section. The section can be swapped at
//! runtime, so validation lives here and is shared by load and reload.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::net::ToSocketAddrs;

use serde::{Deserialize, Serialize};

use super::errors::{ConfigError, ConfigResult};

/// Basic auth credentials for mutating routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub username: String,
    pub password: String,
}

/// Client certificate policy when TLS is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyClient {
    None,
    Optional,
    Required,
}

/// How much the `Server` response header reveals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerTokens {
    /// No product token
    Original,
    /// `pgha`
    ProductOnly,
    /// `pgha/<version>`
    Minimal,
}

impl ServerTokens {
    /// Case-insensitive; anything unknown falls back to `Original`.
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "productonly" => ServerTokens::ProductOnly,
            "minimal" => ServerTokens::Minimal,
            _ => ServerTokens::Original,
        }
    }

    /// Value for the `Server` header, `None` to send none.
    pub fn header_value(&self) -> Option<String> {
        match self {
            ServerTokens::Original => None,
            ServerTokens::ProductOnly => Some("pgha".to_string()),
            ServerTokens::Minimal => Some(format!("pgha/{}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

/// The `restapi` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestApiConfig {
    /// `host:port` to bind (default: "127.0.0.1:8008")
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Address other members use to reach this API
    #[serde(default)]
    pub connect_address: Option<String>,

    #[serde(default)]
    pub authentication: Option<AuthConfig>,

    #[serde(default)]
    pub certfile: Option<String>,

    #[serde(default)]
    pub keyfile: Option<String>,

    #[serde(default)]
    pub cafile: Option<String>,

    #[serde(default)]
    pub ciphers: Option<String>,

    /// `none`, `optional` or `required`
    #[serde(default)]
    pub verify_client: Option<String>,

    /// IPs or CIDR networks allowed to call mutating routes
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Also allow every member's API host
    #[serde(default)]
    pub allowlist_include_members: bool,

    #[serde(default)]
    pub http_extra_headers: BTreeMap<String, String>,

    #[serde(default)]
    pub https_extra_headers: BTreeMap<String, String>,

    /// Listen backlog (default: 5)
    #[serde(default = "default_request_queue_size")]
    pub request_queue_size: u32,

    /// `original`, `productonly` or `minimal` (default: "original")
    #[serde(default = "default_server_tokens")]
    pub server_tokens: String,
}

fn default_listen() -> String {
    "127.0.0.1:8008".to_string()
}

fn default_request_queue_size() -> u32 {
    5
}

fn default_server_tokens() -> String {
    "original".to_string()
}

impl Default for RestApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            connect_address: None,
            authentication: None,
            certfile: None,
            keyfile: None,
            cafile: None,
            ciphers: None,
            verify_client: None,
            allowlist: Vec::new(),
            allowlist_include_members: false,
            http_extra_headers: BTreeMap::new(),
            https_extra_headers: BTreeMap::new(),
            request_queue_size: default_request_queue_size(),
            server_tokens: default_server_tokens(),
        }
    }
}

/// Split `host:port`, accepting `[v6]:port`.
pub fn split_host_port(raw: &str) -> Option<(&str, u16)> {
    let (host, port) = raw.rsplit_once(':')?;
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    let port: u16 = port.parse().ok()?;
    if host.is_empty() || port == 0 {
        return None;
    }
    Some((host, port))
}

const LOOPBACK_HOSTS: &[&str] = &["127.0.0.1", "0.0.0.0", "*", "::1", "localhost"];

impl RestApiConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if split_host_port(&self.listen).is_none() {
            return Err(ConfigError::invalid(
                "restapi.listen",
                format!("'{}' is not a valid host:port", self.listen),
            ));
        }

        if let Some(address) = &self.connect_address {
            match split_host_port(address) {
                None => {
                    return Err(ConfigError::invalid(
                        "restapi.connect_address",
                        format!("'{}' is not a valid host:port", address),
                    ))
                }
                Some((host, _)) if LOOPBACK_HOSTS.contains(&host) => {
                    return Err(ConfigError::invalid(
                        "restapi.connect_address",
                        format!("must not contain \"{}\"", host),
                    ))
                }
                Some(_) => {}
            }
        }

        if let Some(mode) = &self.verify_client {
            if !matches!(mode.as_str(), "none" | "optional" | "required") {
                return Err(ConfigError::invalid(
                    "restapi.verify_client",
                    format!("'{}' is not one of none, optional, required", mode),
                ));
            }
        }

        if !matches!(
            self.server_tokens.to_ascii_lowercase().as_str(),
            "original" | "productonly" | "minimal"
        ) {
            return Err(ConfigError::invalid(
                "restapi.server_tokens",
                format!("'{}' is not one of minimal, productonly, original", self.server_tokens),
            ));
        }

        if self.request_queue_size > 4096 {
            return Err(ConfigError::invalid(
                "restapi.request_queue_size",
                "must be between 0 and 4096",
            ));
        }

        if self.certfile.is_none() && self.keyfile.is_some() {
            return Err(ConfigError::invalid("restapi.keyfile", "requires certfile"));
        }

        Ok(())
    }

    /// Resolve `listen` to a bindable address.
    pub fn listen_addr(&self) -> ConfigResult<SocketAddr> {
        let (host, port) = split_host_port(&self.listen).ok_or_else(|| {
            ConfigError::invalid(
                "restapi.listen",
                format!("'{}' is not a valid host:port", self.listen),
            )
        })?;
        let host = if host == "*" { "0.0.0.0" } else { host };
        (host, port)
            .to_socket_addrs()
            .map_err(|e| ConfigError::invalid("restapi.listen", e.to_string()))?
            .next()
            .ok_or_else(|| ConfigError::invalid("restapi.listen", "address did not resolve"))
    }

    pub fn is_tls(&self) -> bool {
        self.certfile.is_some()
    }

    /// Headers added to every response.
    pub fn extra_headers(&self) -> &BTreeMap<String, String> {
        if self.is_tls() {
            &self.https_extra_headers
        } else {
            &self.http_extra_headers
        }
    }

    pub fn server_tokens(&self) -> ServerTokens {
        ServerTokens::parse(&self.server_tokens)
    }

    /// Client certificate policy; only meaningful with TLS.
    pub fn verify_client(&self) -> VerifyClient {
        if !self.is_tls() {
            return VerifyClient::None;
        }
        match self.verify_client.as_deref() {
            Some("optional") => VerifyClient::Optional,
            Some("required") => VerifyClient::Required,
            _ => VerifyClient::None,
        }
    }
}
