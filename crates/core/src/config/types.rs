use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Upstream processing service configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Processing service URL (e.g., "http://localhost:8000")
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout for the start-processing call in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// TCP connect timeout in seconds (default: 10)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

/// Generation orchestrator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Budget for a single artifact fetch in seconds.
    /// Artifacts are produced by the upstream service while the request is
    /// held open, so this is much larger than the start-processing timeout.
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,

    /// Substitute a fixed placeholder pitch when the upstream service is
    /// unreachable, instead of exposing a failed pitch slot.
    #[serde(default)]
    pub pitch_placeholder: bool,

    /// Cancel the superseded generation when a new one names it.
    #[serde(default = "default_true")]
    pub cancel_superseded: bool,

    /// Capacity of the slot update broadcast channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_fetch_timeout() -> u64 {
    600 // 10 minutes
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    256
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout(),
            pitch_placeholder: false,
            cancel_superseded: true,
            event_buffer: default_event_buffer(),
        }
    }
}

/// Sanitized config for API responses
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub upstream: SanitizedUpstreamConfig,
    pub generation: GenerationConfig,
}

/// Upstream config without credentials embedded in the URL
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedUpstreamConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            server: config.server.clone(),
            upstream: SanitizedUpstreamConfig {
                base_url: redact_userinfo(&config.upstream.base_url),
                request_timeout_secs: config.upstream.request_timeout_secs,
                connect_timeout_secs: config.upstream.connect_timeout_secs,
            },
            generation: config.generation.clone(),
        }
    }
}

/// Replace `user:pass@` in a URL authority with `***@`.
fn redact_userinfo(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***{}", scheme, &rest[at..]),
        None => url.to_string(),
    }
}
