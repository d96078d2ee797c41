//! Transport layer for serial connections.
//!
//! This module handles the byte-stream side of a monitored serial port: a
//! remote port behind an RFC 2217 bridge, or a local tty. A transport yields
//! raw serial payload without any knowledge of lines; line splitting lives in
//! [`crate::line`].

pub mod rfc2217;
pub mod serial;

use async_trait::async_trait;
use bytes::Bytes;
use std::{fmt, io, str::FromStr};

use crate::{
    config::MonitorConfig,
    error::{Error, Result},
};

/// Scheme prefix accepted for bridge addresses.
pub const RFC2217_SCHEME: &str = "rfc2217://";

/// A source of serial payload bytes.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next chunk of payload.
    ///
    /// Returns `Ok(None)` when the remote end closed the stream. Must be
    /// cancel safe: dropping the future before it completes loses no data.
    async fn recv(&mut self) -> io::Result<Option<Bytes>>;

    /// Release the underlying connection.
    async fn close(&mut self) -> io::Result<()>;
}

/// Where the monitored serial port lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Serial port exported by an RFC 2217 bridge.
    Rfc2217 { host: String, port: u16 },
    /// Serial device attached to this machine.
    Local(String),
}

impl Endpoint {
    /// Shorthand for a bridge endpoint.
    pub fn rfc2217(host: impl Into<String>, port: u16) -> Self {
        Self::Rfc2217 {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Rfc2217 { host, port } if host.contains(':') => {
                write!(f, "{}[{}]:{}", RFC2217_SCHEME, host, port)
            }
            Endpoint::Rfc2217 { host, port } => write!(f, "{}{}:{}", RFC2217_SCHEME, host, port),
            Endpoint::Local(path) => write!(f, "{}", path),
        }
    }
}

impl FromStr for Endpoint {
    type Err = Error;

    /// Parse `rfc2217://host:port`, bare `host:port`, or a local device path.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Config("empty address".to_string()));
        }

        if let Some(rest) = s.strip_prefix(RFC2217_SCHEME) {
            return parse_host_port(rest);
        }
        if let Some((scheme, _)) = s.split_once("://") {
            return Err(Error::Config(format!(
                "unsupported address scheme '{}://'",
                scheme
            )));
        }
        if is_device_path(s) {
            return Ok(Endpoint::Local(s.to_string()));
        }

        parse_host_port(s)
    }
}

fn is_device_path(s: &str) -> bool {
    if s.starts_with('/') {
        return true;
    }
    // Windows style COM1, COM12...
    match (s.get(..3), s.get(3..)) {
        (Some(prefix), Some(number)) => {
            prefix.eq_ignore_ascii_case("com")
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

fn parse_host_port(s: &str) -> Result<Endpoint> {
    let (host, port) = s
        .rsplit_once(':')
        .ok_or_else(|| Error::Config(format!("address '{}' is missing a port", s)))?;

    // Bracketed IPv6 literal, e.g. [::1]:4000
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    if host.is_empty() {
        return Err(Error::Config(format!("address '{}' is missing a host", s)));
    }

    let port = port
        .parse::<u16>()
        .map_err(|e| Error::Config(format!("invalid port '{}': {}", port, e)))?;

    Ok(Endpoint::rfc2217(host, port))
}

/// Open the transport named by the configuration.
///
/// Any failure here is a [`Error::Connection`].
pub async fn open(config: &MonitorConfig) -> Result<Box<dyn Transport>> {
    match &config.endpoint {
        Endpoint::Rfc2217 { host, port } => {
            let port = rfc2217::Rfc2217Port::connect(
                host,
                *port,
                &config.serial,
                config.connect_timeout,
                config.handshake_timeout,
            )
            .await?;
            Ok(Box::new(port))
        }
        Endpoint::Local(path) => {
            let port = serial::LocalSerial::open(path, &config.serial)?;
            Ok(Box::new(port))
        }
    }
}
