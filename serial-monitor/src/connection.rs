//! The monitored connection: one transport plus its line buffer.

use bytes::Bytes;
use std::{io, time::Duration};
use tokio::time;

use crate::{
    config::{self, MonitorConfig},
    error::Result,
    line::LineBuffer,
    tracing::prelude::*,
    transport::{self, Endpoint, Transport},
};

/// An open serial connection with a per-read timeout.
///
/// Owned by exactly one reader. [`Connection::close`] consumes it, so the
/// transport is released once.
pub struct Connection {
    transport: Box<dyn Transport>,
    lines: LineBuffer,
    endpoint: Endpoint,
    baud_rate: u32,
    read_timeout: Duration,
}

/// Open the configured endpoint, ready for [`Connection::read_line`].
///
/// Fails with [`crate::Error::Connection`] when the endpoint cannot be
/// reached or rejects the handshake.
pub async fn open(config: &MonitorConfig) -> Result<Connection> {
    debug!(
        endpoint = %config.endpoint,
        baud = config.serial.baud_rate,
        timeout = ?config.read_timeout,
        "Opening connection"
    );
    let transport = transport::open(config).await?;
    Ok(Connection::new(transport, config))
}

impl Connection {
    /// Wrap an already open transport.
    pub fn new(transport: Box<dyn Transport>, config: &MonitorConfig) -> Self {
        Self {
            transport,
            lines: LineBuffer::new(),
            endpoint: config.endpoint.clone(),
            baud_rate: config.serial.baud_rate,
            read_timeout: config.read_timeout,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Wait up to the read timeout for a complete line.
    ///
    /// Returns the line including its newline, or `None` if the timeout
    /// elapsed first. Bytes of an unfinished line stay buffered for the next
    /// call. A closed or broken connection is an error.
    ///
    /// Cancel safe: dropping the future keeps every byte received so far.
    pub async fn read_line(&mut self) -> io::Result<Option<Bytes>> {
        let deadline = config::deadline_after(self.read_timeout);
        loop {
            if let Some(line) = self.lines.next_line() {
                return Ok(Some(line));
            }

            match time::timeout_at(deadline, self.transport.recv()).await {
                Err(_elapsed) => {
                    if !self.lines.is_empty() {
                        trace!(buffered = self.lines.len(), "Read timed out mid-line");
                    }
                    return Ok(None);
                }
                Ok(Ok(Some(chunk))) => self.lines.extend(&chunk),
                Ok(Ok(None)) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("{} closed the connection", self.endpoint),
                    ));
                }
                Ok(Err(e)) => return Err(e),
            }
        }
    }

    /// Take bytes received after the last newline.
    pub fn take_partial(&mut self) -> Option<Bytes> {
        self.lines.take_partial()
    }

    /// Release the transport.
    pub async fn close(mut self) -> io::Result<()> {
        debug!(endpoint = %self.endpoint, "Closing connection");
        self.transport.close().await
    }
}
