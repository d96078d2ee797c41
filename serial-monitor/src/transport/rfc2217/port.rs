//! Serial port reached through an RFC 2217 bridge.

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use futures::SinkExt;
use std::{collections::HashSet, io, time::Duration};
use tokio::{
    io::AsyncWriteExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    time::{self, Instant},
};
use tokio_stream::StreamExt;
use tokio_util::codec::{Encoder, FramedRead, FramedWrite};

use super::{
    control, describe_server_code, option, ComPortCommand, Negotiator, OptionState, TelnetCodec,
    TelnetCommand, TelnetEvent, PURGE_RECEIVE_BUFFER, SERVER_CODE_OFFSET,
};
use crate::{
    config::{self, SerialSettings},
    error::{Error, Result},
    tracing::prelude::*,
    transport::Transport,
};

/// What one inbound frame amounted to.
enum Step {
    Data(Bytes),
    Control,
    Eof,
}

/// An open, configured RFC 2217 session.
pub struct Rfc2217Port {
    reader: FramedRead<OwnedReadHalf, TelnetCodec>,
    writer: FramedWrite<OwnedWriteHalf, TelnetCodec>,
    negotiator: Negotiator,
    /// Server COM port replies seen so far, by server code
    acknowledged: HashSet<u8>,
    requested_baud: u32,
    peer: String,
}

impl Rfc2217Port {
    /// Connect to the bridge and run the handshake.
    ///
    /// Fails with [`Error::Connection`] if the bridge is unreachable, refuses
    /// the COM port option, or does not acknowledge the line settings within
    /// `handshake_timeout`.
    pub async fn connect(
        host: &str,
        port: u16,
        settings: &SerialSettings,
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Result<Self> {
        let peer = format!("{}:{}", host, port);

        let stream = time::timeout(connect_timeout, TcpStream::connect((host, port)))
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "timed out connecting to {} after {:?}",
                    peer, connect_timeout
                ))
            })?
            .map_err(|e| Error::Connection(format!("cannot connect to {}: {}", peer, e)))?;
        // Small telnet frames; don't let Nagle hold them back.
        stream
            .set_nodelay(true)
            .map_err(|e| Error::Connection(format!("cannot configure {}: {}", peer, e)))?;
        debug!(peer = %peer, "TCP connection established");

        let mut port = Self::new(stream, peer, settings.baud_rate);
        port.negotiate_options(handshake_timeout).await?;
        port.configure(settings, handshake_timeout).await?;

        info!(
            peer = %port.peer,
            baud = settings.baud_rate,
            "RFC 2217 port configured"
        );
        Ok(port)
    }

    fn new(stream: TcpStream, peer: String, requested_baud: u32) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: FramedRead::new(read_half, TelnetCodec),
            writer: FramedWrite::new(write_half, TelnetCodec),
            negotiator: Negotiator::new(),
            acknowledged: HashSet::new(),
            requested_baud,
            peer,
        }
    }

    async fn negotiate_options(&mut self, timeout: Duration) -> Result<()> {
        for request in self.negotiator.initial_requests() {
            self.send_handshake(request).await?;
        }

        let deadline = config::deadline_after(timeout);
        loop {
            match self.negotiator.com_port() {
                OptionState::Active => break,
                OptionState::Rejected => {
                    return Err(Error::Connection(format!(
                        "{} refused the RFC 2217 COM-PORT option",
                        self.peer
                    )));
                }
                OptionState::Inactive | OptionState::Requested => {}
            }
            self.handshake_step(deadline, "option negotiation").await?;
        }

        debug!(
            peer = %self.peer,
            binary_out = ?self.negotiator.local_state(option::BINARY),
            binary_in = ?self.negotiator.remote_state(option::BINARY),
            "Telnet options negotiated"
        );
        Ok(())
    }

    async fn configure(&mut self, settings: &SerialSettings, timeout: Duration) -> Result<()> {
        let requests = [
            ComPortCommand::SetBaudRate(settings.baud_rate),
            ComPortCommand::SetDataSize(settings.data_bits),
            ComPortCommand::SetParity(settings.parity),
            ComPortCommand::SetStopSize(settings.stop_bits),
        ];
        for request in requests {
            self.send_handshake(TelnetCommand::ComPort(request)).await?;
        }

        let deadline = config::deadline_after(timeout);
        loop {
            let pending = requests
                .iter()
                .find(|r| !self.acknowledged.contains(&(r.code() + SERVER_CODE_OFFSET)));
            let Some(pending) = pending else {
                break;
            };
            let what = format!("{} acknowledgement", pending.name());
            self.handshake_step(deadline, &what).await?;
        }

        // No acknowledgement required for these; some bridges never send one.
        for request in [
            ComPortCommand::SetControl(control::NO_FLOW_CONTROL),
            ComPortCommand::SetControl(control::DTR_ON),
            ComPortCommand::SetControl(control::RTS_ON),
            ComPortCommand::PurgeData(PURGE_RECEIVE_BUFFER),
        ] {
            self.send_handshake(TelnetCommand::ComPort(request)).await?;
        }
        Ok(())
    }

    async fn send_handshake(&mut self, command: TelnetCommand) -> Result<()> {
        self.writer.send(command).await.map_err(|e| {
            Error::Connection(format!("{} handshake failed: {}", self.peer, e))
        })
    }

    // Process one frame during the handshake. Payload that arrives before the
    // receive buffer is purged was sent at unknown line settings; drop it.
    async fn handshake_step(&mut self, deadline: Instant, waiting_for: &str) -> Result<()> {
        let step = time::timeout_at(deadline, self.step())
            .await
            .map_err(|_| {
                Error::Connection(format!(
                    "{} did not complete {} in time",
                    self.peer, waiting_for
                ))
            })?
            .map_err(|e| Error::Connection(format!("{} handshake failed: {}", self.peer, e)))?;

        match step {
            Step::Data(bytes) => {
                trace!(len = bytes.len(), "Discarding payload received during handshake");
                Ok(())
            }
            Step::Control => Ok(()),
            Step::Eof => Err(Error::Connection(format!(
                "{} closed the connection during {}",
                self.peer, waiting_for
            ))),
        }
    }

    // Read one frame and act on it. Negotiation replies are only queued in
    // the write buffer and go out at the start of the next step, so dropping
    // this future at any await loses neither input nor replies.
    async fn step(&mut self) -> io::Result<Step> {
        if !self.writer.write_buffer().is_empty() {
            self.writer.flush().await?;
        }

        let Some(event) = self.reader.next().await.transpose()? else {
            return Ok(Step::Eof);
        };

        match event {
            TelnetEvent::Data(bytes) => return Ok(Step::Data(bytes)),
            TelnetEvent::Negotiate(verb, opt) => {
                trace!(?verb, option = opt, "Negotiation received");
                if let Some(reply) = self.negotiator.receive(verb, opt) {
                    trace!(?reply, "Negotiation reply queued");
                    TelnetCodec.encode(reply, self.writer.write_buffer_mut())?;
                }
            }
            TelnetEvent::Subnegotiation { option, payload } => {
                self.handle_subnegotiation(option, payload);
            }
            TelnetEvent::Command(command) => {
                trace!(command, "Ignoring telnet command");
            }
        }
        Ok(Step::Control)
    }

    fn handle_subnegotiation(&mut self, opt: u8, mut payload: Bytes) {
        if opt != option::COM_PORT_OPTION || payload.is_empty() {
            trace!(option = opt, len = payload.len(), "Ignoring subnegotiation");
            return;
        }

        let code = payload.get_u8();
        trace!(
            code,
            kind = describe_server_code(code),
            value = ?payload.as_ref(),
            "COM port notification"
        );

        if code == ComPortCommand::SetBaudRate(0).code() + SERVER_CODE_OFFSET
            && payload.len() == 4
        {
            let baud = payload.get_u32();
            if baud != self.requested_baud {
                warn!(
                    requested = self.requested_baud,
                    actual = baud,
                    "Bridge set a different baud rate"
                );
            }
        }
        self.acknowledged.insert(code);
    }
}

#[async_trait]
impl Transport for Rfc2217Port {
    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        loop {
            match self.step().await? {
                Step::Data(bytes) => return Ok(Some(bytes)),
                Step::Control => continue,
                Step::Eof => return Ok(None),
            }
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        debug!(peer = %self.peer, "Closing RFC 2217 connection");
        self.writer.flush().await?;
        self.writer.get_mut().shutdown().await
    }
}
