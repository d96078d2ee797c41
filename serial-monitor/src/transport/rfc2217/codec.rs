//! Telnet framing for RFC 2217 sessions.
//!
//! [`TelnetCodec`] splits the inbound stream into payload runs and telnet
//! control frames, and serializes outbound negotiation and subnegotiation
//! frames. It knows nothing about option state; see
//! [`super::negotiation`] for that.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};

use super::{cmd, option, ComPortCommand, Verb};

/// Longest subnegotiation payload accepted before the stream is declared
/// corrupt.
pub const MAX_SUBNEGOTIATION_LEN: usize = 4096;

/// One unit of inbound telnet traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetEvent {
    /// Serial payload, already unescaped. Never empty.
    Data(Bytes),
    /// `IAC <verb> <option>`
    Negotiate(Verb, u8),
    /// `IAC SB <option> <payload> IAC SE`, payload unescaped
    Subnegotiation { option: u8, payload: Bytes },
    /// Any other two-byte `IAC <command>`
    Command(u8),
}

/// One unit of outbound telnet traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TelnetCommand {
    Negotiate(Verb, u8),
    ComPort(ComPortCommand),
    /// Raw subnegotiation; the payload is escaped on encode.
    Subnegotiate { option: u8, payload: Bytes },
}

#[derive(Debug, Default)]
pub struct TelnetCodec;

impl Decoder for TelnetCodec {
    type Item = TelnetEvent;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        if src[0] != cmd::IAC {
            let end = src.iter().position(|&b| b == cmd::IAC).unwrap_or(src.len());
            return Ok(Some(TelnetEvent::Data(src.split_to(end).freeze())));
        }

        if src.len() < 2 {
            return Ok(None);
        }

        match src[1] {
            cmd::IAC => {
                src.advance(2);
                Ok(Some(TelnetEvent::Data(Bytes::from_static(&[cmd::IAC]))))
            }
            byte @ (cmd::WILL | cmd::WONT | cmd::DO | cmd::DONT) => {
                if src.len() < 3 {
                    return Ok(None);
                }
                let opt = src[2];
                src.advance(3);
                // from_byte cannot fail for the four verbs matched above
                let verb = Verb::from_byte(byte)
                    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad verb"))?;
                Ok(Some(TelnetEvent::Negotiate(verb, opt)))
            }
            cmd::SB => decode_subnegotiation(src),
            command => {
                src.advance(2);
                Ok(Some(TelnetEvent::Command(command)))
            }
        }
    }
}

// Called with src starting at IAC SB. Leaves src untouched until the closing
// IAC SE has arrived.
fn decode_subnegotiation(src: &mut BytesMut) -> io::Result<Option<TelnetEvent>> {
    if src.len() < 3 {
        return Ok(None);
    }
    let opt = src[2];

    let mut payload = BytesMut::new();
    let mut i = 3;
    loop {
        if payload.len() > MAX_SUBNEGOTIATION_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "subnegotiation for option {} exceeds {} bytes",
                    opt, MAX_SUBNEGOTIATION_LEN
                ),
            ));
        }
        let Some(&byte) = src.get(i) else {
            return Ok(None);
        };
        if byte != cmd::IAC {
            payload.put_u8(byte);
            i += 1;
            continue;
        }
        let Some(&next) = src.get(i + 1) else {
            return Ok(None);
        };
        match next {
            cmd::IAC => {
                payload.put_u8(cmd::IAC);
                i += 2;
            }
            cmd::SE => {
                src.advance(i + 2);
                return Ok(Some(TelnetEvent::Subnegotiation {
                    option: opt,
                    payload: payload.freeze(),
                }));
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "unexpected IAC {} inside subnegotiation for option {}",
                        other, opt
                    ),
                ));
            }
        }
    }
}

fn put_escaped(dst: &mut BytesMut, bytes: &[u8]) {
    for &b in bytes {
        if b == cmd::IAC {
            dst.put_u8(cmd::IAC);
        }
        dst.put_u8(b);
    }
}

fn put_subnegotiation(dst: &mut BytesMut, opt: u8, payload: &[u8]) {
    dst.put_slice(&[cmd::IAC, cmd::SB, opt]);
    put_escaped(dst, payload);
    dst.put_slice(&[cmd::IAC, cmd::SE]);
}

impl Encoder<TelnetCommand> for TelnetCodec {
    type Error = io::Error;

    fn encode(&mut self, command: TelnetCommand, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match command {
            TelnetCommand::Negotiate(verb, opt) => {
                dst.put_slice(&[cmd::IAC, verb.as_byte(), opt]);
            }
            TelnetCommand::ComPort(request) => {
                put_subnegotiation(dst, option::COM_PORT_OPTION, &request.payload());
            }
            TelnetCommand::Subnegotiate { option, payload } => {
                put_subnegotiation(dst, option, &payload);
            }
        }
        Ok(())
    }
}
