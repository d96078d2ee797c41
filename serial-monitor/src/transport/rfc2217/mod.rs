//! RFC 2217 (telnet COM-PORT-OPTION) client.
//!
//! An RFC 2217 bridge exposes a serial port as a telnet session. Serial
//! payload travels in-band with `0xFF` escaped as `IAC IAC`; port settings
//! travel as `IAC SB COM-PORT-OPTION <code> <value> IAC SE` subnegotiations,
//! which the server acknowledges with the same code plus 100.
//!
//! # Handshake
//!
//! 1. Offer `WILL COM-PORT-OPTION` plus binary mode and wait for the server to
//!    accept the COM port option.
//! 2. Send baud rate, data size, parity and stop size, and wait for all four
//!    acknowledgements.
//! 3. Disable flow control, raise DTR and RTS, purge the receive buffer.
//!
//! After that the port is a plain byte source; negotiation requests the
//! server sends later are answered inline while reading.

mod codec;
mod negotiation;
mod port;

use bytes::{BufMut, BytesMut};
use tokio_serial::{DataBits, Parity, StopBits};

pub use codec::{TelnetCodec, TelnetCommand, TelnetEvent, MAX_SUBNEGOTIATION_LEN};
pub use negotiation::{Negotiator, OptionState};
pub use port::Rfc2217Port;

/// Telnet command bytes.
pub mod cmd {
    pub const SE: u8 = 240;
    pub const NOP: u8 = 241;
    pub const SB: u8 = 250;
    pub const WILL: u8 = 251;
    pub const WONT: u8 = 252;
    pub const DO: u8 = 253;
    pub const DONT: u8 = 254;
    pub const IAC: u8 = 255;
}

/// Telnet option codes.
pub mod option {
    pub const BINARY: u8 = 0;
    pub const ECHO: u8 = 1;
    pub const SGA: u8 = 3;
    pub const COM_PORT_OPTION: u8 = 44;
}

/// Offset between a client COM port request code and the server's reply.
pub const SERVER_CODE_OFFSET: u8 = 100;

/// Client COM port codes.
mod com {
    pub const SET_BAUDRATE: u8 = 1;
    pub const SET_DATASIZE: u8 = 2;
    pub const SET_PARITY: u8 = 3;
    pub const SET_STOPSIZE: u8 = 4;
    pub const SET_CONTROL: u8 = 5;
    pub const NOTIFY_LINESTATE: u8 = 6;
    pub const NOTIFY_MODEMSTATE: u8 = 7;
    pub const PURGE_DATA: u8 = 12;
}

/// `SET-CONTROL` values.
pub mod control {
    pub const NO_FLOW_CONTROL: u8 = 1;
    pub const DTR_ON: u8 = 8;
    pub const RTS_ON: u8 = 11;
}

/// `PURGE-DATA` value for the access server's receive buffer.
pub const PURGE_RECEIVE_BUFFER: u8 = 1;

/// Telnet negotiation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Will,
    Wont,
    Do,
    Dont,
}

impl Verb {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            cmd::WILL => Some(Verb::Will),
            cmd::WONT => Some(Verb::Wont),
            cmd::DO => Some(Verb::Do),
            cmd::DONT => Some(Verb::Dont),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Verb::Will => cmd::WILL,
            Verb::Wont => cmd::WONT,
            Verb::Do => cmd::DO,
            Verb::Dont => cmd::DONT,
        }
    }
}

/// A COM-PORT-OPTION request sent by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComPortCommand {
    SetBaudRate(u32),
    SetDataSize(DataBits),
    SetParity(Parity),
    SetStopSize(StopBits),
    SetControl(u8),
    PurgeData(u8),
}

impl ComPortCommand {
    /// Client-side code; the server acknowledges with `code() + 100`.
    pub fn code(&self) -> u8 {
        match self {
            ComPortCommand::SetBaudRate(_) => com::SET_BAUDRATE,
            ComPortCommand::SetDataSize(_) => com::SET_DATASIZE,
            ComPortCommand::SetParity(_) => com::SET_PARITY,
            ComPortCommand::SetStopSize(_) => com::SET_STOPSIZE,
            ComPortCommand::SetControl(_) => com::SET_CONTROL,
            ComPortCommand::PurgeData(_) => com::PURGE_DATA,
        }
    }

    /// Human readable parameter name for diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            ComPortCommand::SetBaudRate(_) => "baud rate",
            ComPortCommand::SetDataSize(_) => "data size",
            ComPortCommand::SetParity(_) => "parity",
            ComPortCommand::SetStopSize(_) => "stop size",
            ComPortCommand::SetControl(_) => "control",
            ComPortCommand::PurgeData(_) => "purge",
        }
    }

    /// Unescaped subnegotiation payload: code followed by value.
    pub fn payload(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(5);
        buf.put_u8(self.code());
        match *self {
            ComPortCommand::SetBaudRate(baud) => buf.put_u32(baud),
            ComPortCommand::SetDataSize(bits) => buf.put_u8(match bits {
                DataBits::Five => 5,
                DataBits::Six => 6,
                DataBits::Seven => 7,
                DataBits::Eight => 8,
            }),
            ComPortCommand::SetParity(parity) => buf.put_u8(match parity {
                Parity::None => 1,
                Parity::Odd => 2,
                Parity::Even => 3,
            }),
            ComPortCommand::SetStopSize(stop) => buf.put_u8(match stop {
                StopBits::One => 1,
                StopBits::Two => 2,
            }),
            ComPortCommand::SetControl(value) | ComPortCommand::PurgeData(value) => {
                buf.put_u8(value)
            }
        }
        buf
    }
}

/// Describe a server COM port subnegotiation for logging.
pub(crate) fn describe_server_code(code: u8) -> &'static str {
    match code.checked_sub(SERVER_CODE_OFFSET) {
        Some(com::SET_BAUDRATE) => "baud rate ack",
        Some(com::SET_DATASIZE) => "data size ack",
        Some(com::SET_PARITY) => "parity ack",
        Some(com::SET_STOPSIZE) => "stop size ack",
        Some(com::SET_CONTROL) => "control ack",
        Some(com::NOTIFY_LINESTATE) => "line state",
        Some(com::NOTIFY_MODEMSTATE) => "modem state",
        Some(com::PURGE_DATA) => "purge ack",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baud_rate_payload_is_big_endian() {
        let payload = ComPortCommand::SetBaudRate(115_200).payload();
        assert_eq!(&payload[..], &[1, 0x00, 0x01, 0xc2, 0x00]);
    }

    #[test]
    fn test_8n1_payloads() {
        assert_eq!(&ComPortCommand::SetDataSize(DataBits::Eight).payload()[..], &[2, 8]);
        assert_eq!(&ComPortCommand::SetParity(Parity::None).payload()[..], &[3, 1]);
        assert_eq!(&ComPortCommand::SetStopSize(StopBits::One).payload()[..], &[4, 1]);
    }

    #[test]
    fn test_verb_bytes() {
        for verb in [Verb::Will, Verb::Wont, Verb::Do, Verb::Dont] {
            assert_eq!(Verb::from_byte(verb.as_byte()), Some(verb));
        }
        assert_eq!(Verb::from_byte(cmd::SB), None);
    }

    #[test]
    fn test_describe_server_code() {
        assert_eq!(describe_server_code(101), "baud rate ack");
        assert_eq!(describe_server_code(106), "line state");
        assert_eq!(describe_server_code(7), "unknown");
    }
}
