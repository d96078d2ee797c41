//! Serial device attached to this machine.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_stream::StreamExt;
use tokio_util::codec::{BytesCodec, FramedRead};

use crate::{
    config::SerialSettings,
    error::{Error, Result},
    tracing::prelude::*,
    transport::Transport,
};

/// A local tty read in whatever chunks the driver delivers.
pub struct LocalSerial {
    reader: FramedRead<SerialStream, BytesCodec>,
    path: String,
}

impl LocalSerial {
    /// Open `path` with the given line settings.
    pub fn open(path: &str, settings: &SerialSettings) -> Result<Self> {
        let stream = tokio_serial::new(path, settings.baud_rate)
            .data_bits(settings.data_bits)
            .parity(settings.parity)
            .stop_bits(settings.stop_bits)
            .open_native_async()
            .map_err(|e| Error::Connection(format!("cannot open {}: {}", path, e)))?;

        info!(path, baud = settings.baud_rate, "Serial port opened");
        Ok(Self {
            reader: FramedRead::new(stream, BytesCodec::new()),
            path: path.to_string(),
        })
    }
}

#[async_trait]
impl Transport for LocalSerial {
    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        match self.reader.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk.freeze())),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        // The descriptor is released when the stream drops; nothing is
        // buffered on the write side.
        debug!(path = %self.path, "Closing serial port");
        Ok(())
    }
}
