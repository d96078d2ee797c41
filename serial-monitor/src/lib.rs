//! Serial line monitor.
//!
//! Opens a serial port, either behind an RFC 2217 network bridge or attached
//! locally, and prints every newline-terminated line it receives until told
//! to stop.
//!
//! ```rust,ignore
//! let config = MonitorConfig::new("rfc2217://localhost:4000".parse()?);
//! let connection = connection::open(&config).await?;
//! monitor::run(connection, shutdown_token, &mut std::io::stdout()).await?;
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod line;
pub mod monitor;
pub mod tracing;
pub mod transport;

pub use config::{MonitorConfig, SerialSettings};
pub use connection::Connection;
pub use error::{Error, Result};
pub use transport::Endpoint;
