//! Handshake line emitted on stdout once the listener is bound.
//!
//! The host process spawns the plugin and synchronously reads exactly one
//! line from its stdout to learn how to connect:
//!
//! ```text
//! <CORE_PROTOCOL_VERSION>|<APP_PROTOCOL_VERSION>|<NETWORK>|<ADDRESS>|<PROTOCOL>|<SERVER_CERT_B64>
//! ```
//!
//! e.g. `1|6|tcp|127.0.0.1:54321|grpc|MIIB...==`. Emitting before the
//! listener is ready is a protocol violation - the host may connect
//! immediately after reading the line.

use std::fmt;
use std::io::Write;

use crate::error::{Error, Result};

/// Version of the handshake line layout itself.
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Version of the application protocol spoken over the connection.
pub const APP_PROTOCOL_VERSION: u32 = 6;

/// Network type field. Plugins always listen on TCP loopback.
pub const NETWORK: &str = "tcp";

/// Wire protocol field.
pub const PROTOCOL: &str = "grpc";

/// Loopback address plugins bind to; never a wildcard interface.
pub const LOOPBACK_ADDR: &str = "127.0.0.1";

/// The single announcement line a plugin writes to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    port: u16,
    cert_b64: String,
}

impl HandshakeLine {
    /// Build the handshake line for a bound port and encoded certificate.
    pub fn new(port: u16, cert_b64: impl Into<String>) -> Self {
        Self {
            port,
            cert_b64: cert_b64.into(),
        }
    }

    /// The bound port the line advertises.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Base64 DER certificate carried in the last field.
    pub fn cert_b64(&self) -> &str {
        &self.cert_b64
    }

    /// Write the line to stdout, newline-terminated, and flush.
    ///
    /// Must be called exactly once, after the listener is bound and before
    /// the process blocks serving requests. A broken stdout pipe is fatal:
    /// the host cannot learn how to connect.
    pub fn emit(&self) -> Result<()> {
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        self.emit_to(&mut out)
    }

    /// Write the line to an arbitrary writer and flush.
    pub fn emit_to<W: Write>(&self, out: &mut W) -> Result<()> {
        writeln!(out, "{}", self).map_err(Error::HandshakeWrite)?;
        out.flush().map_err(Error::HandshakeWrite)
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}:{}|{}|{}",
            CORE_PROTOCOL_VERSION,
            APP_PROTOCOL_VERSION,
            NETWORK,
            LOOPBACK_ADDR,
            self.port,
            PROTOCOL,
            self.cert_b64
        )
    }
}
