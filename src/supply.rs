//! SCPI bench supply over a raw TCP socket (Rigol DP800 series)

use std::io::Write;
use std::net::TcpStream;
use std::time::Duration;

use icepick_core::sweep::BenchSupply;
use thiserror::Error;

/// Socket timeout for SCPI commands
const SCPI_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors talking to the bench supply
#[derive(Debug, Error)]
pub enum SupplyError {
    /// Could not connect
    #[error("Failed to connect to supply at {addr}: {source}")]
    Connect {
        /// `host:port` that was tried
        addr: String,
        /// Underlying error
        source: std::io::Error,
    },

    /// Socket write failed
    #[error("Supply I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SupplyError> for icepick_core::Error {
    fn from(e: SupplyError) -> Self {
        icepick_core::Error::Probe(e.to_string())
    }
}

/// Format the voltage set command for one output channel
pub fn voltage_command(channel: u8, volts: f64) -> String {
    format!(":SOUR{}:VOLT {:.3}\r\n", channel, volts)
}

/// Supply output driven over SCPI
pub struct ScpiSupply<W: Write = TcpStream> {
    stream: W,
    channel: u8,
}

impl ScpiSupply {
    /// Connect to `addr` (`host:port`) and drive output `channel`
    pub fn connect(addr: &str, channel: u8) -> Result<Self, SupplyError> {
        log::info!("Connecting to bench supply at {}", addr);
        let stream = TcpStream::connect(addr).map_err(|source| SupplyError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(SCPI_TIMEOUT))?;
        Ok(Self { stream, channel })
    }
}

impl<W: Write> ScpiSupply<W> {
    fn send(&mut self, volts: f64) -> Result<(), SupplyError> {
        let cmd = voltage_command(self.channel, volts);
        log::trace!("scpi: {}", cmd.trim_end());
        self.stream.write_all(cmd.as_bytes())?;
        self.stream.flush()?;
        Ok(())
    }
}

impl<W: Write> BenchSupply for ScpiSupply<W> {
    fn set_voltage(&mut self, volts: f64) -> icepick_core::Result<()> {
        Ok(self.send(volts)?)
    }
}
