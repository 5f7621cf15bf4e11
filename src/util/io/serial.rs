// src/util/io/serial.rs
//! Command port - the byte stream the host talks to us over.
//!
//! A serial device when a path is configured, otherwise this process's
//! stdin/stdout.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_serial::SerialPortBuilderExt;

use crate::config::PortConfig;
use crate::error::Result;
use crate::log_info;
use crate::util::io::records::Record;

pub type PortReader = Box<dyn AsyncRead + Unpin + Send>;
pub type PortWriter = Box<dyn AsyncWrite + Unpin + Send>;

pub struct CommandPort {
    pub name: String,
    pub reader: PortReader,
    pub writer: PortWriter,
}

impl CommandPort {
    pub fn open(config: &PortConfig) -> Result<Self> {
        match &config.path {
            Some(path) => Self::open_serial(path, config.baud_rate),
            None => Ok(Self::stdio()),
        }
    }

    pub fn open_serial(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate).open_native_async()?;
        log_info!("Serial port {} opened at {} baud", path, baud_rate);

        let (reader, writer) = tokio::io::split(port);
        Ok(Self {
            name: path.to_string(),
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }

    pub fn stdio() -> Self {
        log_info!("No serial port configured, using stdio");
        Self {
            name: "stdio".to_string(),
            reader: Box::new(tokio::io::stdin()),
            writer: Box::new(tokio::io::stdout()),
        }
    }

    /// Assemble from any byte streams
    pub fn from_parts(name: impl Into<String>, reader: PortReader, writer: PortWriter) -> Self {
        Self {
            name: name.into(),
            reader,
            writer,
        }
    }
}

/// One record, CRLF terminated, flushed
pub async fn write_record(writer: &mut PortWriter, record: &Record) -> Result<()> {
    writer.write_all(record.to_wire().as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}
