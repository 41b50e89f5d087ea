//! Serial port channel

use crate::channel::{ByteChannel, StreamChannel};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::SerialStream;
use ziv_core::{SerialConfig, TransportError};

/// Serial port settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
}

impl SerialSettings {
    /// 8N1 without flow control, as the meter's port expects
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
        }
    }
}

impl From<&SerialConfig> for SerialSettings {
    fn from(config: &SerialConfig) -> Self {
        Self::new(config.port.clone(), config.baud_rate)
    }
}

/// SerialStream with a Debug impl
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

impl AsyncRead for DebugSerialStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for DebugSerialStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// [`ByteChannel`] over a UART
#[derive(Debug)]
pub struct SerialChannel {
    port_name: String,
    inner: StreamChannel<DebugSerialStream>,
}

impl SerialChannel {
    /// Open the serial port
    pub fn open(settings: &SerialSettings) -> Result<Self, tokio_serial::Error> {
        let builder = tokio_serial::new(&settings.port_name, settings.baud_rate)
            .data_bits(settings.data_bits)
            .stop_bits(settings.stop_bits)
            .parity(settings.parity)
            .flow_control(settings.flow_control);

        let stream = SerialStream::open(&builder)?;
        log::info!(
            "Opened serial port {} at {} baud",
            settings.port_name,
            settings.baud_rate
        );

        Ok(Self {
            port_name: settings.port_name.clone(),
            inner: StreamChannel::new(DebugSerialStream(stream)),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl ByteChannel for SerialChannel {
    async fn write(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.inner.write(bytes).await
    }

    async fn read_with_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.inner.read_with_timeout(timeout).await
    }
}
