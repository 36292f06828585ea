//! Models an LXI device attached through its raw TCP socket interface.
//!
//! A [`Device`] exclusively owns one connection. All operations run on the
//! caller's task and the read deadline is re-armed at the start of every
//! read, so a timeout change via [`Device::set_timeout`] takes effect on the
//! next read.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

use crate::resource::VisaResource;
use crate::Error;

/// A single SCPI/ASCII connection to an LXI instrument.
///
/// Open with a VISA resource string and a read timeout in milliseconds,
/// where 0 means "block until data arrives":
///
/// ```no_run
/// # async fn example() -> lxi::Result<()> {
/// use lxi::Device;
///
/// let mut device = Device::open("TCPIP::192.168.1.10::5025::SOCKET", 1000).await?;
/// let idn = device.query("*IDN?").await?;
/// device.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Device {
    stream: Option<TcpStream>,
    timeout_ms: u32,
}

impl Device {
    /// Open a TCPIP device using the given VISA resource string.
    ///
    /// The resource string is parsed before any network activity, so a
    /// malformed string never dials. The dial itself uses the transport's
    /// default connect behavior without an extra timeout.
    pub async fn open(address: &str, timeout_ms: u32) -> crate::Result<Device> {
        let resource = VisaResource::parse(address)?;
        let stream = TcpStream::connect((resource.host.as_str(), resource.port)).await?;
        log::debug!("connected to {}", resource);
        Ok(Device {
            stream: Some(stream),
            timeout_ms,
        })
    }

    fn stream(&mut self) -> crate::Result<&mut TcpStream> {
        self.stream.as_mut().ok_or(Error::Disconnected)
    }

    /// Write raw bytes to the connection. The whole buffer is written; no
    /// read deadline applies to writes.
    pub async fn write(&mut self, data: &[u8]) -> crate::Result<usize> {
        let stream = self.stream()?;
        log::debug!("write: {:?}", data);
        stream.write_all(data).await?;
        Ok(data.len())
    }

    /// Write a string to the connection.
    pub async fn write_str(&mut self, data: &str) -> crate::Result<usize> {
        self.write(data.as_bytes()).await
    }

    /// Perform a single read into the given buffer, returning the number of
    /// bytes read. If the stored timeout is greater than 0 the read is
    /// bounded by it and expiry yields [`Error::Timeout`]; a timeout of 0
    /// blocks until data arrives or the connection closes.
    pub async fn read(&mut self, buf: &mut [u8]) -> crate::Result<usize> {
        let timeout_ms = self.timeout_ms;
        let stream = self.stream()?;
        let fut = stream.read(buf);
        let num_read = if timeout_ms > 0 {
            match timeout(Duration::from_millis(timeout_ms as u64), fut).await {
                Ok(x) => x?,
                Err(_) => return Err(Error::Timeout),
            }
        } else {
            fut.await?
        };
        log::debug!("read: {:?}", &buf[..num_read]);
        Ok(num_read)
    }

    /// Send an SCPI/ASCII command. Surrounding whitespace is trimmed and a
    /// single newline is appended. Format arguments are the caller's
    /// business: `device.command(&format!("VOLT {}", 5.0))`.
    pub async fn command(&mut self, cmd: &str) -> crate::Result<()> {
        let line = format!("{}\n", cmd.trim());
        self.write(line.as_bytes()).await?;
        Ok(())
    }

    /// Send a command and read the response up to and including the first
    /// newline. The accumulated response is bounded by one deadline per the
    /// stored timeout, like [`Device::read`].
    ///
    /// An empty `cmd` skips the write and goes straight to reading, which is
    /// how asynchronous output of an already-issued command is collected.
    pub async fn query(&mut self, cmd: &str) -> crate::Result<String> {
        if !cmd.is_empty() {
            self.command(cmd).await?;
        }
        let timeout_ms = self.timeout_ms;
        let stream = self.stream()?;
        let data = if timeout_ms > 0 {
            match timeout(Duration::from_millis(timeout_ms as u64), read_line(stream)).await {
                Ok(x) => x?,
                Err(_) => return Err(Error::Timeout),
            }
        } else {
            read_line(stream).await?
        };
        log::debug!("read: {:?}", data);
        Ok(String::from_utf8(data)?)
    }

    /// Replace the stored read timeout in milliseconds. Takes effect on the
    /// next read, not on a read already in flight.
    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.timeout_ms = timeout_ms;
    }

    /// The stored read timeout in milliseconds.
    pub fn timeout(&self) -> u32 {
        self.timeout_ms
    }

    /// Shut down and release the underlying connection. Closing is
    /// idempotent; any other operation on a closed device returns
    /// [`Error::Disconnected`].
    pub async fn close(&mut self) -> crate::Result<()> {
        if let Some(mut stream) = self.stream.take() {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Read until the first newline, inclusive.
async fn read_line(stream: &mut TcpStream) -> crate::Result<Vec<u8>> {
    let mut ret = Vec::new();
    loop {
        let x = stream.read_u8().await?;
        ret.push(x);
        if x == b'\n' {
            break;
        }
    }
    Ok(ret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Instant;
    use tokio::net::TcpListener;
    use tokio::time::sleep;

    fn resource(addr: &SocketAddr) -> String {
        format!("TCPIP::{}::{}::SOCKET", addr.ip(), addr.port())
    }

    /// Instrument emulator that echoes everything it receives.
    async fn spawn_echo() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            loop {
                let num_read = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(x) => x,
                };
                if stream.write_all(&buf[..num_read]).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    /// Instrument emulator that accepts the connection but never answers.
    async fn spawn_silent() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            sleep(Duration::from_secs(3600)).await;
        });
        addr
    }

    /// Instrument emulator that answers after the given delay.
    async fn spawn_delayed(delay: Duration, response: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            sleep(delay).await;
            stream.write_all(response).await.unwrap();
            sleep(Duration::from_secs(3600)).await;
        });
        addr
    }

    #[tokio::test]
    async fn command_then_read_echoes_with_newline() {
        let addr = spawn_echo().await;
        let mut device = Device::open(&resource(&addr), 1000).await.unwrap();
        device.command("*IDN?").await.unwrap();

        let mut out = Vec::new();
        let mut buf = [0u8; 64];
        while !out.ends_with(b"\n") {
            let num_read = device.read(&mut buf).await.unwrap();
            out.extend_from_slice(&buf[..num_read]);
        }
        assert_eq!(out, b"*IDN?\n");
    }

    #[tokio::test]
    async fn command_trims_and_appends_newline() {
        let addr = spawn_echo().await;
        let mut device = Device::open(&resource(&addr), 1000).await.unwrap();

        // the echo returns exactly the bytes that went over the wire
        let echoed = device.query(&format!("  {}={}  ", "VOLT", 5)).await.unwrap();
        assert_eq!(echoed, "VOLT=5\n");
    }

    #[tokio::test]
    async fn query_returns_line_including_newline() {
        let addr = spawn_echo().await;
        let mut device = Device::open(&resource(&addr), 1000).await.unwrap();
        let ret = device.query("*IDN?").await.unwrap();
        assert_eq!(ret, "*IDN?\n");
        assert!(ret.ends_with('\n'));
    }

    #[tokio::test]
    async fn write_returns_byte_count() {
        let addr = spawn_echo().await;
        let mut device = Device::open(&resource(&addr), 1000).await.unwrap();
        let num_written = device.write_str("SYST:ERR?\n").await.unwrap();
        assert_eq!(num_written, 10);
    }

    #[tokio::test]
    async fn device_is_debug_printable() {
        let addr = spawn_echo().await;
        let device = Device::open(&resource(&addr), 1000).await.unwrap();
        let rendered = format!("{:?}", device);
        assert!(rendered.contains("Device"));
    }

    #[tokio::test]
    async fn query_times_out_on_silent_instrument() {
        let addr = spawn_silent().await;
        let mut device = Device::open(&resource(&addr), 250).await.unwrap();

        let start = Instant::now();
        let err = device.query("*IDN?").await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, Error::Timeout));
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_millis(2500));
    }

    #[tokio::test]
    async fn zero_timeout_blocks_until_data_arrives() {
        let delay = Duration::from_millis(300);
        let addr = spawn_delayed(delay, b"1.25\n").await;
        let mut device = Device::open(&resource(&addr), 0).await.unwrap();

        let start = Instant::now();
        let ret = device.query("").await.unwrap();
        assert_eq!(ret, "1.25\n");
        assert!(start.elapsed() >= delay);
    }

    #[tokio::test]
    async fn set_timeout_applies_to_next_read() {
        let addr = spawn_silent().await;
        let mut device = Device::open(&resource(&addr), 0).await.unwrap();
        assert_eq!(device.timeout(), 0);

        device.set_timeout(100);
        let mut buf = [0u8; 16];
        let err = device.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn closed_device_returns_disconnected() {
        let addr = spawn_echo().await;
        let mut device = Device::open(&resource(&addr), 1000).await.unwrap();
        device.close().await.unwrap();

        let mut buf = [0u8; 16];
        assert!(matches!(
            device.write(b"*RST\n").await.unwrap_err(),
            Error::Disconnected
        ));
        assert!(matches!(
            device.read(&mut buf).await.unwrap_err(),
            Error::Disconnected
        ));
        assert!(matches!(
            device.query("*IDN?").await.unwrap_err(),
            Error::Disconnected
        ));
        assert!(matches!(
            device.query("").await.unwrap_err(),
            Error::Disconnected
        ));

        // closing twice is fine
        device.close().await.unwrap();
    }

    #[tokio::test]
    async fn open_rejects_bad_resource_without_dialing() {
        let err = Device::open("GPIB0::5::INSTR", 100).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedInterface(_)));
    }

    #[tokio::test]
    async fn open_surfaces_dial_failure() {
        // bind and drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = Device::open(&resource(&addr), 100).await.unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
