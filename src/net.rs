use anyhow::{anyhow, Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use crate::packet::max_datagram_len;
use crate::traits::SampleSource;

pub fn create_listen_socket(bind_addr: &str, port: u16, recv_timeout: Duration) -> Result<UdpSocket> {
    let ip: Ipv4Addr = bind_addr
        .parse()
        .map_err(|e| anyhow!("Invalid bind address {}: {}", bind_addr, e))?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;

    let addr = SocketAddrV4::new(ip, port);
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind UDP {}", addr))?;

    // Zero would mean "block forever"
    let timeout = if recv_timeout.is_zero() { Duration::from_millis(1) } else { recv_timeout };
    socket.set_read_timeout(Some(timeout))?;

    Ok(socket.into())
}

/// Live source: one UDP socket listening for sensor node datagrams.
pub struct UdpSource {
    bind_addr: String,
    port: u16,
    recv_timeout: Duration,
    sock: Option<UdpSocket>,
    buf: Vec<u8>,
}

impl UdpSource {
    /// The receive buffer holds exactly one `max_batch` datagram. Anything
    /// bigger is truncated by the kernel and then rejected by the decoder.
    pub fn new(bind_addr: &str, port: u16, recv_timeout: Duration, max_batch: u16) -> Self {
        UdpSource {
            bind_addr: bind_addr.to_string(),
            port,
            recv_timeout,
            sock: None,
            buf: vec![0u8; max_datagram_len(max_batch)],
        }
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.sock.as_ref().and_then(|s| s.local_addr().ok())
    }
}

impl SampleSource for UdpSource {
    fn setup(&mut self) -> Result<()> {
        let sock = create_listen_socket(&self.bind_addr, self.port, self.recv_timeout)?;
        log::info!("Listening for sensor node on udp://{}:{}", self.bind_addr, self.port);
        self.sock = Some(sock);
        Ok(())
    }

    fn receive_batch(&mut self) -> Result<Option<Vec<u8>>> {
        let sock = self
            .sock
            .as_ref()
            .ok_or_else(|| anyhow!("UDP source used before setup()"))?;

        match sock.recv_from(&mut self.buf) {
            Ok((size, from)) => {
                log::debug!("[Net] {} bytes from {}", size, from);
                Ok(Some(self.buf[..size].to_vec()))
            }
            Err(ref e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
