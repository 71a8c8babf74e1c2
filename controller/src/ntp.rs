use std::{
    io::ErrorKind,
    net::{IpAddr, SocketAddr},
    time::Duration,
};

use irrigation_common::{
    ntp::{build_request, parse_reply, NTP_PACKET_SIZE, NTP_PORT},
    NtpError,
};
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no reply within {0:?}")]
    Timeout(Duration),
    #[error("ntp socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad ntp reply: {0}")]
    Reply(#[from] NtpError),
}

/// SNTP client over one long-lived UDP socket.
pub struct NtpClient {
    socket: UdpSocket,
    server: String,
    timeout: Duration,
}

impl NtpClient {
    pub async fn bind(server: impl Into<String>, timeout: Duration) -> std::io::Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            server: with_default_port(&server.into()),
            timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// One request/reply exchange, name lookup included, waiting at most the
    /// configured timeout. Returns unix seconds.
    pub async fn fetch_unix_secs(&self) -> Result<u32, SyncError> {
        self.discard_pending();

        let mut reply = [0_u8; 2 * NTP_PACKET_SIZE];
        let exchange = async {
            self.socket
                .send_to(&build_request(), self.server.as_str())
                .await?;
            self.socket.recv_from(&mut reply).await
        };
        let (len, from) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| SyncError::Timeout(self.timeout))??;
        debug!(%from, len, "ntp reply received");

        Ok(parse_reply(&reply[..len])?)
    }

    fn discard_pending(&self) {
        let mut scratch = [0_u8; 2 * NTP_PACKET_SIZE];
        let mut discarded = 0;
        loop {
            match self.socket.try_recv_from(&mut scratch) {
                Ok(_) => discarded += 1,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(%err, "ntp socket drain stopped");
                    break;
                }
            }
        }
        if discarded > 0 {
            debug!(discarded, "discarded stale ntp datagrams");
        }
    }
}

/// Appends the NTP port to a server given without one.
fn with_default_port(server: &str) -> String {
    if server.parse::<SocketAddr>().is_ok() {
        return server.to_string();
    }
    if let Ok(ip) = server.parse::<IpAddr>() {
        return SocketAddr::new(ip, NTP_PORT).to_string();
    }
    match server.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {
            server.to_string()
        }
        _ => format!("{server}:{NTP_PORT}"),
    }
}
