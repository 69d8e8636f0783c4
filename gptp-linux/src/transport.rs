//! A development transport: structured messages as JSON over UDP
//!
//! Every port of every domain has its own socket and a single link peer.
//! Timestamps are taken in software, right after a send or receive
//! completes. This is good enough for lab setups on a quiet network, and it
//! is not compatible with the 802.1AS wire format.

use std::net::SocketAddr;

use gptp::Message;
use tokio::net::UdpSocket;

/// Upper bound on the size of an encoded message
pub const MAX_MESSAGE_SIZE: usize = 2048;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("message of {0} bytes exceeds the maximum size")]
    TooLarge(usize),
}

#[derive(Debug)]
pub struct PortSocket {
    socket: UdpSocket,
    peer: SocketAddr,
}

impl PortSocket {
    /// Bind the socket. Must be called from within the runtime.
    pub fn bind(bind: SocketAddr, peer: SocketAddr) -> std::io::Result<Self> {
        let socket = std::net::UdpSocket::bind(bind)?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket)?;

        Ok(PortSocket { socket, peer })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let data = serde_json::to_vec(message)?;
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(TransportError::TooLarge(data.len()));
        }

        self.socket.send_to(&data, self.peer).await?;
        Ok(())
    }

    /// Wait for the next message from the peer. Datagrams from other senders
    /// and datagrams that don't decode are dropped.
    pub async fn recv(&self, buffer: &mut [u8; MAX_MESSAGE_SIZE]) -> std::io::Result<Message> {
        loop {
            let (length, sender) = self.socket.recv_from(buffer).await?;
            if sender != self.peer {
                tracing::trace!("Dropping datagram from unknown sender {}", sender);
                continue;
            }

            match serde_json::from_slice(&buffer[..length]) {
                Ok(message) => return Ok(message),
                Err(error) => {
                    tracing::warn!("Dropping malformed message from {}: {}", sender, error)
                }
            }
        }
    }
}
