// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! UDP ingestion.
//!
//! Binds once and yields each datagram with its source address. Payloads are never parsed
//! or split: one packet is one message.

use crate::error::ForwarderError;
use std::net::SocketAddr;
use tracing::debug;

#[cfg(test)]
use std::collections::VecDeque;

// Largest possible UDP payload, so no datagram is ever truncated by this layer
const BUFFER_SIZE: usize = 65_535;

/// One received packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub payload: Vec<u8>,
    pub source: SocketAddr,
}

// DatagramReader abstracts where datagrams come from.
enum DatagramReader {
    UdpSocket(tokio::net::UdpSocket),

    /// Replays queued datagrams, then stays pending forever like an idle socket
    #[cfg(test)]
    Replay(VecDeque<Datagram>),
}

pub struct UdpListener {
    reader: DatagramReader,
    local_addr: SocketAddr,
    // Receive buffer reused across datagrams; payloads are copied out at their exact size
    buf: Box<[u8]>,
}

impl UdpListener {
    /// Binds the UDP socket. A failure here is fatal for the forwarder.
    pub async fn bind(address: &str) -> Result<Self, ForwarderError> {
        let bind_error = |source| ForwarderError::Bind {
            address: address.to_string(),
            source,
        };
        let socket = tokio::net::UdpSocket::bind(address)
            .await
            .map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;
        debug!("UDP socket bound to {}", local_addr);

        Ok(Self {
            reader: DatagramReader::UdpSocket(socket),
            local_addr,
            buf: vec![0; BUFFER_SIZE].into_boxed_slice(),
        })
    }

    #[cfg(test)]
    pub(crate) fn replay(datagrams: Vec<Datagram>) -> Self {
        Self {
            reader: DatagramReader::Replay(datagrams.into()),
            local_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            buf: Box::default(),
        }
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the next datagram.
    pub async fn recv(&mut self) -> std::io::Result<Datagram> {
        match &mut self.reader {
            DatagramReader::UdpSocket(socket) => {
                let (amt, source) = socket.recv_from(&mut self.buf).await?;
                Ok(Datagram {
                    payload: self.buf[..amt].to_vec(),
                    source,
                })
            }
            #[cfg(test)]
            DatagramReader::Replay(queue) => match queue.pop_front() {
                Some(datagram) => Ok(datagram),
                None => std::future::pending().await,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket;

    #[tokio::test]
    async fn test_receives_datagram_with_source() {
        let mut listener = UdpListener::bind("127.0.0.1:0").await.expect("bind");
        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
        sender
            .send_to(b"line 0", listener.local_addr())
            .await
            .expect("send");

        let datagram = listener.recv().await.expect("recv");

        assert_eq!(datagram.payload, b"line 0");
        assert_eq!(datagram.source, sender.local_addr().expect("sender addr"));
    }

    #[tokio::test]
    async fn test_payload_is_not_split_or_parsed() {
        let mut listener = UdpListener::bind("127.0.0.1:0").await.expect("bind");
        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
        let payload = b"a\nb\n\xff\x00c".to_vec();
        sender
            .send_to(&payload, listener.local_addr())
            .await
            .expect("send");

        let datagram = listener.recv().await.expect("recv");

        assert_eq!(datagram.payload, payload);
    }

    #[tokio::test]
    async fn test_large_datagram_is_not_truncated() {
        let mut listener = UdpListener::bind("127.0.0.1:0").await.expect("bind");
        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
        let payload = vec![b'x'; 16_384];
        sender
            .send_to(&payload, listener.local_addr())
            .await
            .expect("send");

        let datagram = listener.recv().await.expect("recv");

        assert_eq!(datagram.payload.len(), 16_384);
    }

    #[tokio::test]
    async fn test_payload_holds_only_received_bytes() {
        let mut listener = UdpListener::bind("127.0.0.1:0").await.expect("bind");
        let sender = UdpSocket::bind("127.0.0.1:0").await.expect("bind sender");
        for payload in [&b"line 0"[..], &b"line 1"[..]] {
            sender
                .send_to(payload, listener.local_addr())
                .await
                .expect("send");

            let datagram = listener.recv().await.expect("recv");

            assert_eq!(datagram.payload, payload);
            assert!(
                datagram.payload.capacity() < 64,
                "payload kept {} bytes of capacity",
                datagram.payload.capacity()
            );
        }
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let first = UdpListener::bind("127.0.0.1:0").await.expect("bind");
        let taken = first.local_addr().to_string();

        let result = UdpListener::bind(&taken).await;

        match result {
            Err(ForwarderError::Bind { address, .. }) => assert_eq!(address, taken),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("binding an address in use should fail"),
        }
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_reported() {
        let result = UdpListener::bind("not-an-address").await;
        assert!(matches!(result, Err(ForwarderError::Bind { .. })));
    }
}
