//! Async UDP transport for OSC

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::dispatch::Dispatcher;
use crate::packet::{decode, encode_message, OscMessage, OscType};

/// Largest datagram the server accepts
const MAX_DATAGRAM: usize = 65_507;

/// Sends OSC messages to one remote endpoint
pub struct OscSender {
    socket: UdpSocket,
    target: SocketAddr,
}

impl OscSender {
    /// Bind an ephemeral local socket for sending to `target`
    pub async fn new(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            "0.0.0.0:0".parse()?
        } else {
            "[::]:0".parse()?
        };
        let socket = UdpSocket::bind(local).await?;
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Send one message as a single datagram
    pub async fn send(&self, address: &str, args: Vec<OscType>) -> Result<usize> {
        let packet = encode_message(&OscMessage::new(address, args))?;
        trace!(
            target_addr = %self.target,
            address = %address,
            len = packet.len(),
            "Sending OSC message"
        );
        let sent = self.socket.send_to(&packet, self.target).await?;
        Ok(sent)
    }
}

/// Receives OSC datagrams and routes them through a dispatcher
pub struct OscServer {
    socket: UdpSocket,
    dispatcher: Arc<Dispatcher>,
}

impl OscServer {
    pub async fn bind(addr: SocketAddr, dispatcher: Arc<Dispatcher>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, dispatcher })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Receive and dispatch datagrams one at a time until the task is dropped
    pub async fn serve(self) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            let (len, peer) = self.socket.recv_from(&mut buf).await?;
            self.handle_datagram(&buf[..len], peer);
        }
    }

    fn handle_datagram(&self, data: &[u8], peer: SocketAddr) {
        let packet = match decode(data) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(peer = %peer, len = data.len(), error = %e, "Dropping malformed OSC packet");
                return;
            }
        };
        for msg in packet.messages() {
            if !self.dispatcher.dispatch(msg) {
                trace!(peer = %peer, address = %msg.addr, "Ignoring unmapped OSC address");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Handler;
    use crate::packet::{encode, OscPacket};
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_sender_to_server_round_trip() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: Handler = Arc::new(move |addr: &str, channel: usize, args: &[OscType]| {
            let _ = tx.send((addr.to_string(), channel, args.to_vec()));
        });
        let mut dispatcher = Dispatcher::new();
        dispatcher.map("/phidget1012/2", 2, handler);

        let server = OscServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(dispatcher))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.serve());

        let sender = OscSender::new(addr).await.unwrap();
        sender.send("/phidget1012/9", vec![OscType::Int(1)]).await.unwrap();
        sender.send("/phidget1012/2", vec![OscType::Int(0)]).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, ("/phidget1012/2".to_string(), 2, vec![OscType::Int(0)]));
        assert!(rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test]
    async fn test_server_drops_overly_nested_bundle() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handler: Handler = Arc::new(move |addr: &str, _channel: usize, _args: &[OscType]| {
            let _ = tx.send(addr.to_string());
        });
        let mut dispatcher = Dispatcher::new();
        dispatcher.map("/phidget1012/0", 0, handler);

        let server = OscServer::bind("127.0.0.1:0".parse().unwrap(), Arc::new(dispatcher))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let task = tokio::spawn(server.serve());

        let mut packet =
            OscPacket::Message(OscMessage::new("/phidget1012/0", vec![OscType::Int(1)]));
        for _ in 0..200 {
            packet = OscPacket::Bundle {
                timetag: 1,
                content: vec![packet],
            };
        }
        let deep = encode(&packet).unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(&deep, addr).await.unwrap();
        let sender = OscSender::new(addr).await.unwrap();
        sender.send("/phidget1012/0", vec![OscType::Int(0)]).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, "/phidget1012/0");
        assert!(rx.try_recv().is_err());
        assert!(!task.is_finished());

        task.abort();
    }
}
