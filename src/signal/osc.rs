use super::SignalSink;
use crate::gesture::Gesture;
use anyhow::{Context, Result};
use rosc::{encoder, OscMessage, OscPacket, OscType};
use std::net::{SocketAddr, UdpSocket};

/// Sends each gesture as a one-string OSC message over UDP
pub struct OscSink {
    socket: UdpSocket,
    target: SocketAddr,
    address: String,
}

impl OscSink {
    pub fn new(target: SocketAddr, address: impl Into<String>) -> Result<Self> {
        let address = address.into();
        tracing::info!("Sending OSC {} to {}", address, target);

        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind).context("Failed to bind UDP socket")?;

        Ok(Self {
            socket,
            target,
            address,
        })
    }

    /// Encoded datagram for one gesture
    pub fn encode(&self, gesture: Gesture) -> Result<Vec<u8>> {
        let msg = OscMessage {
            addr: self.address.clone(),
            args: vec![OscType::String(gesture.as_str().to_string())],
        };
        Ok(encoder::encode(&OscPacket::Message(msg))?)
    }
}

impl SignalSink for OscSink {
    fn send(&mut self, gesture: Gesture) -> Result<()> {
        let data = self.encode(gesture)?;
        self.socket
            .send_to(&data, self.target)
            .with_context(|| format!("Failed to send {} to {}", gesture, self.target))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::decoder;
    use std::time::Duration;

    #[test]
    fn sends_gesture_as_osc_string() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let target = receiver.local_addr().unwrap();

        let mut sink = OscSink::new(target, "/gesture").unwrap();
        sink.send(Gesture::RotateLeft).unwrap();

        let mut buf = [0u8; decoder::MTU];
        let (len, _) = receiver.recv_from(&mut buf).unwrap();
        let (_, packet) = decoder::decode_udp(&buf[..len]).unwrap();
        match packet {
            OscPacket::Message(msg) => {
                assert_eq!(msg.addr, "/gesture");
                assert_eq!(msg.args, vec![OscType::String("rotate_left".into())]);
            }
            other => panic!("expected a message, got {:?}", other),
        }
    }

    #[test]
    fn one_datagram_per_gesture() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let mut sink = OscSink::new(receiver.local_addr().unwrap(), "/lorenz").unwrap();

        for gesture in [Gesture::Pause, Gesture::Reset] {
            sink.send(gesture).unwrap();
        }

        let mut buf = [0u8; decoder::MTU];
        for expected in ["pause", "reset"] {
            let (len, _) = receiver.recv_from(&mut buf).unwrap();
            let (_, packet) = decoder::decode_udp(&buf[..len]).unwrap();
            let OscPacket::Message(msg) = packet else {
                panic!("expected a message");
            };
            assert_eq!(msg.addr, "/lorenz");
            assert_eq!(msg.args, vec![OscType::String(expected.into())]);
        }
    }

    #[test]
    fn encoded_payload_is_padded_osc() {
        let sink = OscSink::new("127.0.0.1:9".parse().unwrap(), "/gesture").unwrap();
        let data = sink.encode(Gesture::Pause).unwrap();
        // "/gesture" + pad, ",s" + pad, "pause" + pad
        assert_eq!(data.len(), 12 + 4 + 8);
        assert_eq!(data.len() % 4, 0);
    }
}
