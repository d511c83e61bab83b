use crate::mac::{InvalidFormat, MacAddress};
use log::debug;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

const SYNCHRONIZATION_SCHEME: [u8; 6] = [0xff; 6];

/// 6 synchronization bytes followed by the target MAC repeated 16 times.
pub const MAGIC_PACKET_LEN: usize = 102;

#[derive(thiserror::Error, Debug)]
pub enum TransmitError {
    #[error(transparent)]
    InvalidMac(#[from] InvalidFormat),
    #[error("could not bind to interface address {addr}: {source}")]
    BindFailed { addr: Ipv4Addr, source: io::Error },
    #[error("transport accepted {sent} of 102 bytes")]
    PartialSend { sent: usize },
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

/// The fixed-format payload a Wake-on-LAN NIC matches against.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    pub fn new(mac: MacAddress) -> Self {
        let mut data = [0u8; MAGIC_PACKET_LEN];
        data[..6].copy_from_slice(&SYNCHRONIZATION_SCHEME);
        for chunk in data[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(mac.as_bytes());
        }
        MagicPacket(data)
    }

    pub fn as_bytes(&self) -> &[u8; MAGIC_PACKET_LEN] {
        &self.0
    }
}

/// Per-send parameters. `interface` of `None` leaves the egress
/// interface to the OS default route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeParams {
    pub broadcast: Ipv4Addr,
    pub port: u16,
    pub interface: Option<Ipv4Addr>,
}

impl Default for WakeParams {
    fn default() -> Self {
        WakeParams {
            broadcast: Ipv4Addr::BROADCAST,
            port: 9,
            interface: None,
        }
    }
}

/// Datagram delivery, separated out so tests can substitute a recorder
/// for the real socket.
pub trait Transport {
    /// Sends `payload` to `dest` as one datagram, optionally with the
    /// local endpoint bound to `bind`. Returns the bytes accepted.
    fn broadcast(
        &mut self,
        bind: Option<Ipv4Addr>,
        dest: SocketAddrV4,
        payload: &[u8],
    ) -> Result<usize, TransmitError>;
}

/// One UDP socket per send; dropped (closed) on every return path.
pub struct UdpTransport;

impl Transport for UdpTransport {
    fn broadcast(
        &mut self,
        bind: Option<Ipv4Addr>,
        dest: SocketAddrV4,
        payload: &[u8],
    ) -> Result<usize, TransmitError> {
        let local = SocketAddrV4::new(bind.unwrap_or(Ipv4Addr::UNSPECIFIED), 0);
        let socket = UdpSocket::bind(local).map_err(|source| match bind {
            Some(addr) => TransmitError::BindFailed { addr, source },
            None => TransmitError::Transport(source),
        })?;
        socket.set_broadcast(true)?;
        Ok(socket.send_to(payload, dest)?)
    }
}

/// Sends a magic packet for `mac_text` via UDP broadcast. Success means
/// the datagram was handed to the OS; Wake-on-LAN has no acknowledgment.
pub fn wake(mac_text: &str, params: &WakeParams) -> Result<(), TransmitError> {
    wake_with(&mut UdpTransport, mac_text, params)
}

pub fn wake_with(
    transport: &mut dyn Transport,
    mac_text: &str,
    params: &WakeParams,
) -> Result<(), TransmitError> {
    // Parse before touching any socket.
    let mac: MacAddress = mac_text.parse()?;
    let packet = MagicPacket::new(mac);
    let dest = SocketAddrV4::new(params.broadcast, params.port);

    let sent = transport.broadcast(params.interface, dest, packet.as_bytes())?;
    if sent != MAGIC_PACKET_LEN {
        return Err(TransmitError::PartialSend { sent });
    }
    debug!("magic packet for {} sent to {}", mac, dest);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingTransport {
        sent: Vec<(Option<Ipv4Addr>, SocketAddrV4, Vec<u8>)>,
        accept: Option<usize>,
    }

    impl RecordingTransport {
        fn new() -> Self {
            RecordingTransport {
                sent: Vec::new(),
                accept: None,
            }
        }
    }

    impl Transport for RecordingTransport {
        fn broadcast(
            &mut self,
            bind: Option<Ipv4Addr>,
            dest: SocketAddrV4,
            payload: &[u8],
        ) -> Result<usize, TransmitError> {
            self.sent.push((bind, dest, payload.to_vec()));
            Ok(self.accept.unwrap_or(payload.len()))
        }
    }

    const MAC: [u8; 6] = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];

    #[test]
    fn packet_layout() {
        let packet = MagicPacket::new(MacAddress::new(MAC));
        let bytes = packet.as_bytes();
        assert_eq!(bytes.len(), 102);
        assert_eq!(&bytes[..6], &[0xff; 6]);
        for rep in 0..16 {
            let start = 6 + rep * 6;
            assert_eq!(&bytes[start..start + 6], &MAC, "repetition {}", rep);
        }
    }

    #[test]
    fn sends_single_datagram_to_broadcast() {
        let mut transport = RecordingTransport::new();
        wake_with(&mut transport, "AA:BB:CC:DD:EE:FF", &WakeParams::default()).unwrap();

        assert_eq!(transport.sent.len(), 1);
        let (bind, dest, payload) = &transport.sent[0];
        assert_eq!(*bind, None);
        assert_eq!(
            *dest,
            SocketAddrV4::new(Ipv4Addr::new(255, 255, 255, 255), 9)
        );
        assert_eq!(payload.len(), 102);
        assert_eq!(
            payload.as_slice(),
            MagicPacket::new(MacAddress::new(MAC)).as_bytes()
        );
    }

    #[test]
    fn invalid_mac_never_reaches_transport() {
        let mut transport = RecordingTransport::new();
        let err = wake_with(&mut transport, "not-a-mac", &WakeParams::default()).unwrap_err();
        assert!(matches!(err, TransmitError::InvalidMac(_)));
        assert!(transport.sent.is_empty());
    }

    #[test]
    fn custom_destination_and_interface_are_forwarded() {
        let mut transport = RecordingTransport::new();
        let params = WakeParams {
            broadcast: Ipv4Addr::new(192, 168, 1, 255),
            port: 7,
            interface: Some(Ipv4Addr::new(192, 168, 1, 10)),
        };
        wake_with(&mut transport, "aabbccddeeff", &params).unwrap();

        let (bind, dest, _) = &transport.sent[0];
        assert_eq!(*bind, Some(Ipv4Addr::new(192, 168, 1, 10)));
        assert_eq!(*dest, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 255), 7));
    }

    #[test]
    fn short_write_is_partial_send() {
        let mut transport = RecordingTransport::new();
        transport.accept = Some(42);
        let err = wake_with(&mut transport, "aabbccddeeff", &WakeParams::default()).unwrap_err();
        assert!(matches!(err, TransmitError::PartialSend { sent: 42 }));
    }
}
