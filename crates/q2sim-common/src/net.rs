// net.rs - datagram transports: in-process loopback and UDP

use std::io;
use std::net::{SocketAddrV4, UdpSocket};
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::qcommon::{NetAdr, NetSrc, MAX_MSGLEN, PORT_ANY};

pub const MAX_LOOPBACK: usize = 4;

const IPTOS_LOWDELAY: u32 = 0x10;

/// Anything that can move whole datagrams between a server and its clients.
pub trait NetTransport {
    /// Returns the next queued datagram for `sock`, never blocking.
    fn get_packet(&mut self, sock: NetSrc) -> Option<(NetAdr, Vec<u8>)>;

    fn send_packet(&mut self, sock: NetSrc, data: &[u8], to: &NetAdr);
}

// =============================================================================
// Loopback
// =============================================================================

#[derive(Debug, Default)]
struct LoopQueue {
    msgs: [Vec<u8>; MAX_LOOPBACK],
    get: usize,
    send: usize,
}

/// Two small rings, one per `NetSrc`. Sending from one side queues on the
/// other. Clones share the same rings so a local client and the server can
/// each hold one.
#[derive(Debug, Clone, Default)]
pub struct LoopbackTransport {
    queues: Arc<Mutex<[LoopQueue; 2]>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, sock: NetSrc) -> Option<Vec<u8>> {
        let mut queues = self.queues.lock();
        let q = &mut queues[sock as usize];

        // the writer lapped us; skip what was overwritten
        if q.send - q.get > MAX_LOOPBACK {
            q.get = q.send - MAX_LOOPBACK;
        }
        if q.get >= q.send {
            return None;
        }

        let i = q.get & (MAX_LOOPBACK - 1);
        q.get += 1;
        Some(std::mem::take(&mut q.msgs[i]))
    }

    fn send(&self, sock: NetSrc, data: &[u8]) {
        let mut queues = self.queues.lock();
        let q = &mut queues[sock.other() as usize];

        let i = q.send & (MAX_LOOPBACK - 1);
        q.send += 1;

        let len = data.len().min(MAX_MSGLEN);
        q.msgs[i] = data[..len].to_vec();
    }
}

impl NetTransport for LoopbackTransport {
    fn get_packet(&mut self, sock: NetSrc) -> Option<(NetAdr, Vec<u8>)> {
        self.get(sock).map(|data| (NetAdr::Loopback, data))
    }

    fn send_packet(&mut self, sock: NetSrc, data: &[u8], to: &NetAdr) {
        match to {
            NetAdr::Loopback => self.send(sock, data),
            NetAdr::Udp(a) => warn!("NET_SendPacket: no UDP socket for {}", a),
        }
    }
}

// =============================================================================
// UDP
// =============================================================================

/// Non-blocking UDP sockets with a loopback path for `NetAdr::Loopback`.
#[derive(Debug, Default)]
pub struct UdpTransport {
    loopback: LoopbackTransport,
    sockets: [Option<UdpSocket>; 2],
}

/// Opens a non-blocking, broadcast-capable socket with low-delay ToS.
fn ip_socket(interface: &str, port: i32) -> io::Result<UdpSocket> {
    let bind_addr = if interface.is_empty() || interface.eq_ignore_ascii_case("localhost") {
        "0.0.0.0"
    } else {
        interface
    };
    let port = if port == PORT_ANY { 0 } else { port as u16 };

    let addr: SocketAddrV4 = format!("{}:{}", bind_addr, port)
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    // not every platform honours ToS
    if let Err(e) = socket.set_tos(IPTOS_LOWDELAY) {
        warn!("UDP_OpenSocket: set_tos: {}", e);
    }

    socket.bind(&SockAddr::from(addr))?;
    socket.set_nonblocking(true)?;
    socket.set_broadcast(true)?;
    Ok(socket.into())
}

impl UdpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle on the loopback rings, for a client running in-process.
    pub fn loopback(&self) -> LoopbackTransport {
        self.loopback.clone()
    }

    pub fn is_open(&self, sock: NetSrc) -> bool {
        self.sockets[sock as usize].is_some()
    }

    /// Binds the socket for `sock` unless it is already open. Returns the
    /// bound local port.
    pub fn open(&mut self, sock: NetSrc, interface: &str, port: i32) -> io::Result<u16> {
        if let Some(s) = &self.sockets[sock as usize] {
            return Ok(s.local_addr()?.port());
        }
        let s = ip_socket(interface, port)?;
        let local = s.local_addr()?.port();
        info!("Opened {:?} UDP socket on port {}", sock, local);
        self.sockets[sock as usize] = Some(s);
        Ok(local)
    }

    pub fn close(&mut self, sock: NetSrc) {
        self.sockets[sock as usize] = None;
    }
}

impl NetTransport for UdpTransport {
    fn get_packet(&mut self, sock: NetSrc) -> Option<(NetAdr, Vec<u8>)> {
        if let Some(data) = self.loopback.get(sock) {
            return Some((NetAdr::Loopback, data));
        }

        let socket = self.sockets[sock as usize].as_ref()?;
        let mut buf = [0u8; MAX_MSGLEN + 1];
        loop {
            match socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    if n > MAX_MSGLEN {
                        warn!("Oversize packet from {}", from);
                        continue;
                    }
                    return Some((NetAdr::Udp(from), buf[..n].to_vec()));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return None,
                // ICMP port unreachable surfaces here on some platforms
                Err(e) if e.kind() == io::ErrorKind::ConnectionReset => {
                    debug!("NET_GetPacket: {}", e);
                }
                Err(e) => {
                    warn!("NET_GetPacket: {}", e);
                    return None;
                }
            }
        }
    }

    fn send_packet(&mut self, sock: NetSrc, data: &[u8], to: &NetAdr) {
        match to {
            NetAdr::Loopback => self.loopback.send(sock, data),
            NetAdr::Udp(addr) => {
                let Some(socket) = &self.sockets[sock as usize] else {
                    return;
                };
                if let Err(e) = socket.send_to(data, addr) {
                    if e.kind() != io::ErrorKind::WouldBlock {
                        warn!("NET_SendPacket: {} to {}", e, addr);
                    }
                }
            }
        }
    }
}
