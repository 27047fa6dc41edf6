// qcommon.rs - definitions shared by the server and its clients: protocol
// numbers, message buffers and network addresses.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};

pub const PROTOCOL_VERSION: i32 = 34;

pub const PORT_ANY: i32 = -1;
pub const PORT_SERVER: u16 = 27910;

/// max length of a message
pub const MAX_MSGLEN: usize = 1400;
/// two ints and a short
pub const PACKET_HEADER: usize = 10;

pub const UPDATE_BACKUP: usize = 16;
pub const UPDATE_MASK: usize = UPDATE_BACKUP - 1;

// server to client
pub const SVC_BAD: u8 = 0;
pub const SVC_NOP: u8 = 6;
pub const SVC_DISCONNECT: u8 = 7;
pub const SVC_RECONNECT: u8 = 8;
pub const SVC_PRINT: u8 = 10;
pub const SVC_STUFFTEXT: u8 = 11;
pub const SVC_SERVERDATA: u8 = 12;
pub const SVC_PLAYERINFO: u8 = 17;
pub const SVC_FRAME: u8 = 20;

// client to server
pub const CLC_BAD: u8 = 0;
pub const CLC_NOP: u8 = 1;
pub const CLC_MOVE: u8 = 2;
pub const CLC_USERINFO: u8 = 3;
pub const CLC_STRINGCMD: u8 = 4;

// usercmd delta bits
pub const CM_ANGLE1: u8 = 1 << 0;
pub const CM_ANGLE2: u8 = 1 << 1;
pub const CM_ANGLE3: u8 = 1 << 2;
pub const CM_FORWARD: u8 = 1 << 3;
pub const CM_SIDE: u8 = 1 << 4;
pub const CM_UP: u8 = 1 << 5;
pub const CM_BUTTONS: u8 = 1 << 6;
pub const CM_IMPULSE: u8 = 1 << 7;

// player state delta bits
pub const PS_M_TYPE: u16 = 1 << 0;
pub const PS_M_ORIGIN: u16 = 1 << 1;
pub const PS_M_VELOCITY: u16 = 1 << 2;
pub const PS_M_TIME: u16 = 1 << 3;
pub const PS_M_FLAGS: u16 = 1 << 4;
pub const PS_M_GRAVITY: u16 = 1 << 5;
pub const PS_M_DELTA_ANGLES: u16 = 1 << 6;

// print levels
pub const PRINT_LOW: u8 = 0;
pub const PRINT_MEDIUM: u8 = 1;
pub const PRINT_HIGH: u8 = 2;

/// A bounded byte buffer used both for building and for parsing messages.
/// The read and write primitives live in `common`.
#[derive(Debug, Clone, Default)]
pub struct SizeBuf {
    /// if false, overflowing is fatal
    pub allow_overflow: bool,
    /// set to true if the buffer size failed
    pub overflowed: bool,
    pub data: Vec<u8>,
    pub maxsize: usize,
    pub cursize: usize,
    pub readcount: usize,
}

impl SizeBuf {
    pub fn new(maxsize: usize) -> Self {
        Self {
            allow_overflow: false,
            overflowed: false,
            data: vec![0; maxsize],
            maxsize,
            cursize: 0,
            readcount: 0,
        }
    }

    /// Wraps a received datagram for reading.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            allow_overflow: false,
            overflowed: false,
            data: bytes.to_vec(),
            maxsize: bytes.len(),
            cursize: bytes.len(),
            readcount: 0,
        }
    }

    pub fn clear(&mut self) {
        self.cursize = 0;
        self.overflowed = false;
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.cursize]
    }

    /// Bytes not yet consumed by the reader.
    pub fn remaining(&self) -> &[u8] {
        if self.readcount >= self.cursize {
            &[]
        } else {
            &self.data[self.readcount..self.cursize]
        }
    }
}

/// Which end of a connection a socket belongs to. Selects the loopback
/// queue and the header layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetSrc {
    Client = 0,
    Server = 1,
}

impl NetSrc {
    pub fn other(self) -> NetSrc {
        match self {
            NetSrc::Client => NetSrc::Server,
            NetSrc::Server => NetSrc::Client,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetAdr {
    Loopback,
    Udp(SocketAddr),
}

impl Default for NetAdr {
    fn default() -> Self {
        NetAdr::Loopback
    }
}

impl NetAdr {
    /// Resolves `"localhost"`, `"loopback"`, `"host"` or `"host:port"`.
    /// A missing port defaults to the server port.
    pub fn parse(s: &str) -> Option<NetAdr> {
        if s == "localhost" || s == "loopback" {
            return Some(NetAdr::Loopback);
        }
        let with_port = if s.contains(':') {
            s.to_string()
        } else {
            format!("{}:{}", s, PORT_SERVER)
        };
        with_port.to_socket_addrs().ok()?.next().map(NetAdr::Udp)
    }

    pub fn is_loopback(&self) -> bool {
        matches!(self, NetAdr::Loopback)
    }

    pub fn port(&self) -> u16 {
        match self {
            NetAdr::Loopback => 0,
            NetAdr::Udp(a) => a.port(),
        }
    }

    /// Same host, ignoring the port.
    pub fn compare_base_adr(&self, other: &NetAdr) -> bool {
        match (self, other) {
            (NetAdr::Loopback, NetAdr::Loopback) => true,
            (NetAdr::Udp(a), NetAdr::Udp(b)) => a.ip() == b.ip(),
            _ => false,
        }
    }

    pub fn compare_adr(&self, other: &NetAdr) -> bool {
        self == other
    }

    pub fn is_local(&self) -> bool {
        match self {
            NetAdr::Loopback => true,
            NetAdr::Udp(a) => a.ip() == IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

impl fmt::Display for NetAdr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetAdr::Loopback => write!(f, "loopback"),
            NetAdr::Udp(a) => write!(f, "{}", a),
        }
    }
}
