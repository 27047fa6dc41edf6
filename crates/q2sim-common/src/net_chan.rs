// net_chan.rs - sequenced datagram channel with one reliable slot
//
// Packet header:
//
//   31 sequence | 1 does this message contain a reliable payload
//   31 acknowledge sequence | 1 acknowledge receipt of even/odd message
//   16 qport (client to server only)
//
// The remote connection never knows if it missed a reliable message; the
// local side detects that it was dropped by seeing a sequence acknowledge
// higher than the last reliable sequence with an unchanged even/odd bit.
// Only one reliable message may be in flight at a time. Anything queued
// while it is outstanding waits in `message` until it is acknowledged.
//
// A qport is sent by clients so the server can tell connections apart when
// a NAT router remaps the client's UDP port mid-game.

use log::{debug, warn};

use crate::common::{msg_begin_reading, msg_read_long, msg_read_short, msg_write_long, msg_write_short};
use crate::net::NetTransport;
use crate::qcommon::{NetAdr, NetSrc, SizeBuf, MAX_MSGLEN};

const SEQUENCE_MASK: u32 = 0x7fff_ffff;
const RELIABLE_BIT: u32 = 1 << 31;

#[derive(Debug, Clone)]
pub struct NetChan {
    /// set when the pending message overflowed; the owner must drop the
    /// connection
    pub fatal_error: bool,

    pub sock: NetSrc,

    /// between last packet and previous
    pub dropped: i32,

    /// for timeouts
    pub last_received: i32,
    /// for retransmits
    pub last_sent: i32,

    pub remote_address: NetAdr,
    pub qport: i32,

    // sequencing variables
    pub incoming_sequence: i32,
    pub incoming_acknowledged: i32,
    /// single bit
    pub incoming_reliable_acknowledged: i32,
    /// single bit, maintained local
    pub incoming_reliable_sequence: i32,

    pub outgoing_sequence: i32,
    /// single bit
    pub reliable_sequence: i32,
    /// sequence number of last send
    pub last_reliable_sequence: i32,

    /// reliable staging and holding area
    pub message: SizeBuf,

    /// unacked reliable message
    pub reliable_buf: Vec<u8>,
}

impl Default for NetChan {
    fn default() -> Self {
        Self {
            fatal_error: false,
            sock: NetSrc::Client,
            dropped: 0,
            last_received: 0,
            last_sent: 0,
            remote_address: NetAdr::default(),
            qport: 0,
            incoming_sequence: 0,
            incoming_acknowledged: 0,
            incoming_reliable_acknowledged: 0,
            incoming_reliable_sequence: 0,
            outgoing_sequence: 0,
            reliable_sequence: 0,
            last_reliable_sequence: 0,
            message: SizeBuf::default(),
            reliable_buf: Vec::new(),
        }
    }
}

impl NetChan {
    pub fn reliable_length(&self) -> usize {
        self.reliable_buf.len()
    }
}

/// True once the last reliable message has been acknowledged.
pub fn netchan_can_reliable(chan: &NetChan) -> bool {
    chan.reliable_buf.is_empty()
}

pub fn netchan_need_reliable(chan: &NetChan) -> bool {
    // the remote side dropped the last reliable message, resend it
    if chan.incoming_acknowledged > chan.last_reliable_sequence
        && chan.incoming_reliable_acknowledged != chan.reliable_sequence
    {
        return true;
    }

    // the reliable transmit buffer is empty, copy the current message out
    chan.reliable_buf.is_empty() && chan.message.cursize > 0
}

/// Called to open a channel to a remote system.
pub fn netchan_setup(sock: NetSrc, chan: &mut NetChan, adr: NetAdr, qport: i32, curtime: i32) {
    *chan = NetChan::default();
    chan.sock = sock;
    chan.remote_address = adr;
    chan.qport = qport;
    chan.last_received = curtime;
    chan.incoming_sequence = 0;
    chan.outgoing_sequence = 1;
    chan.message = SizeBuf::new(MAX_MSGLEN - 16);
    chan.message.allow_overflow = true;
}

/// Builds the next datagram: header, then any reliable payload, then as
/// much of `data` as fits. Returns `None` if the pending reliable message
/// overflowed, in which case the channel is marked fatal.
pub fn netchan_build(chan: &mut NetChan, data: &[u8], curtime: i32) -> Option<Vec<u8>> {
    if chan.message.overflowed {
        chan.fatal_error = true;
        warn!("{}:Outgoing message overflow", chan.remote_address);
        return None;
    }

    let send_reliable = netchan_need_reliable(chan);

    if chan.reliable_buf.is_empty() && chan.message.cursize > 0 {
        chan.reliable_buf = chan.message.as_slice().to_vec();
        chan.message.clear();
        chan.reliable_sequence ^= 1;
    }

    let mut send = SizeBuf::new(MAX_MSGLEN);

    let w1 = (chan.outgoing_sequence as u32 & SEQUENCE_MASK)
        | if send_reliable { RELIABLE_BIT } else { 0 };
    let w2 = (chan.incoming_sequence as u32 & SEQUENCE_MASK)
        | ((chan.incoming_reliable_sequence as u32) << 31);

    chan.outgoing_sequence += 1;
    chan.last_sent = curtime;

    msg_write_long(&mut send, w1 as i32);
    msg_write_long(&mut send, w2 as i32);

    if chan.sock == NetSrc::Client {
        msg_write_short(&mut send, chan.qport);
    }

    if send_reliable {
        send.write(&chan.reliable_buf);
        chan.last_reliable_sequence = chan.outgoing_sequence;
    }

    if send.maxsize - send.cursize >= data.len() {
        send.write(data);
    } else {
        warn!("Netchan_Transmit: dumped unreliable");
    }

    debug!(
        "send {:4} : s={} reliable={} ack={} rack={}",
        send.cursize,
        chan.outgoing_sequence - 1,
        chan.reliable_sequence,
        chan.incoming_sequence,
        chan.incoming_reliable_sequence
    );

    Some(send.as_slice().to_vec())
}

/// Tries to send an unreliable message to the remote end, retransmitting
/// or starting a reliable message as needed. A zero length `data` still
/// sends a packet, which keeps the acknowledgements flowing.
pub fn netchan_transmit(chan: &mut NetChan, net: &mut dyn NetTransport, data: &[u8], curtime: i32) {
    if let Some(packet) = netchan_build(chan, data, curtime) {
        net.send_packet(chan.sock, &packet, &chan.remote_address);
    }
}

/// Called when the current datagram in `msg` is from the remote address.
/// Strips the header and leaves `msg.readcount` at the payload. Returns
/// false for stale, duplicated or truncated packets, which must be ignored.
pub fn netchan_process(chan: &mut NetChan, msg: &mut SizeBuf, curtime: i32) -> bool {
    let header = if chan.sock == NetSrc::Server { 10 } else { 8 };
    if msg.cursize < header {
        debug!("{}:Runt packet", chan.remote_address);
        return false;
    }

    msg_begin_reading(msg);
    let sequence = msg_read_long(msg) as u32;
    let sequence_ack = msg_read_long(msg) as u32;

    // the server already matched the qport to this channel
    if chan.sock == NetSrc::Server {
        msg_read_short(msg);
    }

    let reliable_message = (sequence >> 31) as i32;
    let reliable_ack = (sequence_ack >> 31) as i32;
    let sequence = (sequence & SEQUENCE_MASK) as i32;
    let sequence_ack = (sequence_ack & SEQUENCE_MASK) as i32;

    debug!(
        "recv {:4} : s={} ack={} rack={}",
        msg.cursize, sequence, sequence_ack, reliable_ack
    );

    // discard stale or duplicated packets
    if sequence <= chan.incoming_sequence {
        debug!(
            "{}:Out of order packet {} at {}",
            chan.remote_address, sequence, chan.incoming_sequence
        );
        return false;
    }

    chan.dropped = sequence - (chan.incoming_sequence + 1);
    if chan.dropped > 0 {
        debug!(
            "{}:Dropped {} packets at {}",
            chan.remote_address, chan.dropped, sequence
        );
    }

    // if the current outgoing reliable message has been acknowledged,
    // clear the buffer to make way for the next
    if reliable_ack == chan.reliable_sequence {
        chan.reliable_buf.clear();
    }

    chan.incoming_sequence = sequence;
    chan.incoming_acknowledged = sequence_ack;
    chan.incoming_reliable_acknowledged = reliable_ack;
    if reliable_message != 0 {
        chan.incoming_reliable_sequence ^= 1;
    }

    chan.last_received = curtime;
    true
}

/// Connectionless packets are marked by a -1 sequence.
pub fn netchan_out_of_band_data(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&(-1i32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

/// Sends a connectionless datagram. Oversized payloads are dropped.
pub fn netchan_out_of_band(net: &mut dyn NetTransport, sock: NetSrc, adr: &NetAdr, data: &[u8]) {
    if data.len() + 4 > MAX_MSGLEN {
        warn!("Netchan_OutOfBand: {} byte packet to {} dropped", data.len(), adr);
        return;
    }
    net.send_packet(sock, &netchan_out_of_band_data(data), adr);
}

pub fn netchan_out_of_band_print(net: &mut dyn NetTransport, sock: NetSrc, adr: &NetAdr, text: &str) {
    netchan_out_of_band(net, sock, adr, text.as_bytes());
}
