// common.rs - error tiers, message buffer primitives and misc helpers

use log::warn;
use thiserror::Error;

use crate::cmodel::MapLoadError;
use crate::q_shared::{PmType, PmoveState, UserCmd, Vec3};
use crate::qcommon::*;

/// Errors that abort the current level or connection but leave the process
/// running. Unrecoverable invariant violations panic instead.
#[derive(Debug, Error)]
pub enum ComError {
    #[error("{0}")]
    Drop(String),
    #[error("disconnected: {0}")]
    Disconnect(String),
    #[error(transparent)]
    MapLoad(#[from] MapLoadError),
}

pub type ComResult<T> = Result<T, ComError>;

// ============================================================
// SizeBuf writing
// ============================================================

impl SizeBuf {
    /// Reserves `length` bytes and returns their offset.
    ///
    /// Overflowing a buffer without `allow_overflow` is a programming error
    /// and panics. With it set, the buffer is cleared and flagged so the
    /// caller can notice and drop the contents.
    pub fn get_space(&mut self, length: usize) -> usize {
        if self.cursize + length > self.maxsize {
            if !self.allow_overflow {
                panic!("SZ_GetSpace: overflow without allowoverflow set");
            }
            if length > self.maxsize {
                panic!("SZ_GetSpace: {} is > full buffer size", length);
            }
            warn!("SZ_GetSpace: overflow");
            self.clear();
            self.overflowed = true;
        }
        let start = self.cursize;
        self.cursize += length;
        start
    }

    pub fn write(&mut self, src: &[u8]) {
        let start = self.get_space(src.len());
        self.data[start..start + src.len()].copy_from_slice(src);
    }

    /// Appends a NUL terminated string, overwriting a trailing NUL so
    /// consecutive prints concatenate.
    pub fn print(&mut self, s: &str) {
        let bytes = s.as_bytes();
        if self.cursize > 0 && self.data[self.cursize - 1] == 0 {
            self.cursize -= 1;
        }
        self.write(bytes);
        self.write(&[0]);
    }
}

pub fn msg_write_char(sb: &mut SizeBuf, c: i32) {
    sb.write(&[c as i8 as u8]);
}

pub fn msg_write_byte(sb: &mut SizeBuf, c: i32) {
    sb.write(&[c as u8]);
}

pub fn msg_write_short(sb: &mut SizeBuf, c: i32) {
    sb.write(&(c as i16).to_le_bytes());
}

pub fn msg_write_long(sb: &mut SizeBuf, c: i32) {
    sb.write(&c.to_le_bytes());
}

pub fn msg_write_float(sb: &mut SizeBuf, f: f32) {
    sb.write(&f.to_le_bytes());
}

pub fn msg_write_string(sb: &mut SizeBuf, s: &str) {
    sb.write(s.as_bytes());
    sb.write(&[0]);
}

pub fn msg_write_coord(sb: &mut SizeBuf, f: f32) {
    msg_write_short(sb, (f * 8.0) as i32);
}

pub fn msg_write_pos(sb: &mut SizeBuf, pos: &Vec3) {
    for v in pos {
        msg_write_coord(sb, *v);
    }
}

pub fn msg_write_angle(sb: &mut SizeBuf, f: f32) {
    msg_write_byte(sb, (f * 256.0 / 360.0) as i32 & 255);
}

pub fn msg_write_angle16(sb: &mut SizeBuf, f: f32) {
    msg_write_short(sb, crate::q_shared::angle2short(f) as i32);
}

pub fn msg_write_delta_usercmd(sb: &mut SizeBuf, from: &UserCmd, cmd: &UserCmd) {
    let mut bits = 0u8;
    if cmd.angles[0] != from.angles[0] {
        bits |= CM_ANGLE1;
    }
    if cmd.angles[1] != from.angles[1] {
        bits |= CM_ANGLE2;
    }
    if cmd.angles[2] != from.angles[2] {
        bits |= CM_ANGLE3;
    }
    if cmd.forwardmove != from.forwardmove {
        bits |= CM_FORWARD;
    }
    if cmd.sidemove != from.sidemove {
        bits |= CM_SIDE;
    }
    if cmd.upmove != from.upmove {
        bits |= CM_UP;
    }
    if cmd.buttons != from.buttons {
        bits |= CM_BUTTONS;
    }
    if cmd.impulse != from.impulse {
        bits |= CM_IMPULSE;
    }

    msg_write_byte(sb, bits as i32);

    for (i, flag) in [CM_ANGLE1, CM_ANGLE2, CM_ANGLE3].into_iter().enumerate() {
        if bits & flag != 0 {
            msg_write_short(sb, cmd.angles[i] as i32);
        }
    }
    if bits & CM_FORWARD != 0 {
        msg_write_short(sb, cmd.forwardmove as i32);
    }
    if bits & CM_SIDE != 0 {
        msg_write_short(sb, cmd.sidemove as i32);
    }
    if bits & CM_UP != 0 {
        msg_write_short(sb, cmd.upmove as i32);
    }
    if bits & CM_BUTTONS != 0 {
        msg_write_byte(sb, cmd.buttons as i32);
    }
    if bits & CM_IMPULSE != 0 {
        msg_write_byte(sb, cmd.impulse as i32);
    }

    msg_write_byte(sb, cmd.msec as i32);
    msg_write_byte(sb, cmd.lightlevel as i32);
}

/// Writes only the fields of `to` that differ from `from`.
pub fn msg_write_delta_pmove_state(sb: &mut SizeBuf, from: &PmoveState, to: &PmoveState) {
    let mut bits = 0u16;
    if to.pm_type != from.pm_type {
        bits |= PS_M_TYPE;
    }
    if to.origin != from.origin {
        bits |= PS_M_ORIGIN;
    }
    if to.velocity != from.velocity {
        bits |= PS_M_VELOCITY;
    }
    if to.pm_time != from.pm_time {
        bits |= PS_M_TIME;
    }
    if to.pm_flags != from.pm_flags {
        bits |= PS_M_FLAGS;
    }
    if to.gravity != from.gravity {
        bits |= PS_M_GRAVITY;
    }
    if to.delta_angles != from.delta_angles {
        bits |= PS_M_DELTA_ANGLES;
    }

    msg_write_short(sb, bits as i32);
    if bits & PS_M_TYPE != 0 {
        msg_write_byte(sb, to.pm_type as i32);
    }
    if bits & PS_M_ORIGIN != 0 {
        for v in to.origin {
            msg_write_short(sb, v as i32);
        }
    }
    if bits & PS_M_VELOCITY != 0 {
        for v in to.velocity {
            msg_write_short(sb, v as i32);
        }
    }
    if bits & PS_M_TIME != 0 {
        msg_write_byte(sb, to.pm_time as i32);
    }
    if bits & PS_M_FLAGS != 0 {
        msg_write_byte(sb, to.pm_flags as i32);
    }
    if bits & PS_M_GRAVITY != 0 {
        msg_write_short(sb, to.gravity as i32);
    }
    if bits & PS_M_DELTA_ANGLES != 0 {
        for v in to.delta_angles {
            msg_write_short(sb, v as i32);
        }
    }
}

// ============================================================
// Reading
//
// Reads past the end return -1 (or empty values) and push readcount
// beyond cursize so callers can detect a truncated message.
// ============================================================

pub fn msg_begin_reading(msg: &mut SizeBuf) {
    msg.readcount = 0;
}

pub fn msg_read_overrun(msg: &SizeBuf) -> bool {
    msg.readcount > msg.cursize
}

fn read_bytes<const N: usize>(msg: &mut SizeBuf) -> Option<[u8; N]> {
    if msg.readcount + N > msg.cursize {
        msg.readcount += N;
        return None;
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&msg.data[msg.readcount..msg.readcount + N]);
    msg.readcount += N;
    Some(out)
}

pub fn msg_read_char(msg: &mut SizeBuf) -> i32 {
    read_bytes::<1>(msg).map_or(-1, |b| b[0] as i8 as i32)
}

pub fn msg_read_byte(msg: &mut SizeBuf) -> i32 {
    read_bytes::<1>(msg).map_or(-1, |b| b[0] as i32)
}

pub fn msg_read_short(msg: &mut SizeBuf) -> i32 {
    read_bytes::<2>(msg).map_or(-1, |b| i16::from_le_bytes(b) as i32)
}

pub fn msg_read_long(msg: &mut SizeBuf) -> i32 {
    read_bytes::<4>(msg).map_or(-1, i32::from_le_bytes)
}

pub fn msg_read_float(msg: &mut SizeBuf) -> f32 {
    read_bytes::<4>(msg).map_or(-1.0, f32::from_le_bytes)
}

pub fn msg_read_string(msg: &mut SizeBuf) -> String {
    let mut out = Vec::new();
    loop {
        let c = msg_read_byte(msg);
        if c == -1 || c == 0 {
            break;
        }
        out.push(c as u8);
        if out.len() >= 2047 {
            break;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

pub fn msg_read_coord(msg: &mut SizeBuf) -> f32 {
    msg_read_short(msg) as f32 * 0.125
}

pub fn msg_read_pos(msg: &mut SizeBuf) -> Vec3 {
    [msg_read_coord(msg), msg_read_coord(msg), msg_read_coord(msg)]
}

pub fn msg_read_angle(msg: &mut SizeBuf) -> f32 {
    msg_read_char(msg) as f32 * (360.0 / 256.0)
}

pub fn msg_read_angle16(msg: &mut SizeBuf) -> f32 {
    crate::q_shared::short2angle(msg_read_short(msg) as i16)
}

pub fn msg_read_delta_usercmd(msg: &mut SizeBuf, from: &UserCmd) -> UserCmd {
    let mut cmd = *from;
    let bits = msg_read_byte(msg) as u8;

    for (i, flag) in [CM_ANGLE1, CM_ANGLE2, CM_ANGLE3].into_iter().enumerate() {
        if bits & flag != 0 {
            cmd.angles[i] = msg_read_short(msg) as i16;
        }
    }
    if bits & CM_FORWARD != 0 {
        cmd.forwardmove = msg_read_short(msg) as i16;
    }
    if bits & CM_SIDE != 0 {
        cmd.sidemove = msg_read_short(msg) as i16;
    }
    if bits & CM_UP != 0 {
        cmd.upmove = msg_read_short(msg) as i16;
    }
    if bits & CM_BUTTONS != 0 {
        cmd.buttons = msg_read_byte(msg) as u8;
    }
    if bits & CM_IMPULSE != 0 {
        cmd.impulse = msg_read_byte(msg) as u8;
    }

    cmd.msec = msg_read_byte(msg) as u8;
    cmd.lightlevel = msg_read_byte(msg) as u8;
    cmd
}

pub fn msg_read_delta_pmove_state(msg: &mut SizeBuf, from: &PmoveState) -> PmoveState {
    let mut s = *from;
    let bits = msg_read_short(msg) as u16;

    if bits & PS_M_TYPE != 0 {
        s.pm_type = PmType::from_u8(msg_read_byte(msg) as u8).unwrap_or_default();
    }
    if bits & PS_M_ORIGIN != 0 {
        for v in s.origin.iter_mut() {
            *v = msg_read_short(msg) as i16;
        }
    }
    if bits & PS_M_VELOCITY != 0 {
        for v in s.velocity.iter_mut() {
            *v = msg_read_short(msg) as i16;
        }
    }
    if bits & PS_M_TIME != 0 {
        s.pm_time = msg_read_byte(msg) as u8;
    }
    if bits & PS_M_FLAGS != 0 {
        s.pm_flags = msg_read_byte(msg) as u8;
    }
    if bits & PS_M_GRAVITY != 0 {
        s.gravity = msg_read_short(msg) as i16;
    }
    if bits & PS_M_DELTA_ANGLES != 0 {
        for v in s.delta_angles.iter_mut() {
            *v = msg_read_short(msg) as i16;
        }
    }
    s
}

pub fn msg_read_data(msg: &mut SizeBuf, len: usize) -> Vec<u8> {
    (0..len).map(|_| msg_read_byte(msg) as u8).collect()
}

// ============================================================
// Misc
// ============================================================

/// Splits a console line into whitespace separated tokens, keeping quoted
/// strings together.
pub fn tokenize(line: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();
    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&c) = chars.peek() else { break };
        let mut tok = String::new();
        if c == '"' {
            chars.next();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                tok.push(c);
            }
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                tok.push(c);
                chars.next();
            }
        }
        out.push(tok);
    }
    out
}
