//! Wire format of the four packet types.
//!
//! All fields are big-endian. An address travels as a 16-bit code unit
//! holding one uppercase ASCII letter.
//!
//! | Packet | Layout |
//! |---|---|
//! | HELLO | code · address · distance(i32) |
//! | BYE   | code · address |
//! | ROUTE | code · origin · TTL(i16) · seq(i32) · count(i16) · count × entry |
//! | entry | address · distance(i32) |
//! | DATA  | code · sender · seq(i32) · dest · msgLen(i16) · msg · pathLen(u8) · path |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{DecodeError, ValidationError};
use crate::types::{Address, Entry, MAX_DISTANCE, MAX_ENTRY_VEC_LEN, MAX_MESSAGE_LEN};

pub const PKT_DATA: u8 = 1;
pub const PKT_ROUTE: u8 = 2;
pub const PKT_HELLO: u8 = 3;
pub const PKT_BYE: u8 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Hello(HelloPacket),
    Bye(ByePacket),
    Route(RoutePacket),
    Data(DataPacket),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HelloPacket {
    pub sender: Address,
    pub dist: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByePacket {
    pub sender: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePacket {
    pub origin: Address,
    /// Validity of the advertisement in seconds, also the relay hop budget
    pub ttl: u16,
    pub seq: u32,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPacket {
    pub sender: Address,
    pub seq: u32,
    pub dest: Address,
    pub message: Vec<u8>,
    pub path: Vec<Address>,
}

impl DataPacket {
    pub fn message_text(&self) -> String {
        String::from_utf8_lossy(&self.message).into_owned()
    }

    pub fn path_text(&self) -> String {
        self.path.iter().map(|a| a.as_char()).collect()
    }
}

impl Packet {
    pub fn code(&self) -> u8 {
        match self {
            Packet::Hello(_) => PKT_HELLO,
            Packet::Bye(_) => PKT_BYE,
            Packet::Route(_) => PKT_ROUTE,
            Packet::Data(_) => PKT_DATA,
        }
    }

    pub fn sender(&self) -> Address {
        match self {
            Packet::Hello(p) => p.sender,
            Packet::Bye(p) => p.sender,
            Packet::Route(p) => p.origin,
            Packet::Data(p) => p.sender,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Packet::Hello(_) => "HELLO",
            Packet::Bye(_) => "BYE",
            Packet::Route(_) => "ROUTE",
            Packet::Data(_) => "DATA",
        }
    }

    pub fn encode(&self) -> Result<Bytes, ValidationError> {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(self.code());
        buf.put_u16(self.sender().to_wire());

        match self {
            Packet::Hello(p) => {
                buf.put_i32(p.dist as i32);
            }
            Packet::Bye(_) => {}
            Packet::Route(p) => {
                if p.entries.is_empty() || p.entries.len() > MAX_ENTRY_VEC_LEN {
                    return Err(ValidationError::InvalidVectorLength(p.entries.len()));
                }
                buf.put_i16(p.ttl.min(i16::MAX as u16) as i16);
                buf.put_u32(p.seq);
                buf.put_i16(p.entries.len() as i16);
                for entry in &p.entries {
                    buf.put_u16(entry.dest.to_wire());
                    buf.put_i32(entry.dist as i32);
                }
            }
            Packet::Data(p) => {
                if p.message.len() > MAX_MESSAGE_LEN {
                    return Err(ValidationError::MessageTooLong(p.message.len()));
                }
                if p.path.len() > u8::MAX as usize {
                    return Err(ValidationError::PathTooLong {
                        len: p.path.len(),
                        max: u8::MAX as usize,
                    });
                }
                buf.put_u32(p.seq);
                buf.put_u16(p.dest.to_wire());
                buf.put_i16(p.message.len() as i16);
                buf.put_slice(&p.message);
                buf.put_u8(p.path.len() as u8);
                for hop in &p.path {
                    buf.put_u8(hop.as_byte());
                }
            }
        }

        Ok(buf.freeze())
    }

    /// Decode a full datagram. `max_path_len` bounds the DATA path field.
    pub fn decode(data: &[u8], max_path_len: usize) -> Result<Packet, DecodeError> {
        let mut buf = data;
        if buf.is_empty() {
            return Err(DecodeError::Empty);
        }
        let code = buf.get_u8();
        need(&buf, 2)?;
        let sender = Address::from_wire(buf.get_u16())?;

        match code {
            PKT_HELLO => {
                let dist = read_distance(&mut buf)?;
                Ok(Packet::Hello(HelloPacket { sender, dist }))
            }
            PKT_BYE => Ok(Packet::Bye(ByePacket { sender })),
            PKT_ROUTE => decode_route(sender, &mut buf).map(Packet::Route),
            PKT_DATA => decode_data(sender, &mut buf, max_path_len).map(Packet::Data),
            other => Err(DecodeError::UnknownCode(other)),
        }
    }
}

fn need(buf: &&[u8], n: usize) -> Result<(), DecodeError> {
    if buf.remaining() < n {
        Err(DecodeError::Truncated {
            needed: n,
            remaining: buf.remaining(),
        })
    } else {
        Ok(())
    }
}

fn read_address(buf: &mut &[u8]) -> Result<Address, DecodeError> {
    need(buf, 2)?;
    Address::from_wire(buf.get_u16())
}

fn read_distance(buf: &mut &[u8]) -> Result<u32, DecodeError> {
    need(buf, 4)?;
    let dist = buf.get_i32();
    if dist < 0 || dist as u32 > MAX_DISTANCE {
        return Err(DecodeError::InvalidDistance(dist));
    }
    Ok(dist as u32)
}

fn decode_route(origin: Address, buf: &mut &[u8]) -> Result<RoutePacket, DecodeError> {
    need(buf, 2 + 4 + 2)?;
    let ttl = buf.get_i16();
    if ttl < 0 {
        return Err(DecodeError::InvalidTtl(ttl));
    }
    let seq = buf.get_u32();
    let count = buf.get_i16();
    if count <= 0 || count as usize > MAX_ENTRY_VEC_LEN {
        return Err(DecodeError::InvalidCount(count));
    }

    let mut entries = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let dest = read_address(buf)?;
        let dist = read_distance(buf)?;
        entries.push(Entry::new(dest, dist));
    }

    Ok(RoutePacket {
        origin,
        ttl: ttl as u16,
        seq,
        entries,
    })
}

fn decode_data(
    sender: Address,
    buf: &mut &[u8],
    max_path_len: usize,
) -> Result<DataPacket, DecodeError> {
    need(buf, 4)?;
    let seq = buf.get_u32();
    let dest = read_address(buf)?;

    need(buf, 2)?;
    let msg_len = buf.get_i16();
    if msg_len < 0 || msg_len as usize > MAX_MESSAGE_LEN {
        return Err(DecodeError::MessageTooLong(msg_len));
    }
    need(buf, msg_len as usize)?;
    let message = buf.copy_to_bytes(msg_len as usize).to_vec();

    need(buf, 1)?;
    let path_len = buf.get_u8() as usize;
    if path_len > max_path_len {
        return Err(DecodeError::PathTooLong {
            len: path_len,
            max: max_path_len,
        });
    }
    need(buf, path_len)?;
    let mut path = Vec::with_capacity(path_len);
    for _ in 0..path_len {
        path.push(Address::from_wire(buf.get_u8() as u16)?);
    }

    Ok(DataPacket {
        sender,
        seq,
        dest,
        message,
        path,
    })
}
