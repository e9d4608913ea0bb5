
use crate::error::{Error, Result};

/// Size in bytes of every frame header: flag(1) + length(2) + rid(4) + sid(16) + seqid(2).
pub const HEADER_SIZE: usize = 1 + 2 + 4 + 16 + 2;

pub const SID_SIZE: usize = 16;

pub type StreamId = [u8; SID_SIZE];

/// One octet discriminating the purpose of a frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Flag {
    /// Advisory stream open. Not acknowledged by the peer.
    Syn = 0,
    /// Carries one fragment of payload.
    Psh = 1,
    /// Marks the end of the current burst of PSH frames.
    Dne = 2,
    /// Reserved; parsed but never produced or acted on.
    Nop = 3,
    /// Terminates the stream permanently.
    Fin = 4,
}

impl Flag {
    fn from_u8(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Flag::Syn),
            1 => Ok(Flag::Psh),
            2 => Ok(Flag::Dne),
            3 => Ok(Flag::Nop),
            4 => Ok(Flag::Fin),
            _ => Err(Error::UnknownFlag(b)),
        }
    }
}

/// A parsed frame header plus a borrowed view of its payload bytes.
///
/// Built over a whole received datagram; never copies the payload out until
/// the caller asks for it.
#[derive(Debug)]
pub struct Header<'a> {
    buf: &'a [u8],
}

impl<'a> Header<'a> {
    /// Parses the header of `buf`. Fails if `buf` is shorter than
    /// [`HEADER_SIZE`], the flag byte is unrecognized, or the declared
    /// `length` would run past the end of `buf`.
    pub fn parse(buf: &'a [u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(Error::Eof);
        }
        let h = Header { buf };
        Flag::from_u8(buf[0])?;
        let length = h.length() as usize;
        if HEADER_SIZE + length > buf.len() {
            return Err(Error::FrameTooLarge(length));
        }
        Ok(h)
    }

    pub fn flag(&self) -> Flag {
        Flag::from_u8(self.buf[0]).expect("validated in parse")
    }

    pub fn length(&self) -> u16 {
        u16::from_le_bytes([self.buf[1], self.buf[2]])
    }

    pub fn rid(&self) -> u32 {
        u32::from_le_bytes([self.buf[3], self.buf[4], self.buf[5], self.buf[6]])
    }

    pub fn sid(&self) -> StreamId {
        let mut sid = [0u8; SID_SIZE];
        sid.copy_from_slice(&self.buf[7..7 + SID_SIZE]);
        sid
    }

    pub fn seqid(&self) -> u16 {
        let o = 7 + SID_SIZE;
        u16::from_le_bytes([self.buf[o], self.buf[o + 1]])
    }

    pub fn payload(&self) -> &'a [u8] {
        let len = self.length() as usize;
        &self.buf[HEADER_SIZE..HEADER_SIZE + len]
    }
}

/// Builds the serialized bytes of a single frame.
pub fn build(flag: Flag, sid: StreamId, rid: u32, seqid: u16, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > u16::MAX as usize {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.push(flag as u8);
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.extend_from_slice(&rid.to_le_bytes());
    out.extend_from_slice(&sid);
    out.extend_from_slice(&seqid.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}
