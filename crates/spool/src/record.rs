//! On-disk record framing.
//!
//! Every record is a big-endian `u32` length followed by the payload. A crash in
//! the middle of an append leaves at most one torn frame at the end of a file;
//! decoding stops there and keeps everything before it.

use bytes::{Buf, BufMut, Bytes, BytesMut};

pub(crate) const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame a payload. The caller guarantees `payload.len() <= u32::MAX`.
pub(crate) fn encode(payload: &[u8]) -> Bytes {
    let mut frame = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.put_u32(payload.len() as u32);
    frame.put_slice(payload);
    frame.freeze()
}

#[derive(Debug, Default)]
pub(crate) struct Decoded {
    pub records: Vec<Bytes>,
    /// Bytes after the last complete frame.
    pub torn_bytes: usize,
}

pub(crate) fn decode(mut data: Bytes) -> Decoded {
    let mut decoded = Decoded::default();
    while data.remaining() >= LENGTH_PREFIX_SIZE {
        let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        if data.remaining() - LENGTH_PREFIX_SIZE < len {
            break;
        }
        data.advance(LENGTH_PREFIX_SIZE);
        decoded.records.push(data.split_to(len));
    }
    decoded.torn_bytes = data.remaining();
    decoded
}
