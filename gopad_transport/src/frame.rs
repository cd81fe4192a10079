use std::io::{Read, Write};

use buffertk::Unpackable;
use rpc_pb::{Error, Frame};
use zerror_core::ErrorCore;

/// Messages on the wire are a varint byte-length of the packed [Frame], the packed [Frame]
/// itself (carrying the body's size and crc32c), and then the body.  Grounded on
/// `busyrpc::channel::Channel::send`'s framing, read here with blocking reads instead of
/// `busyrpc`'s non-blocking poll loop.
const MAX_FRAME_HEADER: usize = 32;

fn transport_failure(what: impl std::fmt::Display) -> Error {
    Error::TransportFailure {
        core: ErrorCore::default(),
        what: what.to_string(),
    }
}

pub fn write_message<W: Write>(w: &mut W, msg: &[u8]) -> Result<(), Error> {
    let frame = Frame::from_buffer(msg);
    let frame_bytes = buffertk::stack_pack(frame).to_vec();
    let frame_sz = encode_varint(frame_bytes.len() as u64);
    w.write_all(&frame_sz).map_err(transport_failure)?;
    w.write_all(&frame_bytes).map_err(transport_failure)?;
    w.write_all(msg).map_err(transport_failure)?;
    w.flush().map_err(transport_failure)
}

pub fn read_message<R: Read>(r: &mut R) -> Result<Vec<u8>, Error> {
    let frame_sz = read_varint(r)? as usize;
    if frame_sz > MAX_FRAME_HEADER {
        return Err(transport_failure("frame header implausibly large"));
    }
    let mut frame_bytes = vec![0u8; frame_sz];
    r.read_exact(&mut frame_bytes).map_err(transport_failure)?;
    let (frame, _): (Frame, _) = Frame::unpack(&frame_bytes).map_err(transport_failure)?;
    if frame.size > rpc_pb::MAX_REQUEST_SIZE as u64 {
        return Err(Error::RequestTooLarge {
            core: ErrorCore::default(),
            size: frame.size,
        });
    }
    let mut body = vec![0u8; frame.size as usize];
    r.read_exact(&mut body).map_err(transport_failure)?;
    if crc32c::crc32c(&body) != frame.crc32c {
        return Err(transport_failure("frame crc32c mismatch"));
    }
    Ok(body)
}

/// Unsigned LEB128, matching the varint encoding `buffertk::v64` packs to the wire.
fn encode_varint(mut x: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    loop {
        let byte = (x & 0x7f) as u8;
        x >>= 7;
        if x == 0 {
            out.push(byte);
            break;
        } else {
            out.push(byte | 0x80);
        }
    }
    out
}

fn read_varint<R: Read>(r: &mut R) -> Result<u64, Error> {
    let mut value: u64 = 0;
    for shift in (0..64).step_by(7) {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte).map_err(transport_failure)?;
        value |= ((byte[0] & 0x7f) as u64) << shift;
        if byte[0] & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(transport_failure("varint too long"))
}
