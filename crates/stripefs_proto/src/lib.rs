//! Wire protocol between stripefs clients and block servers.
//!
//! A server exports a flat array of raw block slots addressed by per-server
//! index (never by client-logical block number) and answers exactly three
//! requests:
//!
//! * `Get(index)`: the slot's contents, exactly one block.
//! * `Put(index, data)`: store `data` (the server pads short payloads with
//!   NUL to a full block); empty reply.
//! * `Rsm(index)`: the atomic test-and-set used for the lock block, replying
//!   with the slot's prior contents and overwriting it with all-`0xFF` bytes.
//!
//! Frames are big-endian and length-prefixed: a request is an opcode byte
//! and a `u32` slot index, plus a `u32` length and payload for `Put`; a
//! response is a status byte, a `u32` length, and the payload. Connections
//! are persistent; requests are answered in order.

use std::io::{self, Read, Write};

const OP_GET: u8 = 1;
const OP_PUT: u8 = 2;
const OP_RSM: u8 = 3;

const STATUS_OK: u8 = 0;
const STATUS_FAILED: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("unknown opcode {0:#04x}")]
    BadOpcode(u8),
    #[error("unknown response status {0:#04x}")]
    BadStatus(u8),
    #[error("payload of {len} bytes exceeds the {max}-byte block size")]
    Oversize { len: u32, max: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get { index: u32 },
    Put { index: u32, data: Vec<u8> },
    Rsm { index: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ok(Vec<u8>),
    Failed,
}

fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

fn read_payload<R: Read>(r: &mut R, max: usize) -> Result<Vec<u8>, ProtoError> {
    let len = read_u32(r)?;
    if len as usize > max {
        return Err(ProtoError::Oversize { len, max });
    }
    let mut data = vec![0; len as usize];
    r.read_exact(&mut data)?;
    Ok(data)
}

impl Request {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::Get { index } => {
                w.write_all(&[OP_GET])?;
                w.write_all(&index.to_be_bytes())?;
            }
            Self::Put { index, data } => {
                w.write_all(&[OP_PUT])?;
                w.write_all(&index.to_be_bytes())?;
                w.write_all(&u32::try_from(data.len()).unwrap().to_be_bytes())?;
                w.write_all(data)?;
            }
            Self::Rsm { index } => {
                w.write_all(&[OP_RSM])?;
                w.write_all(&index.to_be_bytes())?;
            }
        }
        w.flush()
    }

    /// Reads one request frame. `max_payload` is the server's block size;
    /// larger `Put` payloads are refused before allocation.
    pub fn read_from<R: Read>(r: &mut R, max_payload: usize) -> Result<Self, ProtoError> {
        let mut op = [0];
        r.read_exact(&mut op)?;
        let index = read_u32(r)?;
        match op[0] {
            OP_GET => Ok(Self::Get { index }),
            OP_RSM => Ok(Self::Rsm { index }),
            OP_PUT => {
                let data = read_payload(r, max_payload)?;
                Ok(Self::Put { index, data })
            }
            op => Err(ProtoError::BadOpcode(op)),
        }
    }
}

impl Response {
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        match self {
            Self::Ok(data) => {
                w.write_all(&[STATUS_OK])?;
                w.write_all(&u32::try_from(data.len()).unwrap().to_be_bytes())?;
                w.write_all(data)?;
            }
            Self::Failed => {
                w.write_all(&[STATUS_FAILED])?;
                w.write_all(&0u32.to_be_bytes())?;
            }
        }
        w.flush()
    }

    pub fn read_from<R: Read>(r: &mut R, max_payload: usize) -> Result<Self, ProtoError> {
        let mut status = [0];
        r.read_exact(&mut status)?;
        match status[0] {
            STATUS_OK => Ok(Self::Ok(read_payload(r, max_payload)?)),
            STATUS_FAILED => {
                let _ = read_payload(r, max_payload)?;
                Ok(Self::Failed)
            }
            status => Err(ProtoError::BadStatus(status)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn round_trip_request(req: &Request) -> Request {
        let mut buf = Vec::new();
        req.write_to(&mut buf).unwrap();
        Request::read_from(&mut Cursor::new(buf), 128).unwrap()
    }

    #[test]
    fn request_round_trips() {
        for req in [
            Request::Get { index: 0 },
            Request::Get { index: 85 },
            Request::Rsm { index: 85 },
            Request::Put {
                index: 3,
                data: b"hello".to_vec(),
            },
            Request::Put {
                index: 0,
                data: vec![0xab; 128],
            },
        ] {
            assert_eq!(round_trip_request(&req), req);
        }
    }

    #[test]
    fn response_round_trips() {
        for resp in [Response::Ok(vec![0x55; 128]), Response::Failed] {
            let mut buf = Vec::new();
            resp.write_to(&mut buf).unwrap();
            let back = Response::read_from(&mut Cursor::new(buf), 128).unwrap();
            assert_eq!(back, resp);
        }
    }

    #[test]
    fn rejects_unknown_opcode() {
        let buf = [9u8, 0, 0, 0, 0];
        assert!(matches!(
            Request::read_from(&mut Cursor::new(buf), 128),
            Err(ProtoError::BadOpcode(9))
        ));
    }

    #[test]
    fn rejects_oversized_put() {
        let req = Request::Put {
            index: 0,
            data: vec![0; 200],
        };
        let mut buf = Vec::new();
        req.write_to(&mut buf).unwrap();
        assert!(matches!(
            Request::read_from(&mut Cursor::new(buf), 128),
            Err(ProtoError::Oversize { len: 200, .. })
        ));
    }

    #[test]
    fn truncated_frame_is_eof() {
        let req = Request::Get { index: 7 };
        let mut buf = Vec::new();
        req.write_to(&mut buf).unwrap();
        buf.truncate(3);
        match Request::read_from(&mut Cursor::new(buf), 128) {
            Err(ProtoError::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected eof, got {other:?}"),
        }
    }
}
