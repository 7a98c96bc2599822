// src/core/protocol/resp_frame.rs

//! Implements the subset of RESP2 (the key-value store's native wire protocol)
//! needed by the store client: encoding command arrays and decoding replies.

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// The CRLF (Carriage Return, Line Feed) sequence used to terminate lines in RESP.
const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Limits applied to replies so a misbehaving store cannot exhaust memory.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 32;

/// Failures while encoding or decoding RESP frames.
#[derive(Error, Debug)]
pub enum RespError {
    /// More bytes are needed before a full frame is available.
    #[error("incomplete frame")]
    Incomplete,

    #[error("protocol syntax error: {0}")]
    Syntax(&'static str),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single frame in the RESP protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds a command frame, an array of bulk strings, e.g. `SET key value`.
    pub fn command<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        RespFrame::Array(
            parts
                .into_iter()
                .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p.as_ref().as_bytes())))
                .collect(),
        )
    }

    /// Encodes a frame into a `Vec<u8>`.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>, RespError> {
        let mut buf = BytesMut::new();
        RespFrameCodec.encode(self.clone(), &mut buf)?;
        Ok(buf.to_vec())
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
/// It is stateless and is also driven by hand over blocking sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = RespError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => {
                dst.extend_from_slice(b"+");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Error(s) => {
                dst.extend_from_slice(b"-");
                dst.extend_from_slice(s.as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Integer(i) => {
                dst.extend_from_slice(b":");
                dst.extend_from_slice(i.to_string().as_bytes());
                dst.extend_from_slice(CRLF);
            }
            RespFrame::BulkString(b) => {
                dst.extend_from_slice(b"$");
                dst.extend_from_slice(b.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(arr) => {
                dst.extend_from_slice(b"*");
                dst.extend_from_slice(arr.len().to_string().as_bytes());
                dst.extend_from_slice(CRLF);
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = RespError;

    /// Decodes one frame, consuming its bytes from `src`. Returns `Ok(None)`
    /// and leaves `src` untouched if the frame is not complete yet.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut bytes = &src[..];
        match decode_frame(&mut bytes, 0) {
            Ok(frame) => {
                let consumed = src.len() - bytes.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            Err(RespError::Incomplete) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn decode_frame(bytes: &mut &[u8], depth: usize) -> Result<RespFrame, RespError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(RespError::Syntax("nesting too deep"));
    }
    let Some((&prefix, rest)) = bytes.split_first() else {
        return Err(RespError::Incomplete);
    };
    *bytes = rest;

    match prefix {
        b'+' => Ok(RespFrame::SimpleString(read_text_line(bytes)?)),
        b'-' => Ok(RespFrame::Error(read_text_line(bytes)?)),
        b':' => Ok(RespFrame::Integer(read_length(bytes)?)),
        b'$' => {
            let len = read_length(bytes)?;
            if len == -1 {
                return Ok(RespFrame::Null);
            }
            let len = usize::try_from(len).map_err(|_| RespError::Syntax("negative length"))?;
            if len > MAX_BULK_STRING_SIZE {
                return Err(RespError::Syntax("bulk string too large"));
            }
            if bytes.len() < len + CRLF_LEN {
                return Err(RespError::Incomplete);
            }
            if &bytes[len..len + CRLF_LEN] != CRLF {
                return Err(RespError::Syntax("bulk string not terminated"));
            }
            let data = Bytes::copy_from_slice(&bytes[..len]);
            *bytes = &bytes[len + CRLF_LEN..];
            Ok(RespFrame::BulkString(data))
        }
        b'*' => {
            let len = read_length(bytes)?;
            if len == -1 {
                return Ok(RespFrame::NullArray);
            }
            let len = usize::try_from(len).map_err(|_| RespError::Syntax("negative length"))?;
            if len > MAX_FRAME_ELEMENTS {
                return Err(RespError::Syntax("array too large"));
            }
            let mut frames = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                frames.push(decode_frame(bytes, depth + 1)?);
            }
            Ok(RespFrame::Array(frames))
        }
        _ => Err(RespError::Syntax("unknown frame prefix")),
    }
}

/// Splits off the next CRLF-terminated line.
fn read_line<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], RespError> {
    let pos = bytes
        .windows(CRLF_LEN)
        .position(|window| window == CRLF)
        .ok_or(RespError::Incomplete)?;
    let line = &bytes[..pos];
    *bytes = &bytes[pos + CRLF_LEN..];
    Ok(line)
}

fn read_text_line(bytes: &mut &[u8]) -> Result<String, RespError> {
    Ok(String::from_utf8_lossy(read_line(bytes)?).into_owned())
}

fn read_length(bytes: &mut &[u8]) -> Result<i64, RespError> {
    let line = read_line(bytes)?;
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or(RespError::Syntax("invalid integer"))
}
