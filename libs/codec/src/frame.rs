//! Resynchronizing frame reader for byte streams
//!
//! TCP delivers a byte stream, not frames. The reader scans for the magic
//! sequence, then reads one frame's worth of header, declarations, and
//! payloads. Garbage between frames, a torn frame after a peer crash, or
//! a malformed header all result in the same recovery: log, drop what was
//! consumed, and scan forward for the next magic. Only a transport-level
//! I/O failure (including EOF) ends the stream.

use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::DecodingError;
use crate::message::{flag, FieldDecl, Message, MAGIC};
use crate::value::WireInstant;
use crate::Codec;

/// Default ceiling on signature, declaration, and payload bytes per frame.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub struct FrameReader<R> {
    reader: BufReader<R>,
    codec: Arc<Codec>,
    max_frame_bytes: usize,
}

enum FrameError {
    /// Stream is done: EOF or a transport fault.
    Io(std::io::Error),
    /// This frame is garbage; the stream may still recover.
    Malformed(DecodingError),
}

impl From<std::io::Error> for FrameError {
    fn from(e: std::io::Error) -> Self {
        FrameError::Io(e)
    }
}

impl From<DecodingError> for FrameError {
    fn from(e: DecodingError) -> Self {
        FrameError::Malformed(e)
    }
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wraps a byte stream with the process-default codec and frame limit.
    pub fn new(inner: R) -> Self {
        Self::with_codec(inner, Codec::shared())
    }

    pub fn with_codec(inner: R, codec: Arc<Codec>) -> Self {
        Self {
            reader: BufReader::new(inner),
            codec,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Overrides the per-frame byte ceiling.
    pub fn max_frame_bytes(mut self, limit: usize) -> Self {
        self.max_frame_bytes = limit;
        self
    }

    /// The next complete message, skipping any garbage and malformed
    /// frames in between. `None` means the stream is finished: EOF or an
    /// I/O error, which the caller cannot tell apart by design.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            self.sync_to_magic().await?;
            match self.read_frame().await {
                Ok(msg) => return Some(msg),
                Err(FrameError::Malformed(err)) => {
                    warn!(error = %err, "discarding malformed frame, scanning for next magic");
                }
                Err(FrameError::Io(_)) => return None,
            }
        }
    }

    /// Consumes bytes until a full magic sequence has been read.
    ///
    /// On a mismatch the candidate restarts at the mismatching byte, so a
    /// run of garbage that happens to contain a magic prefix cannot hide
    /// the genuine frame start that follows it. (The magic's first byte
    /// recurs nowhere else in the sequence, so one-byte lookback is all
    /// the overlap that can occur.)
    async fn sync_to_magic(&mut self) -> Option<()> {
        let mut matched = 0;
        while matched < MAGIC.len() {
            let byte = self.reader.read_u8().await.ok()?;
            if byte == MAGIC[matched] {
                matched += 1;
            } else {
                matched = usize::from(byte == MAGIC[0]);
            }
        }
        Some(())
    }

    /// Reads everything after the magic of one frame.
    async fn read_frame(&mut self) -> Result<Message, FrameError> {
        // Timestamps and flags precede the endianness switch; they are
        // always big-endian.
        let mut head = [0u8; 28];
        self.reader.read_exact(&mut head).await?;
        let signing_time = WireInstant {
            secs: BigEndian::read_i64(&head[..8]),
            nanos: BigEndian::read_i32(&head[8..12]),
        };
        let sent_time = WireInstant {
            secs: BigEndian::read_i64(&head[12..20]),
            nanos: BigEndian::read_i32(&head[20..24]),
        };
        let flags = BigEndian::read_u32(&head[24..28]);
        let little = flags & flag::LITTLE_ENDIAN != 0;

        let count = self.read_i32(little).await?;
        if count < 0 {
            return Err(DecodingError::InvalidFieldCount { count }.into());
        }
        let count = count as usize;
        if count.saturating_mul(8) > self.max_frame_bytes {
            return Err(DecodingError::FrameTooLarge {
                requested: count as u64 * 8,
                limit: self.max_frame_bytes,
            }
            .into());
        }

        let sig_len = self.read_i32(little).await?;
        if sig_len < 0 {
            return Err(DecodingError::InvalidSignatureLength { length: sig_len }.into());
        }
        if sig_len as usize > self.max_frame_bytes {
            return Err(DecodingError::FrameTooLarge {
                requested: sig_len as u64,
                limit: self.max_frame_bytes,
            }
            .into());
        }
        let signature = self.read_bytes(sig_len as usize).await?;

        let mut decl_buf = vec![0u8; count * 8];
        self.reader.read_exact(&mut decl_buf).await?;
        let mut decls = Vec::with_capacity(count);
        for index in 0..count {
            let d = &decl_buf[index * 8..index * 8 + 8];
            let (datatype, encoding, size) = if little {
                (
                    LittleEndian::read_u16(&d[..2]),
                    LittleEndian::read_u16(&d[2..4]),
                    LittleEndian::read_i32(&d[4..]),
                )
            } else {
                (
                    BigEndian::read_u16(&d[..2]),
                    BigEndian::read_u16(&d[2..4]),
                    BigEndian::read_i32(&d[4..]),
                )
            };
            if size < 0 {
                return Err(DecodingError::NegativeFieldSize { index, size }.into());
            }
            decls.push(FieldDecl {
                datatype,
                encoding,
                size: size as usize,
            });
        }

        let total: u64 = decls.iter().map(|d| d.size as u64).sum();
        if total > self.max_frame_bytes as u64 {
            return Err(DecodingError::FrameTooLarge {
                requested: total,
                limit: self.max_frame_bytes,
            }
            .into());
        }

        let mut parts = Vec::with_capacity(count);
        for decl in decls {
            let payload = self.read_bytes(decl.size).await?;
            parts.push((decl, payload));
        }

        debug!(fields = parts.len(), signed = !signature.is_empty(), "frame read");
        Ok(Message::from_parts(
            Arc::clone(&self.codec),
            flags,
            signing_time,
            sent_time,
            signature,
            parts,
        ))
    }

    async fn read_i32(&mut self, little: bool) -> Result<i32, std::io::Error> {
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf).await?;
        Ok(if little {
            LittleEndian::read_i32(&buf)
        } else {
            BigEndian::read_i32(&buf)
        })
    }

    async fn read_bytes(&mut self, len: usize) -> Result<Bytes, std::io::Error> {
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clean_stream_yields_each_message() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&Message::of(["one"]).unwrap().to_bytes().unwrap());
        stream.extend_from_slice(&Message::of(["two"]).unwrap().to_bytes().unwrap());

        let mut reader = FrameReader::new(&stream[..]);
        let first = reader.next_message().await.unwrap();
        assert_eq!(first.field(0).unwrap().as_str().unwrap(), "one");
        let second = reader.next_message().await.unwrap();
        assert_eq!(second.field(0).unwrap().as_str().unwrap(), "two");
        assert!(reader.next_message().await.is_none());
    }

    #[tokio::test]
    async fn eof_mid_frame_ends_the_stream() {
        let wire = Message::of(["torn"]).unwrap().to_bytes().unwrap();
        let mut reader = FrameReader::new(&wire[..wire.len() - 2]);
        assert!(reader.next_message().await.is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_skipped() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&Message::of(["way too big"]).unwrap().to_bytes().unwrap());
        stream.extend_from_slice(&Message::of(["ok"]).unwrap().to_bytes().unwrap());

        // Tight limit rejects the first frame's payload but the reader
        // still finds the next one... which it also rejects, then EOF.
        let mut reader = FrameReader::new(&stream[..]).max_frame_bytes(4);
        assert!(reader.next_message().await.is_none());

        let mut reader = FrameReader::new(&stream[..]).max_frame_bytes(64);
        assert!(reader.next_message().await.is_some());
    }
}
