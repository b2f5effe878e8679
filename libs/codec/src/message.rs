//! The wire message: framing, field container, mutability discipline
//!
//! Wire layout, scalars big-endian unless the little-endian flag is set
//! (and then only for scalars *after* the flags word):
//!
//! ```text
//! [magic "AERIS-COMM-0004"]
//! [signing time: i64 secs, i32 nanos]
//! [sent time:    i64 secs, i32 nanos]
//! [flags: u32]  bit 0 = little-endian, bit 1 = signed
//! [field count: i32]
//! [signature length: i32, 0 when unsigned][signature bytes]
//! [per field: datatype u16, encoding u16, size u32]
//! [field payloads, back to back]
//! ```
//!
//! Locally-built messages are writable until serialized; parsed messages
//! are permanently read-only. Mutating a writable message voids any
//! signature it carried.

use std::fmt;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::RwLock;
use tracing::warn;

use crate::cursor::WireCursor;
use crate::encoding;
use crate::error::{DecodeResult, DecodingError, EncodeResult, EncodingError};
use crate::field::Field;
use crate::metaspace::MetaSpace;
use crate::value::{Value, WireInstant};
use crate::Codec;

/// Frame magic. A receiver scans for this sequence to find frame starts.
pub const MAGIC: &[u8] = b"AERIS-COMM-0004";

/// Header bytes between magic and the signature length: two timestamps,
/// flags, field count.
pub(crate) const POST_MAGIC_HEADER: usize = 12 + 12 + 4 + 4;

/// Smallest structurally valid frame: header plus a zero signature length.
pub const MIN_WIRE_LEN: usize = MAGIC.len() + POST_MAGIC_HEADER + 4;

/// Header flag bits.
pub mod flag {
    /// Scalars after the flags word are little-endian.
    pub const LITTLE_ENDIAN: u32 = 1;
    /// The message carries a signature.
    pub const SIGNED: u32 = 1 << 1;
}

/// One parsed field declaration.
pub(crate) struct FieldDecl {
    pub datatype: u16,
    pub encoding: u16,
    pub size: usize,
}

pub struct Message {
    codec: Arc<Codec>,
    flags: u32,
    signing_time: WireInstant,
    sent_time: Option<WireInstant>,
    pub(crate) signature: Bytes,
    connection_id: u64,
    read_only: bool,
    meta: Arc<RwLock<MetaSpace>>,
    fields: Vec<Field>,
}

impl Message {
    /// An empty writable message using the process-default codec.
    pub fn new() -> Self {
        Self::with_codec(Codec::shared())
    }

    /// An empty writable message using an explicit codec.
    pub fn with_codec(codec: Arc<Codec>) -> Self {
        Self {
            codec,
            flags: 0,
            signing_time: WireInstant::now(),
            sent_time: None,
            signature: Bytes::new(),
            connection_id: 0,
            read_only: false,
            meta: Arc::new(RwLock::new(MetaSpace::new())),
            fields: Vec::new(),
        }
    }

    /// Builds a message from a sequence of values, all plain-encoded.
    pub fn of<I, V>(values: I) -> EncodeResult<Self>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut msg = Self::new();
        for value in values {
            msg.add(value)?;
        }
        Ok(msg)
    }

    /// Appends a plain-encoded field.
    pub fn add(&mut self, value: impl Into<Value>) -> EncodeResult<&mut Self> {
        self.add_encoded(value, encoding::ids::PLAIN)
    }

    /// Appends a field with an explicit encoding. The datatype follows
    /// from the value's variant. Voids any existing signature.
    pub fn add_encoded(
        &mut self,
        value: impl Into<Value>,
        encoding_id: u16,
    ) -> EncodeResult<&mut Self> {
        if self.read_only {
            return Err(EncodingError::ReadOnly);
        }
        let value = value.into();
        let datatype = self.codec.datatypes().for_value(&value);
        let encoding = self.codec.encodings().get(encoding_id);
        self.fields.push(Field::outgoing(
            self.fields.len(),
            datatype,
            encoding,
            value,
            Arc::clone(&self.meta),
        ));
        self.void_signature();
        Ok(self)
    }

    /// Mutable access to a field. Voids any existing signature, but only
    /// when the index actually resolves to one.
    pub fn field_mut(&mut self, index: usize) -> EncodeResult<Option<&mut Field>> {
        if self.read_only {
            return Err(EncodingError::ReadOnly);
        }
        if index >= self.fields.len() {
            return Ok(None);
        }
        self.void_signature();
        Ok(self.fields.get_mut(index))
    }

    fn void_signature(&mut self) {
        self.signature = Bytes::new();
        self.flags &= !flag::SIGNED;
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Time the signature was produced (creation time until signed).
    pub fn signing_time(&self) -> WireInstant {
        self.signing_time
    }

    pub(crate) fn set_signing_time(&mut self, t: WireInstant) {
        self.signing_time = t;
    }

    /// Time the peer serialized the message; absent until then.
    pub fn sent_time(&self) -> Option<WireInstant> {
        self.sent_time
    }

    /// Transport-assigned origin id; 0 until stamped.
    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Stamps the origin connection. Valid exactly once, on a parsed
    /// message, with a nonzero id; anything else is ignored with a
    /// warning so a misbehaving caller cannot re-attribute a message.
    pub fn set_connection_id(&mut self, id: u64) {
        if !self.read_only || self.connection_id != 0 || id == 0 {
            warn!(
                id,
                current = self.connection_id,
                read_only = self.read_only,
                "refusing connection id stamp"
            );
            return;
        }
        self.connection_id = id;
    }

    /// Handle to the message's key context, shared with all its fields.
    pub fn meta(&self) -> Arc<RwLock<MetaSpace>> {
        Arc::clone(&self.meta)
    }

    /// Replaces the key context. Works on parsed messages too: attaching
    /// keys is not a mutation of the message content.
    pub fn set_meta_space(&self, meta: MetaSpace) {
        *self.meta.write() = meta;
    }

    /// Builder form of [`set_meta_space`](Self::set_meta_space).
    pub fn with_meta(self, meta: MetaSpace) -> Self {
        self.set_meta_space(meta);
        self
    }

    /// Decodes every field now, surfacing the first failure. Useful to
    /// check that the attached key material is sufficient before handing
    /// the message on.
    pub fn ensure_decoded(&self) -> DecodeResult<()> {
        for field in &self.fields {
            field.value()?;
        }
        Ok(())
    }

    /// Serializes to the wire form. Always emits big-endian scalars; the
    /// little-endian flag exists for foreign senders, not for us. Field
    /// encodings run (and are cached) here, so a missing key surfaces as
    /// a typed error before any bytes leave the process.
    pub fn to_bytes(&self) -> EncodeResult<Bytes> {
        let mut encoded = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            encoded.push(field.encoded()?);
        }
        let payload_len: usize = encoded.iter().map(|e| e.len()).sum();

        let mut flags = self.flags & !flag::LITTLE_ENDIAN;
        if self.signature.is_empty() {
            flags &= !flag::SIGNED;
        } else {
            flags |= flag::SIGNED;
        }
        let sent = WireInstant::now();

        let mut buf = BytesMut::with_capacity(
            MIN_WIRE_LEN + self.signature.len() + self.fields.len() * 8 + payload_len,
        );
        buf.put_slice(MAGIC);
        buf.put_i64(self.signing_time.secs);
        buf.put_i32(self.signing_time.nanos);
        buf.put_i64(sent.secs);
        buf.put_i32(sent.nanos);
        buf.put_u32(flags);
        buf.put_i32(self.fields.len() as i32);
        buf.put_i32(self.signature.len() as i32);
        buf.put_slice(&self.signature);
        for (field, wire) in self.fields.iter().zip(&encoded) {
            buf.put_u16(field.datatype().id());
            buf.put_u16(field.encoding().id());
            buf.put_u32(wire.len() as u32);
        }
        for wire in &encoded {
            buf.put_slice(wire);
        }
        Ok(buf.freeze())
    }

    /// Parses a complete frame with the process-default codec.
    pub fn parse(buf: &[u8]) -> DecodeResult<Self> {
        Self::parse_with(Codec::shared(), buf)
    }

    /// Parses a complete frame. Validation order: overall size, magic,
    /// header structure, declarations, then payload bounds; nothing is
    /// decrypted or decoded here.
    pub fn parse_with(codec: Arc<Codec>, buf: &[u8]) -> DecodeResult<Self> {
        if buf.len() < MIN_WIRE_LEN {
            return Err(DecodingError::insufficient(
                "frame header",
                MIN_WIRE_LEN,
                buf.len(),
            ));
        }
        if &buf[..MAGIC.len()] != MAGIC {
            return Err(DecodingError::InvalidMagic);
        }

        let mut cur = WireCursor::new(&buf[MAGIC.len()..]);
        let signing_time = WireInstant {
            secs: cur.read_i64("signing time")?,
            nanos: cur.read_i32("signing time")?,
        };
        let sent_time = WireInstant {
            secs: cur.read_i64("sent time")?,
            nanos: cur.read_i32("sent time")?,
        };
        let flags = cur.read_u32("flags")?;
        cur.set_little_endian(flags & flag::LITTLE_ENDIAN != 0);

        let count = cur.read_i32("field count")?;
        if count < 0 {
            return Err(DecodingError::InvalidFieldCount { count });
        }
        let sig_len = cur.read_i32("signature length")?;
        if sig_len < 0 {
            return Err(DecodingError::InvalidSignatureLength { length: sig_len });
        }
        let signature = Bytes::copy_from_slice(cur.take(sig_len as usize, "signature")?);

        let count = count as usize;
        let mut decls = Vec::with_capacity(count);
        for index in 0..count {
            let datatype = cur.read_u16("field declaration")?;
            let encoding = cur.read_u16("field declaration")?;
            let size = cur.read_i32("field declaration")?;
            if size < 0 {
                return Err(DecodingError::NegativeFieldSize { index, size });
            }
            decls.push(FieldDecl {
                datatype,
                encoding,
                size: size as usize,
            });
        }

        let declared: u64 = decls.iter().map(|d| d.size as u64).sum();
        if declared > cur.remaining() as u64 {
            return Err(DecodingError::OversizedFields {
                declared,
                available: cur.remaining() as u64,
            });
        }

        let mut parts = Vec::with_capacity(count);
        for decl in decls {
            let payload = Bytes::copy_from_slice(cur.take(decl.size, "field payload")?);
            parts.push((decl, payload));
        }

        Ok(Self::from_parts(
            codec,
            flags,
            signing_time,
            sent_time,
            signature,
            parts,
        ))
    }

    /// Assembles a read-only message from already-validated parts.
    pub(crate) fn from_parts(
        codec: Arc<Codec>,
        flags: u32,
        signing_time: WireInstant,
        sent_time: WireInstant,
        signature: Bytes,
        parts: Vec<(FieldDecl, Bytes)>,
    ) -> Self {
        let meta = Arc::new(RwLock::new(MetaSpace::new()));
        let fields = parts
            .into_iter()
            .enumerate()
            .map(|(index, (decl, payload))| {
                Field::incoming(
                    index,
                    codec.datatypes().get(decl.datatype),
                    codec.encodings().get(decl.encoding),
                    payload,
                    Arc::clone(&meta),
                )
            })
            .collect();
        Self {
            codec,
            flags,
            signing_time,
            sent_time: Some(sent_time),
            signature,
            connection_id: 0,
            read_only: true,
            meta,
            fields,
        }
    }
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Message {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            flags: self.flags,
            signing_time: self.signing_time,
            sent_time: self.sent_time,
            signature: self.signature.clone(),
            connection_id: self.connection_id,
            read_only: self.read_only,
            meta: Arc::clone(&self.meta),
            fields: self.fields.clone(),
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("fields", &self.fields.len())
            .field("signed", &self.is_signed())
            .field("read_only", &self.read_only)
            .field("connection_id", &self.connection_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{BigEndian, ByteOrder, LittleEndian};

    #[test]
    fn round_trip_preserves_fields() {
        let mut msg = Message::new();
        msg.add("hello").unwrap();
        msg.add(Value::I64(-42)).unwrap();
        msg.add(vec![0xDE, 0xAD]).unwrap();

        let wire = msg.to_bytes().unwrap();
        assert!(wire.starts_with(MAGIC));

        let parsed = Message::parse(&wire).unwrap();
        assert!(parsed.is_read_only());
        assert!(!parsed.is_signed());
        assert_eq!(parsed.field_count(), 3);
        assert_eq!(parsed.field(0).unwrap().as_str().unwrap(), "hello");
        assert_eq!(parsed.field(1).unwrap().as_i64().unwrap(), -42);
        assert_eq!(parsed.field(2).unwrap().as_blob().unwrap(), &[0xDE, 0xAD]);
        assert!(parsed.sent_time().is_some());
    }

    #[test]
    fn empty_message_round_trips() {
        let wire = Message::new().to_bytes().unwrap();
        assert_eq!(wire.len(), MIN_WIRE_LEN);
        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.field_count(), 0);
    }

    #[test]
    fn parsed_messages_reject_mutation() {
        let wire = Message::of(["x"]).unwrap().to_bytes().unwrap();
        let mut parsed = Message::parse(&wire).unwrap();
        assert!(matches!(parsed.add("y"), Err(EncodingError::ReadOnly)));
        assert!(matches!(
            parsed.field_mut(0),
            Err(EncodingError::ReadOnly)
        ));
    }

    #[test]
    fn truncated_buffer_is_insufficient_data() {
        let wire = Message::of(["hello"]).unwrap().to_bytes().unwrap();
        assert!(matches!(
            Message::parse(&wire[..MIN_WIRE_LEN - 1]),
            Err(DecodingError::InsufficientData { .. })
        ));
        // Long enough for the header but missing payload bytes.
        assert!(Message::parse(&wire[..wire.len() - 1]).is_err());
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let mut wire = Message::new().to_bytes().unwrap().to_vec();
        wire[0] ^= 0xFF;
        assert!(matches!(
            Message::parse(&wire),
            Err(DecodingError::InvalidMagic)
        ));
    }

    #[test]
    fn negative_field_count_is_rejected() {
        let mut wire = Message::new().to_bytes().unwrap().to_vec();
        let at = MAGIC.len() + 12 + 12 + 4;
        BigEndian::write_i32(&mut wire[at..at + 4], -1);
        assert!(matches!(
            Message::parse(&wire),
            Err(DecodingError::InvalidFieldCount { count: -1 })
        ));
    }

    #[test]
    fn oversized_declaration_is_rejected_before_payload_reads() {
        let wire = Message::of(["hello"]).unwrap().to_bytes().unwrap();
        let mut wire = wire.to_vec();
        // Inflate the declared size of field 0 far past the buffer.
        let decl_size_at = MIN_WIRE_LEN + 4;
        BigEndian::write_u32(&mut wire[decl_size_at..decl_size_at + 4], 1 << 30);
        assert!(matches!(
            Message::parse(&wire),
            Err(DecodingError::OversizedFields { .. })
        ));
    }

    #[test]
    fn little_endian_frames_parse() {
        // Hand-build an LE frame: scalars after the flags word flipped.
        let mut wire = Vec::new();
        wire.extend_from_slice(MAGIC);
        wire.extend_from_slice(&[0u8; 24]); // both timestamps at epoch
        let mut w32 = [0u8; 4];
        BigEndian::write_u32(&mut w32, flag::LITTLE_ENDIAN);
        wire.extend_from_slice(&w32); // flags stay big-endian
        LittleEndian::write_i32(&mut w32, 1);
        wire.extend_from_slice(&w32); // field count
        LittleEndian::write_i32(&mut w32, 0);
        wire.extend_from_slice(&w32); // signature length
        let mut w16 = [0u8; 2];
        LittleEndian::write_u16(&mut w16, crate::datatype::ids::STRING);
        wire.extend_from_slice(&w16);
        LittleEndian::write_u16(&mut w16, encoding::ids::PLAIN);
        wire.extend_from_slice(&w16);
        LittleEndian::write_u32(&mut w32, 5);
        wire.extend_from_slice(&w32);
        wire.extend_from_slice(b"hello");

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.field_count(), 1);
        assert_eq!(parsed.field(0).unwrap().as_str().unwrap(), "hello");
    }

    #[test]
    fn connection_id_stamps_once_on_parsed_messages() {
        let wire = Message::new().to_bytes().unwrap();
        let mut parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.connection_id(), 0);

        parsed.set_connection_id(7);
        assert_eq!(parsed.connection_id(), 7);

        // Restamping and zero are both ignored.
        parsed.set_connection_id(9);
        assert_eq!(parsed.connection_id(), 7);

        let mut outgoing = Message::new();
        outgoing.set_connection_id(3);
        assert_eq!(outgoing.connection_id(), 0);
    }

    #[test]
    fn unknown_ids_degrade_to_blob_passthrough() {
        let wire = Message::of(["payload"]).unwrap().to_bytes().unwrap();
        let mut wire = wire.to_vec();
        // Rewrite field 0's declaration to unknown datatype/encoding ids.
        let decl_at = MIN_WIRE_LEN;
        BigEndian::write_u16(&mut wire[decl_at..decl_at + 2], 900);
        BigEndian::write_u16(&mut wire[decl_at + 2..decl_at + 4], 901);

        let parsed = Message::parse(&wire).unwrap();
        assert_eq!(parsed.field(0).unwrap().as_blob().unwrap(), b"payload");
    }
}
