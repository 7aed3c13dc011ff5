//! BER primitives (ITU-T X.690), restricted to what LDAP puts on the wire.
//!
//! RFC 4511 section 5.1 limits LDAP to definite lengths, and no LDAP type
//! uses a tag number above 30, so tags here are always a single octet.
//! Anything outside that envelope is rejected rather than skipped.

use std::fmt;
use thiserror::Error;

use rolodex_core::error::Error as CoreError;

/// Upper bound on a single message, to keep a hostile length octet from
/// pinning the read buffer.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Errors that can occur while decoding BER elements or LDAP messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The input ended inside an element.
    #[error("element truncated")]
    Truncated,
    /// An indefinite length octet was seen.
    #[error("indefinite lengths are not allowed")]
    IndefiniteLength,
    /// A multi-octet tag was seen.
    #[error("unsupported multi-octet tag: 0x{0:02x}")]
    UnsupportedTag(u8),
    /// A different element was required here.
    #[error("expected tag 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag {
        /// Tag the structure requires at this position
        expected: u8,
        /// Tag actually present
        found: u8,
    },
    /// An INTEGER had no content or more than eight octets.
    #[error("integer of {0} octets out of range")]
    IntegerOutOfRange(usize),
    /// A BOOLEAN did not have exactly one content octet.
    #[error("boolean of {0} octets")]
    InvalidBoolean(usize),
    /// A length octet announced more than [`MAX_FRAME_LEN`] bytes.
    #[error("announced element of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    /// Bytes remained after the outermost element.
    #[error("{0} trailing bytes after element")]
    TrailingBytes(usize),
    /// A string field held invalid UTF-8.
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    /// The protocol op tag is not part of the supported subset.
    #[error("unknown protocol operation: 0x{0:02x}")]
    UnknownOperation(u8),
    /// The element is valid LDAP but outside the supported subset.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(&'static str),
    /// A required field was absent.
    #[error("missing {0}")]
    MissingElement(&'static str),
    /// A field decoded but held a value outside its range.
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

impl From<DecodeError> for CoreError {
    fn from(err: DecodeError) -> Self {
        CoreError::Protocol(err.to_string())
    }
}

/// A single-octet BER tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag(u8);

impl Tag {
    /// UNIVERSAL 1, primitive.
    pub const BOOLEAN: Tag = Tag(0x01);
    /// UNIVERSAL 2, primitive.
    pub const INTEGER: Tag = Tag(0x02);
    /// UNIVERSAL 4, primitive.
    pub const OCTET_STRING: Tag = Tag(0x04);
    /// UNIVERSAL 10, primitive.
    pub const ENUMERATED: Tag = Tag(0x0a);
    /// UNIVERSAL 16, constructed.
    pub const SEQUENCE: Tag = Tag(0x30);
    /// UNIVERSAL 17, constructed.
    pub const SET: Tag = Tag(0x31);

    /// Context-specific primitive tag, e.g. `[0]` for a simple bind
    /// password.
    #[must_use]
    pub const fn context(number: u8) -> Tag {
        Tag(0x80 | number)
    }

    /// Context-specific constructed tag, e.g. `[3]` for a referral list.
    #[must_use]
    pub const fn context_constructed(number: u8) -> Tag {
        Tag(0xa0 | number)
    }

    /// Application-class primitive tag.
    #[must_use]
    pub const fn application(number: u8) -> Tag {
        Tag(0x40 | number)
    }

    /// Application-class constructed tag.
    #[must_use]
    pub const fn application_constructed(number: u8) -> Tag {
        Tag(0x60 | number)
    }

    /// Reads a tag octet, rejecting the multi-octet form.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnsupportedTag`] when the tag number field is
    /// all ones (0x1f), which announces continuation octets.
    pub const fn from_octet(octet: u8) -> Result<Tag, DecodeError> {
        if octet & 0x1f == 0x1f {
            Err(DecodeError::UnsupportedTag(octet))
        } else {
            Ok(Tag(octet))
        }
    }

    /// The raw tag octet.
    #[must_use]
    pub const fn octet(self) -> u8 {
        self.0
    }

    /// True when the constructed bit is set.
    #[must_use]
    pub const fn is_constructed(self) -> bool {
        self.0 & 0x20 != 0
    }

    /// Tag number (low five bits).
    #[must_use]
    pub const fn number(self) -> u8 {
        self.0 & 0x1f
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

/// Probes the start of `buf` for one complete element.
///
/// Returns the total element length (header plus contents) once the buffer
/// holds a full header announcing an in-range length, `None` while more
/// bytes are needed, and an error for headers no LDAP peer produces.
///
/// # Errors
///
/// Returns [`DecodeError`] for indefinite lengths, multi-octet tags, and
/// lengths beyond [`MAX_FRAME_LEN`].
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>, DecodeError> {
    if buf.len() < 2 {
        return Ok(None);
    }
    Tag::from_octet(buf[0])?;

    let first = buf[1];
    if first < 0x80 {
        return Ok(Some(2 + first as usize));
    }
    if first == 0x80 {
        return Err(DecodeError::IndefiniteLength);
    }

    let octets = (first & 0x7f) as usize;
    if octets > std::mem::size_of::<usize>() {
        return Err(DecodeError::FrameTooLarge(usize::MAX));
    }
    if buf.len() < 2 + octets {
        return Ok(None);
    }

    let mut len: usize = 0;
    for &octet in &buf[2..2 + octets] {
        len = (len << 8) | octet as usize;
    }
    if len > MAX_FRAME_LEN {
        return Err(DecodeError::FrameTooLarge(len));
    }
    Ok(Some(2 + octets + len))
}

/// Serializes BER elements into a growing buffer.
///
/// Constructed elements take a closure for their contents; the length
/// octets are spliced in once the closure returns, so nothing needs to be
/// sized up front.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// A new, empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the writer, returning the encoded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Writes a constructed element with the given tag, filling its
    /// contents from the closure.
    pub fn constructed(&mut self, tag: Tag, contents: impl FnOnce(&mut Self)) {
        self.buf.push(tag.octet());
        let mark = self.buf.len();
        contents(self);
        let len = self.buf.len() - mark;
        let header = length_octets(len);
        self.buf.splice(mark..mark, header);
    }

    /// Writes an INTEGER (or any integer-shaped element under `tag`) in
    /// minimal two's-complement form.
    pub fn integer(&mut self, tag: Tag, value: i64) {
        let bytes = integer_octets(value);
        self.buf.push(tag.octet());
        self.buf.extend(length_octets(bytes.len()));
        self.buf.extend_from_slice(&bytes);
    }

    /// Writes an ENUMERATED value.
    pub fn enumerated(&mut self, value: i64) {
        self.integer(Tag::ENUMERATED, value);
    }

    /// Writes an octet string under `tag`.
    pub fn octet_string(&mut self, tag: Tag, value: &[u8]) {
        self.buf.push(tag.octet());
        self.buf.extend(length_octets(value.len()));
        self.buf.extend_from_slice(value);
    }

    /// Writes a BOOLEAN. True is encoded as 0xff per DER so every server
    /// accepts it.
    pub fn boolean(&mut self, value: bool) {
        self.buf
            .extend_from_slice(&[Tag::BOOLEAN.octet(), 0x01, if value { 0xff } else { 0x00 }]);
    }

    /// Writes a zero-length element, e.g. an UnbindRequest.
    pub fn empty(&mut self, tag: Tag) {
        self.buf.extend_from_slice(&[tag.octet(), 0x00]);
    }

    /// Appends already-encoded bytes verbatim.
    pub fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }
}

fn length_octets(len: usize) -> Vec<u8> {
    if len < 0x80 {
        return vec![len as u8];
    }
    let bytes = len.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    let mut out = Vec::with_capacity(1 + bytes.len() - skip);
    out.push(0x80 | (bytes.len() - skip) as u8);
    out.extend_from_slice(&bytes[skip..]);
    out
}

fn integer_octets(value: i64) -> Vec<u8> {
    let mut bytes = value.to_be_bytes().to_vec();
    while bytes.len() > 1 {
        let drop = (bytes[0] == 0x00 && bytes[1] & 0x80 == 0)
            || (bytes[0] == 0xff && bytes[1] & 0x80 != 0);
        if drop {
            bytes.remove(0);
        } else {
            break;
        }
    }
    bytes
}

/// Walks BER elements over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// A reader over `bytes`.
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    /// True when every byte has been consumed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    /// Bytes not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// The tag of the next element, without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Truncated`] at end of input.
    pub fn peek_tag(&self) -> Result<Tag, DecodeError> {
        let octet = *self.bytes.get(self.pos).ok_or(DecodeError::Truncated)?;
        Tag::from_octet(octet)
    }

    /// Consumes the next element, returning its tag and contents.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the element header is malformed or the
    /// contents run past the end of input.
    pub fn element(&mut self) -> Result<(Tag, &'a [u8]), DecodeError> {
        let tag = self.peek_tag()?;
        self.pos += 1;

        let first = *self.bytes.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;

        let len = if first < 0x80 {
            first as usize
        } else if first == 0x80 {
            return Err(DecodeError::IndefiniteLength);
        } else {
            let octets = (first & 0x7f) as usize;
            if octets > std::mem::size_of::<usize>() {
                return Err(DecodeError::FrameTooLarge(usize::MAX));
            }
            let raw = self
                .bytes
                .get(self.pos..self.pos + octets)
                .ok_or(DecodeError::Truncated)?;
            self.pos += octets;
            let mut len: usize = 0;
            for &octet in raw {
                len = (len << 8) | octet as usize;
            }
            if len > MAX_FRAME_LEN {
                return Err(DecodeError::FrameTooLarge(len));
            }
            len
        };

        let contents = self
            .bytes
            .get(self.pos..self.pos + len)
            .ok_or(DecodeError::Truncated)?;
        self.pos += len;
        Ok((tag, contents))
    }

    /// Consumes the next element, requiring `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedTag`] when a different element is
    /// present.
    pub fn expect(&mut self, tag: Tag) -> Result<&'a [u8], DecodeError> {
        let found = self.peek_tag()?;
        if found != tag {
            return Err(DecodeError::UnexpectedTag {
                expected: tag.octet(),
                found: found.octet(),
            });
        }
        Ok(self.element()?.1)
    }

    /// Consumes the next element if it carries `tag`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] only for malformed input; an absent or
    /// different element yields `Ok(None)`.
    pub fn take_optional(&mut self, tag: Tag) -> Result<Option<&'a [u8]>, DecodeError> {
        if self.is_empty() {
            return Ok(None);
        }
        if self.peek_tag()? != tag {
            return Ok(None);
        }
        Ok(Some(self.element()?.1))
    }

    /// Consumes an INTEGER.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for a wrong tag or out-of-range contents.
    pub fn integer(&mut self) -> Result<i64, DecodeError> {
        let contents = self.expect(Tag::INTEGER)?;
        integer_value(contents)
    }

    /// Consumes an ENUMERATED value.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for a wrong tag or out-of-range contents.
    pub fn enumerated(&mut self) -> Result<i64, DecodeError> {
        let contents = self.expect(Tag::ENUMERATED)?;
        integer_value(contents)
    }

    /// Consumes an OCTET STRING under the universal tag.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnexpectedTag`] for anything else.
    pub fn octet_string(&mut self) -> Result<&'a [u8], DecodeError> {
        self.expect(Tag::OCTET_STRING)
    }

    /// Consumes an OCTET STRING and validates it as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] when the contents are not valid
    /// UTF-8.
    pub fn string(&mut self) -> Result<String, DecodeError> {
        let contents = self.octet_string()?;
        utf8(contents)
    }

    /// Consumes a BOOLEAN.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidBoolean`] unless there is exactly one
    /// content octet.
    pub fn boolean(&mut self) -> Result<bool, DecodeError> {
        let contents = self.expect(Tag::BOOLEAN)?;
        if contents.len() != 1 {
            return Err(DecodeError::InvalidBoolean(contents.len()));
        }
        Ok(contents[0] != 0)
    }
}

/// Decodes integer contents in two's complement.
///
/// # Errors
///
/// Returns [`DecodeError::IntegerOutOfRange`] for zero or more than eight
/// octets.
pub fn integer_value(contents: &[u8]) -> Result<i64, DecodeError> {
    if contents.is_empty() || contents.len() > 8 {
        return Err(DecodeError::IntegerOutOfRange(contents.len()));
    }
    let mut value: i64 = if contents[0] & 0x80 != 0 { -1 } else { 0 };
    for &octet in contents {
        value = (value << 8) | i64::from(octet);
    }
    Ok(value)
}

/// Validates `contents` as UTF-8 and copies it out.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidUtf8`] when validation fails.
pub fn utf8(contents: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(contents)
        .map(ToOwned::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8)
}
