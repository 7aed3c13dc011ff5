//! LDAP v3 message envelope and protocol operations (RFC 4511).
//!
//! Only the subset a read-only client exchanges is represented: bind,
//! unbind, search, and the responses those produce, plus the extended
//! response used for unsolicited disconnection notices. Every operation
//! encodes and decodes symmetrically, so the same types serve the client
//! and the scripted servers in its tests.

use rolodex_core::error::ResultCode;
use rolodex_core::filter::Filter;

use crate::ber::{self, DecodeError, Reader, Tag, Writer};
use crate::control::Control;

/// Protocol version sent in every bind request.
pub const LDAP_VERSION: u8 = 3;

/// Message ID reserved for unsolicited notifications from the server.
pub const UNSOLICITED_ID: i32 = 0;

/// OID carried by the notice-of-disconnection unsolicited notification.
pub const NOTICE_OF_DISCONNECTION: &str = "1.3.6.1.4.1.1466.20036";

/// One LDAP message: an ID, an operation, and optional controls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapMessage {
    /// Message ID. Requests use positive IDs; responses echo them.
    pub id: i32,
    /// The operation this message carries.
    pub op: ProtocolOp,
    /// Controls attached to the message.
    pub controls: Vec<Control>,
}

impl LdapMessage {
    /// A message without controls.
    #[must_use]
    pub fn new(id: i32, op: ProtocolOp) -> Self {
        Self {
            id,
            op,
            controls: Vec::new(),
        }
    }

    /// A message with controls.
    #[must_use]
    pub fn with_controls(id: i32, op: ProtocolOp, controls: Vec<Control>) -> Self {
        Self { id, op, controls }
    }

    /// Encodes the message for the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::new();
        writer.constructed(Tag::SEQUENCE, |w| {
            w.integer(Tag::INTEGER, i64::from(self.id));
            self.op.encode(w);
            if !self.controls.is_empty() {
                w.constructed(Tag::context_constructed(0), |w| {
                    for control in &self.controls {
                        control.encode(w);
                    }
                });
            }
        });
        writer.into_bytes()
    }

    /// Decodes exactly one message from `bytes`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] for malformed elements, unknown operations,
    /// or bytes left over after the message.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut outer = Reader::new(bytes);
        let envelope = outer.expect(Tag::SEQUENCE)?;
        if !outer.is_empty() {
            return Err(DecodeError::TrailingBytes(outer.remaining()));
        }

        let mut reader = Reader::new(envelope);
        let id = i32::try_from(reader.integer()?)
            .map_err(|_| DecodeError::InvalidValue("messageID"))?;
        let (tag, contents) = reader.element()?;
        let op = ProtocolOp::decode(tag, contents)?;
        let controls = match reader.take_optional(Tag::context_constructed(0))? {
            Some(raw) => Control::decode_list(raw)?,
            None => Vec::new(),
        };
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }

        Ok(Self { id, op, controls })
    }
}

/// The protocol operations in the supported subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolOp {
    /// `[APPLICATION 0]` simple bind request.
    BindRequest(BindRequest),
    /// `[APPLICATION 1]` bind response.
    BindResponse(LdapResult),
    /// `[APPLICATION 2]` unbind request. No response follows.
    UnbindRequest,
    /// `[APPLICATION 3]` search request.
    SearchRequest(SearchRequest),
    /// `[APPLICATION 4]` one entry of a search result.
    SearchResultEntry(SearchResultEntry),
    /// `[APPLICATION 5]` terminal result of a search.
    SearchResultDone(LdapResult),
    /// `[APPLICATION 19]` continuation references for a search.
    SearchResultReference(Vec<String>),
    /// `[APPLICATION 24]` extended response; with message ID zero this is
    /// an unsolicited notification.
    ExtendedResponse(ExtendedResponse),
}

impl ProtocolOp {
    /// Short operation name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::BindRequest(_) => "BindRequest",
            Self::BindResponse(_) => "BindResponse",
            Self::UnbindRequest => "UnbindRequest",
            Self::SearchRequest(_) => "SearchRequest",
            Self::SearchResultEntry(_) => "SearchResultEntry",
            Self::SearchResultDone(_) => "SearchResultDone",
            Self::SearchResultReference(_) => "SearchResultReference",
            Self::ExtendedResponse(_) => "ExtendedResponse",
        }
    }

    /// True when this response ends the operation its message ID belongs
    /// to, freeing the ID for reuse.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::BindResponse(_) | Self::SearchResultDone(_) | Self::ExtendedResponse(_)
        )
    }

    fn encode(&self, w: &mut Writer) {
        match self {
            Self::BindRequest(req) => req.encode(w),
            Self::BindResponse(result) => {
                w.constructed(Tag::application_constructed(1), |w| result.encode(w));
            }
            Self::UnbindRequest => w.empty(Tag::application(2)),
            Self::SearchRequest(req) => req.encode(w),
            Self::SearchResultEntry(entry) => entry.encode(w),
            Self::SearchResultDone(result) => {
                w.constructed(Tag::application_constructed(5), |w| result.encode(w));
            }
            Self::SearchResultReference(uris) => {
                w.constructed(Tag::application_constructed(19), |w| {
                    for uri in uris {
                        w.octet_string(Tag::OCTET_STRING, uri.as_bytes());
                    }
                });
            }
            Self::ExtendedResponse(resp) => resp.encode(w),
        }
    }

    fn decode(tag: Tag, contents: &[u8]) -> Result<Self, DecodeError> {
        match tag.octet() {
            0x60 => Ok(Self::BindRequest(BindRequest::decode(contents)?)),
            0x61 => {
                let mut reader = Reader::new(contents);
                let result = LdapResult::decode(&mut reader)?;
                // serverSaslCreds [7]; SASL is outside the subset, the
                // field is tolerated and dropped.
                reader.take_optional(Tag::context(7))?;
                if !reader.is_empty() {
                    return Err(DecodeError::TrailingBytes(reader.remaining()));
                }
                Ok(Self::BindResponse(result))
            }
            0x42 => {
                if contents.is_empty() {
                    Ok(Self::UnbindRequest)
                } else {
                    Err(DecodeError::InvalidValue("UnbindRequest"))
                }
            }
            0x63 => Ok(Self::SearchRequest(SearchRequest::decode(contents)?)),
            0x64 => Ok(Self::SearchResultEntry(SearchResultEntry::decode(
                contents,
            )?)),
            0x65 => {
                let mut reader = Reader::new(contents);
                let result = LdapResult::decode(&mut reader)?;
                if !reader.is_empty() {
                    return Err(DecodeError::TrailingBytes(reader.remaining()));
                }
                Ok(Self::SearchResultDone(result))
            }
            0x73 => {
                let mut reader = Reader::new(contents);
                let mut uris = Vec::new();
                while !reader.is_empty() {
                    uris.push(ber::utf8(reader.octet_string()?)?);
                }
                if uris.is_empty() {
                    return Err(DecodeError::MissingElement("reference URI"));
                }
                Ok(Self::SearchResultReference(uris))
            }
            0x78 => Ok(Self::ExtendedResponse(ExtendedResponse::decode(contents)?)),
            other => Err(DecodeError::UnknownOperation(other)),
        }
    }
}

/// Simple bind request.
///
/// Only the simple authentication choice is supported; SASL mechanisms are
/// outside this client's scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    /// Protocol version, always [`LDAP_VERSION`] when built by this crate.
    pub version: u8,
    /// Name to bind as. Empty for an anonymous bind.
    pub name: String,
    /// Password octets. Empty for an anonymous bind.
    pub password: Vec<u8>,
}

impl BindRequest {
    /// A simple bind at the supported protocol version.
    #[must_use]
    pub fn simple(name: impl Into<String>, password: impl Into<Vec<u8>>) -> Self {
        Self {
            version: LDAP_VERSION,
            name: name.into(),
            password: password.into(),
        }
    }

    fn encode(&self, w: &mut Writer) {
        w.constructed(Tag::application_constructed(0), |w| {
            w.integer(Tag::INTEGER, i64::from(self.version));
            w.octet_string(Tag::OCTET_STRING, self.name.as_bytes());
            w.octet_string(Tag::context(0), &self.password);
        });
    }

    fn decode(contents: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(contents);
        let version = u8::try_from(reader.integer()?)
            .map_err(|_| DecodeError::InvalidValue("bind version"))?;
        let name = reader.string()?;
        let (tag, value) = reader.element()?;
        if tag != Tag::context(0) {
            return Err(DecodeError::UnsupportedConstruct(
                "non-simple authentication choice",
            ));
        }
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        Ok(Self {
            version,
            name,
            password: value.to_vec(),
        })
    }
}

/// The result fields shared by response operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapResult {
    /// Outcome of the operation.
    pub code: ResultCode,
    /// Matched DN, often empty.
    pub matched_dn: String,
    /// Diagnostic message, often empty.
    pub message: String,
    /// Referral URIs, present only with [`ResultCode::Referral`].
    pub referrals: Vec<String>,
}

impl LdapResult {
    /// A success result with empty fields.
    #[must_use]
    pub fn success() -> Self {
        Self::of(ResultCode::Success, "")
    }

    /// A result with the given code and diagnostic message.
    #[must_use]
    pub fn of(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            matched_dn: String::new(),
            message: message.into(),
            referrals: Vec::new(),
        }
    }

    fn encode(&self, w: &mut Writer) {
        w.enumerated(i64::from(self.code.code()));
        w.octet_string(Tag::OCTET_STRING, self.matched_dn.as_bytes());
        w.octet_string(Tag::OCTET_STRING, self.message.as_bytes());
        if !self.referrals.is_empty() {
            w.constructed(Tag::context_constructed(3), |w| {
                for uri in &self.referrals {
                    w.octet_string(Tag::OCTET_STRING, uri.as_bytes());
                }
            });
        }
    }

    fn decode(reader: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let raw = reader.enumerated()?;
        let code = u32::try_from(raw).map_err(|_| DecodeError::InvalidValue("resultCode"))?;
        let matched_dn = reader.string()?;
        let message = reader.string()?;
        let referrals = match reader.take_optional(Tag::context_constructed(3))? {
            Some(raw) => {
                let mut inner = Reader::new(raw);
                let mut uris = Vec::new();
                while !inner.is_empty() {
                    uris.push(ber::utf8(inner.octet_string()?)?);
                }
                uris
            }
            None => Vec::new(),
        };
        Ok(Self {
            code: ResultCode::from_code(code),
            matched_dn,
            message,
            referrals,
        })
    }
}

/// How far below the base object a search reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Only the base object itself.
    Base,
    /// Direct children of the base object, not the base itself.
    OneLevel,
    /// The base object and everything below it.
    #[default]
    Subtree,
}

impl SearchScope {
    const fn code(self) -> i64 {
        match self {
            Self::Base => 0,
            Self::OneLevel => 1,
            Self::Subtree => 2,
        }
    }

    fn from_code(code: i64) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(Self::Base),
            1 => Ok(Self::OneLevel),
            2 => Ok(Self::Subtree),
            _ => Err(DecodeError::InvalidValue("scope")),
        }
    }
}

/// Alias dereferencing policy for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DerefAliases {
    /// Never dereference aliases.
    #[default]
    Never,
    /// Dereference while searching below the base.
    InSearching,
    /// Dereference while locating the base.
    FindingBase,
    /// Always dereference.
    Always,
}

impl DerefAliases {
    const fn code(self) -> i64 {
        match self {
            Self::Never => 0,
            Self::InSearching => 1,
            Self::FindingBase => 2,
            Self::Always => 3,
        }
    }

    fn from_code(code: i64) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(Self::Never),
            1 => Ok(Self::InSearching),
            2 => Ok(Self::FindingBase),
            3 => Ok(Self::Always),
            _ => Err(DecodeError::InvalidValue("derefAliases")),
        }
    }
}

/// Search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Base object the search starts from.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Alias handling.
    pub deref: DerefAliases,
    /// Entry limit, zero for no client-requested limit.
    pub size_limit: i32,
    /// Time limit in seconds, zero for none.
    pub time_limit: i32,
    /// Request attribute names only, no values.
    pub types_only: bool,
    /// The filter entries must match.
    pub filter: Filter,
    /// Attributes to return; empty requests all user attributes.
    pub attributes: Vec<String>,
}

impl SearchRequest {
    fn encode(&self, w: &mut Writer) {
        w.constructed(Tag::application_constructed(3), |w| {
            w.octet_string(Tag::OCTET_STRING, self.base.as_bytes());
            w.enumerated(self.scope.code());
            w.enumerated(self.deref.code());
            w.integer(Tag::INTEGER, i64::from(self.size_limit));
            w.integer(Tag::INTEGER, i64::from(self.time_limit));
            w.boolean(self.types_only);
            encode_filter(w, &self.filter);
            w.constructed(Tag::SEQUENCE, |w| {
                for attribute in &self.attributes {
                    w.octet_string(Tag::OCTET_STRING, attribute.as_bytes());
                }
            });
        });
    }

    fn decode(contents: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(contents);
        let base = reader.string()?;
        let scope = SearchScope::from_code(reader.enumerated()?)?;
        let deref = DerefAliases::from_code(reader.enumerated()?)?;
        let size_limit = i32::try_from(reader.integer()?)
            .map_err(|_| DecodeError::InvalidValue("sizeLimit"))?;
        let time_limit = i32::try_from(reader.integer()?)
            .map_err(|_| DecodeError::InvalidValue("timeLimit"))?;
        let types_only = reader.boolean()?;
        let (tag, filter_contents) = reader.element()?;
        let filter = decode_filter(tag, filter_contents)?;
        let mut attributes = Vec::new();
        let mut attrs = Reader::new(reader.expect(Tag::SEQUENCE)?);
        while !attrs.is_empty() {
            attributes.push(ber::utf8(attrs.octet_string()?)?);
        }
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        Ok(Self {
            base,
            scope,
            deref,
            size_limit,
            time_limit,
            types_only,
            filter,
            attributes,
        })
    }
}

/// One attribute of a returned entry. Values are raw octets; whether they
/// are text is the consumer's call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialAttribute {
    /// Attribute description, e.g. `cn`.
    pub name: String,
    /// Values in server order.
    pub values: Vec<Vec<u8>>,
}

impl PartialAttribute {
    /// An attribute with UTF-8 values.
    #[must_use]
    pub fn new<S: Into<String>>(name: impl Into<String>, values: Vec<S>) -> Self {
        Self {
            name: name.into(),
            values: values
                .into_iter()
                .map(|v| v.into().into_bytes())
                .collect(),
        }
    }
}

/// One entry of a search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResultEntry {
    /// The entry's distinguished name.
    pub dn: String,
    /// The requested attributes present on the entry.
    pub attributes: Vec<PartialAttribute>,
}

impl SearchResultEntry {
    fn encode(&self, w: &mut Writer) {
        w.constructed(Tag::application_constructed(4), |w| {
            w.octet_string(Tag::OCTET_STRING, self.dn.as_bytes());
            w.constructed(Tag::SEQUENCE, |w| {
                for attribute in &self.attributes {
                    w.constructed(Tag::SEQUENCE, |w| {
                        w.octet_string(Tag::OCTET_STRING, attribute.name.as_bytes());
                        w.constructed(Tag::SET, |w| {
                            for value in &attribute.values {
                                w.octet_string(Tag::OCTET_STRING, value);
                            }
                        });
                    });
                }
            });
        });
    }

    fn decode(contents: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(contents);
        let dn = reader.string()?;
        let mut attributes = Vec::new();
        let mut list = Reader::new(reader.expect(Tag::SEQUENCE)?);
        while !list.is_empty() {
            let mut attr = Reader::new(list.expect(Tag::SEQUENCE)?);
            let name = attr.string()?;
            let mut values = Vec::new();
            let mut vals = Reader::new(attr.expect(Tag::SET)?);
            while !vals.is_empty() {
                values.push(vals.octet_string()?.to_vec());
            }
            attributes.push(PartialAttribute { name, values });
        }
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        Ok(Self { dn, attributes })
    }
}

/// Extended response. With message ID zero this is an unsolicited
/// notification, most importantly the notice of disconnection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedResponse {
    /// Result fields.
    pub result: LdapResult,
    /// Response name OID, e.g. [`NOTICE_OF_DISCONNECTION`].
    pub name: Option<String>,
    /// Response value octets.
    pub value: Option<Vec<u8>>,
}

impl ExtendedResponse {
    /// The notice-of-disconnection notification with the given code.
    #[must_use]
    pub fn disconnection_notice(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            result: LdapResult::of(code, message),
            name: Some(NOTICE_OF_DISCONNECTION.to_string()),
            value: None,
        }
    }

    /// True when this is the notice-of-disconnection notification.
    #[must_use]
    pub fn is_disconnection_notice(&self) -> bool {
        self.name.as_deref() == Some(NOTICE_OF_DISCONNECTION)
    }

    fn encode(&self, w: &mut Writer) {
        w.constructed(Tag::application_constructed(24), |w| {
            self.result.encode(w);
            if let Some(name) = &self.name {
                w.octet_string(Tag::context(10), name.as_bytes());
            }
            if let Some(value) = &self.value {
                w.octet_string(Tag::context(11), value);
            }
        });
    }

    fn decode(contents: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = Reader::new(contents);
        let result = LdapResult::decode(&mut reader)?;
        let name = reader
            .take_optional(Tag::context(10))?
            .map(ber::utf8)
            .transpose()?;
        let value = reader
            .take_optional(Tag::context(11))?
            .map(<[u8]>::to_vec);
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        Ok(Self {
            result,
            name,
            value,
        })
    }
}

fn encode_filter(w: &mut Writer, filter: &Filter) {
    match filter {
        Filter::And(inner) => w.constructed(Tag::context_constructed(0), |w| {
            for filter in inner {
                encode_filter(w, filter);
            }
        }),
        Filter::Or(inner) => w.constructed(Tag::context_constructed(1), |w| {
            for filter in inner {
                encode_filter(w, filter);
            }
        }),
        Filter::Not(inner) => {
            w.constructed(Tag::context_constructed(2), |w| encode_filter(w, inner));
        }
        Filter::Equality(attribute, value) => {
            encode_assertion(w, 3, attribute, value);
        }
        Filter::Substring {
            attribute,
            initial,
            any,
            final_,
        } => {
            w.constructed(Tag::context_constructed(4), |w| {
                w.octet_string(Tag::OCTET_STRING, attribute.as_bytes());
                w.constructed(Tag::SEQUENCE, |w| {
                    if let Some(initial) = initial {
                        w.octet_string(Tag::context(0), initial.as_bytes());
                    }
                    for part in any {
                        w.octet_string(Tag::context(1), part.as_bytes());
                    }
                    if let Some(final_) = final_ {
                        w.octet_string(Tag::context(2), final_.as_bytes());
                    }
                });
            });
        }
        Filter::GreaterOrEqual(attribute, value) => {
            encode_assertion(w, 5, attribute, value);
        }
        Filter::LessOrEqual(attribute, value) => {
            encode_assertion(w, 6, attribute, value);
        }
        Filter::Present(attribute) => {
            w.octet_string(Tag::context(7), attribute.as_bytes());
        }
        Filter::Approx(attribute, value) => {
            encode_assertion(w, 8, attribute, value);
        }
    }
}

fn encode_assertion(w: &mut Writer, tag_number: u8, attribute: &str, value: &str) {
    w.constructed(Tag::context_constructed(tag_number), |w| {
        w.octet_string(Tag::OCTET_STRING, attribute.as_bytes());
        w.octet_string(Tag::OCTET_STRING, value.as_bytes());
    });
}

fn decode_filter(tag: Tag, contents: &[u8]) -> Result<Filter, DecodeError> {
    match tag.octet() {
        0xa0 | 0xa1 => {
            let mut reader = Reader::new(contents);
            let mut inner = Vec::new();
            while !reader.is_empty() {
                let (tag, contents) = reader.element()?;
                inner.push(decode_filter(tag, contents)?);
            }
            Ok(if tag.octet() == 0xa0 {
                Filter::And(inner)
            } else {
                Filter::Or(inner)
            })
        }
        0xa2 => {
            let mut reader = Reader::new(contents);
            let (tag, contents) = reader.element()?;
            let inner = decode_filter(tag, contents)?;
            if !reader.is_empty() {
                return Err(DecodeError::TrailingBytes(reader.remaining()));
            }
            Ok(Filter::Not(Box::new(inner)))
        }
        0xa3 => decode_assertion(contents).map(|(a, v)| Filter::Equality(a, v)),
        0xa4 => {
            let mut reader = Reader::new(contents);
            let attribute = reader.string()?;
            let mut parts = Reader::new(reader.expect(Tag::SEQUENCE)?);
            let mut initial = None;
            let mut any = Vec::new();
            let mut final_ = None;
            while !parts.is_empty() {
                let (tag, contents) = parts.element()?;
                let text = ber::utf8(contents)?;
                match tag.octet() {
                    0x80 if initial.is_none() && any.is_empty() && final_.is_none() => {
                        initial = Some(text);
                    }
                    0x81 if final_.is_none() => any.push(text),
                    0x82 if final_.is_none() => final_ = Some(text),
                    _ => return Err(DecodeError::InvalidValue("substring sequence")),
                }
            }
            if initial.is_none() && any.is_empty() && final_.is_none() {
                return Err(DecodeError::MissingElement("substring part"));
            }
            Ok(Filter::Substring {
                attribute,
                initial,
                any,
                final_,
            })
        }
        0xa5 => decode_assertion(contents).map(|(a, v)| Filter::GreaterOrEqual(a, v)),
        0xa6 => decode_assertion(contents).map(|(a, v)| Filter::LessOrEqual(a, v)),
        0x87 => Ok(Filter::Present(ber::utf8(contents)?)),
        0xa8 => decode_assertion(contents).map(|(a, v)| Filter::Approx(a, v)),
        0xa9 => Err(DecodeError::UnsupportedConstruct("extensibleMatch filter")),
        _ => Err(DecodeError::InvalidValue("filter")),
    }
}

fn decode_assertion(contents: &[u8]) -> Result<(String, String), DecodeError> {
    let mut reader = Reader::new(contents);
    let attribute = reader.string()?;
    let value = reader.string()?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingBytes(reader.remaining()));
    }
    Ok((attribute, value))
}
