//! Request and response controls.
//!
//! Controls ride alongside any message. The client itself only issues the
//! simple paged results control (RFC 2696); everything else is carried
//! opaquely so a server-sent control never breaks decoding.

use crate::ber::{self, DecodeError, Reader, Tag, Writer};

/// OID of the simple paged results control.
pub const PAGED_RESULTS_OID: &str = "1.2.840.113556.1.4.319";

/// A single control: an OID, a criticality flag, and an opaque value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    /// The control type OID.
    pub oid: String,
    /// Whether the server must reject the operation if the control is not
    /// understood.
    pub critical: bool,
    /// BER-encoded control value, if the control carries one.
    pub value: Option<Vec<u8>>,
}

impl Control {
    pub(crate) fn encode(&self, w: &mut Writer) {
        w.constructed(Tag::SEQUENCE, |w| {
            w.octet_string(Tag::OCTET_STRING, self.oid.as_bytes());
            // criticality DEFAULT FALSE: write only when true.
            if self.critical {
                w.boolean(true);
            }
            if let Some(value) = &self.value {
                w.octet_string(Tag::OCTET_STRING, value);
            }
        });
    }

    pub(crate) fn decode_list(raw: &[u8]) -> Result<Vec<Self>, DecodeError> {
        let mut reader = Reader::new(raw);
        let mut controls = Vec::new();
        while !reader.is_empty() {
            let mut control = Reader::new(reader.expect(Tag::SEQUENCE)?);
            let oid = ber::utf8(control.octet_string()?)?;
            let critical = if control.peek_tag().ok() == Some(Tag::BOOLEAN) {
                control.boolean()?
            } else {
                false
            };
            let value = control
                .take_optional(Tag::OCTET_STRING)?
                .map(<[u8]>::to_vec);
            if !control.is_empty() {
                return Err(DecodeError::TrailingBytes(control.remaining()));
            }
            controls.push(Self {
                oid,
                critical,
                value,
            });
        }
        Ok(controls)
    }
}

/// Simple paged results control value (RFC 2696).
///
/// On a request, `size` asks for at most that many entries and `cookie`
/// continues an earlier page (empty for the first). On a response, `cookie`
/// is non-empty while more pages remain; sending it back empty abandons the
/// search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedResults {
    /// Requested page size, or the server's total estimate on responses.
    pub size: i32,
    /// Continuation cookie.
    pub cookie: Vec<u8>,
}

impl PagedResults {
    /// The control value for the first page.
    #[must_use]
    pub fn first_page(size: i32) -> Self {
        Self {
            size,
            cookie: Vec::new(),
        }
    }

    /// True when no further pages remain.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.cookie.is_empty()
    }

    /// Wraps the value in a [`Control`].
    ///
    /// The control is marked critical: a server that does not support
    /// paging must fail the search rather than silently return everything.
    #[must_use]
    pub fn control(&self) -> Control {
        let mut writer = Writer::new();
        writer.constructed(Tag::SEQUENCE, |w| {
            w.integer(Tag::INTEGER, i64::from(self.size));
            w.octet_string(Tag::OCTET_STRING, &self.cookie);
        });
        Control {
            oid: PAGED_RESULTS_OID.to_string(),
            critical: true,
            value: Some(writer.into_bytes()),
        }
    }

    /// Extracts and decodes this control from a response's control list.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the control is present but its value is
    /// missing or malformed.
    pub fn find(controls: &[Control]) -> Result<Option<Self>, DecodeError> {
        let Some(control) = controls.iter().find(|c| c.oid == PAGED_RESULTS_OID) else {
            return Ok(None);
        };
        let value = control
            .value
            .as_deref()
            .ok_or(DecodeError::MissingElement("paged results value"))?;

        let mut reader = Reader::new(value);
        let mut inner = Reader::new(reader.expect(Tag::SEQUENCE)?);
        if !reader.is_empty() {
            return Err(DecodeError::TrailingBytes(reader.remaining()));
        }
        let size = i32::try_from(inner.integer()?)
            .map_err(|_| DecodeError::InvalidValue("page size"))?;
        let cookie = inner.octet_string()?.to_vec();
        if !inner.is_empty() {
            return Err(DecodeError::TrailingBytes(inner.remaining()));
        }
        Ok(Some(Self { size, cookie }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_results_round_trip() {
        let paging = PagedResults {
            size: 250,
            cookie: vec![0xde, 0xad, 0xbe, 0xef],
        };
        let control = paging.control();
        assert_eq!(control.oid, PAGED_RESULTS_OID);
        assert!(control.critical);

        let found = PagedResults::find(&[control]).unwrap().unwrap();
        assert_eq!(found, paging);
        assert!(!found.is_last());
    }

    #[test]
    fn first_page_has_empty_cookie() {
        let paging = PagedResults::first_page(500);
        assert!(paging.is_last());

        let found = PagedResults::find(&[paging.control()]).unwrap().unwrap();
        assert_eq!(found.size, 500);
        assert!(found.cookie.is_empty());
    }

    #[test]
    fn find_ignores_other_controls() {
        let other = Control {
            oid: "1.2.840.113556.1.4.473".to_string(),
            critical: false,
            value: None,
        };
        assert_eq!(PagedResults::find(&[other]).unwrap(), None);
        assert_eq!(PagedResults::find(&[]).unwrap(), None);
    }

    #[test]
    fn find_rejects_missing_value() {
        let control = Control {
            oid: PAGED_RESULTS_OID.to_string(),
            critical: true,
            value: None,
        };
        assert_eq!(
            PagedResults::find(&[control]).unwrap_err(),
            DecodeError::MissingElement("paged results value")
        );
    }

    #[test]
    fn control_list_encoding_round_trip() {
        let controls = vec![
            PagedResults::first_page(100).control(),
            Control {
                oid: "1.3.6.1.4.1.4203.1.10.1".to_string(),
                critical: false,
                value: None,
            },
        ];

        let mut writer = Writer::new();
        for control in &controls {
            control.encode(&mut writer);
        }
        let decoded = Control::decode_list(&writer.into_bytes()).unwrap();
        assert_eq!(decoded, controls);
    }
}
