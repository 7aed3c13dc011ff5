//! Queries and the lazy search stream.

use crate::connection::OpHandle;
use crate::entry::Entry;
use crate::session::Session;
use rolodex_core::{DistinguishedName, Error, Filter, Result, ResultCode};
use rolodex_proto::message::{DerefAliases, SearchRequest};
use rolodex_proto::{Control, PagedResults, ProtocolOp, SearchScope};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// A directory search, immutable once built.
///
/// Base DN and scope are fields of the query, never session state: a base
/// override on one query is invisible to every other query on the same
/// session, including concurrent ones.
#[derive(Debug, Clone)]
pub struct Query {
    filter: Filter,
    base: Option<DistinguishedName>,
    scope: SearchScope,
    attributes: Vec<String>,
    size_limit: i32,
    time_limit: i32,
    page_size: Option<u32>,
    timeout: Option<Duration>,
}

impl Query {
    /// Starts building a query from a parsed filter.
    #[must_use]
    pub fn builder(filter: Filter) -> QueryBuilder {
        QueryBuilder {
            query: Self {
                filter,
                base: None,
                scope: SearchScope::Subtree,
                attributes: Vec::new(),
                size_limit: 0,
                time_limit: 0,
                page_size: None,
                timeout: None,
            },
        }
    }

    /// Parses `filter` and starts building a query from it.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidFilter`] when the filter string does not parse.
    pub fn parse(filter: &str) -> Result<QueryBuilder> {
        Ok(Self::builder(Filter::parse(filter)?))
    }

    /// The filter entries must match.
    #[must_use]
    pub const fn filter(&self) -> &Filter {
        &self.filter
    }

    /// Base DN override, when one was set.
    #[must_use]
    pub const fn base(&self) -> Option<&DistinguishedName> {
        self.base.as_ref()
    }

    /// Search scope.
    #[must_use]
    pub const fn scope(&self) -> SearchScope {
        self.scope
    }

    /// Attributes to request; empty means all user attributes.
    #[must_use]
    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// Client-requested entry limit, zero for none.
    #[must_use]
    pub const fn size_limit(&self) -> i32 {
        self.size_limit
    }

    /// Server-side time limit in seconds, zero for none.
    #[must_use]
    pub const fn time_limit(&self) -> i32 {
        self.time_limit
    }

    /// Page size override, when one was set.
    #[must_use]
    pub const fn page_size(&self) -> Option<u32> {
        self.page_size
    }

    /// Per-call timeout override, when one was set.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

/// Builder for [`Query`].
#[derive(Debug)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    /// Overrides the search base for this query only.
    #[must_use]
    pub fn base(mut self, base: DistinguishedName) -> Self {
        self.query.base = Some(base);
        self
    }

    /// Sets the search scope.
    #[must_use]
    pub const fn scope(mut self, scope: SearchScope) -> Self {
        self.query.scope = scope;
        self
    }

    /// Sets the attributes to request.
    #[must_use]
    pub fn attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.query.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Asks the server to return at most `limit` entries.
    #[must_use]
    pub const fn size_limit(mut self, limit: i32) -> Self {
        self.query.size_limit = limit;
        self
    }

    /// Asks the server to spend at most `seconds` on the search.
    #[must_use]
    pub const fn time_limit(mut self, seconds: i32) -> Self {
        self.query.time_limit = seconds;
        self
    }

    /// Overrides the page size for this query. Zero disables paging.
    #[must_use]
    pub const fn page_size(mut self, size: u32) -> Self {
        self.query.page_size = Some(size);
        self
    }

    /// Overrides the per-call timeout for this query.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.query.timeout = Some(timeout);
        self
    }

    /// Finalises the query.
    #[must_use]
    pub fn build(self) -> Query {
        self.query
    }
}

impl Session {
    /// Issues `query` and returns a stream over the matching entries.
    ///
    /// When the query does not override them, the base DN falls back to the
    /// session's configured default and the page size to the configured
    /// default; with paging active the stream walks the server's paged
    /// results cookies transparently. The whole search, across all pages, is
    /// bounded by the query timeout (or the configured operation timeout).
    ///
    /// # Errors
    ///
    /// [`Error::SessionClosed`] when the transport is already gone.
    pub fn search(&self, query: &Query) -> Result<SearchStream<'_>> {
        let base = query
            .base()
            .unwrap_or_else(|| self.config().base_dn())
            .clone();
        let page_size = effective_page_size(query.page_size(), self.config().page_size());
        let request = SearchRequest {
            base: base.to_string(),
            scope: query.scope(),
            deref: DerefAliases::default(),
            size_limit: query.size_limit(),
            time_limit: query.time_limit(),
            types_only: false,
            filter: query.filter().clone(),
            attributes: query.attributes().to_vec(),
        };
        let deadline = Instant::now()
            + query
                .timeout()
                .unwrap_or_else(|| self.config().operation_timeout());

        let controls = page_controls(page_size, Vec::new());
        let op = self
            .connection()
            .send(ProtocolOp::SearchRequest(request.clone()), controls)?;
        debug!(base = %request.base, filter = %request.filter, scope = ?request.scope, "search issued");

        Ok(SearchStream {
            session: self,
            op,
            request,
            page_size,
            deadline,
            done: false,
        })
    }
}

/// Lazily yields the entries of one search.
///
/// Dropping the stream abandons the operation; responses still in flight
/// are discarded by the driver.
pub struct SearchStream<'a> {
    session: &'a Session,
    op: OpHandle,
    request: SearchRequest,
    page_size: Option<u32>,
    deadline: Instant,
    done: bool,
}

impl SearchStream<'_> {
    /// Next entry, or `Ok(None)` once the search completed cleanly.
    ///
    /// A search that matches nothing yields `Ok(None)` on the first call;
    /// that is not an error.
    ///
    /// # Errors
    ///
    /// [`Error::Query`] when the server fails the search (for instance
    /// `noSuchObject` for a missing base, or `sizeLimitExceeded` after the
    /// limit was hit), [`Error::Timeout`] past the deadline,
    /// [`Error::SessionClosed`] when the transport went away, and
    /// [`Error::Protocol`] for malformed traffic.
    pub async fn next(&mut self) -> Result<Option<Entry>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let message = match timeout_at(self.deadline, self.op.recv()).await {
                Ok(received) => received?,
                Err(_) => {
                    self.done = true;
                    return Err(Error::Timeout("search timed out".to_string()));
                }
            };

            match message.op {
                ProtocolOp::SearchResultEntry(wire) => {
                    return Entry::from_wire(wire).map(Some);
                }
                ProtocolOp::SearchResultReference(uris) => {
                    warn!(references = ?uris, "skipping search continuation references");
                }
                ProtocolOp::SearchResultDone(result) => match result.code {
                    ResultCode::Success => {
                        if let Some(cookie) = self.next_cookie(&message.controls)? {
                            self.request_page(cookie)?;
                        } else {
                            self.done = true;
                            return Ok(None);
                        }
                    }
                    code => {
                        self.done = true;
                        return Err(Error::Query {
                            code,
                            message: result.message,
                        });
                    }
                },
                other => {
                    self.done = true;
                    return Err(Error::Protocol(format!(
                        "unexpected {} during search",
                        other.name()
                    )));
                }
            }
        }
    }

    /// Collects every remaining entry.
    ///
    /// # Errors
    ///
    /// Same as [`SearchStream::next`].
    pub async fn entries(mut self) -> Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(entry) = self.next().await? {
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Cookie for the next page, when paging is active and the server says
    /// there is one.
    fn next_cookie(&self, controls: &[Control]) -> Result<Option<Vec<u8>>> {
        if self.page_size.is_none() {
            return Ok(None);
        }
        match PagedResults::find(controls)? {
            Some(page) if !page.is_last() => Ok(Some(page.cookie)),
            _ => Ok(None),
        }
    }

    /// Re-issues the search for the page behind `cookie`.
    fn request_page(&mut self, cookie: Vec<u8>) -> Result<()> {
        let controls = page_controls(self.page_size, cookie);
        self.op = self
            .session
            .connection()
            .send(ProtocolOp::SearchRequest(self.request.clone()), controls)?;
        debug!(base = %self.request.base, "requesting next page");
        Ok(())
    }
}

fn effective_page_size(query: Option<u32>, default: u32) -> Option<u32> {
    match query {
        Some(0) => None,
        Some(size) => Some(size),
        None => Some(default),
    }
}

fn page_controls(page_size: Option<u32>, cookie: Vec<u8>) -> Vec<Control> {
    page_size
        .map(|size| {
            let page = PagedResults {
                size: i32::try_from(size).unwrap_or(i32::MAX),
                cookie,
            };
            vec![page.control()]
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolodex_proto::control::PAGED_RESULTS_OID;

    #[test]
    fn builder_applies_defaults() {
        let query = Query::parse("(cn=jdoe)").unwrap().build();
        assert_eq!(query.filter().to_string(), "(cn=jdoe)");
        assert!(query.base().is_none());
        assert_eq!(query.scope(), SearchScope::Subtree);
        assert!(query.attributes().is_empty());
        assert_eq!(query.size_limit(), 0);
        assert!(query.page_size().is_none());
        assert!(query.timeout().is_none());
    }

    #[test]
    fn builder_overrides() {
        let base: DistinguishedName = "ou=People,dc=example,dc=com".parse().unwrap();
        let query = Query::parse("(objectClass=*)")
            .unwrap()
            .base(base.clone())
            .scope(SearchScope::OneLevel)
            .attributes(["cn", "mail"])
            .size_limit(10)
            .time_limit(30)
            .page_size(25)
            .timeout(Duration::from_secs(2))
            .build();
        assert_eq!(query.base(), Some(&base));
        assert_eq!(query.scope(), SearchScope::OneLevel);
        assert_eq!(query.attributes(), ["cn", "mail"]);
        assert_eq!(query.size_limit(), 10);
        assert_eq!(query.time_limit(), 30);
        assert_eq!(query.page_size(), Some(25));
        assert_eq!(query.timeout(), Some(Duration::from_secs(2)));
    }

    #[test]
    fn malformed_filter_is_rejected_at_parse_time() {
        let err = Query::parse("(cn=unclosed").unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[test]
    fn page_size_resolution() {
        assert_eq!(effective_page_size(None, 500), Some(500));
        assert_eq!(effective_page_size(Some(25), 500), Some(25));
        assert_eq!(effective_page_size(Some(0), 500), None);
    }

    #[test]
    fn page_controls_carry_the_cookie() {
        let controls = page_controls(Some(2), b"abc".to_vec());
        assert_eq!(controls.len(), 1);
        assert_eq!(controls[0].oid, PAGED_RESULTS_OID);
        let page = PagedResults::find(&controls).unwrap().unwrap();
        assert_eq!(page.size, 2);
        assert_eq!(page.cookie, b"abc");

        assert!(page_controls(None, Vec::new()).is_empty());
    }
}
