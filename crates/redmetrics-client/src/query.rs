//! Paginated read queries.
//!
//! [`execute_query`] issues one filtered `GET` and wraps the page in a
//! [`PageCursor`]. A cursor is an immutable snapshot: it remembers the
//! filter and endpoint that produced it so adjacent pages can be requested
//! without the caller rebuilding either.

use core::fmt::Display;
use core::str::FromStr;

use redmetrics_types::{Entity, SearchFilter};
use serde_json::Value;
use tracing::debug;

use crate::config::ServiceEndpoint;
use crate::error::ClientError;
use crate::transport::{HttpRequest, HttpResponse, Transport, send_checked};

/// Pagination headers returned by the read API.
const PAGE_NUMBER_HEADER: &str = "x-page-number";
const PAGE_COUNT_HEADER: &str = "x-page-count";
const PER_PAGE_COUNT_HEADER: &str = "x-per-page-count";
const TOTAL_COUNT_HEADER: &str = "x-total-count";

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCursor {
    page_number: u32,
    page_count: u32,
    per_page_count: u32,
    total_count: u64,
    filter: SearchFilter,
    endpoint: ServiceEndpoint,
    data: Vec<Entity>,
}

impl PageCursor {
    /// 1-based index of this page.
    pub const fn page_number(&self) -> u32 {
        self.page_number
    }

    /// Number of pages available.
    pub const fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Page size used by the service.
    pub const fn per_page_count(&self) -> u32 {
        self.per_page_count
    }

    /// Number of entities matching the filter across all pages.
    pub const fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Filter that produced this page.
    pub const fn filter(&self) -> &SearchFilter {
        &self.filter
    }

    /// Endpoint that served this page.
    pub const fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Entities on this page.
    pub fn data(&self) -> &[Entity] {
        &self.data
    }

    /// Take the entities, dropping the pagination context.
    pub fn into_data(self) -> Vec<Entity> {
        self.data
    }

    /// Whether a later page exists.
    pub const fn has_next_page(&self) -> bool {
        self.page_number < self.page_count
    }

    /// Whether an earlier page exists.
    pub const fn has_previous_page(&self) -> bool {
        self.page_number > 1
    }

    /// Fetch the page after this one.
    ///
    /// No local check is made; asking past the last page returns whatever
    /// the service answers.
    pub async fn next_page<T: Transport>(&self, transport: &T) -> Result<Self, ClientError> {
        let filter = self.filter.clone().page(self.page_number.saturating_add(1));
        execute_query(transport, &filter, &self.endpoint).await
    }

    /// Fetch the page before this one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionState`] without making a request
    /// when this is the first page.
    pub async fn previous_page<T: Transport>(&self, transport: &T) -> Result<Self, ClientError> {
        if !self.has_previous_page() {
            return Err(ClientError::ConnectionState(
                "no previous page before page 1".to_owned(),
            ));
        }
        let filter = self.filter.clone().page(self.page_number.saturating_sub(1));
        execute_query(transport, &filter, &self.endpoint).await
    }
}

/// Run one read query.
///
/// # Errors
///
/// - [`ClientError::Configuration`] if the filter has no entity type (no
///   request is made).
/// - [`ClientError::QueryFailed`] on transport failure, non-2xx status,
///   missing or malformed pagination headers, or undecodable entities.
pub async fn execute_query<T: Transport>(
    transport: &T,
    filter: &SearchFilter,
    endpoint: &ServiceEndpoint,
) -> Result<PageCursor, ClientError> {
    let entity_type = filter
        .entity_type
        .ok_or_else(|| ClientError::Configuration("missing entityType".to_owned()))?;

    let url = format!("{}/v1/{entity_type}", endpoint.base_url());
    let request = HttpRequest::get(url).with_query(filter.to_query_params());
    let response = send_checked(transport, request)
        .await
        .map_err(ClientError::QueryFailed)?;

    let page_number: u32 = page_header(&response, PAGE_NUMBER_HEADER)?;
    let page_count: u32 = page_header(&response, PAGE_COUNT_HEADER)?;
    let per_page_count: u32 = page_header(&response, PER_PAGE_COUNT_HEADER)?;
    let total_count: u64 = page_header(&response, TOTAL_COUNT_HEADER)?;

    if page_count > 0 && !(1..=page_count).contains(&page_number) {
        return Err(ClientError::QueryFailed(format!(
            "page {page_number} is outside 1..={page_count}"
        )));
    }

    let data = decode_entities(response.data)?;
    debug!(
        entity_type = %entity_type,
        page_number,
        page_count,
        returned = data.len(),
        "query page received"
    );

    Ok(PageCursor {
        page_number,
        page_count,
        per_page_count,
        total_count,
        filter: filter.clone(),
        endpoint: endpoint.clone(),
        data,
    })
}

fn page_header<N>(response: &HttpResponse, name: &str) -> Result<N, ClientError>
where
    N: FromStr,
    N::Err: Display,
{
    let raw = response
        .header(name)
        .ok_or_else(|| ClientError::QueryFailed(format!("missing {name} header")))?;
    raw.trim()
        .parse()
        .map_err(|e| ClientError::QueryFailed(format!("invalid {name} header {raw:?}: {e}")))
}

fn decode_entities(body: Value) -> Result<Vec<Entity>, ClientError> {
    match body {
        Value::Array(items) => items
            .into_iter()
            .map(Entity::from_wire)
            .collect::<Result<_, _>>()
            .map_err(|e| ClientError::QueryFailed(e.to_string())),
        Value::Null => Ok(Vec::new()),
        other => Err(ClientError::QueryFailed(format!(
            "expected an array of entities, got {other}"
        ))),
    }
}

/// Transport and endpoint bundled for repeated queries.
#[derive(Debug, Clone)]
pub struct QueryClient<T> {
    transport: T,
    endpoint: ServiceEndpoint,
}

impl<T: Transport> QueryClient<T> {
    /// Create a client for the given endpoint.
    pub const fn new(transport: T, endpoint: ServiceEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    /// Endpoint queries are sent to.
    pub const fn endpoint(&self) -> &ServiceEndpoint {
        &self.endpoint
    }

    /// Run a query; see [`execute_query`].
    pub async fn query(&self, filter: &SearchFilter) -> Result<PageCursor, ClientError> {
        execute_query(&self.transport, filter, &self.endpoint).await
    }

    /// Fetch the page after `cursor`.
    pub async fn next_page(&self, cursor: &PageCursor) -> Result<PageCursor, ClientError> {
        cursor.next_page(&self.transport).await
    }

    /// Fetch the page before `cursor`; fails without a request on page 1.
    pub async fn previous_page(&self, cursor: &PageCursor) -> Result<PageCursor, ClientError> {
        cursor.previous_page(&self.transport).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn paged(number: &str, count: &str) -> HttpResponse {
        HttpResponse::new(200, json!([]))
            .with_header("X-Page-Number", number)
            .with_header("X-Page-Count", count)
            .with_header("X-Per-Page-Count", "50")
            .with_header("X-Total-Count", "120")
    }

    #[test]
    fn headers_parse_as_integers() {
        let response = paged("2", "3");
        assert_eq!(page_header::<u32>(&response, PAGE_NUMBER_HEADER).unwrap(), 2);
        assert_eq!(page_header::<u64>(&response, TOTAL_COUNT_HEADER).unwrap(), 120);
    }

    #[test]
    fn missing_header_is_query_failure() {
        let response = HttpResponse::new(200, json!([]));
        let err = page_header::<u32>(&response, PAGE_COUNT_HEADER).unwrap_err();
        assert!(matches!(err, ClientError::QueryFailed(_)));
    }

    #[test]
    fn malformed_header_is_query_failure() {
        let response = paged("two", "3");
        let err = page_header::<u32>(&response, PAGE_NUMBER_HEADER).unwrap_err();
        assert!(matches!(err, ClientError::QueryFailed(_)));
    }

    #[test]
    fn entities_decode_times() {
        let entities = decode_entities(json!([
            {"id": "e1", "serverTime": "2015-01-01T08:00:00.000Z", "type": "click"},
        ]))
        .unwrap();
        assert_eq!(entities.len(), 1);
        assert!(entities.first().unwrap().server_time.is_some());
    }

    #[test]
    fn non_array_body_is_rejected() {
        assert!(decode_entities(json!({"oops": true})).is_err());
        assert!(decode_entities(Value::Null).unwrap().is_empty());
    }

    #[test]
    fn cursor_navigation_flags() {
        let cursor = |page_number, page_count| PageCursor {
            page_number,
            page_count,
            per_page_count: 50,
            total_count: 0,
            filter: SearchFilter::default(),
            endpoint: ServiceEndpoint::default(),
            data: Vec::new(),
        };
        assert!(cursor(1, 3).has_next_page());
        assert!(!cursor(1, 3).has_previous_page());
        assert!(cursor(3, 3).has_previous_page());
        assert!(!cursor(3, 3).has_next_page());
        assert!(!cursor(0, 0).has_next_page());
        assert!(!cursor(0, 0).has_previous_page());
    }
}
