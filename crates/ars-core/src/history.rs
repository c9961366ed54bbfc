//! Backward pagination over a team's message history.
//!
//! Page 1 is the most recent page. `load_initial` fetches it, and each
//! `load_older` fetches the next older page until the backend reports there
//! are no more.
//!
//! # Invariants
//!
//! - At most one fetch is in flight. `load_older` is a no-op while any fetch
//!   is outstanding, so no page is ever requested twice concurrently.
//! - `page` and `has_more` change only when a fetch succeeds. A failed or
//!   timed-out fetch leaves them untouched and can be retried.
//! - Responses are matched by [`RequestId`]. A response for anything other
//!   than the in-flight request (superseded, timed out, cancelled) is stale
//!   and discarded.

use std::{
    fmt,
    ops::Sub,
    time::{Duration, Instant},
};

use ars_proto::{HistoryPage, Message, TeamId};
use tracing::{debug, warn};

use crate::error::HistoryError;

/// Time allowed for a history fetch before it is abandoned.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Identifier of one history request, unique within a loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw request number.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw request number.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Why a page is being fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Page 1, replacing the whole list
    Initial,
    /// Next older page, prepended to the list
    Older,
}

/// A fetch the driver must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Id the response must be reported with
    pub request_id: RequestId,
    /// Team whose history is requested
    pub team_id: TeamId,
    /// 1-indexed page, 1 being the most recent
    pub page: u32,
    /// How the result will be applied
    pub kind: FetchKind,
}

/// History configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Time allowed for one fetch
    pub fetch_timeout: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { fetch_timeout: DEFAULT_FETCH_TIMEOUT }
    }
}

/// How a successful page must be applied to the message list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryOutcome {
    /// Replace the list with these messages
    Replace(Vec<Message>),
    /// Prepend these older messages
    Prepend(Vec<Message>),
}

#[derive(Debug, Clone)]
struct InFlight<I> {
    request: HistoryRequest,
    started: I,
}

/// Pagination state machine for one team.
#[derive(Debug, Clone)]
pub struct HistoryLoader<I = Instant>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    team_id: TeamId,
    config: HistoryConfig,
    page: u32,
    has_more: bool,
    next_request: u64,
    in_flight: Option<InFlight<I>>,
}

impl<I> HistoryLoader<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Create a loader with nothing loaded yet.
    pub fn new(team_id: TeamId, config: HistoryConfig) -> Self {
        Self { team_id, config, page: 1, has_more: false, next_request: 0, in_flight: None }
    }

    /// Last successfully loaded page.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Whether an older page exists. False until the first page loads.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Whether a fetch is outstanding.
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Outstanding request, if any.
    pub fn in_flight(&self) -> Option<&HistoryRequest> {
        self.in_flight.as_ref().map(|f| &f.request)
    }

    /// Request page 1.
    ///
    /// Always issues a request. Any outstanding fetch is superseded and its
    /// response will be discarded.
    pub fn load_initial(&mut self, now: I) -> HistoryRequest {
        if let Some(superseded) = self.in_flight.take() {
            debug!(request = %superseded.request.request_id, "superseding history fetch");
        }

        self.issue(1, FetchKind::Initial, now)
    }

    /// Request the next older page.
    ///
    /// Returns `None` if there is no older page or a fetch is outstanding.
    pub fn load_older(&mut self, now: I) -> Option<HistoryRequest> {
        if let Some(outstanding) = &self.in_flight {
            debug!(request = %outstanding.request.request_id, "history fetch already in flight");
            return None;
        }

        if !self.has_more {
            debug!(team = %self.team_id, page = self.page, "no older history");
            return None;
        }

        Some(self.issue(self.page + 1, FetchKind::Older, now))
    }

    /// Apply a successful response.
    ///
    /// Returns `None` for stale responses.
    pub fn handle_loaded(
        &mut self,
        request_id: RequestId,
        page: HistoryPage,
    ) -> Option<HistoryOutcome> {
        let request = self.complete(request_id)?;

        self.page = request.page;
        self.has_more = page.has_next;

        debug!(
            team = %self.team_id,
            page = request.page,
            messages = page.messages.len(),
            has_more = self.has_more,
            "history page loaded"
        );

        Some(match request.kind {
            FetchKind::Initial => HistoryOutcome::Replace(page.messages),
            FetchKind::Older => HistoryOutcome::Prepend(page.messages),
        })
    }

    /// Record a failed response.
    ///
    /// Returns `None` for stale responses.
    pub fn handle_failed(
        &mut self,
        request_id: RequestId,
        reason: impl Into<String>,
    ) -> Option<HistoryError> {
        let request = self.complete(request_id)?;
        let reason = reason.into();

        warn!(team = %self.team_id, page = request.page, %reason, "history fetch failed");
        Some(HistoryError::Fetch { page: request.page, reason })
    }

    /// Abandon a fetch that exceeded the fetch timeout.
    pub fn tick(&mut self, now: I) -> Option<HistoryError> {
        let started = self.in_flight.as_ref()?.started;
        let elapsed = now - started;

        if elapsed <= self.config.fetch_timeout {
            return None;
        }

        let request = self.in_flight.take()?.request;
        warn!(team = %self.team_id, page = request.page, ?elapsed, "history fetch timed out");
        Some(HistoryError::Timeout { page: request.page, elapsed })
    }

    /// Drop the outstanding fetch; its response will be discarded.
    pub fn cancel(&mut self) {
        self.in_flight = None;
    }

    fn issue(&mut self, page: u32, kind: FetchKind, now: I) -> HistoryRequest {
        self.next_request += 1;
        let request = HistoryRequest {
            request_id: RequestId::new(self.next_request),
            team_id: self.team_id.clone(),
            page,
            kind,
        };

        debug!(team = %self.team_id, request = %request.request_id, page, "fetching history");
        self.in_flight = Some(InFlight { request: request.clone(), started: now });
        request
    }

    fn complete(&mut self, request_id: RequestId) -> Option<HistoryRequest> {
        let current = self.in_flight.as_ref().is_some_and(|f| f.request.request_id == request_id);
        if !current {
            debug!(request = %request_id, "discarding stale history response");
            return None;
        }

        self.in_flight.take().map(|f| f.request)
    }
}
