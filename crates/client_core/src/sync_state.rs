//! Pure list synchronization state.
//!
//! Every operation is a synchronous transition on [`SyncState`]. Operations that
//! need the network return a [`FetchTicket`]; the caller performs the fetch and
//! hands the ticket back to [`SyncState::apply`] together with the result. The
//! ticket carries the generation it was issued under, so a result that arrives
//! after a refresh, a query change or disposal is dropped on the floor.

use std::{collections::HashSet, time::Duration};

use shared::domain::{is_rank_ordered, RankedEntry, UserId};

use crate::{error::SyncError, gateway::PageRequest};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListMode {
    /// Global ranking; an empty query means "everyone".
    Leaderboard,
    /// Username search; an empty query means "no results" and never hits the network.
    Search,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: ListMode,
    pub page_size: usize,
    pub poll_interval: Duration,
}

impl SyncOptions {
    pub fn leaderboard() -> Self {
        Self {
            mode: ListMode::Leaderboard,
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn search() -> Self {
        Self {
            mode: ListMode::Search,
            ..Self::leaderboard()
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self::leaderboard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Rows the server has returned so far, not rows held; deduplication can
    /// leave fewer items than this, so never index the list with it.
    pub offset: usize,
    pub page_size: usize,
}

impl Cursor {
    /// Nothing beyond the first page has been fetched.
    pub fn at_top(&self) -> bool {
        self.offset <= self.page_size
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Idle,
    Loading,
    Refreshing,
    LoadingMore,
    Polling,
    Ready,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Load,
    Refresh,
    LoadMore,
    Poll,
}

impl FetchKind {
    fn status(self) -> SyncStatus {
        match self {
            Self::Load => SyncStatus::Loading,
            Self::Refresh => SyncStatus::Refreshing,
            Self::LoadMore => SyncStatus::LoadingMore,
            Self::Poll => SyncStatus::Polling,
        }
    }
}

/// A request the state machine wants performed, tagged with the generation
/// that was current when it was issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub seq: u64,
    pub generation: u64,
    pub kind: FetchKind,
    pub request: PageRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Merged,
    Failed,
    Discarded,
}

/// Immutable copy of the list handed to views.
#[derive(Debug, Clone, PartialEq)]
pub struct ListSnapshot {
    pub items: Vec<RankedEntry>,
    pub has_more: bool,
    pub generation: u64,
    pub status: SyncStatus,
    pub error: Option<String>,
    pub query: Option<String>,
    pub offset: usize,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u64,
    kind: FetchKind,
    offset: usize,
    /// Cursor offset and `has_more` to put back if a refresh fails.
    restore: Option<(usize, bool)>,
}

#[derive(Debug)]
pub struct SyncState {
    mode: ListMode,
    items: Vec<RankedEntry>,
    cursor: Cursor,
    has_more: bool,
    generation: u64,
    status: SyncStatus,
    error: Option<String>,
    query: Option<String>,
    loaded: bool,
    in_flight: Option<InFlight>,
    poll_in_flight: Option<u64>,
    next_seq: u64,
    disposed: bool,
}

impl SyncState {
    pub fn new(options: &SyncOptions) -> Self {
        Self {
            mode: options.mode,
            items: Vec::new(),
            cursor: Cursor {
                offset: 0,
                page_size: options.page_size.max(1),
            },
            has_more: true,
            generation: 0,
            status: SyncStatus::Idle,
            error: None,
            query: None,
            loaded: false,
            in_flight: None,
            poll_in_flight: None,
            next_seq: 0,
            disposed: false,
        }
    }

    pub fn mode(&self) -> ListMode {
        self.mode
    }

    pub fn items(&self) -> &[RankedEntry] {
        &self.items
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn snapshot(&self) -> ListSnapshot {
        ListSnapshot {
            items: self.items.clone(),
            has_more: self.has_more,
            generation: self.generation,
            status: self.status,
            error: self.error.clone(),
            query: self.query.clone(),
            offset: self.cursor.offset,
        }
    }

    pub fn start(&mut self) -> Option<FetchTicket> {
        if self.disposed || self.query_blocked() || !self.items.is_empty() {
            return None;
        }
        if self.in_flight.is_some() {
            return None;
        }
        self.error = None;
        self.cursor.offset = 0;
        Some(self.issue(FetchKind::Load, 0, None))
    }

    pub fn refresh(&mut self) -> Option<FetchTicket> {
        if self.disposed || self.query_blocked() {
            return None;
        }
        let restore = match self.in_flight {
            Some(InFlight {
                restore: Some(restore),
                ..
            }) => restore,
            _ => (self.cursor.offset, self.has_more),
        };
        self.generation += 1;
        self.in_flight = None;
        self.poll_in_flight = None;
        self.cursor.offset = 0;
        self.has_more = true;
        self.error = None;
        Some(self.issue(FetchKind::Refresh, 0, Some(restore)))
    }

    pub fn load_more(&mut self) -> Option<FetchTicket> {
        if self.disposed || self.query_blocked() || !self.has_more || self.in_flight.is_some() {
            return None;
        }
        self.error = None;
        let offset = self.cursor.offset;
        Some(self.issue(FetchKind::LoadMore, offset, None))
    }

    pub fn poll(&mut self) -> Option<FetchTicket> {
        if self.disposed || self.query_blocked() || !self.cursor.at_top() {
            return None;
        }
        if self.poll_in_flight.is_some() {
            return None;
        }
        if matches!(
            self.in_flight,
            Some(InFlight {
                kind: FetchKind::Load | FetchKind::Refresh,
                ..
            })
        ) {
            return None;
        }
        Some(self.issue(FetchKind::Poll, 0, None))
    }

    /// Starts a new generation scoped to `query`. Always changes state, even
    /// when no request is needed.
    pub fn set_query(&mut self, query: &str) -> Option<FetchTicket> {
        if self.disposed {
            return None;
        }
        let query = query.trim();
        self.generation += 1;
        self.items.clear();
        self.cursor.offset = 0;
        self.in_flight = None;
        self.poll_in_flight = None;
        self.error = None;
        self.has_more = true;
        self.loaded = false;
        self.query = (!query.is_empty()).then(|| query.to_string());

        if self.query_blocked() {
            self.has_more = false;
            self.loaded = true;
            self.settle_status();
            return None;
        }
        Some(self.issue(FetchKind::Load, 0, None))
    }

    /// Retires the live generation. Later results are discarded and every
    /// operation becomes a no-op; the status is left as it was.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.generation += 1;
        self.in_flight = None;
        self.poll_in_flight = None;
    }

    pub fn apply(
        &mut self,
        ticket: &FetchTicket,
        result: Result<Vec<RankedEntry>, SyncError>,
    ) -> MergeOutcome {
        if self.disposed || ticket.generation != self.generation {
            return MergeOutcome::Discarded;
        }

        let restore = match ticket.kind {
            FetchKind::Poll => {
                if self.poll_in_flight != Some(ticket.seq) {
                    return MergeOutcome::Discarded;
                }
                self.poll_in_flight = None;
                None
            }
            _ => match self.in_flight {
                Some(in_flight) if in_flight.seq == ticket.seq => {
                    self.in_flight = None;
                    in_flight.restore
                }
                _ => return MergeOutcome::Discarded,
            },
        };

        let outcome = match result {
            Ok(page) => {
                match ticket.kind {
                    FetchKind::Load | FetchKind::Refresh => self.replace_all(page),
                    FetchKind::LoadMore => self.append_page(page),
                    FetchKind::Poll => self.merge_polled_page(page),
                }
                self.error = None;
                self.loaded = true;
                MergeOutcome::Merged
            }
            Err(err) => {
                if let Some((offset, has_more)) = restore {
                    self.cursor.offset = offset;
                    self.has_more = has_more;
                }
                self.error = Some(err.to_string());
                MergeOutcome::Failed
            }
        };
        self.settle_status();
        outcome
    }

    fn query_blocked(&self) -> bool {
        self.mode == ListMode::Search && self.query.is_none()
    }

    fn issue(
        &mut self,
        kind: FetchKind,
        offset: usize,
        restore: Option<(usize, bool)>,
    ) -> FetchTicket {
        let seq = self.next_seq;
        self.next_seq += 1;
        if kind == FetchKind::Poll {
            self.poll_in_flight = Some(seq);
        } else {
            self.in_flight = Some(InFlight {
                seq,
                kind,
                offset,
                restore,
            });
        }
        self.settle_status();
        FetchTicket {
            seq,
            generation: self.generation,
            kind,
            request: PageRequest {
                query: self.query.clone(),
                offset,
                limit: self.cursor.page_size,
            },
        }
    }

    fn settle_status(&mut self) {
        self.status = if let Some(in_flight) = self.in_flight {
            in_flight.kind.status()
        } else if self.error.is_some() {
            SyncStatus::Error
        } else if self.poll_in_flight.is_some() {
            SyncStatus::Polling
        } else if self.loaded {
            SyncStatus::Ready
        } else {
            SyncStatus::Idle
        };
    }

    fn replace_all(&mut self, page: Vec<RankedEntry>) {
        let returned = page.len();
        self.items = normalize_page(page);
        self.cursor.offset = returned;
        self.has_more = returned == self.cursor.page_size;
    }

    fn append_page(&mut self, page: Vec<RankedEntry>) {
        let returned = page.len();
        let mut known: HashSet<UserId> = self.items.iter().map(|entry| entry.id).collect();
        self.items
            .extend(page.into_iter().filter(|entry| known.insert(entry.id)));
        if !is_rank_ordered(&self.items) {
            self.items.sort_by_key(|entry| entry.rank);
        }
        self.cursor.offset += returned;
        self.has_more = returned == self.cursor.page_size;
    }

    /// Page-1 replace that keeps the pages already loaded below the fold, as
    /// long as they still line up with the fresh first page.
    fn merge_polled_page(&mut self, page: Vec<RankedEntry>) {
        let page_size = self.cursor.page_size;
        let returned = page.len();
        let first_page = normalize_page(page);
        let tail = if self.items.len() > page_size {
            self.items.split_off(page_size)
        } else {
            Vec::new()
        };

        if returned < page_size {
            self.items = first_page;
            self.cursor.offset = returned;
            self.has_more = false;
        } else if tail.is_empty() {
            self.items = first_page;
            // an exhausted list stays exhausted unless the cursor moves
            if self.cursor.offset != returned {
                self.cursor.offset = returned;
                self.has_more = true;
            }
        } else if tail_lines_up(&first_page, &tail) {
            self.items = first_page;
            self.items.extend(tail);
        } else {
            self.items = first_page;
            self.cursor.offset = returned;
            self.has_more = true;
        }

        if let Some(in_flight) = self.in_flight {
            if in_flight.kind == FetchKind::LoadMore && in_flight.offset != self.cursor.offset {
                self.in_flight = None;
            }
        }
    }
}

fn normalize_page(page: Vec<RankedEntry>) -> Vec<RankedEntry> {
    let mut seen = HashSet::new();
    let mut page: Vec<RankedEntry> = page
        .into_iter()
        .filter(|entry| seen.insert(entry.id))
        .collect();
    if !is_rank_ordered(&page) {
        page.sort_by_key(|entry| entry.rank);
    }
    page
}

fn tail_lines_up(first_page: &[RankedEntry], tail: &[RankedEntry]) -> bool {
    let ids: HashSet<UserId> = first_page.iter().map(|entry| entry.id).collect();
    if tail.iter().any(|entry| ids.contains(&entry.id)) {
        return false;
    }
    match (first_page.last(), tail.first()) {
        (Some(last), Some(first)) => last.rank <= first.rank,
        _ => true,
    }
}
