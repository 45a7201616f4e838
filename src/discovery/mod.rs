// Discovery - enumerates every commitment id ever created
//
// Two modes:
// - Full rescan: newest-first scan of the creation-event log up to
//   page_size * max_pages events, every sweep.
// - Incremental: oldest-first scan from a persisted cursor, merging new ids
//   into a persisted known set. Terminal ids are pruned from the set.
pub mod cursor;

use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::WatcherConfig;
use crate::error::{DiscoveryError, LedgerError};
use crate::ledger::models::{EventCursor, EventPage, EventQuery, ObjectId};
use crate::ledger::LedgerClient;
use cursor::{CursorState, FileCursorStore};

pub struct Discovery {
    ledger: Arc<dyn LedgerClient>,
    config: Arc<WatcherConfig>,
    cursor_store: Option<FileCursorStore>,
    /// Cached incremental state; loaded lazily from the store
    state: Mutex<Option<CursorState>>,
}

impl Discovery {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: Arc<WatcherConfig>) -> Self {
        let cursor_store = config
            .discovery_cursor_path
            .as_ref()
            .map(FileCursorStore::new);

        Self {
            ledger,
            config,
            cursor_store,
            state: Mutex::new(None),
        }
    }

    pub fn is_incremental(&self) -> bool {
        self.cursor_store.is_some()
    }

    /// Distinct identifiers, ascending
    pub async fn discover(&self) -> Result<BTreeSet<ObjectId>, DiscoveryError> {
        match &self.cursor_store {
            Some(store) => self.discover_incremental(store).await,
            None => self.discover_full().await,
        }
    }

    /// Drop ids known to be terminal from the incremental known set.
    /// No-op in full-rescan mode.
    pub async fn forget(&self, ids: &[ObjectId]) -> Result<(), DiscoveryError> {
        let Some(store) = &self.cursor_store else {
            return Ok(());
        };
        if ids.is_empty() {
            return Ok(());
        }

        let mut guard = self.state.lock().await;
        let mut state = match guard.take() {
            Some(state) => state,
            None => store.load().await?,
        };

        let before = state.known_ids.len();
        for id in ids {
            state.known_ids.remove(id);
        }

        let pruned = before - state.known_ids.len();
        let result = if pruned > 0 {
            debug!("Pruned {} terminal ids from cursor state", pruned);
            store.save(&state).await
        } else {
            Ok(())
        };

        *guard = Some(state);
        result
    }

    #[instrument(skip(self))]
    async fn discover_full(&self) -> Result<BTreeSet<ObjectId>, DiscoveryError> {
        let mut ids = BTreeSet::new();
        let mut cursor = None;
        let mut events_seen = 0usize;

        for page in 0..self.config.discovery_max_pages {
            let result = self.fetch_page(page, cursor.take(), true).await?;
            events_seen += result.events.len();
            collect_ids(&result, &mut ids);

            if !result.has_next_page || result.next_cursor.is_none() {
                break;
            }
            if page + 1 == self.config.discovery_max_pages {
                warn!(
                    "⚠️  Creation-event scan hit page limit ({} pages); older commitments not rescanned",
                    self.config.discovery_max_pages
                );
            }
            cursor = result.next_cursor;
        }

        if events_seen == 0 {
            info!("No creation events found");
        } else {
            info!("🔍 Found {} unique commitment ids in {} events", ids.len(), events_seen);
        }

        Ok(ids)
    }

    #[instrument(skip(self, store), fields(path = %store.path().display()))]
    async fn discover_incremental(
        &self,
        store: &FileCursorStore,
    ) -> Result<BTreeSet<ObjectId>, DiscoveryError> {
        let mut guard = self.state.lock().await;
        let mut state = match guard.as_ref() {
            Some(state) => state.clone(),
            None => store.load().await?,
        };

        let mut new_ids = 0usize;
        let mut new_events = 0usize;

        for page in 0..self.config.discovery_max_pages {
            let result = self.fetch_page(page, state.cursor.clone(), false).await?;
            new_events += result.events.len();

            let before = state.known_ids.len();
            collect_ids(&result, &mut state.known_ids);
            new_ids += state.known_ids.len() - before;

            if let Some(last) = result.events.last() {
                state.cursor = Some(last.cursor.clone());
            }

            if !result.has_next_page {
                break;
            }
            if page + 1 == self.config.discovery_max_pages {
                info!("⏭️  Event backlog remains; continuing from cursor next sweep");
            }
        }

        if new_events > 0 {
            store.save(&state).await?;
        }

        info!(
            "🔍 Incremental discovery: {} new events, {} new ids, {} known",
            new_events,
            new_ids,
            state.known_ids.len()
        );

        let ids = state.known_ids.clone();
        *guard = Some(state);
        Ok(ids)
    }

    async fn fetch_page(
        &self,
        page: usize,
        cursor: Option<EventCursor>,
        descending: bool,
    ) -> Result<EventPage, DiscoveryError> {
        let query = EventQuery {
            event_type: self.config.created_event_type(),
            cursor,
            limit: self.config.discovery_page_size,
            descending,
        };

        let result = tokio::time::timeout(self.config.rpc_timeout, self.ledger.query_events(&query))
            .await
            .unwrap_or(Err(LedgerError::Timeout {
                operation: "query_events",
                after: self.config.rpc_timeout,
            }));

        result.map_err(|source| DiscoveryError::PageFetch { page, source })
    }
}

fn collect_ids(page: &EventPage, ids: &mut BTreeSet<ObjectId>) {
    for event in &page.events {
        match &event.object_id {
            Some(id) => {
                ids.insert(id.clone());
            }
            None => debug!("Creation event {:?} has no id field, skipping", event.cursor),
        }
    }
}
