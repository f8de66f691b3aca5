//! # Bulk Sync
//!
//! Back-fills the relational store from the Wix query APIs.
//!
//! Pages are fetched sequentially, cursor by cursor. Each item goes through
//! the same sanitize and map steps as a webhook delivery, and each page is
//! written as one batch upsert. There is no checkpointing: any API or store
//! failure aborts the run, and re-running it is safe because every write is
//! an upsert on the table's conflict key.

use crate::dispatch::route;
use crate::mapping::map_entity;
use crate::store::{DataStore, Record, StoreError, TableNames};
use crate::webhook::classify::EventKind;
use crate::webhook::sanitize::Sanitizer;
use crate::{EntityType, EventAction};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use wix_client::{ApiError, WixQueryApi, WixResource};

/// Items requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Counters for one sync run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub pages: usize,
    pub fetched: usize,
    pub written: usize,
    pub skipped: usize,
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages, {} fetched, {} written, {} skipped",
            self.pages, self.fetched, self.written, self.skipped
        )
    }
}

/// Errors that abort a sync run
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Wix query for {resource} failed: {source}")]
    Api {
        resource: WixResource,
        #[source]
        source: ApiError,
    },

    #[error("Batch write to {table} failed: {source}")]
    Store {
        table: String,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { source, .. } => source.is_transient(),
            Self::Store { source, .. } => source.is_transient(),
        }
    }
}

/// Entity type stored for a queried resource
pub fn entity_type_for(resource: WixResource) -> EntityType {
    match resource {
        WixResource::Bookings => EntityType::Booking,
        WixResource::Contacts => EntityType::Contact,
        WixResource::Orders => EntityType::Order,
        WixResource::Products => EntityType::Product,
    }
}

/// Bulk sync runner
pub struct BulkSync {
    api: Arc<dyn WixQueryApi>,
    store: Arc<dyn DataStore>,
    tables: TableNames,
    sanitizer: Sanitizer,
    page_size: u32,
}

impl BulkSync {
    pub fn new(api: Arc<dyn WixQueryApi>, store: Arc<dyn DataStore>, tables: TableNames) -> Self {
        Self {
            api,
            store,
            tables,
            sanitizer: Sanitizer::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    /// Sync one resource end to end.
    ///
    /// # Errors
    ///
    /// Returns the first API or store failure; pages written before it stay
    /// written.
    #[instrument(skip(self), fields(resource = %resource))]
    pub async fn run(&self, resource: WixResource) -> Result<SyncReport, SyncError> {
        let kind = EventKind::new(entity_type_for(resource), EventAction::Updated);
        let mut report = SyncReport::default();
        let mut cursor: Option<String> = None;
        let table = route(&kind, &self.tables)
            .map(|r| r.table)
            .unwrap_or_default();

        loop {
            let page = self
                .api
                .query_page(resource, cursor.as_deref(), self.page_size)
                .await
                .map_err(|source| SyncError::Api { resource, source })?;

            report.pages += 1;
            report.fetched += page.items.len();

            let (batches, skipped) = self.build_batches(&kind, page.items);
            report.skipped += skipped;

            for (conflict_key, records) in batches {
                report.written += self.write_batch(&table, conflict_key, records).await?;
            }

            info!(
                page = report.pages,
                fetched = report.fetched,
                written = report.written,
                "Synced page"
            );

            match page.next_cursor {
                Some(next) if cursor.as_deref() != Some(next.as_str()) => cursor = Some(next),
                Some(_) => {
                    warn!("Wix returned the same cursor twice, stopping");
                    break;
                }
                None => break,
            }
        }

        info!(report = %report, "Sync finished");
        Ok(report)
    }

    /// Sync every resource in turn, stopping at the first failure
    pub async fn run_all(&self) -> Result<Vec<(WixResource, SyncReport)>, SyncError> {
        let mut reports = Vec::with_capacity(WixResource::ALL.len());
        for resource in WixResource::ALL {
            reports.push((resource, self.run(resource).await?));
        }
        Ok(reports)
    }

    /// Map a page into batches grouped by resolved conflict key.
    ///
    /// Contacts without a Wix id fall back to `email`, so one page can
    /// produce two batches.
    fn build_batches(
        &self,
        kind: &EventKind,
        items: Vec<serde_json::Value>,
    ) -> (BTreeMap<&'static str, Vec<Record>>, usize) {
        let mut batches: BTreeMap<&'static str, Vec<Record>> = BTreeMap::new();
        let mut skipped = 0;

        let Some(route) = route(kind, &self.tables) else {
            return (batches, items.len());
        };

        for item in items {
            let entity = self.sanitizer.sanitize(item);
            let record = match map_entity(kind, &entity) {
                Ok(Some(mapped)) => mapped.to_record(),
                Ok(None) => {
                    skipped += 1;
                    continue;
                }
                Err(e) => Err(e),
            };

            match record {
                Ok(record) => match route.resolve_key(&record) {
                    Some((key, _)) => batches.entry(key).or_default().push(record),
                    None => {
                        warn!(table = %route.table, "Item has no conflict key value, skipping");
                        skipped += 1;
                    }
                },
                Err(e) => {
                    warn!(table = %route.table, error = %e, "Item could not be mapped, skipping");
                    skipped += 1;
                }
            }
        }

        (batches, skipped)
    }

    async fn write_batch(
        &self,
        table: &str,
        conflict_key: &str,
        records: Vec<Record>,
    ) -> Result<usize, SyncError> {
        self.store
            .upsert_batch(table, records, conflict_key)
            .await
            .map_err(|source| SyncError::Store {
                table: table.to_string(),
                source,
            })
    }
}

#[cfg(test)]
#[path = "bulk_sync_tests.rs"]
mod tests;
