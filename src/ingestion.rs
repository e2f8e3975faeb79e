//! # Order Ingestion Module
//!
//! Runs an inbound payload through parse → normalize → persist → archive →
//! notify. Completed orders are published on a broadcast channel; consumers
//! drain it on their own tasks so slow processing never holds up intake.
//!
//! The steps are not atomic: an order is persisted before its source file is
//! archived, so a crash in between re-ingests that file on the next scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use crate::intake_errors::{IntakeError, IntakeResult};
use crate::normalizer::{normalize, OrderSource};
use crate::persistence::{OrderOrigin, OrderStore, StoredOrder};

/// Name of the archive directory inside the inbox
pub const PROCESSED_DIR: &str = "Processed";

/// Capacity of the order notification channel
const NOTIFICATION_CAPACITY: usize = 64;

/// A raw order payload as handed to the pipeline
#[derive(Debug, Clone)]
pub enum RawPayload {
    /// Structured export stored in a file; the file is archived on success
    File(PathBuf),
    /// URL-encoded order form body
    FormBody(String),
    /// Structured export already read into memory
    Json(String),
}

/// Event published after an order has been persisted
#[derive(Debug, Clone)]
pub struct OrderReceived {
    pub order: Arc<StoredOrder>,
    /// Where the source file was archived, if it came from a file
    pub archived_to: Option<PathBuf>,
}

/// Per-file outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    pub ingested: Vec<(PathBuf, u64)>,
    pub failed: Vec<(PathBuf, String)>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.ingested.len() + self.failed.len()
    }
}

pub struct OrderIngestionPipeline {
    store: Arc<OrderStore>,
    inbox_dir: PathBuf,
    events: broadcast::Sender<OrderReceived>,
}

impl OrderIngestionPipeline {
    pub fn new(store: Arc<OrderStore>, inbox_dir: impl Into<PathBuf>) -> Self {
        let (events, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            store,
            inbox_dir: inbox_dir.into(),
            events,
        }
    }

    pub fn store(&self) -> &Arc<OrderStore> {
        &self.store
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inbox_dir
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.inbox_dir.join(PROCESSED_DIR)
    }

    /// Register a new consumer of order notifications
    pub fn subscribe(&self) -> broadcast::Receiver<OrderReceived> {
        self.events.subscribe()
    }

    /// Ingest one payload and return the id assigned to the order
    pub fn ingest(&self, payload: RawPayload) -> IntakeResult<u64> {
        let (order, origin) = match &payload {
            RawPayload::File(path) => {
                let content =
                    fs::read_to_string(path).map_err(|e| IntakeError::persistence(path, e))?;
                (normalize(OrderSource::StructuredExport(&content))?, OrderOrigin::File)
            }
            RawPayload::FormBody(body) => {
                (normalize(OrderSource::FormSubmission(body))?, OrderOrigin::WebForm)
            }
            RawPayload::Json(json) => {
                (normalize(OrderSource::StructuredExport(json))?, OrderOrigin::Json)
            }
        };

        let stored = self.store.save(&order, origin)?;
        let order_id = stored.id;

        let archived_to = match &payload {
            RawPayload::File(path) => match self.archive(path, order_id) {
                Ok(archived) => Some(archived),
                Err(e) => {
                    error!(order_id, file = %path.display(), error = %e, "Failed to archive processed file");
                    None
                }
            },
            _ => None,
        };

        self.notify(OrderReceived {
            order: Arc::new(stored),
            archived_to,
        });

        Ok(order_id)
    }

    /// Move a processed file to `Processed/order_<id>_<name>`
    fn archive(&self, path: &Path, order_id: u64) -> IntakeResult<PathBuf> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let archive_dir = self.archive_dir();
        fs::create_dir_all(&archive_dir).map_err(|e| IntakeError::persistence(&archive_dir, e))?;

        let target = archive_dir.join(format!("order_{order_id}_{file_name}"));
        fs::rename(path, &target).map_err(|e| IntakeError::persistence(path, e))?;
        debug!(order_id, target = %target.display(), "Archived processed file");
        Ok(target)
    }

    fn notify(&self, event: OrderReceived) {
        let order_id = event.order.id;
        match self.events.send(event) {
            Ok(receivers) => debug!(order_id, receivers, "Order notification published"),
            Err(_) => warn!(order_id, "No subscribers for order notification"),
        }
    }

    /// Ingest every `*.json` file in the inbox; one failure never stops the batch
    pub fn ingest_inbox(&self) -> IntakeResult<BatchReport> {
        fs::create_dir_all(&self.inbox_dir)
            .map_err(|e| IntakeError::persistence(&self.inbox_dir, e))?;
        let entries =
            fs::read_dir(&self.inbox_dir).map_err(|e| IntakeError::persistence(&self.inbox_dir, e))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();

        info!(count = files.len(), inbox = %self.inbox_dir.display(), "Found JSON order files");

        let mut report = BatchReport::default();
        for file in files {
            match self.ingest(RawPayload::File(file.clone())) {
                Ok(order_id) => {
                    info!(order_id, file = %file.display(), "Order file ingested");
                    report.ingested.push((file, order_id));
                }
                Err(e) => {
                    error!(file = %file.display(), error = %e, "Failed to ingest order file");
                    report.failed.push((file, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

/// Log every received order until the channel closes.
///
/// Corporate customers are flagged so that the sales desk can pick them up.
pub async fn run_order_logger(mut events: broadcast::Receiver<OrderReceived>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                let stored = &event.order;
                let customer = &stored.order.customer;
                info!(
                    order_id = stored.id,
                    origin = ?stored.origin,
                    customer = %customer.full_name,
                    phone = %customer.phone,
                    email = %customer.email,
                    company = %customer.company,
                    address = %customer.delivery_address,
                    comment = %stored.order.customer_notes,
                    items = stored.order.items.len(),
                    total = %stored.order.total_amount,
                    "New order received"
                );
                if customer.is_corporate() {
                    info!(order_id = stored.id, company = %customer.company, "Corporate customer order");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Order logger lagged behind notifications");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    debug!("Order logger stopped");
}

/// Run one inbox batch on the blocking pool and log its outcome
pub async fn scan_inbox(pipeline: Arc<OrderIngestionPipeline>) -> Option<BatchReport> {
    match tokio::task::spawn_blocking(move || pipeline.ingest_inbox()).await {
        Ok(Ok(report)) => {
            info!(
                files = report.total(),
                ingested = report.ingested.len(),
                failed = report.failed.len(),
                "Inbox scan finished"
            );
            Some(report)
        }
        Ok(Err(e)) => {
            error!(error = %e, "Inbox scan failed");
            None
        }
        Err(e) => {
            error!(error = %e, "Inbox scan task failed");
            None
        }
    }
}

/// Rescan the inbox every `period` until `shutdown` flips to true
pub async fn run_inbox_scanner(
    pipeline: Arc<OrderIngestionPipeline>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    // The first tick fires immediately and the startup scan already ran
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                scan_inbox(pipeline.clone()).await;
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!("Inbox scanner stopped");
}
