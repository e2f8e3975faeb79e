//! # Persistence Module
//!
//! JSON-file storage for orders, manager codes and stored users.
//! Every write goes through a temporary file in the target directory that is
//! renamed into place, so readers never observe a half-written document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::intake_errors::{IntakeError, IntakeResult};
use crate::order_model::Order;

const ORDER_FILE_PREFIX: &str = "order_";

/// Read and deserialize a JSON document, `None` if the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> IntakeResult<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(IntakeError::persistence(path, e)),
    };
    Ok(Some(serde_json::from_str(&content)?))
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> IntakeResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| IntakeError::persistence(&dir, e))?;

    let mut temp_file = NamedTempFile::new_in(&dir).map_err(|e| IntakeError::persistence(&dir, e))?;
    serde_json::to_writer_pretty(temp_file.as_file_mut(), value)?;
    temp_file
        .as_file_mut()
        .write_all(b"\n")
        .map_err(|e| IntakeError::persistence(path, e))?;
    temp_file
        .persist(path)
        .map_err(|e| IntakeError::persistence(path, e.error))?;

    debug!(path = %path.display(), "JSON document written");
    Ok(())
}

/// Where a persisted order came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderOrigin {
    /// Structured export dropped into the inbox directory
    File,
    /// HTML order form posted to the web server
    WebForm,
    /// Structured export handed over in memory
    Json,
}

/// An order as it is stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredOrder {
    pub id: u64,
    pub received_at: DateTime<Local>,
    pub origin: OrderOrigin,
    pub order: Order,
}

/// Directory of individual order files with a monotonic id allocator.
///
/// The allocator starts after the highest id found on disk, so ids stay
/// unique across restarts.
#[derive(Debug)]
pub struct OrderStore {
    dir: PathBuf,
    next_id: Mutex<u64>,
}

/// Parse the id out of an `order_<id>_<timestamp>.json` file name
pub fn order_id_from_file_name(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(ORDER_FILE_PREFIX)?.strip_suffix(".json")?;
    rest.split('_').next()?.parse().ok()
}

impl OrderStore {
    /// Open (and create if needed) the order directory
    pub fn open(dir: impl Into<PathBuf>) -> IntakeResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| IntakeError::persistence(&dir, e))?;

        let highest = Self::order_files(&dir)?
            .iter()
            .filter_map(|path| path.file_name()?.to_str().and_then(order_id_from_file_name))
            .max()
            .unwrap_or(0);

        info!(dir = %dir.display(), next_id = highest + 1, "Order store opened");
        Ok(Self {
            dir,
            next_id: Mutex::new(highest + 1),
        })
    }

    fn order_files(dir: &Path) -> IntakeResult<Vec<PathBuf>> {
        let entries = fs::read_dir(dir).map_err(|e| IntakeError::persistence(dir, e))?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| order_id_from_file_name(n).is_some())
            })
            .collect();
        files.sort();
        Ok(files)
    }

    /// Persist an order under a freshly allocated id
    pub fn save(&self, order: &Order, origin: OrderOrigin) -> IntakeResult<StoredOrder> {
        let mut next_id = self.next_id.lock().unwrap_or_else(PoisonError::into_inner);

        let stored = StoredOrder {
            id: *next_id,
            received_at: Local::now(),
            origin,
            order: order.clone(),
        };
        let file_name = format!(
            "{ORDER_FILE_PREFIX}{}_{}.json",
            stored.id,
            stored.received_at.format("%Y%m%d_%H%M%S")
        );
        let path = self.dir.join(&file_name);
        write_json(&path, &stored)?;

        *next_id += 1;
        info!(order_id = stored.id, file = %file_name, "Order persisted");
        Ok(stored)
    }

    /// Load every stored order, ordered by id. Unreadable files are skipped.
    pub fn list(&self) -> IntakeResult<Vec<StoredOrder>> {
        let mut orders = Vec::new();
        for path in Self::order_files(&self.dir)? {
            match read_json::<StoredOrder>(&path) {
                Ok(Some(order)) => orders.push(order),
                Ok(None) => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable order file"),
            }
        }
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    /// Load a single order by id
    pub fn get(&self, id: u64) -> IntakeResult<Option<StoredOrder>> {
        let prefix = format!("{ORDER_FILE_PREFIX}{id}_");
        for path in Self::order_files(&self.dir)? {
            let matches = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix));
            if matches {
                return read_json(&path);
            }
        }
        Ok(None)
    }
}
