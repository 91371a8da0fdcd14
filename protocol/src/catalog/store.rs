//! File-backed order catalog.
//!
//! Every mutation runs as lock → load → modify → write temp → rename →
//! unlock, so concurrent writers serialize on the lock file and readers
//! always see a complete document. Reads skip the lock.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::lock::{FileLock, LockError};
use super::types::{
    CatalogDocument, CatalogStatistics, OrderFilter, OrderMetadata, OrderStatus, PublishRequest,
    PublishedOrder,
};
use crate::config::{ServiceConfig, CATALOG_VERSION, LOCK_STALE_AFTER, LOCK_TIMEOUT};
use crate::error::{ErrorCode, RequestError};
use crate::zkp::Commitment;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("could not lock catalog within {0:?}")]
    LockTimeout(Duration),

    /// The document on disk does not parse. Never repaired automatically.
    #[error("catalog {path} is corrupt: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("catalog I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("an active order already exists for commitment {0}")]
    DuplicateCommitment(Commitment),

    #[error("no published order with id {0}")]
    NotFound(String),

    #[error(transparent)]
    InvalidRequest(#[from] RequestError),

    #[error("catalog serialization failed: {0}")]
    Serialize(String),
}

impl CatalogError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::LockTimeout(_) => ErrorCode::StorageLockTimeout,
            Self::Corrupt { .. } => ErrorCode::StorageCorrupt,
            Self::Io { .. } | Self::Serialize(_) => ErrorCode::StorageIo,
            Self::DuplicateCommitment(_) => ErrorCode::DuplicateCommitment,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::InvalidRequest(_) => ErrorCode::InvalidRequest,
        }
    }
}

impl From<LockError> for CatalogError {
    fn from(e: LockError) -> Self {
        match e {
            LockError::Timeout(after, _) => Self::LockTimeout(after),
            LockError::Io { path, source } => Self::Io { path, source },
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;

// ---------------------------------------------------------------------------
// OrderCatalog
// ---------------------------------------------------------------------------

/// Handle on one catalog document. Cheap to clone; holds no open files.
#[derive(Debug, Clone)]
pub struct OrderCatalog {
    path: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl OrderCatalog {
    /// Catalog at `path` with the default lock timing. The file is created
    /// on first write.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock_timeout: LOCK_TIMEOUT,
            stale_after: LOCK_STALE_AFTER,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::open(config.catalog_path.clone())
            .with_lock_timing(config.lock_timeout(), config.lock_stale_after())
    }

    pub fn with_lock_timing(mut self, timeout: Duration, stale_after: Duration) -> Self {
        self.lock_timeout = timeout;
        self.stale_after = stale_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document. A missing file is an empty catalog.
    pub fn load(&self) -> CatalogResult<CatalogDocument> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(CatalogDocument::default()),
            Err(source) => return Err(io_error(&self.path, source)),
        };

        serde_json::from_slice(&bytes).map_err(|e| {
            error!(path = %self.path.display(), error = %e, "catalog document is corrupt");
            CatalogError::Corrupt {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Validate and append a new active order.
    pub fn publish(&self, request: PublishRequest) -> CatalogResult<PublishedOrder> {
        let original_salt = request.validate()?;

        self.mutate(|doc| {
            let duplicate = doc.orders.iter().any(|o| {
                o.commitment == request.commitment && o.metadata.status == OrderStatus::Active
            });
            if duplicate {
                return Err(CatalogError::DuplicateCommitment(request.commitment));
            }

            let order = PublishedOrder {
                id: Uuid::new_v4().to_string(),
                order_data: request.order_data,
                signature: request.signature,
                commitment: request.commitment,
                metadata: OrderMetadata {
                    maker: request.maker,
                    maker_asset: request.maker_asset,
                    taker_asset: request.taker_asset,
                    making_amount: request.making_amount,
                    taking_amount: request.taking_amount,
                    original_salt,
                    network: request.network,
                    published: Utc::now(),
                    status: OrderStatus::Active,
                },
            };
            info!(id = %order.id, commitment = %order.commitment, "order published");
            doc.orders.push(order.clone());
            Ok(order)
        })
    }

    pub fn get_by_id(&self, id: &str) -> CatalogResult<Option<PublishedOrder>> {
        Ok(self.load()?.orders.into_iter().find(|o| o.id == id))
    }

    /// Orders matching `filter`, newest-published first.
    pub fn query(&self, filter: &OrderFilter) -> CatalogResult<Vec<PublishedOrder>> {
        let mut matches: Vec<_> = self
            .load()?
            .orders
            .into_iter()
            .rev()
            .filter(|o| filter.matches(o))
            .collect();
        // Stable: equal timestamps keep latest-appended first.
        matches.sort_by(|a, b| b.metadata.published.cmp(&a.metadata.published));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    /// Set the status of `id`. Any transition is accepted.
    pub fn update_status(&self, id: &str, status: OrderStatus) -> CatalogResult<PublishedOrder> {
        self.mutate(|doc| {
            let order = doc
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or_else(|| CatalogError::NotFound(id.to_string()))?;
            let previous = order.metadata.status;
            order.metadata.status = status;
            info!(id, ?previous, ?status, "order status updated");
            Ok(order.clone())
        })
    }

    pub fn statistics(&self) -> CatalogResult<CatalogStatistics> {
        Ok(self.load()?.statistics())
    }

    // -- Internals ----------------------------------------------------------

    fn mutate<T>(&self, f: impl FnOnce(&mut CatalogDocument) -> CatalogResult<T>) -> CatalogResult<T> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
        }

        let _lock = FileLock::acquire(&self.path, self.lock_timeout, self.stale_after)?;
        let mut doc = self.load()?;
        let out = f(&mut doc)?;
        doc.last_updated = Utc::now();
        doc.version = CATALOG_VERSION.to_string();
        self.write(&doc)?;
        Ok(out)
    }

    /// Write to a sibling temp file, then rename over the document.
    fn write(&self, doc: &CatalogDocument) -> CatalogResult<()> {
        let body = serde_json::to_vec_pretty(doc).map_err(|e| CatalogError::Serialize(e.to_string()))?;

        let mut tmp_name = self.path.as_os_str().to_os_string();
        tmp_name.push(format!(".{}.tmp", Uuid::new_v4().simple()));
        let tmp = PathBuf::from(tmp_name);

        let result = fs::File::create(&tmp)
            .and_then(|mut file| {
                file.write_all(&body)?;
                file.sync_all()
            })
            .and_then(|_| fs::rename(&tmp, &self.path));

        if let Err(source) = result {
            let _ = fs::remove_file(&tmp);
            return Err(io_error(&self.path, source));
        }
        debug!(path = %self.path.display(), orders = doc.orders.len(), "catalog written");
        Ok(())
    }
}

fn io_error(path: &Path, source: io::Error) -> CatalogError {
    CatalogError::Io {
        path: path.to_path_buf(),
        source,
    }
}
