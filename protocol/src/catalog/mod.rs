//! # Order Catalog
//!
//! Durable record of published orders, kept as one JSON document:
//!
//! ```text
//! { "orders": [PublishedOrder, ...], "lastUpdated": "<rfc3339>", "version": "1.0.0" }
//! ```
//!
//! | File          | Contents                                         |
//! |---------------|--------------------------------------------------|
//! | `types.rs`    | records, `PublishRequest`, `OrderFilter`, stats  |
//! | `lock.rs`     | OS advisory lock on `<catalog>.lock`, holder info |
//! | `store.rs`    | `OrderCatalog` read / publish / update / query   |
//!
//! Status moves only through [`OrderCatalog::update_status`]; the catalog
//! does not police transitions.

pub mod lock;
pub mod store;
pub mod types;

pub use lock::{FileLock, LockError};
pub use store::{CatalogError, CatalogResult, OrderCatalog};
pub use types::{
    CatalogDocument, CatalogStatistics, OrderFilter, OrderMetadata, OrderStatus, PublishRequest,
    PublishedOrder,
};
