//! Catalog records, filters and the on-disk document.

use chrono::{DateTime, Utc};
use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::config::CATALOG_VERSION;
use crate::error::{FieldCheck, RequestError};
use crate::serde_util::u256_dec;
use crate::zkp::Commitment;

/// Lifecycle of a published order. Created `Active`; moved only by
/// explicit status updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Filled,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMetadata {
    pub maker: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    #[serde(with = "u256_dec")]
    pub making_amount: U256,
    #[serde(with = "u256_dec")]
    pub taking_amount: U256,
    #[serde(with = "u256_dec")]
    pub original_salt: U256,
    pub network: String,
    pub published: DateTime<Utc>,
    pub status: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedOrder {
    pub id: String,
    /// The signed order as the maker's wallet produced it.
    pub order_data: serde_json::Value,
    pub signature: String,
    pub commitment: Commitment,
    pub metadata: OrderMetadata,
}

/// Inbound publish request. Validated before anything touches disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    pub order_data: serde_json::Value,
    pub signature: String,
    pub commitment: Commitment,
    pub maker: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    #[serde(with = "u256_dec")]
    pub making_amount: U256,
    #[serde(with = "u256_dec")]
    pub taking_amount: U256,
    /// Defaults to the commitment when the order had no extension.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_salt: Option<String>,
    pub network: String,
}

impl PublishRequest {
    /// Check every field, returning the effective original salt.
    pub fn validate(&self) -> Result<U256, RequestError> {
        let mut check = FieldCheck::new();

        if !self.order_data.is_object() {
            check.reject("orderData", "must be a JSON object");
        }

        let sig = self.signature.trim();
        let sig_hex = sig.strip_prefix("0x").unwrap_or(sig);
        if sig_hex.is_empty() {
            check.reject("signature", "must not be empty");
        } else if hex::decode(sig_hex).is_err() {
            check.reject("signature", "must be hex encoded");
        }

        if self.network.trim().is_empty() {
            check.reject("network", "must not be empty");
        }
        if self.maker.is_zero() {
            check.reject("maker", "must not be the zero address");
        }
        if self.maker_asset == self.taker_asset {
            check.reject("takerAsset", "must differ from makerAsset");
        }
        if self.making_amount.is_zero() {
            check.reject("makingAmount", "must be positive");
        }
        if self.taking_amount.is_zero() {
            check.reject("takingAmount", "must be positive");
        }

        let salt = match &self.original_salt {
            Some(raw) => check.take("originalSalt", crate::serde_util::parse_u256(raw)),
            None => Some(self.commitment.as_u256()),
        };

        check.finish_with(salt)
    }
}

/// Query filter. Every `Some` field must match; results come back
/// newest-published first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub maker: Option<Address>,
    pub maker_asset: Option<Address>,
    pub taker_asset: Option<Address>,
    pub network: Option<String>,
    pub limit: Option<usize>,
}

impl OrderFilter {
    pub fn active() -> Self {
        Self {
            status: Some(OrderStatus::Active),
            ..Self::default()
        }
    }

    pub fn matches(&self, order: &PublishedOrder) -> bool {
        let m = &order.metadata;
        self.status.map_or(true, |s| m.status == s)
            && self.maker.map_or(true, |a| m.maker == a)
            && self.maker_asset.map_or(true, |a| m.maker_asset == a)
            && self.taker_asset.map_or(true, |a| m.taker_asset == a)
            && self
                .network
                .as_deref()
                .map_or(true, |n| m.network.eq_ignore_ascii_case(n))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStatistics {
    pub total: usize,
    pub active: usize,
    pub filled: usize,
    pub cancelled: usize,
}

/// The single JSON document on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogDocument {
    pub orders: Vec<PublishedOrder>,
    pub last_updated: DateTime<Utc>,
    pub version: String,
}

impl Default for CatalogDocument {
    fn default() -> Self {
        Self {
            orders: Vec::new(),
            last_updated: Utc::now(),
            version: CATALOG_VERSION.to_string(),
        }
    }
}

impl CatalogDocument {
    pub fn statistics(&self) -> CatalogStatistics {
        self.orders
            .iter()
            .fold(CatalogStatistics::default(), |mut stats, order| {
                stats.total += 1;
                match order.metadata.status {
                    OrderStatus::Active => stats.active += 1,
                    OrderStatus::Filled => stats.filled += 1,
                    OrderStatus::Cancelled => stats.cancelled += 1,
                }
                stats
            })
    }
}
