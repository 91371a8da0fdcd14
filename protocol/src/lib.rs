// Copyright (c) 2026 Umbra Contributors. MIT License.
// See LICENSE for details.

//! # Umbra Protocol — Core Library
//!
//! Hidden-threshold limit orders. A maker publishes an ordinary limit order
//! whose salt is a Poseidon commitment to a secret minimum price and amount.
//! A taker can only fill it through a freshly signed copy whose extension
//! carries a Groth16 proof that the offered terms meet those thresholds.
//! The thresholds themselves never leave the maker's registration.
//!
//! ## Architecture
//!
//! - **zkp**: commitment engine, threshold circuit, prover seam, worker pool,
//!   verifier ABI encoding.
//! - **order**: limit-order structs, salt codec, extension layout, EIP-712
//!   signing.
//! - **catalog**: durable JSON catalog of published orders behind a
//!   stale-aware file lock.
//! - **authorization**: order registry and the fill state machine.
//! - **config** / **error** / **logging**: constants and service settings,
//!   stable error codes, `tracing` setup.
//!
//! ## Flow
//!
//! ```text
//! maker ─► commit(price, amount, nonce) ─► order(salt = C) ─► catalog
//! taker ─► authorize_fill(hash, amount)
//!            └► registry ─► threshold ─► prove ─► rebuild(salt, extension) ─► sign
//! ```

pub mod authorization;
pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod order;
pub mod serde_util;
pub mod zkp;

pub use error::ErrorCode;
