//! # Limit Orders
//!
//! Order structs, the salt codec, extension layout, fill-time rebuild and
//! EIP-712 signing.
//!
//! ```text
//! types.rs       LimitOrder, OrderParameters, MakerTraits
//! salt.rs        (commitment mod 2^96) << 160 | keccak(extension) mod 2^160
//! extension.rs   offsets-word extension layout + ZK predicate gate
//! builder.rs     rebuild an order around a fresh proof
//! eip712.rs      order hash, OrderSigner, LocalOrderSigner
//! ```

pub mod builder;
pub mod eip712;
pub mod extension;
pub mod salt;
pub mod types;

pub use builder::{rebuild_with_proof, BuiltOrder, RebuildError};
pub use eip712::{order_hash, LocalOrderSigner, OrderDomain, OrderSignature, OrderSigner, SignerError};
pub use extension::{Extension, ExtensionError, ZkPredicate};
pub use salt::SaltError;
pub use types::{LimitOrder, MakerTraits, OrderParameters};
