//! EIP-712 order hashing and signing.
//!
//! ```text
//! digest = keccak256(0x1901 || domainSeparator || hashStruct(order))
//! ```
//!
//! The domain is `{name, version, chainId, verifyingContract}` of the
//! limit-order router. Signing is behind [`OrderSigner`] so a remote or
//! hardware signer can replace the local wallet.

use async_trait::async_trait;
use ethers_core::abi::{self, Token};
use ethers_core::types::{Address, Signature, H256, U256};
use ethers_core::utils::keccak256;
use ethers_signers::{LocalWallet, Signer};
use serde::{Deserialize, Serialize};

use super::types::LimitOrder;
use crate::config::{EIP712_DOMAIN_NAME, EIP712_DOMAIN_VERSION};
use crate::error::ErrorCode;

pub const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

pub const ORDER_TYPE: &str = "Order(uint256 salt,address maker,address receiver,address makerAsset,address takerAsset,uint256 makingAmount,uint256 takingAmount,uint256 makerTraits)";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignerError {
    #[error("invalid signing key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("signature recovery failed: {0}")]
    Recovery(String),
}

impl SignerError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::SigningFailed
    }
}

// ---------------------------------------------------------------------------
// Domain and hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDomain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl OrderDomain {
    /// The router's domain on `chain_id`.
    pub fn new(chain_id: u64, verifying_contract: Address) -> Self {
        Self {
            name: EIP712_DOMAIN_NAME.to_string(),
            version: EIP712_DOMAIN_VERSION.to_string(),
            chain_id,
            verifying_contract,
        }
    }

    pub fn separator(&self) -> H256 {
        let encoded = abi::encode(&[
            Token::FixedBytes(keccak256(DOMAIN_TYPE).to_vec()),
            Token::FixedBytes(keccak256(self.name.as_bytes()).to_vec()),
            Token::FixedBytes(keccak256(self.version.as_bytes()).to_vec()),
            Token::Uint(U256::from(self.chain_id)),
            Token::Address(self.verifying_contract),
        ]);
        H256(keccak256(encoded))
    }
}

pub fn order_struct_hash(order: &LimitOrder) -> H256 {
    let encoded = abi::encode(&[
        Token::FixedBytes(keccak256(ORDER_TYPE).to_vec()),
        Token::Uint(order.salt),
        Token::Address(order.maker),
        Token::Address(order.receiver),
        Token::Address(order.maker_asset),
        Token::Address(order.taker_asset),
        Token::Uint(order.making_amount),
        Token::Uint(order.taking_amount),
        Token::Uint(order.maker_traits.as_u256()),
    ]);
    H256(keccak256(encoded))
}

/// The digest the maker signs and the router recomputes.
pub fn order_hash(order: &LimitOrder, domain: &OrderDomain) -> H256 {
    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(domain.separator().as_bytes());
    preimage.extend_from_slice(order_struct_hash(order).as_bytes());
    H256(keccak256(preimage))
}

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// A 65-byte `r || s || v` ECDSA signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderSignature(pub Signature);

impl OrderSignature {
    /// `0x`-prefixed hex of the 65 bytes.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0.to_vec()))
    }

    /// EIP-2098 compact form `(r, vs)` the router's fill entry point takes.
    pub fn compact(&self) -> (H256, H256) {
        let mut r = [0u8; 32];
        self.0.r.to_big_endian(&mut r);
        let mut vs = self.0.s;
        if self.0.v == 28 || self.0.v == 1 {
            vs = vs | (U256::one() << 255);
        }
        let mut vs_bytes = [0u8; 32];
        vs.to_big_endian(&mut vs_bytes);
        (H256(r), H256(vs_bytes))
    }

    pub fn recover(&self, order: &LimitOrder, domain: &OrderDomain) -> Result<Address, SignerError> {
        self.0
            .recover(order_hash(order, domain))
            .map_err(|e| SignerError::Recovery(e.to_string()))
    }
}

/// Produces structured-data signatures over orders.
#[async_trait]
pub trait OrderSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_order(
        &self,
        order: &LimitOrder,
        domain: &OrderDomain,
    ) -> Result<OrderSignature, SignerError>;
}

/// In-process secp256k1 signer.
pub struct LocalOrderSigner {
    wallet: LocalWallet,
}

impl LocalOrderSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    /// Parse a hex private key (with or without `0x`).
    pub fn from_private_key(key: &str) -> Result<Self, SignerError> {
        let trimmed = key.trim();
        let stripped = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let wallet = stripped
            .parse::<LocalWallet>()
            .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
        Ok(Self { wallet })
    }
}

#[async_trait]
impl OrderSigner for LocalOrderSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_order(
        &self,
        order: &LimitOrder,
        domain: &OrderDomain,
    ) -> Result<OrderSignature, SignerError> {
        let digest = order_hash(order, domain);
        self.wallet
            .sign_hash(digest)
            .map(OrderSignature)
            .map_err(|e| SignerError::Signing(e.to_string()))
    }
}
