//! Order structs as the limit-order protocol sees them.

use ethers_core::types::{Address, U256};
use serde::{Deserialize, Serialize};

use crate::serde_util::u256_dec;
use crate::zkp::Commitment;

// ---------------------------------------------------------------------------
// MakerTraits
// ---------------------------------------------------------------------------

/// Packed maker flags and limits (`uint256 makerTraits`).
///
/// High bits are flags; the low 200 bits hold the allowed-sender suffix,
/// expiration, nonce/epoch and series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MakerTraits(#[serde(with = "u256_dec")] pub U256);

impl MakerTraits {
    pub const NO_PARTIAL_FILLS_FLAG: usize = 255;
    pub const ALLOW_MULTIPLE_FILLS_FLAG: usize = 254;
    pub const PRE_INTERACTION_CALL_FLAG: usize = 252;
    pub const POST_INTERACTION_CALL_FLAG: usize = 251;
    pub const NEED_CHECK_EPOCH_MANAGER_FLAG: usize = 250;
    pub const HAS_EXTENSION_FLAG: usize = 249;
    pub const USE_PERMIT2_FLAG: usize = 248;
    pub const UNWRAP_WETH_FLAG: usize = 247;

    const EXPIRATION_OFFSET: usize = 80;
    const EXPIRATION_BITS: usize = 40;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    fn flag(&self, bit: usize) -> bool {
        self.0.bit(bit)
    }

    fn with_flag(self, bit: usize, on: bool) -> Self {
        let mask = U256::one() << bit;
        Self(if on { self.0 | mask } else { self.0 & !mask })
    }

    pub fn has_extension(&self) -> bool {
        self.flag(Self::HAS_EXTENSION_FLAG)
    }

    pub fn with_extension(self, on: bool) -> Self {
        self.with_flag(Self::HAS_EXTENSION_FLAG, on)
    }

    pub fn allows_partial_fills(&self) -> bool {
        !self.flag(Self::NO_PARTIAL_FILLS_FLAG)
    }

    pub fn with_partial_fills(self, allowed: bool) -> Self {
        self.with_flag(Self::NO_PARTIAL_FILLS_FLAG, !allowed)
    }

    pub fn allows_multiple_fills(&self) -> bool {
        self.flag(Self::ALLOW_MULTIPLE_FILLS_FLAG)
    }

    pub fn with_multiple_fills(self, allowed: bool) -> Self {
        self.with_flag(Self::ALLOW_MULTIPLE_FILLS_FLAG, allowed)
    }

    /// Unix expiration timestamp, zero when the order never expires.
    pub fn expiration(&self) -> u64 {
        let mask = crate::config::low_mask(Self::EXPIRATION_BITS);
        ((self.0 >> Self::EXPIRATION_OFFSET) & mask).low_u64()
    }

    /// Set the 40-bit expiration. Larger values are truncated.
    pub fn with_expiration(self, unix_seconds: u64) -> Self {
        let mask = crate::config::low_mask(Self::EXPIRATION_BITS) << Self::EXPIRATION_OFFSET;
        let value = (U256::from(unix_seconds) << Self::EXPIRATION_OFFSET) & mask;
        Self((self.0 & !mask) | value)
    }
}

// ---------------------------------------------------------------------------
// LimitOrder
// ---------------------------------------------------------------------------

/// The signed order struct. Field order matches the EIP-712 type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LimitOrder {
    #[serde(with = "u256_dec")]
    pub salt: U256,
    pub maker: Address,
    pub receiver: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    #[serde(with = "u256_dec")]
    pub making_amount: U256,
    #[serde(with = "u256_dec")]
    pub taking_amount: U256,
    pub maker_traits: MakerTraits,
}

// ---------------------------------------------------------------------------
// OrderParameters
// ---------------------------------------------------------------------------

/// Economic terms of a registered order. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderParameters {
    pub maker: Address,
    pub maker_asset: Address,
    pub taker_asset: Address,
    #[serde(with = "u256_dec")]
    pub making_amount: U256,
    #[serde(with = "u256_dec")]
    pub taking_amount: U256,
    pub commitment: Commitment,
    /// Salt of the order as first signed. Equals the commitment for orders
    /// published without an extension.
    #[serde(with = "u256_dec")]
    pub original_salt: U256,
    #[serde(default)]
    pub receiver: Address,
    #[serde(default)]
    pub maker_traits: MakerTraits,
    /// Extension bytes of the order as first signed, usually empty.
    #[serde(default, with = "crate::serde_util::hex_bytes")]
    pub original_extension: Vec<u8>,
}

impl OrderParameters {
    /// Terms for an order whose initial salt is its commitment.
    pub fn new(
        maker: Address,
        maker_asset: Address,
        taker_asset: Address,
        making_amount: U256,
        taking_amount: U256,
        commitment: Commitment,
    ) -> Self {
        Self {
            maker,
            maker_asset,
            taker_asset,
            making_amount,
            taking_amount,
            commitment,
            original_salt: commitment.as_u256(),
            receiver: Address::zero(),
            maker_traits: MakerTraits::new(),
            original_extension: Vec::new(),
        }
    }

    /// The order exactly as first published: salt = original salt.
    pub fn initial_order(&self) -> LimitOrder {
        LimitOrder {
            salt: self.original_salt,
            maker: self.maker,
            receiver: self.receiver,
            maker_asset: self.maker_asset,
            taker_asset: self.taker_asset,
            making_amount: self.making_amount,
            taking_amount: self.taking_amount,
            maker_traits: self.maker_traits,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_toggle_independently() {
        let t = MakerTraits::new()
            .with_extension(true)
            .with_multiple_fills(true)
            .with_partial_fills(false);
        assert!(t.has_extension());
        assert!(t.allows_multiple_fills());
        assert!(!t.allows_partial_fills());
        assert!(t.0.bit(249) && t.0.bit(254) && t.0.bit(255));

        let t = t.with_extension(false);
        assert!(!t.has_extension());
        assert!(t.allows_multiple_fills());
    }

    #[test]
    fn default_traits_allow_partial_single_fill() {
        let t = MakerTraits::default();
        assert!(t.allows_partial_fills());
        assert!(!t.allows_multiple_fills());
        assert!(!t.has_extension());
        assert_eq!(t.expiration(), 0);
    }

    #[test]
    fn expiration_is_isolated() {
        let t = MakerTraits::new().with_extension(true).with_expiration(1_767_225_600);
        assert_eq!(t.expiration(), 1_767_225_600);
        assert!(t.has_extension());
        assert_eq!(t.with_expiration(0).expiration(), 0);
    }

    #[test]
    fn order_json_uses_decimal_strings() {
        let order = LimitOrder {
            salt: U256::from(42u64),
            maker: Address::repeat_byte(1),
            receiver: Address::zero(),
            maker_asset: Address::repeat_byte(2),
            taker_asset: Address::repeat_byte(3),
            making_amount: U256::from(1_000_000_000_000_000_000u64),
            taking_amount: U256::from(3_000_000_000u64),
            maker_traits: MakerTraits::new().with_extension(true),
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["salt"], "42");
        assert_eq!(json["takingAmount"], "3000000000");
        assert!(json["makerTraits"].as_str().unwrap().len() > 70);
        let back: LimitOrder = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }

    #[test]
    fn parameters_default_optional_fields() {
        let c = crate::zkp::commitment::commit(U256::one(), U256::one(), U256::one()).unwrap();
        let json = serde_json::json!({
            "maker": format!("{:?}", Address::repeat_byte(1)),
            "makerAsset": format!("{:?}", Address::repeat_byte(2)),
            "takerAsset": format!("{:?}", Address::repeat_byte(3)),
            "makingAmount": "1",
            "takingAmount": "2",
            "commitment": c.to_string(),
            "originalSalt": c.to_string(),
        });
        let p: OrderParameters = serde_json::from_value(json).unwrap();
        assert_eq!(p.receiver, Address::zero());
        assert!(p.original_extension.is_empty());
        assert_eq!(p.initial_order().salt, c.as_u256());
    }
}
