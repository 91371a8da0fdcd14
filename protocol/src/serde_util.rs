//! Serde helpers for 256-bit integers.
//!
//! Token amounts and field elements travel as decimal strings (the format
//! wallets and snarkjs emit). Deserialisation also accepts `0x` hex strings
//! and plain JSON integers.

use ethers_core::types::U256;
use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

/// Parse a decimal or `0x`-prefixed hex string into a [`U256`].
pub fn parse_u256(raw: &str) -> Result<U256, String> {
    let s = raw.trim();
    if s.is_empty() {
        return Err("empty integer string".to_string());
    }
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        if hex.is_empty() || hex.len() > 64 {
            return Err(format!("invalid hex integer '{}'", s));
        }
        return U256::from_str_radix(hex, 16).map_err(|e| format!("invalid hex integer: {}", e));
    }
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("invalid decimal integer '{}'", s));
    }
    U256::from_dec_str(s).map_err(|e| format!("invalid decimal integer: {}", e))
}

/// `#[serde(with = "u256_dec")]` for `U256` fields.
pub mod u256_dec {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        deserializer.deserialize_any(U256Visitor)
    }
}

/// `#[serde(with = "hex_bytes")]` for `Vec<u8>` fields, `0x`-prefixed.
pub mod hex_bytes {
    use super::*;
    use serde::Deserialize;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(value)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let stripped = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(stripped).map_err(de::Error::custom)
    }
}

struct U256Visitor;

impl<'de> Visitor<'de> for U256Visitor {
    type Value = U256;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a decimal string, 0x-prefixed hex string or unsigned integer")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<U256, E> {
        Ok(U256::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<U256, E> {
        u64::try_from(v)
            .map(U256::from)
            .map_err(|_| E::custom("negative integer"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<U256, E> {
        parse_u256(v).map_err(E::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Amount {
        #[serde(with = "u256_dec")]
        value: U256,
    }

    #[test]
    fn decimal_round_trip() {
        let a = Amount {
            value: U256::from(3_000_000_000u64),
        };
        let json = serde_json::to_string(&a).unwrap();
        assert_eq!(json, r#"{"value":"3000000000"}"#);
        assert_eq!(serde_json::from_str::<Amount>(&json).unwrap(), a);
    }

    #[test]
    fn accepts_hex_and_numbers() {
        let a: Amount = serde_json::from_str(r#"{"value":"0xff"}"#).unwrap();
        assert_eq!(a.value, U256::from(255u64));
        let a: Amount = serde_json::from_str(r#"{"value":42}"#).unwrap();
        assert_eq!(a.value, U256::from(42u64));
    }

    #[test]
    fn rejects_garbage() {
        assert!(serde_json::from_str::<Amount>(r#"{"value":"12abc"}"#).is_err());
        assert!(serde_json::from_str::<Amount>(r#"{"value":"-5"}"#).is_err());
        assert!(serde_json::from_str::<Amount>(r#"{"value":-5}"#).is_err());
        assert!(parse_u256("").is_err());
        assert!(parse_u256("0x").is_err());
    }
}
