//! Typed inbound requests.
//!
//! Requests arrive as JSON with string-encoded numbers and addresses. Each
//! one is parsed field by field into typed values before any hashing or
//! proving, and every bad field is reported in the same error.

use ethers_core::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

use super::registry::Registration;
use crate::config::MAX_SCALAR;
use crate::error::{FieldCheck, RequestError};
use crate::order::{MakerTraits, OrderParameters};
use crate::serde_util::parse_u256;
use crate::zkp::{Commitment, SecretParameters};

/// A taker asking to fill a registered order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillRequest {
    pub order_hash: String,
    pub fill_amount: String,
}

/// A [`FillRequest`] after validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidFill {
    pub order_hash: H256,
    pub fill_amount: U256,
}

impl FillRequest {
    pub fn new(order_hash: H256, fill_amount: U256) -> Self {
        Self {
            order_hash: format!("{:#x}", order_hash),
            fill_amount: fill_amount.to_string(),
        }
    }

    pub fn validate(&self) -> Result<ValidFill, RequestError> {
        let mut check = FieldCheck::new();
        let order_hash = check.take("orderHash", parse_hash(&self.order_hash));
        let fill_amount = check.take("fillAmount", parse_amount(&self.fill_amount));

        let valid = order_hash.zip(fill_amount).map(|(order_hash, fill_amount)| ValidFill {
            order_hash,
            fill_amount,
        });
        check.finish_with(valid)
    }
}

/// A maker registering an order and the opening of its commitment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterOrderRequest {
    pub commitment: String,
    pub maker: String,
    pub maker_asset: String,
    pub taker_asset: String,
    pub making_amount: String,
    pub taking_amount: String,
    pub original_salt: Option<String>,
    pub receiver: Option<String>,
    pub maker_traits: Option<String>,
    pub original_extension: Option<String>,
    pub secret_price: String,
    pub secret_amount: String,
    pub nonce: String,
    pub maker_identity: String,
    pub order_hash: Option<String>,
}

impl RegisterOrderRequest {
    /// Parse into a [`Registration`]. Range and commitment checks on the
    /// secrets happen at registration.
    pub fn validate(&self) -> Result<Registration, RequestError> {
        let mut check = FieldCheck::new();

        let commitment = check.take("commitment", self.commitment.parse::<Commitment>());
        let maker = check.take("maker", parse_address(&self.maker));
        let maker_asset = check.take("makerAsset", parse_address(&self.maker_asset));
        let taker_asset = check.take("takerAsset", parse_address(&self.taker_asset));
        let making_amount = check.take("makingAmount", parse_positive(&self.making_amount));
        let taking_amount = check.take("takingAmount", parse_positive(&self.taking_amount));
        let original_salt = self
            .original_salt
            .as_deref()
            .and_then(|raw| check.take("originalSalt", parse_u256(raw)));
        let receiver = self
            .receiver
            .as_deref()
            .and_then(|raw| check.take("receiver", parse_address(raw)));
        let maker_traits = self
            .maker_traits
            .as_deref()
            .and_then(|raw| check.take("makerTraits", parse_u256(raw)));
        let original_extension = self
            .original_extension
            .as_deref()
            .and_then(|raw| check.take("originalExtension", parse_hex(raw)));
        let secret_price = check.take("secretPrice", parse_u256(&self.secret_price));
        let secret_amount = check.take("secretAmount", parse_u256(&self.secret_amount));
        let nonce = check.take("nonce", parse_u256(&self.nonce));
        let maker_identity = check.take("makerIdentity", parse_address(&self.maker_identity));
        let order_hash = self
            .order_hash
            .as_deref()
            .and_then(|raw| check.take("orderHash", parse_hash(raw)));

        if let (Some(a), Some(b)) = (maker_asset, taker_asset) {
            if a == b {
                check.reject("takerAsset", "must differ from makerAsset");
            }
        }

        let parsed = (|| {
            let commitment = commitment?;
            let mut params = OrderParameters::new(
                maker?,
                maker_asset?,
                taker_asset?,
                making_amount?,
                taking_amount?,
                commitment,
            );
            if let Some(salt) = original_salt {
                params.original_salt = salt;
            }
            if let Some(receiver) = receiver {
                params.receiver = receiver;
            }
            if let Some(traits) = maker_traits {
                params.maker_traits = MakerTraits(traits);
            }
            if let Some(ext) = original_extension {
                params.original_extension = ext;
            }
            Some(Registration {
                commitment,
                params,
                secrets: SecretParameters {
                    secret_price: secret_price?,
                    secret_amount: secret_amount?,
                    nonce: nonce?,
                    maker_identity: maker_identity?,
                },
                order_hash,
            })
        })();

        check.finish_with(parsed)
    }
}

// ---------------------------------------------------------------------------
// Field parsers
// ---------------------------------------------------------------------------

fn strip_hex(raw: &str) -> Result<&str, String> {
    let s = raw.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .ok_or_else(|| "must be 0x-prefixed hex".to_string())
}

fn parse_hash(raw: &str) -> Result<H256, String> {
    let hex_part = strip_hex(raw)?;
    if hex_part.len() != 64 {
        return Err(format!("must be 32 bytes, got {} hex digits", hex_part.len()));
    }
    let bytes = hex::decode(hex_part).map_err(|e| e.to_string())?;
    Ok(H256::from_slice(&bytes))
}

fn parse_address(raw: &str) -> Result<Address, String> {
    let hex_part = strip_hex(raw)?;
    if hex_part.len() != 40 {
        return Err(format!("must be 20 bytes, got {} hex digits", hex_part.len()));
    }
    let bytes = hex::decode(hex_part).map_err(|e| e.to_string())?;
    Ok(Address::from_slice(&bytes))
}

fn parse_hex(raw: &str) -> Result<Vec<u8>, String> {
    let trimmed = raw.trim();
    let hex_part = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    hex::decode(hex_part).map_err(|e| e.to_string())
}

fn parse_positive(raw: &str) -> Result<U256, String> {
    let value = parse_u256(raw)?;
    if value.is_zero() {
        return Err("must be positive".to_string());
    }
    Ok(value)
}

/// Fill amounts feed the circuit, so they share the scalar bounds.
fn parse_amount(raw: &str) -> Result<U256, String> {
    let value = parse_positive(raw)?;
    if value > U256::from(MAX_SCALAR) {
        return Err(format!("must be at most {}", MAX_SCALAR));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zkp::commitment::commit;

    fn register_request() -> RegisterOrderRequest {
        let c = commit(
            U256::from(3_000_000_000u64),
            U256::from(3_000_000_000u64),
            U256::from(123_456_789u64),
        )
        .unwrap();
        RegisterOrderRequest {
            commitment: c.to_string(),
            maker: format!("{:#x}", Address::repeat_byte(0x11)),
            maker_asset: format!("{:#x}", Address::repeat_byte(0x22)),
            taker_asset: format!("{:#x}", Address::repeat_byte(0x33)),
            making_amount: "1000000000000000000".into(),
            taking_amount: "3000000000".into(),
            secret_price: "3000000000".into(),
            secret_amount: "3000000000".into(),
            nonce: "123456789".into(),
            maker_identity: format!("{:#x}", Address::repeat_byte(0x11)),
            order_hash: Some(format!("{:#x}", H256::repeat_byte(0xAB))),
            ..RegisterOrderRequest::default()
        }
    }

    #[test]
    fn fill_request_parses() {
        let req = FillRequest::new(H256::repeat_byte(0xAB), U256::from(3_200_000_000u64));
        let valid = req.validate().unwrap();
        assert_eq!(valid.order_hash, H256::repeat_byte(0xAB));
        assert_eq!(valid.fill_amount, U256::from(3_200_000_000u64));
    }

    #[test]
    fn fill_request_reports_both_fields() {
        let req = FillRequest {
            order_hash: "0x1234".into(),
            fill_amount: "-5".into(),
        };
        let err = req.validate().unwrap_err();
        let fields: Vec<_> = err.fields.iter().map(|f| f.field).collect();
        assert_eq!(fields, vec!["orderHash", "fillAmount"]);
    }

    #[test]
    fn fill_amount_bounds() {
        let hash = format!("{:#x}", H256::zero());
        for bad in ["0", "18446744073709551616", ""] {
            let req = FillRequest {
                order_hash: hash.clone(),
                fill_amount: bad.into(),
            };
            assert!(req.validate().is_err(), "{bad} accepted");
        }
        let req = FillRequest {
            order_hash: hash,
            fill_amount: "18446744073709551615".into(),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn fill_request_deserializes_camel_case() {
        let req: FillRequest =
            serde_json::from_str(r#"{"orderHash":"0xab","fillAmount":"1"}"#).unwrap();
        assert_eq!(req.order_hash, "0xab");
    }

    #[test]
    fn register_request_builds_registration() {
        let reg = register_request().validate().unwrap();
        assert_eq!(reg.params.commitment, reg.commitment);
        assert_eq!(reg.params.original_salt, reg.commitment.as_u256());
        assert_eq!(reg.secrets.nonce, U256::from(123_456_789u64));
        assert_eq!(reg.order_hash, Some(H256::repeat_byte(0xAB)));
    }

    #[test]
    fn register_request_optional_fields() {
        let req = RegisterOrderRequest {
            original_salt: Some("0x10".into()),
            original_extension: Some("0xdead".into()),
            maker_traits: Some("1".into()),
            order_hash: None,
            ..register_request()
        };
        let reg = req.validate().unwrap();
        assert_eq!(reg.params.original_salt, U256::from(16u64));
        assert_eq!(reg.params.original_extension, vec![0xde, 0xad]);
        assert_eq!(reg.params.maker_traits, MakerTraits(U256::one()));
        assert_eq!(reg.order_hash, None);
    }

    #[test]
    fn register_request_collects_every_error() {
        let req = RegisterOrderRequest {
            commitment: "not a number".into(),
            maker: "0x11".into(),
            taker_asset: format!("{:#x}", Address::repeat_byte(0x22)),
            making_amount: "0".into(),
            nonce: "".into(),
            ..register_request()
        };
        let err = req.validate().unwrap_err();
        let fields: Vec<_> = err.fields.iter().map(|f| f.field).collect();
        assert_eq!(
            fields,
            vec!["commitment", "maker", "makingAmount", "nonce", "takerAsset"]
        );
    }

    #[test]
    fn same_assets_rejected_even_when_every_field_parses() {
        let base = register_request();
        let req = RegisterOrderRequest {
            taker_asset: base.maker_asset.clone(),
            ..base
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err.fields.len(), 1);
        assert_eq!(err.fields[0].field, "takerAsset");
    }
}
