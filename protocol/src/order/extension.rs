//! # Order Extension
//!
//! Extension bytes as the limit-order protocol lays them out:
//!
//! ```text
//! [ offsets: 32 bytes ][ field 0 ][ field 1 ] ... [ field 7 ][ custom data ]
//! ```
//!
//! The offsets word packs eight cumulative `uint32` end offsets (relative
//! to the end of the word); field *i* ends at bits `[32i, 32i + 32)`. An
//! extension with every field empty encodes to zero bytes.
//!
//! The hidden-threshold gate lives in the predicate field:
//!
//! ```text
//! gt(0, arbitraryStaticCall(predicate, checkPredicate(proof)))
//! ```
//!
//! i.e. "static-call the ZK predicate contract with the encoded proof and
//! require a result greater than zero".

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, U256};
use ethers_core::utils::id;

use crate::config::{ARBITRARY_STATIC_CALL_SIGNATURE, GT_SIGNATURE, PREDICATE_CHECK_SIGNATURE};
use crate::error::ErrorCode;

const FIELD_COUNT: usize = 8;
const PREDICATE: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    #[error("extension is {0} bytes, shorter than its 32-byte offsets word")]
    TooShort(usize),

    #[error("extension offsets are not monotonic or exceed the payload")]
    InvalidOffsets,

    #[error("extension field {0} is too large")]
    FieldTooLarge(usize),

    #[error("predicate is not a ZK threshold gate: {0}")]
    NotZkPredicate(String),
}

impl ExtensionError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::RebuildFailed
    }
}

// ---------------------------------------------------------------------------
// Extension
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extension {
    pub maker_asset_suffix: Vec<u8>,
    pub taker_asset_suffix: Vec<u8>,
    pub making_amount_data: Vec<u8>,
    pub taking_amount_data: Vec<u8>,
    pub predicate: Vec<u8>,
    pub maker_permit: Vec<u8>,
    pub pre_interaction: Vec<u8>,
    pub post_interaction: Vec<u8>,
    pub custom_data: Vec<u8>,
}

impl Extension {
    /// An extension whose only field is `predicate`.
    pub fn with_predicate(predicate: Vec<u8>) -> Self {
        Self {
            predicate,
            ..Self::default()
        }
    }

    fn fields(&self) -> [&[u8]; FIELD_COUNT] {
        [
            &self.maker_asset_suffix,
            &self.taker_asset_suffix,
            &self.making_amount_data,
            &self.taking_amount_data,
            &self.predicate,
            &self.maker_permit,
            &self.pre_interaction,
            &self.post_interaction,
        ]
    }

    fn fields_mut(&mut self) -> [&mut Vec<u8>; FIELD_COUNT] {
        [
            &mut self.maker_asset_suffix,
            &mut self.taker_asset_suffix,
            &mut self.making_amount_data,
            &mut self.taking_amount_data,
            &mut self.predicate,
            &mut self.maker_permit,
            &mut self.pre_interaction,
            &mut self.post_interaction,
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|f| f.is_empty()) && self.custom_data.is_empty()
    }

    pub fn encode(&self) -> Result<Vec<u8>, ExtensionError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let mut offsets = U256::zero();
        let mut body = Vec::new();
        for (i, field) in self.fields().iter().enumerate() {
            body.extend_from_slice(field);
            let end = u32::try_from(body.len()).map_err(|_| ExtensionError::FieldTooLarge(i))?;
            offsets = offsets | (U256::from(end) << (32 * i));
        }

        let mut out = Vec::with_capacity(32 + body.len() + self.custom_data.len());
        let mut word = [0u8; 32];
        offsets.to_big_endian(&mut word);
        out.extend_from_slice(&word);
        out.extend_from_slice(&body);
        out.extend_from_slice(&self.custom_data);
        Ok(out)
    }

    /// Parse the predicate field as a ZK threshold gate.
    pub fn zk_predicate(&self) -> Result<ZkPredicate, ExtensionError> {
        ZkPredicate::decode(&self.predicate)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ExtensionError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        if bytes.len() < 32 {
            return Err(ExtensionError::TooShort(bytes.len()));
        }

        let offsets = U256::from_big_endian(&bytes[..32]);
        let payload = &bytes[32..];

        let mut ext = Self::default();
        let mut start = 0usize;
        for (i, slot) in ext.fields_mut().into_iter().enumerate() {
            let end = ((offsets >> (32 * i)).low_u64() & 0xffff_ffff) as usize;
            if end < start || end > payload.len() {
                return Err(ExtensionError::InvalidOffsets);
            }
            *slot = payload[start..end].to_vec();
            start = end;
        }
        ext.custom_data = payload[start..].to_vec();
        Ok(ext)
    }
}

// ---------------------------------------------------------------------------
// ZK predicate
// ---------------------------------------------------------------------------

/// A parsed threshold gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZkPredicate {
    pub predicate_address: Address,
    pub proof: Vec<u8>,
}

impl ZkPredicate {
    pub fn new(predicate_address: Address, proof: Vec<u8>) -> Self {
        Self {
            predicate_address,
            proof,
        }
    }

    /// Predicate-field bytes for this gate.
    pub fn encode(&self) -> Vec<u8> {
        let check = call(
            PREDICATE_CHECK_SIGNATURE,
            &[Token::Bytes(self.proof.clone())],
        );
        let static_call = call(
            ARBITRARY_STATIC_CALL_SIGNATURE,
            &[Token::Address(self.predicate_address), Token::Bytes(check)],
        );
        call(GT_SIGNATURE, &[Token::Uint(U256::zero()), Token::Bytes(static_call)])
    }

    /// Parse predicate-field bytes produced by [`encode`](Self::encode).
    pub fn decode(bytes: &[u8]) -> Result<Self, ExtensionError> {
        let gt = args(GT_SIGNATURE, bytes, &[ParamType::Uint(256), ParamType::Bytes])?;
        if gt[0].clone().into_uint() != Some(U256::zero()) {
            return Err(ExtensionError::NotZkPredicate("gt threshold is not zero".into()));
        }
        let static_call = bytes_arg(&gt[1])?;

        let sc = args(
            ARBITRARY_STATIC_CALL_SIGNATURE,
            &static_call,
            &[ParamType::Address, ParamType::Bytes],
        )?;
        let predicate_address = sc[0]
            .clone()
            .into_address()
            .ok_or_else(|| ExtensionError::NotZkPredicate("missing target".into()))?;
        let check = bytes_arg(&sc[1])?;

        let inner = args(PREDICATE_CHECK_SIGNATURE, &check, &[ParamType::Bytes])?;
        Ok(Self {
            predicate_address,
            proof: bytes_arg(&inner[0])?,
        })
    }
}

/// Build the extension carrying a ZK gate and nothing else.
pub fn zk_extension(predicate_address: Address, encoded_proof: Vec<u8>) -> Extension {
    Extension::with_predicate(ZkPredicate::new(predicate_address, encoded_proof).encode())
}

fn call(signature: &str, tokens: &[Token]) -> Vec<u8> {
    let mut out = id(signature).to_vec();
    out.extend(abi::encode(tokens));
    out
}

fn args(signature: &str, data: &[u8], types: &[ParamType]) -> Result<Vec<Token>, ExtensionError> {
    if data.len() < 4 || data[..4] != id(signature) {
        return Err(ExtensionError::NotZkPredicate(format!(
            "expected a {} call",
            signature
        )));
    }
    abi::decode(types, &data[4..]).map_err(|e| ExtensionError::NotZkPredicate(e.to_string()))
}

fn bytes_arg(token: &Token) -> Result<Vec<u8>, ExtensionError> {
    token
        .clone()
        .into_bytes()
        .ok_or_else(|| ExtensionError::NotZkPredicate("expected bytes argument".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_extension_encodes_to_nothing() {
        assert!(Extension::default().encode().unwrap().is_empty());
        assert_eq!(Extension::decode(&[]).unwrap(), Extension::default());
    }

    #[test]
    fn offsets_are_cumulative_per_field() {
        let ext = Extension {
            maker_asset_suffix: vec![0xAA; 3],
            predicate: vec![0xBB; 5],
            post_interaction: vec![0xCC; 2],
            ..Extension::default()
        };
        let bytes = ext.encode().unwrap();
        assert_eq!(bytes.len(), 32 + 10);

        let offsets = U256::from_big_endian(&bytes[..32]);
        let end = |i: usize| ((offsets >> (32 * i)).low_u64() & 0xffff_ffff) as usize;
        assert_eq!(end(0), 3);
        assert_eq!(end(3), 3);
        assert_eq!(end(4), 8);
        assert_eq!(end(7), 10);

        assert_eq!(Extension::decode(&bytes).unwrap(), ext);
    }

    #[test]
    fn custom_data_trails_the_fields() {
        let ext = Extension {
            predicate: vec![1, 2],
            custom_data: vec![9, 9, 9],
            ..Extension::default()
        };
        let decoded = Extension::decode(&ext.encode().unwrap()).unwrap();
        assert_eq!(decoded.custom_data, vec![9, 9, 9]);
        assert_eq!(decoded.predicate, vec![1, 2]);
    }

    #[test]
    fn malformed_offsets_rejected() {
        assert_eq!(Extension::decode(&[0u8; 10]), Err(ExtensionError::TooShort(10)));

        let mut word = [0u8; 32];
        U256::from(100u64).to_big_endian(&mut word);
        assert_eq!(Extension::decode(&word), Err(ExtensionError::InvalidOffsets));
    }

    #[test]
    fn zk_predicate_round_trip() {
        let target = Address::repeat_byte(0x42);
        let proof = vec![7u8; 416];
        let ext = zk_extension(target, proof.clone());
        let bytes = ext.encode().unwrap();

        let decoded = Extension::decode(&bytes).unwrap();
        let gate = decoded.zk_predicate().unwrap();
        assert_eq!(gate.predicate_address, target);
        assert_eq!(gate.proof, proof);
    }

    #[test]
    fn predicate_starts_with_gt_selector() {
        let bytes = ZkPredicate::new(Address::zero(), vec![1]).encode();
        assert_eq!(&bytes[..4], &id(GT_SIGNATURE));
    }

    #[test]
    fn foreign_predicate_rejected() {
        let err = ZkPredicate::decode(&[0xde, 0xad, 0xbe, 0xef]).unwrap_err();
        assert!(matches!(err, ExtensionError::NotZkPredicate(_)));
        assert_eq!(err.code(), ErrorCode::RebuildFailed);
    }
}
