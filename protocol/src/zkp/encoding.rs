//! Verifier ABI encoding.
//!
//! The on-chain verifier takes
//!
//! ```text
//! abi.encode(uint256[2] a, uint256[2][2] b, uint256[2] c, uint256[5] signals)
//! ```
//!
//! which is 13 static words, 416 bytes. The Solidity pairing precompile
//! expects each Fq2 coordinate of `b` as `[c1, c0]`, the reverse of the
//! prover's native `[c0, c1]`, so both pairs are swapped here and swapped
//! back by [`decode`]. Getting this wrong does not error anywhere; the
//! proof just fails verification on-chain.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::U256;

use super::prover::{ProofArtifact, ProofError};
use crate::config::{ENCODED_PROOF_LEN, PUBLIC_SIGNAL_COUNT};

/// ABI-encode an artifact for the on-chain verifier.
///
/// Rejects artifacts whose `valid` signal is not one: such a proof can
/// never pass the verifier and indicates a circuit-level rejection.
pub fn encode_for_verifier(artifact: &ProofArtifact) -> Result<Vec<u8>, ProofError> {
    if !artifact.is_valid() {
        return Err(ProofError::ConstraintViolation(
            "proof reports valid = 0".to_string(),
        ));
    }

    let b = swap_g2(&artifact.pi_b);
    let tokens = [
        uint_array(&artifact.pi_a),
        Token::FixedArray(vec![uint_array(&b[0]), uint_array(&b[1])]),
        uint_array(&artifact.pi_c),
        uint_array(&artifact.public_signals),
    ];

    let encoded = abi::encode(&tokens);
    debug_assert_eq!(encoded.len(), ENCODED_PROOF_LEN);
    Ok(encoded)
}

/// Inverse of [`encode_for_verifier`]. Used for local verification and
/// debugging. Inputs shorter than 416 bytes are rejected before decoding;
/// trailing bytes are ignored.
pub fn decode(bytes: &[u8]) -> Result<ProofArtifact, ProofError> {
    if bytes.len() < ENCODED_PROOF_LEN {
        return Err(ProofError::MalformedEncoding(format!(
            "expected at least {} bytes, got {}",
            ENCODED_PROOF_LEN,
            bytes.len()
        )));
    }

    let tokens = abi::decode(&layout(), &bytes[..ENCODED_PROOF_LEN])
        .map_err(|e| ProofError::MalformedEncoding(e.to_string()))?;
    let mut tokens = tokens.into_iter();
    let mut next = || {
        tokens
            .next()
            .ok_or_else(|| ProofError::MalformedEncoding("missing proof component".into()))
    };

    let pi_a = words::<2>(next()?)?;
    let b_rows = fixed_array(next()?)?;
    if b_rows.len() != 2 {
        return Err(ProofError::MalformedEncoding("pi_b must have two rows".into()));
    }
    let mut rows = b_rows.into_iter();
    let mut row = || {
        rows.next()
            .ok_or_else(|| ProofError::MalformedEncoding("missing pi_b row".into()))
            .and_then(words::<2>)
    };
    let swapped_b = [row()?, row()?];
    let pi_c = words::<2>(next()?)?;
    let public_signals = words::<PUBLIC_SIGNAL_COUNT>(next()?)?;

    Ok(ProofArtifact {
        pi_a,
        pi_b: swap_g2(&swapped_b),
        pi_c,
        public_signals,
    })
}

fn layout() -> [ParamType; 4] {
    let word = || Box::new(ParamType::Uint(256));
    [
        ParamType::FixedArray(word(), 2),
        ParamType::FixedArray(Box::new(ParamType::FixedArray(word(), 2)), 2),
        ParamType::FixedArray(word(), 2),
        ParamType::FixedArray(word(), PUBLIC_SIGNAL_COUNT),
    ]
}

fn swap_g2(b: &[[U256; 2]; 2]) -> [[U256; 2]; 2] {
    [[b[0][1], b[0][0]], [b[1][1], b[1][0]]]
}

fn uint_array(values: &[U256]) -> Token {
    Token::FixedArray(values.iter().copied().map(Token::Uint).collect())
}

fn fixed_array(token: Token) -> Result<Vec<Token>, ProofError> {
    token
        .into_fixed_array()
        .ok_or_else(|| ProofError::MalformedEncoding("expected a fixed array".into()))
}

fn words<const N: usize>(token: Token) -> Result<[U256; N], ProofError> {
    let items = fixed_array(token)?;
    if items.len() != N {
        return Err(ProofError::MalformedEncoding(format!(
            "expected {} words, got {}",
            N,
            items.len()
        )));
    }
    let mut out = [U256::zero(); N];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item
            .into_uint()
            .ok_or_else(|| ProofError::MalformedEncoding("expected uint256".into()))?;
    }
    Ok(out)
}
