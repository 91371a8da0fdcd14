//! In-circuit Poseidon over BN254/Fr.
//!
//! Runs the same permutation `light-poseidon` computes natively with its
//! circom parameter set: state `[0, x_1, .., x_n]`, round constants added
//! per round, x^5 S-box on every lane in full rounds and on lane 0 in
//! partial rounds, then the MDS mix. The output is lane 0.
//!
//! Constants are pulled from `light-poseidon` itself so the two sides can
//! never disagree on parameters.

use ark_bn254::Fr;
use ark_r1cs_std::fields::{fp::FpVar, FieldVar};
use ark_relations::r1cs::SynthesisError;
use light_poseidon::{parameters::bn254_x5::get_poseidon_parameters, PoseidonParameters};

/// Poseidon hash gadget for a fixed number of inputs.
pub struct PoseidonGadget {
    params: PoseidonParameters<Fr>,
}

impl PoseidonGadget {
    /// circomlib-compatible parameters for `nr_inputs` inputs (width `n + 1`).
    pub fn circom(nr_inputs: usize) -> Result<Self, SynthesisError> {
        let width = u8::try_from(nr_inputs + 1).map_err(|_| SynthesisError::Unsatisfiable)?;
        let params =
            get_poseidon_parameters::<Fr>(width).map_err(|_| SynthesisError::Unsatisfiable)?;
        if params.alpha != 5 {
            return Err(SynthesisError::Unsatisfiable);
        }
        Ok(Self { params })
    }

    pub fn width(&self) -> usize {
        self.params.width
    }

    /// Hash `inputs`. The slice length must equal `width - 1`.
    pub fn hash(&self, inputs: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
        let width = self.params.width;
        if inputs.len() + 1 != width {
            return Err(SynthesisError::Unsatisfiable);
        }

        let mut state = Vec::with_capacity(width);
        state.push(FpVar::<Fr>::zero());
        state.extend(inputs.iter().cloned());

        let half_full = self.params.full_rounds / 2;
        let partial = self.params.partial_rounds;
        let total = self.params.full_rounds + partial;

        for round in 0..total {
            for (i, lane) in state.iter_mut().enumerate() {
                *lane += self.params.ark[round * width + i];
            }

            if round < half_full || round >= half_full + partial {
                for lane in state.iter_mut() {
                    *lane = sbox(lane)?;
                }
            } else {
                state[0] = sbox(&state[0])?;
            }

            state = self.mix(&state);
        }

        Ok(state.swap_remove(0))
    }

    fn mix(&self, state: &[FpVar<Fr>]) -> Vec<FpVar<Fr>> {
        self.params
            .mds
            .iter()
            .map(|row| {
                row.iter()
                    .zip(state)
                    .fold(FpVar::<Fr>::zero(), |acc, (m, lane)| acc + lane * *m)
            })
            .collect()
    }
}

/// x^5: two squarings and one multiplication (3 constraints).
fn sbox(x: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let x2 = x.square()?;
    let x4 = x2.square()?;
    Ok(x4 * x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_r1cs_std::{alloc::AllocVar, R1CSVar};
    use ark_relations::r1cs::ConstraintSystem;
    use light_poseidon::{Poseidon, PoseidonHasher};

    fn native(inputs: &[Fr]) -> Fr {
        Poseidon::<Fr>::new_circom(inputs.len())
            .unwrap()
            .hash(inputs)
            .unwrap()
    }

    #[test]
    fn gadget_matches_native_on_witnesses() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let inputs = [
            Fr::from(3_000_000_000u64),
            Fr::from(3_000_000_000u64),
            Fr::from(123_456_789u64),
        ];
        let vars: Vec<_> = inputs
            .iter()
            .map(|x| FpVar::new_witness(cs.clone(), || Ok(*x)).unwrap())
            .collect();

        let gadget = PoseidonGadget::circom(3).unwrap();
        assert_eq!(gadget.width(), 4);
        let out = gadget.hash(&vars).unwrap();

        assert_eq!(out.value().unwrap(), native(&inputs));
        assert!(cs.is_satisfied().unwrap());
        assert!(cs.num_constraints() > 0);
    }

    #[test]
    fn gadget_matches_native_on_constants() {
        let inputs = [Fr::from(1u64), Fr::from(2u64)];
        let vars: Vec<_> = inputs.iter().map(|x| FpVar::constant(*x)).collect();
        let out = PoseidonGadget::circom(2).unwrap().hash(&vars).unwrap();
        assert_eq!(out.value().unwrap(), native(&inputs));
    }

    #[test]
    fn wrong_arity_rejected() {
        let gadget = PoseidonGadget::circom(3).unwrap();
        let vars = vec![FpVar::constant(Fr::from(1u64)); 2];
        assert!(gadget.hash(&vars).is_err());
    }
}
