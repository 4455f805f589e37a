//! Heritable genomes for creatures: a sex plus a vector of trait loci in
//! `[0, 1]`. All randomness flows through a caller-supplied generator so
//! seeded worlds stay reproducible.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Chance that an inherited locus mutates.
pub const MUTATION_CHANCE: f64 = 0.2;
/// Largest absolute shift a mutation can apply to a locus value.
pub const MAX_MUTATION_AMOUNT: f32 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    #[must_use]
    pub const fn opposite(self) -> Sex {
        match self {
            Sex::Male => Sex::Female,
            Sex::Female => Sex::Male,
        }
    }
}

/// A genome. Loci are interpreted by the species that carries them; the
/// genome itself only guarantees values stay in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genes {
    pub sex: Sex,
    pub values: Vec<f32>,
}

impl Genes {
    /// Uniform random genome with `count` loci and a fair-coin sex.
    pub fn random(count: usize, rng: &mut impl Rng) -> Self {
        let values = (0..count).map(|_| rng.random::<f32>()).collect();
        Self {
            sex: random_sex(rng),
            values,
        }
    }

    /// Offspring genome: each locus is copied from either parent with equal
    /// probability, then mutated with probability [`MUTATION_CHANCE`] by up
    /// to [`MAX_MUTATION_AMOUNT`] in either direction, clamped to `[0, 1]`.
    /// Sex is re-rolled. Parents with different locus counts produce the
    /// shorter genome.
    pub fn inherited(a: &Genes, b: &Genes, rng: &mut impl Rng) -> Self {
        let values = a
            .values
            .iter()
            .zip(&b.values)
            .map(|(&from_a, &from_b)| {
                let mut value = if rng.random_bool(0.5) { from_a } else { from_b };
                if rng.random_bool(MUTATION_CHANCE) {
                    let shift = (rng.random::<f32>() * 2.0 - 1.0) * MAX_MUTATION_AMOUNT;
                    value = (value + shift).clamp(0.0, 1.0);
                }
                value
            })
            .collect();
        Self {
            sex: random_sex(rng),
            values,
        }
    }

    #[must_use]
    pub fn locus(&self, index: usize) -> Option<f32> {
        self.values.get(index).copied()
    }
}

fn random_sex(rng: &mut impl Rng) -> Sex {
    if rng.random_bool(0.5) {
        Sex::Male
    } else {
        Sex::Female
    }
}
