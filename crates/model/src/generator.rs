use num_rational::Ratio;

use rand::distr::{Distribution, SampleString};
use rand::rngs::SmallRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::record::Record;

const FIRST_NAMES: &[&str] = &[
    "Ada", "Brook", "Carmen", "Dmitri", "Elena", "Farid", "Grace", "Hiro", "Ines", "Jonas",
    "Kira", "Luis", "Maya", "Nils", "Olga", "Pavel",
];

const LAST_NAMES: &[&str] = &[
    "Abbott", "Baker", "Chen", "Diaz", "Evans", "Fischer", "Garcia", "Hughes", "Ivanova",
    "Jensen", "Kowalski", "Lopez", "Meyer", "Novak", "Okafor", "Petrov",
];

/// Endless stream of sample employee records.
///
/// Every record carries `id`, `first_name`, `last_name` and `salary`; a
/// fixed fraction of them leaves out `age` so that downstream stages see
/// heterogeneous rows.
pub struct EmployeeGenerator {
    rng: SmallRng,
    emitted: u64,
}

impl EmployeeGenerator {
    pub const FIELDS: &[&str] = &["id", "first_name", "last_name", "age", "salary"];

    const MISSING_AGE: Ratio<u32> = Ratio::new_raw(1, 20);
    const AGE_RANGE: std::ops::RangeInclusive<u64> = 18..=70;
    const SALARY_RANGE: std::ops::RangeInclusive<u64> = 30_000..=150_000;
    const ID_LENGTH: usize = 16;

    pub fn new() -> Self {
        EmployeeGenerator {
            rng: SmallRng::from_os_rng(),
            emitted: 0,
        }
    }

    /// Deterministic generator for benches and tests.
    pub fn with_seed(seed: u64) -> Self {
        EmployeeGenerator {
            rng: SmallRng::seed_from_u64(seed),
            emitted: 0,
        }
    }

    fn random_ratio(&mut self, ratio: Ratio<u32>) -> bool {
        self.rng.random_ratio(*ratio.numer(), *ratio.denom())
    }

    fn pick(&mut self, pool: &'static [&'static str]) -> &'static str {
        pool.choose(&mut self.rng).copied().unwrap_or_default()
    }
}

impl Default for EmployeeGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for EmployeeGenerator {
    type Item = Record;

    fn next(&mut self) -> Option<Self::Item> {
        self.emitted += 1;
        let id = Hexadecimal.sample_string(&mut self.rng, Self::ID_LENGTH);
        let mut record = Record::new()
            .with("id", id)
            .with("first_name", self.pick(FIRST_NAMES))
            .with("last_name", self.pick(LAST_NAMES));
        if !self.random_ratio(Self::MISSING_AGE) {
            record.insert("age", self.rng.random_range(Self::AGE_RANGE));
        }
        record.insert("salary", self.rng.random_range(Self::SALARY_RANGE));
        Some(record)
    }
}

struct Hexadecimal;

impl Distribution<u8> for Hexadecimal {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u8 {
        const HEX_DIGITS_CHARSET: &[u8; 16] = b"0123456789abcdef";

        let var = rng.next_u32() >> (32 - 4);
        HEX_DIGITS_CHARSET[var as usize]
    }
}

impl SampleString for Hexadecimal {
    fn append_string<R: Rng + ?Sized>(&self, rng: &mut R, string: &mut String, len: usize) {
        string.extend(self.sample_iter(rng).take(len).map(char::from));
    }
}
