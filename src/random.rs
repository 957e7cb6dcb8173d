//! Lehmer pseudo-random generator used by `RANDOMIZE`/`RND()`.
//!
//! Deliberately not `rand`: the whole point is bit-for-bit identical
//! output across platforms, using the constants C++11's
//! `minstd_rand0` specifies (<https://en.wikipedia.org/wiki/Lehmer_random_number_generator>).

const MODULUS: u64 = 2_147_483_647;
const MULTIPLIER: u64 = 48_271;
const DEFAULT_SEED: u32 = 19_670_512;

pub struct Lehmer {
    state: u64,
}

impl Default for Lehmer {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

impl Lehmer {
    pub fn new(seed: u32) -> Self {
        let mut state = seed as u64 % MODULUS;
        if state == 0 {
            state = 1;
        }
        Lehmer { state }
    }

    pub fn next(&mut self) -> u32 {
        self.state = (MULTIPLIER * self.state) % MODULUS;
        self.state as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_matches_reference_sequence() {
        let mut rng = Lehmer::default();
        // first value = 48271 * 19670512 mod 2147483647
        assert_eq!(rng.next(), 327512778);
    }

    #[test]
    fn zero_seed_is_sanitised_to_one() {
        let mut rng = Lehmer::new(0);
        assert_eq!(rng.next(), 48271);
    }

    #[test]
    fn seed_equal_to_modulus_wraps_to_zero_then_sanitised() {
        let mut rng = Lehmer::new(MODULUS as u32);
        assert_eq!(rng.next(), 48271);
    }
}
