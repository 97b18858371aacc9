//! CDI-seeded BLAKE2s stream generator (spec.md §3 "RNG state", §4.1).
//!
//! The 16-word (512-bit) state is seeded low-half from the CDI and
//! high-half from the TRNG; each 16-byte output block consumes one
//! BLAKE2s-256 digest of the full state, after which the digest is folded
//! back into the low half and a step counter is mixed into the last word.
//! Every 1000 blocks the high half is reseeded from the TRNG.

use crate::cdi::Cdi;
use blake2::{Blake2s256, Digest};
use thiserror::Error;

/// Draws fresh entropy words from the hardware TRNG. Treated as a
/// low-rate entropy source — the DRBG construction here is what survives
/// TRNG stalls between reseeds.
pub trait TrngSource {
    fn next_word(&mut self) -> u32;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RngError {
    #[error("generate() length {0} is not a multiple of 16")]
    BadLength(usize),
}

const RESEED_INTERVAL: u32 = 1000;

pub struct Drbg {
    words: [u32; 16],
    counter: u32,
}

impl Drbg {
    pub fn init(cdi: &Cdi, trng: &mut impl TrngSource) -> Self {
        let mut words = [0u32; 16];
        for (i, chunk) in cdi.as_bytes().chunks_exact(4).enumerate() {
            words[i] = u32::from_be_bytes(chunk.try_into().unwrap());
        }
        for w in words.iter_mut().skip(8) {
            *w = trng.next_word();
        }
        Self { words, counter: 0 }
    }

    fn state_bytes(&self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        for (i, word) in self.words.iter().enumerate() {
            buf[i * 4..i * 4 + 4].copy_from_slice(&word.to_be_bytes());
        }
        buf
    }

    fn update(&mut self, digest: &[u8; 32], trng: &mut impl TrngSource) {
        for (i, chunk) in digest.chunks_exact(4).enumerate() {
            self.words[i] = u32::from_be_bytes(chunk.try_into().unwrap());
        }
        self.counter += 1;
        self.words[15] = self.words[15].wrapping_add(self.counter);
        if self.counter == RESEED_INTERVAL {
            for w in self.words.iter_mut().skip(8) {
                *w = trng.next_word();
            }
            self.counter = 0;
        }
    }

    /// Fill `out` with uniform bytes. `out.len()` must be a multiple of 16.
    pub fn generate(&mut self, out: &mut [u8], trng: &mut impl TrngSource) -> Result<(), RngError> {
        if out.len() % 16 != 0 {
            return Err(RngError::BadLength(out.len()));
        }
        for block in out.chunks_exact_mut(16) {
            let mut hasher = Blake2s256::new();
            hasher.update(self.state_bytes());
            let digest: [u8; 32] = hasher.finalize().into();
            block.copy_from_slice(&digest[..16]);
            self.update(&digest, trng);
        }
        Ok(())
    }

    /// Convenience for the common case of drawing a single 32-byte nonce.
    pub fn generate_nonce(&mut self, trng: &mut impl TrngSource) -> [u8; 32] {
        let mut out = [0u8; 32];
        self.generate(&mut out, trng).expect("32 is a multiple of 16");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingTrng(u32);
    impl TrngSource for CountingTrng {
        fn next_word(&mut self) -> u32 {
            self.0 = self.0.wrapping_add(1);
            self.0
        }
    }

    #[test]
    fn rejects_non_multiple_of_16() {
        let cdi = Cdi::new([1u8; 32]);
        let mut trng = CountingTrng(0);
        let mut drbg = Drbg::init(&cdi, &mut trng);
        let mut out = [0u8; 15];
        assert_eq!(drbg.generate(&mut out, &mut trng), Err(RngError::BadLength(15)));
    }

    #[test]
    fn deterministic_given_same_cdi_and_trng_sequence() {
        let cdi = Cdi::new([9u8; 32]);
        let mut trng_a = CountingTrng(0);
        let mut drbg_a = Drbg::init(&cdi, &mut trng_a);
        let mut out_a = [0u8; 32];
        drbg_a.generate(&mut out_a, &mut trng_a).unwrap();

        let mut trng_b = CountingTrng(0);
        let mut drbg_b = Drbg::init(&cdi, &mut trng_b);
        let mut out_b = [0u8; 32];
        drbg_b.generate(&mut out_b, &mut trng_b).unwrap();

        assert_eq!(out_a, out_b);
    }

    #[test]
    fn reseeds_after_1000_blocks() {
        let cdi = Cdi::new([3u8; 32]);
        let mut trng = CountingTrng(0);
        let mut drbg = Drbg::init(&cdi, &mut trng);
        let high_before = drbg.words[8..].to_vec();
        let mut scratch = [0u8; 16];
        for _ in 0..RESEED_INTERVAL {
            drbg.generate(&mut scratch, &mut trng).unwrap();
        }
        assert_ne!(drbg.words[8..].to_vec(), high_before);
        assert_eq!(drbg.counter, 0);
    }

    #[test]
    fn successive_outputs_differ() {
        let cdi = Cdi::new([5u8; 32]);
        let mut trng = CountingTrng(0);
        let mut drbg = Drbg::init(&cdi, &mut trng);
        let a = drbg.generate_nonce(&mut trng);
        let b = drbg.generate_nonce(&mut trng);
        assert_ne!(a, b);
    }
}
