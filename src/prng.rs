//! # Seeded Generator
//!
//! Reproducible stream of floats in `[0, 1)` keyed by a seed string.
//!
//! The seed is hashed with SHA-256 and the 32 byte digest is split into four
//! big-endian `u32` words. Those words are the state of an sfc32 generator
//! (small fast counter, 128 bits of state).
//!
//! Not suitable for anything secret. The only guarantees are:
//! - same seed, same sequence
//! - spread good enough for shuffling listings
use sha2::{Digest, Sha256};

const TWO_POW_32: f64 = 4_294_967_296.0;

#[derive(Clone, Debug)]
pub struct Prng {
    a: u32,
    b: u32,
    c: u32,
    d: u32,
}

impl Prng {
    pub fn new(seed: &str) -> Self {
        Self::from_digest(Sha256::digest(seed.as_bytes()).into())
    }

    pub fn from_digest(digest: [u8; 32]) -> Self {
        let word = |i: usize| {
            u32::from_be_bytes([
                digest[i * 4],
                digest[i * 4 + 1],
                digest[i * 4 + 2],
                digest[i * 4 + 3],
            ])
        };

        Self {
            a: word(0),
            b: word(1),
            c: word(2),
            d: word(3),
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let t = self.a.wrapping_add(self.b).wrapping_add(self.d);
        self.d = self.d.wrapping_add(1);
        self.a = self.b ^ (self.b >> 9);
        self.b = self.c.wrapping_add(self.c << 3);
        self.c = self.c.rotate_left(21).wrapping_add(t);

        t
    }

    /// Next value as `u32 / 2^32`, always `< 1.0`.
    pub fn next_f64(&mut self) -> f64 {
        f64::from(self.next_u32()) / TWO_POW_32
    }
}
