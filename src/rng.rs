//! Seedable Noise RNG
//!
//! Noise buffers draw their white samples from a Xorshift128+ generator. It
//! implements `rand`'s `RngCore`/`SeedableRng`, so the noise colorers are
//! generic over any `rand::Rng` and tests can swap in a fixed seed.
//!
//! Without an explicit seed the generator is seeded from the host: the
//! system clock natively, `Math.random()` in the browser.

use rand::{Error, RngCore, SeedableRng};

/// Xorshift128+ generator.
///
/// Fast, period 2^128 - 1, more than good enough for audio noise.
#[derive(Debug, Clone, Copy)]
pub struct NoiseRng {
    s0: u64,
    s1: u64,
}

impl NoiseRng {
    /// Create a new RNG with the given state words.
    ///
    /// An all-zero state is replaced by a valid one.
    #[inline]
    pub const fn new(s0: u64, s1: u64) -> Self {
        let s0 = if s0 == 0 && s1 == 0 { 1 } else { s0 };
        Self { s0, s1 }
    }

    /// Derive both state words from one seed
    pub fn from_u64_seed(seed: u64) -> Self {
        let s0 = splitmix64(seed);
        let s1 = splitmix64(seed.wrapping_add(0x9e3779b97f4a7c15));
        Self::new(s0, s1)
    }

    /// Seed from whatever entropy the host offers.
    pub fn from_host_entropy() -> Self {
        Self::from_u64_seed(host_seed())
    }
}

impl RngCore for NoiseRng {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for NoiseRng {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&seed[..8]);
        hi.copy_from_slice(&seed[8..]);
        Self::new(u64::from_le_bytes(lo), u64::from_le_bytes(hi))
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::from_u64_seed(state)
    }
}

impl Default for NoiseRng {
    fn default() -> Self {
        Self::from_host_entropy()
    }
}

/// SplitMix64 finalizer
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

#[cfg(feature = "wasm")]
fn host_seed() -> u64 {
    // SystemTime is unavailable on wasm32-unknown-unknown
    let hi = (js_sys::Math::random() * u32::MAX as f64) as u64;
    let lo = (js_sys::Math::random() * u32::MAX as f64) as u64;
    (hi << 32) | lo
}

#[cfg(not(feature = "wasm"))]
fn host_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}
