// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A deterministic generator keyed by the secret being split

use crate::RootKey;
use hkdf::Hkdf;
use rand::{CryptoRng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha3::Sha3_256;
use zeroize::Zeroizing;

// Domain separation for the HKDF-Extract step
const SALT: &[u8] = b"rootkey-share-rng-v1";

// The "info" string is context to bind the stream to its purpose
const INFO: &[u8] = b"shamir-polynomial-coefficients";

/// Source of the random polynomial coefficients used when splitting a
/// [`RootKey`].
///
/// The stream is a ChaCha20 keystream whose seed is derived from the root key
/// with HKDF-SHA3-256. Splitting the same key twice therefore produces the same
/// shares, which lets the storage service re-derive the exact shares the
/// holders received when an operator asks for a recovery export.
///
/// The coefficients are only as secret as the root key itself, which is all
/// the Shamir scheme requires.
pub struct ShareRng {
    inner: ChaCha20Rng,
}

impl ShareRng {
    pub fn keyed(key: &RootKey) -> ShareRng {
        let ikm = key.to_bytes();
        let hk = Hkdf::<Sha3_256>::new(Some(SALT), ikm.as_ref());
        let mut seed = Zeroizing::new([0u8; 32]);

        // Unwrap is safe because 32 bytes is well under the HKDF output limit
        hk.expand(INFO, seed.as_mut()).unwrap();
        ShareRng { inner: ChaCha20Rng::from_seed(*seed) }
    }
}

impl RngCore for ShareRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}

impl CryptoRng for ShareRng {}
