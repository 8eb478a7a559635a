//! The commit-reveal scheme binding a player to a play before the
//! counterparty answers.
//!
//! A commits to `hash(play, salt)` in her `Propose`; B echoes the commitment
//! in his `Accept` together with his own open play; A then opens the
//! commitment in her `Reveal`. The salt is single-use and high-entropy, so
//! the commitment leaks nothing about the play.

use crate::position::Play;
use blake2::{Blake2b512, Digest};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display, Formatter};

/// A single-use 32-byte blinding value for one commitment.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Salt(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    [u8; 32],
);

impl Salt {
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Salt(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Salt(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for Salt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", hex::encode(self.0))
    }
}

/// The 32-byte commitment to a (play, salt) pair.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCommit(
    #[serde(serialize_with = "crate::helpers::to_hex", deserialize_with = "crate::helpers::array_from_hex")]
    [u8; 32],
);

impl PreCommit {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        PreCommit(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Debug for PreCommit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PreCommit({})", hex::encode(self.0))
    }
}

impl Display for PreCommit {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Compute the commitment for a play under the given salt.
///
/// Blake2b-512 over a domain separator, the play byte, and the salt,
/// truncated to 32 bytes. Deterministic: a `Reveal` is checked by
/// recomputing this and comparing with the round's `pre_commit`.
pub fn hash_commitment(play: Play, salt: &Salt) -> PreCommit {
    let mut hasher = Blake2b512::new();
    hasher.update(b"Rally commit v1");
    hasher.update([play.as_u8()]);
    hasher.update(salt.as_bytes());
    let out = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&out[..32]);
    PreCommit(bytes)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn deterministic() {
        let salt = Salt::from_bytes([7u8; 32]);
        assert_eq!(hash_commitment(Play::Rock, &salt), hash_commitment(Play::Rock, &salt));
    }

    #[test]
    fn binds_play_and_salt() {
        let salt = Salt::from_bytes([7u8; 32]);
        let other_salt = Salt::from_bytes([8u8; 32]);
        let commit = hash_commitment(Play::Rock, &salt);
        assert_ne!(hash_commitment(Play::Paper, &salt), commit);
        assert_ne!(hash_commitment(Play::Scissors, &salt), commit);
        assert_ne!(hash_commitment(Play::Rock, &other_salt), commit);
    }

    #[test]
    fn random_salts_differ() {
        let mut rng = rand::rng();
        let a = Salt::random(&mut rng);
        let b = Salt::random(&mut rng);
        assert_ne!(a, b);
    }
}
