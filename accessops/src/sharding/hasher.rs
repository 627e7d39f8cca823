use fnv::FnvHasher;
use serde::{Deserialize, Serialize};
use std::hash::Hasher as _;

/// How element keys are hashed onto the `i32` range space.
///
/// Every node in an instance must agree on the hasher, so it is part
/// of configuration rather than hardwired.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyHasher {
    /// FNV-1a, folded down to 32 bits.
    #[default]
    Fnv,
    /// Keys that are themselves integers hash to their own value.
    /// Non-numeric keys fall back to FNV. Used by tests and data generators.
    Identity,
}

impl KeyHasher {
    pub fn hash(&self, key: &str) -> i32 {
        match self {
            KeyHasher::Fnv => fnv_32(key),
            KeyHasher::Identity => key.parse().unwrap_or_else(|_| fnv_32(key)),
        }
    }
}

fn fnv_32(key: &str) -> i32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    let folded = hasher.finish();
    ((folded >> 32) as u32 ^ folded as u32) as i32
}
