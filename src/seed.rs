//! Per-document seeding.
//!
//! A document's noise depends only on its row identifier and the project
//! key, so re-rendering one edited row reproduces the earlier run exactly.

use crate::data::DataRow;
use crate::types::RenderRng;
use rand::SeedableRng;
use sha2::{Digest, Sha256};

/// String hashed to seed a row's generator.
pub fn seed_source(row: &DataRow, row_index: usize, project_key: &str) -> String {
    match row.id() {
        Some(id) => format!("{id}_{project_key}"),
        None => format!("row_{row_index}_{project_key}"),
    }
}

/// 32-bit seed: the leading 128 bits of the SHA-256 digest, reduced mod 2^32.
pub fn seed_for_row(row: &DataRow, row_index: usize, project_key: &str) -> u32 {
    hash_seed_source(&seed_source(row, row_index, project_key))
}

pub fn hash_seed_source(source: &str) -> u32 {
    let digest = Sha256::digest(source.as_bytes());
    let mut head = [0u8; 16];
    head.copy_from_slice(&digest[..16]);
    (u128::from_be_bytes(head) % (1u128 << 32)) as u32
}

pub fn rng_for_seed(seed: u32) -> RenderRng {
    RenderRng::seed_from_u64(seed as u64)
}
