use std::collections::HashSet;

use crate::error::{MmvError, MmvResult};

/// Identifiers must stay in the non-negative `i32` range; the on-disk records
/// store them in fields a collector reads as signed.
const ID_MASK: u32 = i32::MAX as u32;

/// Assigns small stable integer ids to named entities within one writer.
///
/// Ids are derived from the name so that repeated runs over the same entity
/// set pick the same ids, which lets a collector correlate series across
/// process restarts. Collisions fall back to linear probing.
#[derive(Debug, Default, Clone)]
pub struct IdentifierSource;

impl IdentifierSource {
    pub fn new() -> Self {
        Self
    }

    /// Compute an id for `name` that is not present in `used_ids`.
    ///
    /// Pure: the caller is responsible for recording the returned id.
    pub fn calculate_id(&self, name: &str, used_ids: &HashSet<u32>) -> MmvResult<u32> {
        if used_ids.len() > ID_MASK as usize {
            return Err(MmvError::Allocation(format!(
                "no identifiers left for {name:?}"
            )));
        }
        let seed = name_hash(name) & ID_MASK;
        let mut candidate = seed;
        loop {
            if !used_ids.contains(&candidate) {
                return Ok(candidate);
            }
            candidate = (candidate + 1) & ID_MASK;
            if candidate == seed {
                return Err(MmvError::Allocation(format!(
                    "no identifiers left for {name:?}"
                )));
            }
        }
    }
}

/// 31-polynomial string hash, matching the ids historical exporters assigned
/// for the same names.
fn name_hash(name: &str) -> u32 {
    let mut hash = 0i32;
    for ch in name.chars() {
        hash = hash.wrapping_mul(31).wrapping_add(ch as i32);
    }
    hash as u32
}
