//! Short blob names.
//!
//! Names are cut from a single BLAKE3 hash chain seeded with the current
//! time. Each attempt feeds another counter into the same hasher, so
//! successive candidates differ without re-seeding. The shortest length is
//! tried first and the chain widens one character at a time once every
//! counter at a length collides.

use crate::constants::{MAX_NAME_LENGTH, NAME_ATTEMPTS_PER_LENGTH, NAME_EXTRA_CHARS};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NameError {
    #[error("Invalid name length bounds {min}..{max} (need 1 <= min < max <= {limit})")]
    InvalidBounds { min: usize, max: usize, limit: usize },

    #[error("Name space exhausted for lengths {min}..{max}")]
    Exhausted { min: usize, max: usize },
}

/// True if `name` can be used as a blob name (and therefore as a file name).
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || NAME_EXTRA_CHARS.contains(&c))
}

#[derive(Debug, Clone, Copy)]
pub struct NameAllocator {
    min_len: usize,
    max_len: usize,
}

impl NameAllocator {
    pub fn new(min_len: usize, max_len: usize) -> Result<Self, NameError> {
        if min_len == 0 || min_len >= max_len || max_len > MAX_NAME_LENGTH {
            return Err(NameError::InvalidBounds {
                min: min_len,
                max: max_len,
                limit: MAX_NAME_LENGTH,
            });
        }
        Ok(Self { min_len, max_len })
    }

    /// Allocate a name seeded with the current time.
    pub fn allocate(&self, exists: impl FnMut(&str) -> bool) -> Result<String, NameError> {
        self.allocate_from_seed(&timestamp_seed(), exists)
    }

    /// Walk the hash chain for `seed` and return the first candidate `exists` rejects.
    pub fn allocate_from_seed(
        &self,
        seed: &str,
        mut exists: impl FnMut(&str) -> bool,
    ) -> Result<String, NameError> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(seed.as_bytes());

        for length in self.min_len..self.max_len {
            for counter in 1..=NAME_ATTEMPTS_PER_LENGTH {
                hasher.update(counter.to_string().as_bytes());
                let encoded = BASE64.encode(hasher.finalize().as_bytes());
                let stripped: String = encoded.chars().filter(|c| *c != '/' && *c != '.').collect();

                // Stripping can in theory leave too few characters
                let Some(candidate) = stripped.get(..length) else {
                    continue;
                };

                if !exists(candidate) {
                    return Ok(candidate.to_string());
                }
            }
            tracing::debug!("All {} candidates of length {} taken, widening", NAME_ATTEMPTS_PER_LENGTH, length);
        }

        Err(NameError::Exhausted {
            min: self.min_len,
            max: self.max_len,
        })
    }
}

/// Current wall-clock time as `<seconds>.<nanoseconds>`.
fn timestamp_seed() -> String {
    let now = chrono::Utc::now();
    format!("{}.{:09}", now.timestamp(), now.timestamp_subsec_nanos())
}
