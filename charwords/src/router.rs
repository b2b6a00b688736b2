//! Category routing.
//!
//! Every record of a category must reach the same reducer, so the bucket is
//! a hash of the category label and never of the document path. The hash is
//! 32-bit FNV-1a: it is stable across runs, processes and platforms, which
//! keeps bucket ownership reproducible in logs and tests.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

/// 32-bit FNV-1a over the UTF-8 bytes of `key`
pub fn fnv1a_32(key: &str) -> u32 {
    key.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Routes categories to one of a fixed number of reducer slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CategoryRouter {
    buckets: usize,
}

impl CategoryRouter {
    /// `buckets` is clamped to at least one slot
    pub fn new(buckets: usize) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }

    pub fn buckets(&self) -> usize {
        self.buckets
    }

    /// Reducer slot owning `category`
    pub fn bucket_of(&self, category: &str) -> usize {
        // u32 -> usize never truncates on supported targets
        fnv1a_32(category) as usize % self.buckets
    }
}
