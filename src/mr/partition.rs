use std::hash::Hasher;

use fnv::FnvHasher;

/// Hashes an intermediate key with FNV-1a, masked to a non-negative 31-bit
/// value. Every worker in a job must agree on this function.
pub fn ihash(key: &str) -> u32 {
    let mut hasher = FnvHasher::default();
    hasher.write(key.as_bytes());
    (hasher.finish() & 0x7fff_ffff) as u32
}

/// The reduce bucket a key is routed to, in `[0, n_reduce)`.
pub fn bucket_for(key: &str, n_reduce: u32) -> u32 {
    ihash(key) % n_reduce
}
