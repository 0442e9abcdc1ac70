use xxhash_rust::xxh3::xxh3_64;
use xxhash_rust::xxh3::Xxh3;

/// Hasher used to generate identifiers for assets, dependencies, environments and bundles.
///
/// Identifiers must be stable across runs, machines and platforms.
pub type IdentifierHasher = Xxh3;

pub fn hash_string(s: String) -> String {
  format!("{:016x}", xxh3_64(s.as_bytes()))
}
