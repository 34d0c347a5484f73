//! Change fingerprint
//!
//! A stable hash over a schema snapshot and the user-authored source files.
//! It is the cache key for generated models and nothing else.

use super::types::TypeDescriptor;
use sha2::{Digest, Sha256};

/// Running 32-bit hash: `hash = ((hash << 5) + hash) ^ value`
#[derive(Debug, Clone, Copy)]
pub struct HashCombiner {
    hash: u32,
}

impl HashCombiner {
    pub const SEED: u32 = 5381;

    pub fn new() -> Self {
        Self { hash: Self::SEED }
    }

    fn fold(&mut self, value: u32) {
        self.hash = (self.hash << 5).wrapping_add(self.hash) ^ value;
    }

    pub fn add_int(&mut self, value: i32) {
        self.fold(value as u32);
    }

    pub fn add_str(&mut self, value: &str) {
        self.fold(stable_hash(value));
    }

    pub fn finish(&self) -> String {
        format!("{:08x}", self.hash)
    }
}

impl Default for HashCombiner {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-independent 32-bit hash of a string
fn stable_hash(value: &str) -> u32 {
    let digest = Sha256::digest(value.as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Computes fingerprints
pub struct ChangeFingerprint;

impl ChangeFingerprint {
    /// Fingerprint of user files plus types.
    ///
    /// Types and properties are sorted by alias. User files are folded in the
    /// order the caller yields them.
    pub fn compute<I, P, T>(user_files: I, types: &[TypeDescriptor]) -> String
    where
        I: IntoIterator<Item = (P, T)>,
        P: AsRef<str>,
        T: AsRef<str>,
    {
        let mut hash = HashCombiner::new();

        for (path, text) in user_files {
            hash.add_str(&format!("{}::{}", path.as_ref(), text.as_ref()));
        }

        let mut sorted: Vec<&TypeDescriptor> = types.iter().collect();
        sorted.sort_by(|a, b| a.alias.cmp(&b.alias));

        for descriptor in sorted {
            hash.add_str("--- CONTENT TYPE MODEL ---");
            hash.add_int(descriptor.id);
            hash.add_str(&descriptor.alias);
            hash.add_str(&descriptor.binding_name);
            hash.add_int(descriptor.parent_id);
            hash.add_str(&descriptor.display_name);
            hash.add_str(descriptor.description.as_deref().unwrap_or_default());
            hash.add_str(&descriptor.item_kind.to_string());
            let mixins: Vec<String> = descriptor.mixin_types.iter().map(|id| id.to_string()).collect();
            hash.add_str(&format!("MIXINS:{}", mixins.join(",")));

            let mut properties: Vec<_> = descriptor.properties.iter().collect();
            properties.sort_by(|a, b| a.alias.cmp(&b.alias));
            for property in properties {
                hash.add_str("--- PROPERTY ---");
                hash.add_str(&property.alias);
                hash.add_str(&property.binding_name);
                hash.add_str(&property.display_name);
                hash.add_str(property.description.as_deref().unwrap_or_default());
                hash.add_str(&property.runtime_type.to_string());
            }
        }

        hash.finish()
    }
}
