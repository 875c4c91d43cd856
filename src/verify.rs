//! The verifier adapter: anchors the call site for an externally supplied chunklist
//! verifier. Chunklist parsing and hashing are out of scope for this core — this
//! module only defines the capability it delegates to.

use crate::region::BackingRegion;

/// A capability that can verify an image's contents against a separate table of
/// hashes (a "chunklist"). Implementations own their own chunklist parsing; this
/// core never inspects one.
pub trait ChunklistVerifier {
    /// Verify the backing region against this verifier's chunklist. Returns `true`
    /// only if every covered range hashes to its expected value.
    fn verify(&self, region: &dyn BackingRegion) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::MemoryRegion;

    struct AlwaysPass;
    impl ChunklistVerifier for AlwaysPass {
        fn verify(&self, _region: &dyn BackingRegion) -> bool {
            true
        }
    }

    struct AlwaysFail;
    impl ChunklistVerifier for AlwaysFail {
        fn verify(&self, _region: &dyn BackingRegion) -> bool {
            false
        }
    }

    #[test]
    fn adapter_delegates_verdict() {
        let region = MemoryRegion::from_bytes(vec![0u8; 16]);
        assert!(AlwaysPass.verify(&region));
        assert!(!AlwaysFail.verify(&region));
    }
}
