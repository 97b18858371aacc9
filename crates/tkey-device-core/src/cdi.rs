use zeroize::Zeroize;

/// The Compound Device Identifier: a 32-byte chip-unique secret, read once
/// at boot. Never logged, never serialized, never leaves the device
/// (spec.md §3, Invariant 1).
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct Cdi([u8; 32]);

impl Cdi {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Cdi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cdi").field("bytes", &"<redacted>").finish()
    }
}
