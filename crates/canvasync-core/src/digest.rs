//! Content digest of a canvas state.
//!
//! Two states with equal digests serialize to identical snapshot blobs, which
//! is how the save pipeline skips writes for unchanged canvases.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::ModelError;
use crate::model::CanvasState;

/// SHA-256 of the canonical JSON encoding of a [`CanvasState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateDigest([u8; 32]);

impl StateDigest {
    /// Hash a state.
    ///
    /// JSON object keys are emitted in sorted order (serde_json's default
    /// `Map` is a BTreeMap), so equal states always hash equally.
    pub fn of(state: &CanvasState) -> Result<Self, ModelError> {
        let bytes = serde_json::to_vec(state)?;
        Ok(Self(Sha256::digest(&bytes).into()))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for StateDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}
