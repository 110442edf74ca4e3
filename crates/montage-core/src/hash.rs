//! Content hashing for deterministic rendering verification.
//!
//! Preview and export must agree pixel-for-pixel for the same timeline
//! snapshot and time; hashing frames makes that cheap to assert and to
//! report from an export run.

use sha2::{Digest, Sha256};

use crate::frame::FrameBuffer;

/// A SHA-256 digest of frame contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentHash {
    bytes: [u8; 32],
}

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    pub fn to_hex(&self) -> String {
        self.bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Incremental hasher over a sequence of frames, so long exports can be
/// fingerprinted without keeping frames in memory.
#[derive(Default)]
pub struct FrameHasher {
    hasher: Sha256,
    frames: u64,
}

impl FrameHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, frame: &FrameBuffer) {
        // Dimensions are part of the digest so equal bytes at different
        // sizes do not collide.
        self.hasher.update(frame.width.to_le_bytes());
        self.hasher.update(frame.height.to_le_bytes());
        self.hasher.update(&frame.data);
        self.frames += 1;
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    pub fn finish(self) -> ContentHash {
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.hasher.finalize());
        ContentHash::from_bytes(bytes)
    }
}

/// Hash a single frame buffer.
pub fn hash_frame(frame: &FrameBuffer) -> ContentHash {
    let mut hasher = FrameHasher::new();
    hasher.update(frame);
    hasher.finish()
}
