//! Chooses the detector's square input resolution from the image size.

/// Inference resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InferenceSizing {
    /// Longest side strictly above this selects `large_size`.
    pub large_image_threshold: u32,
    pub large_size: u32,
    pub default_size: u32,
}

impl Default for InferenceSizing {
    fn default() -> Self {
        Self {
            large_image_threshold: 2000,
            large_size: 3200,
            default_size: 640,
        }
    }
}

impl InferenceSizing {
    pub fn select(&self, width: u32, height: u32) -> u32 {
        if width.max(height) > self.large_image_threshold {
            self.large_size
        } else {
            self.default_size
        }
    }
}
