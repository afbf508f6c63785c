//! Platform-detection results handed in by the caller.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::Platform;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDetection {
    pub detected: bool,
}

/// `{platform -> {detected}}`. Platforms that are not listed count as not detected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectedPlatforms {
    pub platforms: BTreeMap<Platform, PlatformDetection>,
}

impl DetectedPlatforms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, platform: Platform, detected: bool) -> Self {
        self.platforms
            .insert(platform, PlatformDetection { detected });
        self
    }

    /// Shorthand for a result where exactly `platforms` were detected.
    pub fn detected(platforms: &[Platform]) -> Self {
        platforms
            .iter()
            .fold(Self::new(), |acc, platform| acc.with(*platform, true))
    }

    pub fn is_detected(&self, platform: Platform) -> bool {
        self.platforms
            .get(&platform)
            .map(|d| d.detected)
            .unwrap_or(false)
    }

    /// Generic and text rules always pass; specific platforms must be detected.
    pub fn admits(&self, platform: Platform) -> bool {
        !platform.is_specific() || self.is_detected(platform)
    }
}
