//! Feature flags: profile-based capabilities with zero-cost disabled features.
//!
//! Each [`Feature`] maps to a capability that can be enabled or disabled per
//! hardware profile tier. Disabled features must fail fast with a
//! [`FeatureDisabledError`] before any resource (process, connection, model)
//! is constructed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// System profile tier, derived from the detected hardware resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProfileTier {
    /// Less than 8 GB RAM.
    Nano,
    /// 8-16 GB RAM, VRAM below 4 GB.
    Small,
    /// 16-32 GB RAM or 4-12 GB VRAM.
    Medium,
    /// 32-64 GB RAM or 12-24 GB VRAM.
    Large,
    /// 64 GB+ RAM, 24 GB+ VRAM, or multiple GPUs.
    Server,
}

impl ProfileTier {
    /// The lowercase string form used in `detected.json` and run logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nano => "nano",
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
            Self::Server => "server",
        }
    }
}

/// Individual capability that can be enabled or disabled per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// In-process local inference.
    Inprocess,
    /// Ollama local LLM server.
    Ollama,
    /// vLLM high-throughput server.
    Vllm,
    /// Cloud LLM endpoints.
    Cloud,
    /// Remote tool (MCP) servers.
    Mcp,
    /// Headless browser tool.
    Browser,
    /// Vector embeddings for the run index.
    Embedding,
    /// Tracing export.
    Telemetry,
    /// Containerised tool execution.
    Container,
}

impl Feature {
    /// All features, in declaration order.
    pub const ALL: [Feature; 9] = [
        Feature::Inprocess,
        Feature::Ollama,
        Feature::Vllm,
        Feature::Cloud,
        Feature::Mcp,
        Feature::Browser,
        Feature::Embedding,
        Feature::Telemetry,
        Feature::Container,
    ];

    /// The lowercase string form used in config and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inprocess => "inprocess",
            Self::Ollama => "ollama",
            Self::Vllm => "vllm",
            Self::Cloud => "cloud",
            Self::Mcp => "mcp",
            Self::Browser => "browser",
            Self::Embedding => "embedding",
            Self::Telemetry => "telemetry",
            Self::Container => "container",
        }
    }
}

/// Default features enabled per profile tier.
///
/// The server tier drops Ollama (vLLM handles all throughput) and adds
/// telemetry.
pub fn profile_features(tier: ProfileTier) -> BTreeSet<Feature> {
    use Feature::*;
    let features: &[Feature] = match tier {
        ProfileTier::Nano => &[Inprocess, Cloud],
        ProfileTier::Small => &[Inprocess, Ollama, Cloud, Mcp],
        ProfileTier::Medium => &[Inprocess, Ollama, Vllm, Cloud, Mcp, Embedding],
        ProfileTier::Large => &[Inprocess, Ollama, Vllm, Cloud, Mcp, Embedding, Container],
        ProfileTier::Server => &[Inprocess, Vllm, Cloud, Mcp, Embedding, Container, Telemetry],
    };
    features.iter().copied().collect()
}

/// Raised when a code path requires a feature that is disabled for the
/// current profile.
#[derive(Debug, Clone)]
pub struct FeatureDisabledError {
    /// The feature that was attempted.
    pub feature: Feature,
    /// Human-readable suggestion for how to enable the feature.
    pub hint: String,
}

impl std::error::Error for FeatureDisabledError {}

impl std::fmt::Display for FeatureDisabledError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "feature '{}' is disabled for the current profile.",
            self.feature.as_str()
        )?;
        if !self.hint.is_empty() {
            write!(f, " {}", self.hint)?;
        }
        Ok(())
    }
}

/// Explicit per-feature overrides from configuration.
///
/// `None` means "use the profile default"; `Some(true)` forces a feature
/// on; `Some(false)` forces it off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureOverrides {
    pub inprocess: Option<bool>,
    pub ollama: Option<bool>,
    pub vllm: Option<bool>,
    pub cloud: Option<bool>,
    pub mcp: Option<bool>,
    pub browser: Option<bool>,
    pub embedding: Option<bool>,
    pub telemetry: Option<bool>,
    pub container: Option<bool>,
}

impl FeatureOverrides {
    fn get(&self, feature: Feature) -> Option<bool> {
        match feature {
            Feature::Inprocess => self.inprocess,
            Feature::Ollama => self.ollama,
            Feature::Vllm => self.vllm,
            Feature::Cloud => self.cloud,
            Feature::Mcp => self.mcp,
            Feature::Browser => self.browser,
            Feature::Embedding => self.embedding,
            Feature::Telemetry => self.telemetry,
            Feature::Container => self.container,
        }
    }
}

/// The set of features enabled for the current session.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    enabled: BTreeSet<Feature>,
}

impl FeatureSet {
    /// Build a feature set from the profile tier with user overrides applied.
    pub fn from_profile(tier: ProfileTier, overrides: &FeatureOverrides) -> Self {
        let mut enabled = profile_features(tier);
        for feature in Feature::ALL {
            match overrides.get(feature) {
                Some(true) => {
                    enabled.insert(feature);
                }
                Some(false) => {
                    enabled.remove(&feature);
                }
                None => {}
            }
        }
        Self { enabled }
    }

    /// A feature set with every feature enabled. Useful for tests.
    pub fn all_enabled() -> Self {
        Self {
            enabled: Feature::ALL.iter().copied().collect(),
        }
    }

    /// Whether a feature is enabled in this set.
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.enabled.contains(&feature)
    }

    /// Fail fast with a [`FeatureDisabledError`] if a feature is disabled.
    ///
    /// Call at the top of any code path that depends on a feature, so the
    /// failure is a clear structured error rather than a missing resource
    /// deep in the stack.
    pub fn require(
        &self,
        feature: Feature,
        hint: impl Into<String>,
    ) -> std::result::Result<(), FeatureDisabledError> {
        if self.enabled.contains(&feature) {
            Ok(())
        } else {
            Err(FeatureDisabledError {
                feature,
                hint: hint.into(),
            })
        }
    }
}
