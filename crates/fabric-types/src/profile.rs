//! Detected hardware profile: load and persist `detected.json`.
//!
//! The probe that measures RAM/VRAM/cores and recommends models is an
//! external collaborator; this module owns the file format and the
//! OS-appropriate location (`<user-data-dir>/taskfabric/detected.json`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::ProfileTier;

/// Recommended configuration derived from the detected hardware.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemProfile {
    /// Hardware tier.
    pub tier: ProfileTier,
    /// Model used for routing decisions.
    pub routing_model: String,
    /// Model behind the "fast" key.
    pub fast_model: String,
    /// Model behind the "quality" key.
    pub quality_model: String,
    /// How many agents the host can drive concurrently.
    pub max_concurrent_agents: u32,
    /// Total system RAM in MB.
    pub ram_total_mb: u64,
    /// Available RAM at probe time in MB.
    pub ram_available_mb: u64,
    /// Total VRAM across GPUs in MB.
    pub total_vram_mb: u64,
    /// Logical CPU cores.
    pub cpu_cores: u32,
    /// CPU architecture string (e.g. "x86_64").
    pub cpu_arch: String,
    /// Number of GPUs.
    pub gpu_count: u32,
}

/// The OS-appropriate path for `detected.json`.
pub fn detected_path() -> PathBuf {
    let base = dirs::data_dir()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".taskfabric")
        })
        .join("taskfabric");
    base.join("detected.json")
}

/// Persist a profile to `detected.json` (or an explicit path, for tests).
pub fn save_detected(profile: &SystemProfile, path: Option<&Path>) -> Result<()> {
    let default_path = detected_path();
    let dest = path.unwrap_or(&default_path);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(profile)?;
    std::fs::write(dest, text)?;
    Ok(())
}

/// Load `detected.json`, returning `None` when the file is missing or
/// corrupt. A stale or damaged profile never blocks the runtime.
pub fn load_detected(path: Option<&Path>) -> Option<SystemProfile> {
    let default_path = detected_path();
    let src = path.unwrap_or(&default_path);
    let text = std::fs::read_to_string(src).ok()?;
    serde_json::from_str(&text).ok()
}

/// Whether no profile has been detected yet (first run).
pub fn is_first_run(path: Option<&Path>) -> bool {
    let default_path = detected_path();
    !path.unwrap_or(&default_path).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_profile() -> SystemProfile {
        SystemProfile {
            tier: ProfileTier::Medium,
            routing_model: "qwen2.5:0.5b".into(),
            fast_model: "qwen2.5:7b".into(),
            quality_model: "qwen2.5:14b".into(),
            max_concurrent_agents: 3,
            ram_total_mb: 32_768,
            ram_available_mb: 20_000,
            total_vram_mb: 8_192,
            cpu_cores: 12,
            cpu_arch: "x86_64".into(),
            gpu_count: 1,
        }
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detected.json");
        let profile = sample_profile();
        save_detected(&profile, Some(&path)).unwrap();
        let loaded = load_detected(Some(&path)).unwrap();
        assert_eq!(loaded, profile);
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_detected(Some(&dir.path().join("nope.json"))).is_none());
    }

    #[test]
    fn load_corrupt_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detected.json");
        std::fs::write(&path, "{\"tier\": \"galactic\"}").unwrap();
        assert!(load_detected(Some(&path)).is_none());
    }

    #[test]
    fn first_run_flips_after_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detected.json");
        assert!(is_first_run(Some(&path)));
        save_detected(&sample_profile(), Some(&path)).unwrap();
        assert!(!is_first_run(Some(&path)));
    }
}
