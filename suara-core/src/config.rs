//! Persistent engine configuration (JSON file in the app data directory).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const DEFAULT_LOCALE: &str = "id-ID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct SuaraConfig {
    /// BCP-47 locale used for both recognition and synthesis.
    pub locale: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
    /// Delay between the recognizer reporting `ended` and the restart `start()`.
    pub restart_delay_ms: u64,
    /// Consecutive restarts without any result before giving up. `None` = uncapped.
    pub max_consecutive_restarts: Option<u32>,
    pub speech_rate: f32,
    pub speech_pitch: f32,
    pub speech_volume: f32,
    pub voice: VoicePreferences,
}

impl Default for SuaraConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.into(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
            restart_delay_ms: 100,
            max_consecutive_restarts: None,
            speech_rate: 0.9,
            speech_pitch: 1.0,
            speech_volume: 1.0,
            voice: VoicePreferences::default(),
        }
    }
}

/// Name fragments used by the voice selector to rank synthesis voices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct VoicePreferences {
    /// Known high-quality voice providers.
    pub provider_hints: Vec<String>,
    /// Explicit gender/style markers.
    pub style_hints: Vec<String>,
    /// Locale-specific proper names that identify a native voice.
    pub name_hints: Vec<String>,
}

impl Default for VoicePreferences {
    fn default() -> Self {
        Self {
            provider_hints: vec!["google".into()],
            style_hints: vec![
                "female".into(),
                "male".into(),
                "natural".into(),
                "neural".into(),
                "wavenet".into(),
            ],
            name_hints: vec![
                "indonesia".into(),
                "damayanti".into(),
                "gadis".into(),
                "ardi".into(),
            ],
        }
    }
}

impl SuaraConfig {
    pub fn normalize(&mut self) {
        self.locale = normalize_locale(&self.locale);
        self.max_alternatives = self.max_alternatives.clamp(1, 10);
        self.restart_delay_ms = self.restart_delay_ms.min(5_000);
        self.max_consecutive_restarts = self.max_consecutive_restarts.filter(|n| *n > 0);
        self.speech_rate = clamp_or(self.speech_rate, 0.1, 10.0, 0.9);
        self.speech_pitch = clamp_or(self.speech_pitch, 0.0, 2.0, 1.0);
        self.speech_volume = clamp_or(self.speech_volume, 0.0, 1.0, 1.0);
        self.voice.normalize();
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_millis(self.restart_delay_ms)
    }
}

impl VoicePreferences {
    fn normalize(&mut self) {
        normalize_hints(&mut self.provider_hints);
        normalize_hints(&mut self.style_hints);
        normalize_hints(&mut self.name_hints);
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback
    }
}

/// Canonical `ll-RR` form: `id_id` → `id-ID`. Empty input falls back to the default locale.
pub fn normalize_locale(raw: &str) -> String {
    let trimmed = raw.trim().replace('_', "-");
    if trimmed.is_empty() {
        return DEFAULT_LOCALE.into();
    }
    let mut parts = trimmed.split('-');
    let mut out = parts.next().unwrap_or_default().to_ascii_lowercase();
    for part in parts {
        out.push('-');
        if part.len() == 2 {
            out.push_str(&part.to_ascii_uppercase());
        } else {
            out.push_str(part);
        }
    }
    out
}

fn normalize_hints(hints: &mut Vec<String>) {
    let mut out: Vec<String> = Vec::with_capacity(hints.len());
    for hint in hints.iter() {
        let normalized = hint.trim().to_lowercase();
        if normalized.is_empty() || out.contains(&normalized) {
            continue;
        }
        out.push(normalized);
    }
    *hints = out;
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Suara")
            .join("config.json")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("suara")
            .join("config.json")
    }
}

/// Load config from `path`. Missing or malformed files yield the defaults.
pub fn load_config(path: &Path) -> SuaraConfig {
    let mut config = match fs::read_to_string(path) {
        Ok(raw) => serde_json::from_str::<SuaraConfig>(&raw).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), "ignoring malformed config: {e}");
            SuaraConfig::default()
        }),
        Err(_) => SuaraConfig::default(),
    };
    config.normalize();
    config
}

pub fn save_config(path: &Path, config: &SuaraConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("suara-config-{}-{}", std::process::id(), name))
            .join("config.json")
    }

    #[test]
    fn normalize_locale_canonicalizes_case_and_separator() {
        assert_eq!(normalize_locale("id_id"), "id-ID");
        assert_eq!(normalize_locale(" EN-us "), "en-US");
        assert_eq!(normalize_locale(""), "id-ID");
        assert_eq!(normalize_locale("zh-Hans-CN"), "zh-Hans-CN");
    }

    #[test]
    fn normalize_clamps_out_of_range_values() {
        let mut cfg = SuaraConfig {
            max_alternatives: 0,
            restart_delay_ms: 60_000,
            max_consecutive_restarts: Some(0),
            speech_rate: f32::NAN,
            speech_pitch: 9.0,
            speech_volume: -1.0,
            ..SuaraConfig::default()
        };
        cfg.voice.provider_hints = vec![" Google ".into(), "google".into(), "".into()];
        cfg.normalize();

        assert_eq!(cfg.max_alternatives, 1);
        assert_eq!(cfg.restart_delay_ms, 5_000);
        assert_eq!(cfg.max_consecutive_restarts, None);
        assert!((cfg.speech_rate - 0.9).abs() < f32::EPSILON);
        assert!((cfg.speech_pitch - 2.0).abs() < f32::EPSILON);
        assert_eq!(cfg.speech_volume, 0.0);
        assert_eq!(cfg.voice.provider_hints, vec!["google".to_string()]);
    }

    #[test]
    fn partial_json_fills_missing_fields_with_defaults() {
        let cfg: SuaraConfig =
            serde_json::from_str(r#"{"restartDelayMs": 250, "locale": "en-US"}"#)
                .expect("parse partial config");
        assert_eq!(cfg.restart_delay_ms, 250);
        assert_eq!(cfg.locale, "en-US");
        assert!(cfg.continuous);
        assert_eq!(cfg.voice, VoicePreferences::default());
    }

    #[test]
    fn save_then_load_preserves_values() {
        let path = scratch_path("save-load");
        let cfg = SuaraConfig {
            restart_delay_ms: 40,
            max_consecutive_restarts: Some(3),
            ..SuaraConfig::default()
        };
        save_config(&path, &cfg).expect("save config");

        let loaded = load_config(&path);
        assert_eq!(loaded, cfg);

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = scratch_path("malformed");
        fs::create_dir_all(path.parent().expect("parent dir")).expect("create dir");
        fs::write(&path, "{ not json").expect("write file");

        assert_eq!(load_config(&path), SuaraConfig::default());

        let _ = fs::remove_dir_all(path.parent().expect("parent dir"));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let path = scratch_path("missing");
        assert_eq!(load_config(&path), SuaraConfig::default());
    }
}
