//! Synthesis voice ranking.
//!
//! ## Ranking (first match wins, list order breaks ties)
//!
//! 1. exact locale + provider hint + gender/style hint
//! 2. exact locale + provider hint
//! 3. exact locale + locale proper-name hint
//! 4. exact locale
//! 5. same primary language subtag

use serde::{Deserialize, Serialize};

use crate::config::VoicePreferences;

/// A synthesis voice as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Voice {
    pub name: String,
    /// BCP-47 tag as reported; may use `_` or odd casing.
    pub lang: String,
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
        }
    }
}

/// Pick the best voice for `target_locale`, or `None` to use the synthesizer default.
pub fn select_voice<'a>(
    available: &'a [Voice],
    target_locale: &str,
    prefs: &VoicePreferences,
) -> Option<&'a Voice> {
    let target = locale_key(target_locale);
    let target_lang = primary_subtag(&target);

    let exact: Vec<(&Voice, String)> = available
        .iter()
        .filter(|v| locale_key(&v.lang) == target)
        .map(|v| (v, v.name.to_lowercase()))
        .collect();

    let providers = lowercase_hints(&prefs.provider_hints);
    let styles = lowercase_hints(&prefs.style_hints);
    let names = lowercase_hints(&prefs.name_hints);
    let has_any = |name: &str, hints: &[String]| hints.iter().any(|h| name.contains(h.as_str()));

    exact
        .iter()
        .find(|(_, name)| has_any(name, &providers) && has_any(name, &styles))
        .or_else(|| exact.iter().find(|(_, name)| has_any(name, &providers)))
        .or_else(|| exact.iter().find(|(_, name)| has_any(name, &names)))
        .or_else(|| exact.first())
        .map(|(voice, _)| *voice)
        .or_else(|| {
            available
                .iter()
                .find(|v| primary_subtag(&locale_key(&v.lang)) == target_lang)
        })
}

fn lowercase_hints(hints: &[String]) -> Vec<String> {
    hints
        .iter()
        .map(|h| h.trim().to_lowercase())
        .filter(|h| !h.is_empty())
        .collect()
}

fn locale_key(raw: &str) -> String {
    raw.trim().replace('_', "-").to_ascii_lowercase()
}

fn primary_subtag(key: &str) -> &str {
    key.split('-').next().unwrap_or_default()
}
