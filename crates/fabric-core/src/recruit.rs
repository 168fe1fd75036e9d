//! Recruit a specialist for a task. Keyword-based, single specialist.

use fabric_types::FabricConfig;
use tracing::debug;

/// Hardcoded fallback applied when no configured keyword matches: these
/// route to the engineering pack, everything else to research.
const ENGINEERING_FALLBACK_KEYWORDS: [&str; 6] =
    ["code", "build", "implement", "service", "pipeline", "deploy"];

/// Choose one specialist id from the configuration based on the prompt.
///
/// Scoring: each keyword found as a substring of the lowercased prompt
/// adds 1 to that specialist's score; the highest score wins. Ties resolve
/// to whichever specialist is listed *first* in the configuration, so
/// operators control priority through config ordering without code
/// changes. A zero top score falls back to the hardcoded keyword set.
pub fn recruit_specialist(prompt: &str, config: &FabricConfig) -> String {
    let lowered = prompt.to_lowercase();

    let mut best: Option<(&str, usize)> = None;
    for spec in &config.specialists {
        let score = spec
            .keywords
            .iter()
            .filter(|kw| lowered.contains(kw.to_lowercase().as_str()))
            .count();
        // Strictly-greater keeps the first-listed specialist on ties.
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((spec.id.as_str(), score));
        }
    }

    if let Some((id, score)) = best {
        if score > 0 {
            debug!(specialist = id, score, "recruited specialist by keyword score");
            return id.to_string();
        }
    }

    if ENGINEERING_FALLBACK_KEYWORDS
        .iter()
        .any(|kw| lowered.contains(kw))
    {
        debug!("recruited specialist: engineering (hardcoded keyword fallback)");
        return "engineering".to_string();
    }
    debug!("recruited specialist: research (default fallback, no keywords matched)");
    "research".to_string()
}
