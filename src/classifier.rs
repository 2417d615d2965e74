//! Optional free-text intent classification.
//!
//! When a candidate types instead of tapping, the machine may ask a
//! classifier which menu option they meant. The suggestion is only ever a
//! hint — it goes through the same validity checks as a direct selection,
//! never trusted blindly.

use async_trait::async_trait;

use crate::event::MenuOption;
use crate::funnel::Stage;

/// Maps free text to one of the currently valid options.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    /// Best-guess option id for `text` among `options`, or `None`.
    async fn classify(
        &self,
        stage: Stage,
        text: &str,
        options: &[MenuOption],
    ) -> Option<String>;
}

/// Deterministic label matcher: accent folding, case folding, and a small
/// affirmative/negative synonym table. No external calls.
#[derive(Debug, Clone, Default)]
pub struct KeywordClassifier;

const YES_WORDS: &[&str] = &["yes", "y", "yeah", "yep", "sure", "ok", "sim", "s", "claro"];
const NO_WORDS: &[&str] = &["no", "n", "nope", "nao", "not"];

impl KeywordClassifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IntentClassifier for KeywordClassifier {
    async fn classify(
        &self,
        _stage: Stage,
        text: &str,
        options: &[MenuOption],
    ) -> Option<String> {
        let needle = fold(text);
        if needle.is_empty() {
            return None;
        }

        // Exact match on id or folded label.
        for option in options {
            if option.id == text || fold(&option.label) == needle {
                return Some(option.id.clone());
            }
        }

        // Affirmative/negative synonyms map onto yes/no-labeled options.
        let as_yes = YES_WORDS.contains(&needle.as_str());
        let as_no = NO_WORDS.contains(&needle.as_str());
        if as_yes || as_no {
            for option in options {
                let label = fold(&option.label);
                if as_yes && YES_WORDS.contains(&label.as_str()) {
                    return Some(option.id.clone());
                }
                if as_no && NO_WORDS.contains(&label.as_str()) {
                    return Some(option.id.clone());
                }
            }
        }

        None
    }
}

/// Lowercase and strip combining accents, so "São Paulo" matches "sao paulo".
fn fold(text: &str) -> String {
    text.trim()
        .chars()
        .filter_map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => Some('a'),
            'é' | 'è' | 'ê' | 'ë' => Some('e'),
            'í' | 'ì' | 'î' | 'ï' => Some('i'),
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => Some('o'),
            'ú' | 'ù' | 'û' | 'ü' => Some('u'),
            'ç' => Some('c'),
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => Some('a'),
            'É' | 'È' | 'Ê' | 'Ë' => Some('e'),
            'Í' | 'Ì' | 'Î' | 'Ï' => Some('i'),
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => Some('o'),
            'Ú' | 'Ù' | 'Û' | 'Ü' => Some('u'),
            'Ç' => Some('c'),
            _ => Some(c.to_ascii_lowercase()),
        })
        .collect()
}
