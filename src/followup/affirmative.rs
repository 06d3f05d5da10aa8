use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::FollowUpPack;
use crate::locale::Locale;
use crate::Result;

const SPANISH_WORDS: &[&str] = &[
    "sí",
    "si",
    "dale",
    "ok",
    "listo",
    "de una",
    "claro",
    "perfecto",
    "continúa",
    "continua",
    "continuar",
    "sigue",
    "cuéntame más",
    "cuentame mas",
];

const ENGLISH_WORDS: &[&str] = &[
    "yes",
    "yeah",
    "yep",
    "sure",
    "ok",
    "okay",
    "go on",
    "continue",
    "tell me more",
    "please",
];

/// Recognizes replies that only acknowledge the previous answer.
///
/// A reply qualifies when one of the words opens it as a whole word, so
/// "sí, cuéntame más" and "yes, the second" match while "okapi" does not.
#[derive(Debug, Clone)]
pub struct AffirmativeMatcher {
    pattern: Option<Regex>,
}

impl AffirmativeMatcher {
    pub fn new<I, S>(words: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let alternatives: Vec<String> = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_string())
            .filter(|w| !w.is_empty())
            .map(|w| regex::escape(&w))
            .collect();
        if alternatives.is_empty() {
            return Ok(Self { pattern: None });
        }
        let pattern = RegexBuilder::new(&format!(r"^(?:{})\b", alternatives.join("|")))
            .case_insensitive(true)
            .build()?;
        Ok(Self {
            pattern: Some(pattern),
        })
    }

    pub fn for_locale(locale: Locale) -> Self {
        let words = match locale {
            Locale::Es => SPANISH_WORDS,
            Locale::En => ENGLISH_WORDS,
        };
        Self::new(words.iter().copied()).expect("Failed to compile affirmative word list")
    }

    pub fn is_affirmative(&self, text: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|p| p.is_match(text.trim()))
    }
}

/// What a send turns into once the affirmative shortcut has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// Text handed to the retrieval backend, before prompt wrapping.
    pub query: String,
    /// Extra user turn showing the chosen suggestion's title.
    pub synthetic_turn: Option<String>,
    pub option_id: Option<String>,
}

impl Dispatch {
    fn literal(input: &str) -> Self {
        Self {
            query: input.to_string(),
            synthetic_turn: None,
            option_id: None,
        }
    }
}

/// Decide what to send for a typed message.
///
/// An affirmative reply with a live pack is turned into the suggested query
/// of the option whose title appears in the reply, or the first option.
pub fn resolve_dispatch(
    input: &str,
    live_pack: Option<&FollowUpPack>,
    matcher: &AffirmativeMatcher,
) -> Dispatch {
    let input = input.trim();
    let Some(pack) = live_pack.filter(|p| !p.options.is_empty()) else {
        return Dispatch::literal(input);
    };
    if !matcher.is_affirmative(input) {
        return Dispatch::literal(input);
    }

    let lowered = input.to_lowercase();
    let chosen = pack
        .options
        .iter()
        .find(|o| {
            let title = o.title.trim().to_lowercase();
            !title.is_empty() && lowered.contains(&title)
        })
        .unwrap_or(&pack.options[0]);

    debug!("Affirmative reply mapped to follow-up {}", chosen.id);
    Dispatch {
        query: chosen.suggested_query.clone(),
        synthetic_turn: Some(chosen.title.clone()),
        option_id: Some(chosen.id.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::followup::FollowUpOption;
    use pretty_assertions::assert_eq;

    fn steps_pack() -> FollowUpPack {
        FollowUpPack {
            hook: Some("More?".to_string()),
            options: vec![
                FollowUpOption {
                    id: "steps".to_string(),
                    title: "See steps".to_string(),
                    suggested_query: "Q1".to_string(),
                },
                FollowUpOption {
                    id: "docs".to_string(),
                    title: "See docs".to_string(),
                    suggested_query: "Q2".to_string(),
                },
            ],
        }
    }

    #[test]
    fn test_spanish_affirmatives() {
        let m = AffirmativeMatcher::for_locale(Locale::Es);
        for text in ["sí", "Sí, cuéntame más", "si claro", "DALE", "de una", "  ok  ", "cuéntame más"] {
            assert!(m.is_affirmative(text), "{text} should be affirmative");
        }
        for text in ["no gracias", "okapi", "¿qué es esto?", "", "simple"] {
            assert!(!m.is_affirmative(text), "{text} should not be affirmative");
        }
    }

    #[test]
    fn test_english_affirmatives() {
        let m = AffirmativeMatcher::for_locale(Locale::En);
        for text in ["yes", "Yes, the docs", "okay", "tell me more please", "go on"] {
            assert!(m.is_affirmative(text), "{text} should be affirmative");
        }
        for text in ["no", "yesterday", "what about pricing?"] {
            assert!(!m.is_affirmative(text), "{text} should not be affirmative");
        }
    }

    #[test]
    fn test_empty_word_list_matches_nothing() {
        let m = AffirmativeMatcher::new(Vec::<String>::new()).unwrap();
        assert!(!m.is_affirmative("yes"));
        assert!(!m.is_affirmative(""));
    }

    #[test]
    fn test_affirmative_defaults_to_first_option() {
        let m = AffirmativeMatcher::for_locale(Locale::Es);
        let pack = steps_pack();
        let dispatch = resolve_dispatch("sí, cuéntame más", Some(&pack), &m);
        assert_eq!(dispatch.query, "Q1");
        assert_eq!(dispatch.synthetic_turn.as_deref(), Some("See steps"));
        assert_eq!(dispatch.option_id.as_deref(), Some("steps"));
    }

    #[test]
    fn test_affirmative_picks_matching_title() {
        let m = AffirmativeMatcher::for_locale(Locale::En);
        let pack = steps_pack();
        let dispatch = resolve_dispatch("yes, see DOCS please", Some(&pack), &m);
        assert_eq!(dispatch.query, "Q2");
        assert_eq!(dispatch.synthetic_turn.as_deref(), Some("See docs"));
    }

    #[test]
    fn test_literal_without_live_pack() {
        let m = AffirmativeMatcher::for_locale(Locale::Es);
        let dispatch = resolve_dispatch("  sí  ", None, &m);
        assert_eq!(dispatch, Dispatch::literal("sí"));

        let empty = FollowUpPack {
            hook: Some("More?".to_string()),
            options: vec![],
        };
        let dispatch = resolve_dispatch("sí", Some(&empty), &m);
        assert_eq!(dispatch.query, "sí");
        assert!(dispatch.synthetic_turn.is_none());
    }

    #[test]
    fn test_literal_for_regular_question() {
        let m = AffirmativeMatcher::for_locale(Locale::Es);
        let pack = steps_pack();
        let dispatch = resolve_dispatch("¿Cuánto cuesta?", Some(&pack), &m);
        assert_eq!(dispatch.query, "¿Cuánto cuesta?");
        assert!(dispatch.option_id.is_none());
    }
}
