use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{FollowUpOption, FollowUpPack, ParsedAnswer};

pub const START_MARKER: &str = "<!--JSON_START-->";
pub const END_MARKER: &str = "<!--JSON_END-->";

static BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn block_regex() -> &'static Regex {
    BLOCK_REGEX.get_or_init(|| {
        Regex::new(&format!(
            "(?s){}(.*?){}",
            regex::escape(START_MARKER),
            regex::escape(END_MARKER)
        ))
        .expect("Failed to compile follow-up block regex")
    })
}

/// Option as the model writes it. Only title and query are mandatory.
#[derive(Debug, Deserialize)]
struct WireOption {
    #[serde(default)]
    id: Option<Value>,
    #[serde(alias = "titulo")]
    title: String,
    #[serde(alias = "query_sugerida", alias = "suggestedQuery")]
    suggested_query: String,
}

/// Split an assistant answer into display text and follow-up suggestions.
///
/// Never fails: a missing block yields an empty pack, a malformed payload is
/// dropped and still removed from the text.
pub fn parse_answer(full_answer: &str) -> ParsedAnswer {
    let re = block_regex();
    let Some(caps) = re.captures(full_answer) else {
        return ParsedAnswer {
            clean_text: full_answer.trim().to_string(),
            pack: FollowUpPack::default(),
        };
    };

    let payload = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    let pack = decode_pack(payload.trim());

    let clean_text = re.replacen(full_answer, 1, "").trim().to_string();
    ParsedAnswer { clean_text, pack }
}

fn decode_pack(payload: &str) -> FollowUpPack {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            debug!("Discarding malformed follow-up payload: {}", e);
            return FollowUpPack::default();
        }
    };

    let hook = ["gancho", "hook"]
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string);

    let raw_options = ["opciones", "options"]
        .iter()
        .find_map(|k| value.get(*k))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut seen = HashSet::new();
    let mut options = Vec::with_capacity(raw_options.len());
    for (index, raw) in raw_options.into_iter().enumerate() {
        let wire: WireOption = match serde_json::from_value(raw) {
            Ok(o) => o,
            Err(e) => {
                debug!("Dropping follow-up option {}: {}", index, e);
                continue;
            }
        };
        let id = match wire.id {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Number(n)) => n.to_string(),
            _ => format!("opt-{index}"),
        };
        if !seen.insert(id.clone()) {
            debug!("Dropping duplicate follow-up option id {}", id);
            continue;
        }
        options.push(FollowUpOption {
            id,
            title: wire.title,
            suggested_query: wire.suggested_query,
        });
    }

    FollowUpPack { hook, options }
}
