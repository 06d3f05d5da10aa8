//! Follow-up suggestions embedded in assistant answers.
//!
//! The retrieval backend is asked to end every answer with a one-line JSON
//! block between `<!--JSON_START-->` and `<!--JSON_END-->`. [`parse_answer`]
//! splits that block from the display text, [`resolve_dispatch`] implements
//! the "yes, tell me more" shortcut on top of the live pack, and
//! [`PromptTemplate`] builds the instruction that asks for the block.

mod affirmative;
mod parser;
mod prompt;

pub use affirmative::{resolve_dispatch, AffirmativeMatcher, Dispatch};
pub use parser::{parse_answer, END_MARKER, START_MARKER};
pub use prompt::{PromptTemplate, QUERY_PLACEHOLDER};

use serde::{Deserialize, Serialize};

/// One suggested next question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpOption {
    pub id: String,
    #[serde(rename = "titulo", alias = "title")]
    pub title: String,
    #[serde(
        rename = "query_sugerida",
        alias = "suggestedQuery",
        alias = "suggested_query"
    )]
    pub suggested_query: String,
}

/// Suggestions derived from one assistant answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpPack {
    #[serde(rename = "gancho", alias = "hook", default, skip_serializing_if = "Option::is_none")]
    pub hook: Option<String>,
    #[serde(rename = "opciones", alias = "options", default)]
    pub options: Vec<FollowUpOption>,
}

impl FollowUpPack {
    /// A pack is worth showing only with a hook or at least one option.
    pub fn is_present(&self) -> bool {
        self.hook.as_deref().is_some_and(|h| !h.trim().is_empty()) || !self.options.is_empty()
    }

    pub fn option(&self, id: &str) -> Option<&FollowUpOption> {
        self.options.iter().find(|o| o.id == id)
    }

    /// `Some(self)` when present; this is what a chat keeps as its live pack.
    pub fn into_live(self) -> Option<Self> {
        self.is_present().then_some(self)
    }
}

/// Assistant answer split into display text and suggestions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAnswer {
    pub clean_text: String,
    pub pack: FollowUpPack,
}
