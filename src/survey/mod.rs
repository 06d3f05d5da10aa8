//! Multi-section survey: bundled schemas, validation, progress and drafts.

mod schema;
mod session;

pub use schema::{Question, QuestionKind, Section, SurveySchema, LIKERT_SCALE};
pub use session::{DraftStore, SurveySession};
