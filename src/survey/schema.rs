use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::locale::Locale;
use crate::{KioskError, Result};

const SCHEMA_ES: &str = include_str!("../../assets/survey.es.toml");
const SCHEMA_EN: &str = include_str!("../../assets/survey.en.toml");

pub const LIKERT_SCALE: [&str; 5] = ["1", "2", "3", "4", "5"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    SingleChoice,
    #[serde(rename = "likert_1_5")]
    Likert,
    LongText,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub section: String,
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    #[serde(default)]
    pub options: Vec<String>,
}

impl Question {
    /// Free-text questions may be skipped.
    pub fn is_required(&self) -> bool {
        self.kind != QuestionKind::LongText
    }

    /// Accepted answers; empty for free text.
    pub fn choices(&self) -> Vec<&str> {
        match self.kind {
            QuestionKind::SingleChoice => self.options.iter().map(String::as_str).collect(),
            QuestionKind::Likert => LIKERT_SCALE.to_vec(),
            QuestionKind::LongText => Vec::new(),
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self.kind {
            QuestionKind::LongText => true,
            _ => self.choices().contains(&value),
        }
    }

    /// Map typed input to the stored answer. Choices accept the 1-based
    /// option number or the option text in any case.
    pub fn resolve_input(&self, input: &str) -> Option<String> {
        let input = input.trim();
        match self.kind {
            QuestionKind::LongText => Some(input.to_string()),
            QuestionKind::Likert => self.accepts(input).then(|| input.to_string()),
            QuestionKind::SingleChoice => {
                let by_number = input
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| self.options.get(i));
                let wanted = input.to_lowercase();
                by_number
                    .or_else(|| self.options.iter().find(|o| o.to_lowercase() == wanted))
                    .cloned()
            }
        }
    }

    /// Stable column label, `[id] text`.
    pub fn label(&self) -> String {
        format!("[{}] {}", self.id, self.text)
    }
}

#[derive(Debug, Deserialize)]
struct SchemaFile {
    #[serde(default)]
    questions: Vec<Question>,
}

/// Ordered question list of one survey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurveySchema {
    questions: Vec<Question>,
}

/// Questions sharing a section title, in display order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub title: &'a str,
    pub questions: Vec<&'a Question>,
}

impl SurveySchema {
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(content)?;
        Self::new(file.questions)
    }

    pub fn new(questions: Vec<Question>) -> Result<Self> {
        if questions.is_empty() {
            return Err(KioskError::Validation("survey has no questions".to_string()));
        }
        let mut seen = HashSet::new();
        for q in &questions {
            if q.id.trim().is_empty() {
                return Err(KioskError::Validation(format!(
                    "question without id in section {}",
                    q.section
                )));
            }
            if !seen.insert(q.id.as_str()) {
                return Err(KioskError::Validation(format!("duplicate question id {}", q.id)));
            }
            if q.kind == QuestionKind::SingleChoice && q.options.is_empty() {
                return Err(KioskError::Validation(format!(
                    "question {} has no options",
                    q.id
                )));
            }
        }
        Ok(Self { questions })
    }

    /// The survey bundled for `locale`.
    pub fn for_locale(locale: Locale) -> Result<Self> {
        match locale {
            Locale::Es => Self::from_toml(SCHEMA_ES),
            Locale::En => Self::from_toml(SCHEMA_EN),
        }
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Sections in order of first appearance.
    pub fn sections(&self) -> Vec<Section<'_>> {
        let mut sections: Vec<Section<'_>> = Vec::new();
        for q in &self.questions {
            match sections.iter_mut().find(|s| s.title == q.section) {
                Some(section) => section.questions.push(q),
                None => sections.push(Section {
                    title: &q.section,
                    questions: vec![q],
                }),
            }
        }
        sections
    }

    pub fn required_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_required()).count()
    }
}
