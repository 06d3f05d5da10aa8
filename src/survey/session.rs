use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info, warn};

use super::schema::{Question, SurveySchema};
use crate::store::{Answers, DocumentStore, NewResponse, SurveyResponse};
use crate::{KioskError, Result};

/// Unsent answers kept per visitor under `<data_dir>/drafts/<uid>.json`.
pub struct DraftStore {
    drafts_dir: PathBuf,
}

impl DraftStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            drafts_dir: data_dir.join("drafts"),
        }
    }

    /// Saved answers for `uid`, or empty when there are none or they are unreadable.
    pub async fn load(&self, uid: &str) -> Answers {
        let path = self.draft_path(uid);
        let Ok(content) = fs::read_to_string(&path).await else {
            return Answers::new();
        };
        match serde_json::from_str::<Answers>(&content) {
            Ok(answers) => {
                debug!("Restored {} draft answers", answers.len());
                answers
            }
            Err(e) => {
                warn!("Failed to parse draft {}: {}", path.display(), e);
                Answers::new()
            }
        }
    }

    pub async fn save(&self, uid: &str, answers: &Answers) -> Result<()> {
        fs::create_dir_all(&self.drafts_dir).await?;
        let content = serde_json::to_string_pretty(answers)?;
        fs::write(self.draft_path(uid), content).await?;
        Ok(())
    }

    pub async fn remove(&self, uid: &str) -> Result<()> {
        match fs::remove_file(self.draft_path(uid)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn draft_path(&self, uid: &str) -> PathBuf {
        let safe_id: String = uid
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.drafts_dir.join(format!("{}.json", safe_id))
    }
}

/// One visitor walking through the survey, section by section.
#[derive(Debug, Clone)]
pub struct SurveySession {
    schema: SurveySchema,
    /// Question ids per section, in display order.
    sections: Vec<(String, Vec<String>)>,
    answers: Answers,
    step: usize,
    errors: BTreeSet<String>,
}

impl SurveySession {
    pub fn new(schema: SurveySchema) -> Self {
        let sections = schema
            .sections()
            .into_iter()
            .map(|s| {
                (
                    s.title.to_string(),
                    s.questions.iter().map(|q| q.id.clone()).collect(),
                )
            })
            .collect();
        Self {
            schema,
            sections,
            answers: Answers::new(),
            step: 0,
            errors: BTreeSet::new(),
        }
    }

    /// Continue from saved answers. Unknown ids and invalid values are dropped.
    pub fn with_answers(mut self, answers: Answers) -> Self {
        for (id, value) in answers {
            if self.answer(&id, &value).is_err() {
                debug!("Dropping draft answer for {}", id);
            }
        }
        self
    }

    pub fn schema(&self) -> &SurveySchema {
        &self.schema
    }

    pub fn answers(&self) -> &Answers {
        &self.answers
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn is_last_section(&self) -> bool {
        self.step + 1 >= self.sections.len()
    }

    pub fn section_title(&self) -> &str {
        &self.sections[self.step].0
    }

    pub fn current_questions(&self) -> Vec<&Question> {
        self.sections[self.step]
            .1
            .iter()
            .filter_map(|id| self.schema.question(id))
            .collect()
    }

    /// Ids flagged by the last failed validation.
    pub fn errors(&self) -> &BTreeSet<String> {
        &self.errors
    }

    /// Set an answer. A blank value clears it.
    pub fn answer(&mut self, id: &str, value: &str) -> Result<()> {
        let question = self
            .schema
            .question(id)
            .ok_or_else(|| KioskError::Validation(format!("unknown question {id}")))?;
        let value = value.trim();
        if value.is_empty() {
            self.answers.remove(id);
            return Ok(());
        }
        if !question.accepts(value) {
            return Err(KioskError::Validation(format!(
                "invalid answer for {id}: {value}"
            )));
        }
        self.answers.insert(id.to_string(), value.to_string());
        self.errors.remove(id);
        Ok(())
    }

    fn is_answered(&self, id: &str) -> bool {
        self.answers.get(id).is_some_and(|v| !v.trim().is_empty())
    }

    /// Required questions of section `index` that have no answer yet.
    pub fn missing_in_section(&self, index: usize) -> Vec<String> {
        let Some((_, ids)) = self.sections.get(index) else {
            return Vec::new();
        };
        ids.iter()
            .filter(|id| {
                self.schema
                    .question(id)
                    .is_some_and(|q| q.is_required() && !self.is_answered(id))
            })
            .cloned()
            .collect()
    }

    /// Validate the current section and record the missing ids as errors.
    pub fn validate_section(&mut self) -> bool {
        let missing = self.missing_in_section(self.step);
        self.errors = missing.into_iter().collect();
        self.errors.is_empty()
    }

    /// Move forward when the current section is complete.
    pub fn next(&mut self) -> bool {
        if !self.validate_section() {
            return false;
        }
        self.step = (self.step + 1).min(self.sections.len().saturating_sub(1));
        true
    }

    pub fn prev(&mut self) {
        self.step = self.step.saturating_sub(1);
    }

    pub fn answered_required(&self) -> usize {
        self.schema
            .questions()
            .iter()
            .filter(|q| q.is_required() && self.is_answered(&q.id))
            .count()
    }

    pub fn total_required(&self) -> usize {
        self.schema.required_count()
    }

    /// Percentage of required questions answered, rounded.
    pub fn progress(&self) -> u8 {
        let total = self.total_required();
        if total == 0 {
            return 100;
        }
        ((self.answered_required() as f64 / total as f64) * 100.0).round() as u8
    }

    /// Validate the current section and store the response as completed.
    pub async fn submit(
        &mut self,
        store: &dyn DocumentStore,
        uid: &str,
    ) -> Result<SurveyResponse> {
        if !self.validate_section() {
            return Err(KioskError::Validation(format!(
                "missing answers: {}",
                self.errors.iter().cloned().collect::<Vec<_>>().join(", ")
            )));
        }

        let stored = store
            .append_response(NewResponse {
                uid: uid.to_string(),
                answers: self.answers.clone(),
                progress: 100,
                step: self.step,
                total_sections: self.sections.len(),
                completed: true,
            })
            .await?;
        info!(
            "Survey submitted: {} answers in {} sections",
            stored.answers.len(),
            stored.total_sections
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;
    use crate::store::JsonFileStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const SMALL: &str = r#"
        [[questions]]
        section = "Perfil"
        id = "1"
        text = "Rol"
        kind = "single_choice"
        options = ["Dev", "Manager"]

        [[questions]]
        section = "Perfil"
        id = "2"
        text = "Comentarios"
        kind = "long_text"

        [[questions]]
        section = "Bloque A"
        id = "A1"
        text = "Visión"
        kind = "likert_1_5"

        [[questions]]
        section = "Bloque A"
        id = "A2"
        text = "Recursos"
        kind = "likert_1_5"
    "#;

    fn small_session() -> SurveySession {
        SurveySession::new(SurveySchema::from_toml(SMALL).unwrap())
    }

    #[test]
    fn test_next_requires_section_answers() {
        let mut survey = small_session();
        assert_eq!(survey.section_count(), 2);
        assert!(!survey.next());
        assert_eq!(survey.errors().iter().collect::<Vec<_>>(), vec!["1"]);

        survey.answer("1", "Dev").unwrap();
        assert!(survey.errors().is_empty());
        assert!(survey.next());
        assert_eq!(survey.step(), 1);
        assert_eq!(survey.section_title(), "Bloque A");
        assert!(survey.is_last_section());

        survey.prev();
        survey.prev();
        assert_eq!(survey.step(), 0);
    }

    #[test]
    fn test_invalid_answers_rejected() {
        let mut survey = small_session();
        assert!(survey.answer("A1", "7").is_err());
        assert!(survey.answer("1", "CEO").is_err());
        assert!(survey.answer("Z9", "1").is_err());
        survey.answer("2", "anything goes").unwrap();
        survey.answer("2", "   ").unwrap();
        assert!(survey.answers().get("2").is_none());
    }

    #[test]
    fn test_progress_counts_required_only() {
        let mut survey = small_session();
        assert_eq!(survey.total_required(), 3);
        assert_eq!(survey.progress(), 0);
        survey.answer("2", "free text").unwrap();
        assert_eq!(survey.progress(), 0);
        survey.answer("1", "Manager").unwrap();
        assert_eq!(survey.progress(), 33);
        survey.answer("A1", "4").unwrap();
        assert_eq!(survey.progress(), 67);
        survey.answer("A2", "5").unwrap();
        assert_eq!(survey.progress(), 100);
    }

    #[test]
    fn test_with_answers_drops_invalid() {
        let mut draft = Answers::new();
        draft.insert("1".to_string(), "Dev".to_string());
        draft.insert("A1".to_string(), "9".to_string());
        draft.insert("gone".to_string(), "x".to_string());
        let survey = small_session().with_answers(draft);
        assert_eq!(survey.answers().len(), 1);
    }

    #[tokio::test]
    async fn test_submit_stores_completed_response() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let mut survey = small_session();
        survey.answer("1", "Dev").unwrap();
        assert!(survey.next());

        assert!(survey.submit(&store, "uid-1").await.is_err());
        assert_eq!(survey.errors().len(), 2);

        survey.answer("A1", "3").unwrap();
        survey.answer("A2", "3").unwrap();
        let stored = survey.submit(&store, "uid-1").await.unwrap();
        assert!(stored.completed);
        assert_eq!(stored.progress, 100);
        assert_eq!(stored.step, 1);
        assert_eq!(stored.total_sections, 2);
        assert_eq!(store.response_ids_for("uid-1", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_drafts_round_trip() {
        let dir = TempDir::new().unwrap();
        let drafts = DraftStore::new(dir.path());
        assert!(drafts.load("u/1").await.is_empty());

        let mut answers = Answers::new();
        answers.insert("A1".to_string(), "2".to_string());
        drafts.save("u/1", &answers).await.unwrap();
        assert!(dir.path().join("drafts").join("u_1.json").exists());
        assert_eq!(drafts.load("u/1").await, answers);

        drafts.remove("u/1").await.unwrap();
        drafts.remove("u/1").await.unwrap();
        assert!(drafts.load("u/1").await.is_empty());
    }

    fn answer_first_choices(survey: &mut SurveySession) {
        let picks: Vec<(String, String)> = survey
            .current_questions()
            .iter()
            .map(|q| (q.id.clone(), q.choices()[0].to_string()))
            .collect();
        for (id, value) in picks {
            survey.answer(&id, &value).unwrap();
        }
    }

    #[test]
    fn test_bundled_survey_walkthrough() {
        let mut survey = SurveySession::new(SurveySchema::for_locale(Locale::En).unwrap());
        while !survey.is_last_section() {
            answer_first_choices(&mut survey);
            assert!(survey.next());
        }
        answer_first_choices(&mut survey);
        assert!(survey.validate_section());
        assert_eq!(survey.progress(), 100);
    }
}
