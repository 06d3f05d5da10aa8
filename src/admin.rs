//! Administrative dashboard operations over the document store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::auth::short_id;
use crate::store::{DocumentStore, ResponseCursor, SurveyResponse, UserProfile};
use crate::survey::SurveySchema;
use crate::Result;

pub const PAGE_SIZE: usize = 50;
pub const DELETE_BATCH: usize = 250;

const BASE_COLUMNS: [&str; 8] = [
    "uid",
    "shortId",
    "name",
    "email",
    "role",
    "createdAt",
    "completed",
    "progress",
];

/// Everything known about one visitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub uid: String,
    pub profile: Option<UserProfile>,
    /// Newest first.
    pub responses: Vec<SurveyResponse>,
    pub latest_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteSummary {
    pub profile_deleted: bool,
    pub responses_deleted: usize,
}

pub struct AdminDashboard {
    store: Arc<dyn DocumentStore>,
    profiles: BTreeMap<String, UserProfile>,
    responses: Vec<SurveyResponse>,
    cursor: Option<ResponseCursor>,
    has_more: bool,
}

impl AdminDashboard {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            profiles: BTreeMap::new(),
            responses: Vec::new(),
            cursor: None,
            has_more: true,
        }
    }

    pub fn profiles(&self) -> impl Iterator<Item = &UserProfile> {
        self.profiles.values()
    }

    /// Responses loaded so far, newest first.
    pub fn responses(&self) -> &[SurveyResponse] {
        &self.responses
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Reload profiles and the first page of responses.
    pub async fn refresh(&mut self) -> Result<()> {
        let (profiles, page) = futures::try_join!(
            self.store.list_profiles(),
            self.store.page_responses(None, PAGE_SIZE),
        )?;
        self.profiles = profiles.into_iter().map(|p| (p.uid.clone(), p)).collect();
        self.responses.clear();
        self.cursor = None;
        self.absorb(page);
        info!(
            "Dashboard loaded {} profiles, {} responses",
            self.profiles.len(),
            self.responses.len()
        );
        Ok(())
    }

    /// Fetch the next page. Returns how many responses were added.
    pub async fn load_more(&mut self) -> Result<usize> {
        if !self.has_more {
            return Ok(0);
        }
        let page = self
            .store
            .page_responses(self.cursor.as_ref(), PAGE_SIZE)
            .await?;
        Ok(self.absorb(page))
    }

    /// Refresh, then keep paging until the store runs out.
    pub async fn load_all(&mut self) -> Result<()> {
        self.refresh().await?;
        while self.has_more {
            self.load_more().await?;
        }
        Ok(())
    }

    fn absorb(&mut self, page: Vec<SurveyResponse>) -> usize {
        self.has_more = page.len() == PAGE_SIZE;
        if let Some(last) = page.last() {
            self.cursor = Some(ResponseCursor::from(last));
        }
        let added = page.len();
        self.responses.extend(page);
        debug!("Loaded {} responses (more: {})", added, self.has_more);
        added
    }

    /// Profiles and respondents merged per uid, most recent activity first.
    pub fn grouped_users(&self) -> Vec<UserRow> {
        let mut rows: BTreeMap<&str, UserRow> = self
            .profiles
            .values()
            .map(|p| {
                (
                    p.uid.as_str(),
                    UserRow {
                        uid: p.uid.clone(),
                        profile: Some(p.clone()),
                        responses: Vec::new(),
                        latest_at: None,
                    },
                )
            })
            .collect();

        for r in &self.responses {
            let row = rows.entry(r.uid.as_str()).or_insert_with(|| UserRow {
                uid: r.uid.clone(),
                profile: None,
                responses: Vec::new(),
                latest_at: None,
            });
            row.responses.push(r.clone());
            if row.latest_at.map_or(true, |t| r.created_at > t) {
                row.latest_at = Some(r.created_at);
            }
        }

        let mut rows: Vec<UserRow> = rows.into_values().collect();
        for row in &mut rows {
            if row.latest_at.is_none() {
                row.latest_at = row.profile.as_ref().map(|p| p.updated_at);
            }
            row.responses.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        rows.sort_by(|a, b| b.latest_at.cmp(&a.latest_at));
        rows
    }

    /// One row per loaded response plus a header row.
    pub fn export_csv(&self, schema: &SurveySchema) -> String {
        let mut header: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(schema.questions().iter().map(|q| q.label()));

        let mut out = csv_line(&header);
        for r in &self.responses {
            let profile = self.profiles.get(&r.uid);
            let mut cells = vec![
                r.uid.clone(),
                profile
                    .map(|p| p.short_id.clone())
                    .unwrap_or_else(|| short_id(&r.uid)),
                profile.map(|p| p.name.clone()).unwrap_or_default(),
                profile.map(|p| p.email.clone()).unwrap_or_default(),
                profile.map(|p| p.role.clone()).unwrap_or_default(),
                r.created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                r.completed.to_string(),
                r.progress.to_string(),
            ];
            cells.extend(
                schema
                    .questions()
                    .iter()
                    .map(|q| r.answers.get(&q.id).cloned().unwrap_or_default()),
            );
            out.push_str(&csv_line(&cells));
        }
        out
    }

    /// Write the export as `surveys_<timestamp>.csv` inside `dir`.
    pub async fn write_csv(&self, dir: &Path, schema: &SurveySchema) -> Result<PathBuf> {
        fs::create_dir_all(dir).await?;
        let name = format!("surveys_{}.csv", Utc::now().format("%Y-%m-%dT%H-%M-%S"));
        let path = dir.join(name);
        fs::write(&path, self.export_csv(schema)).await?;
        info!(
            "Exported {} responses to {}",
            self.responses.len(),
            path.display()
        );
        Ok(path)
    }

    /// Remove a visitor's profile and every response they submitted.
    ///
    /// A failing profile delete is logged and the responses are still removed.
    pub async fn delete_user(&mut self, uid: &str) -> Result<DeleteSummary> {
        let mut summary = DeleteSummary::default();
        match self.store.delete_profile(uid).await {
            Ok(existed) => summary.profile_deleted = existed,
            Err(e) => warn!("Could not delete profile {}: {}", short_id(uid), e),
        }

        loop {
            let ids = self.store.response_ids_for(uid, DELETE_BATCH).await?;
            if ids.is_empty() {
                break;
            }
            summary.responses_deleted += self.store.delete_responses(&ids).await?;
            if ids.len() < DELETE_BATCH {
                break;
            }
        }

        self.profiles.remove(uid);
        self.responses.retain(|r| r.uid != uid);
        info!(
            "Deleted user {} (profile: {}, responses: {})",
            short_id(uid),
            summary.profile_deleted,
            summary.responses_deleted
        );
        Ok(summary)
    }
}

fn csv_cell(value: &str) -> String {
    let flat = value.replace("\r\n", " ").replace(['\n', '\r'], " ");
    format!("\"{}\"", flat.replace('"', "\"\""))
}

fn csv_line(cells: &[String]) -> String {
    let mut line = cells
        .iter()
        .map(|c| csv_cell(c))
        .collect::<Vec<_>>()
        .join(",");
    line.push('\n');
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locale::Locale;
    use crate::store::{Answers, JsonFileStore, NewResponse, ProfileInput};
    use crate::KioskError;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    fn survey_response(uid: &str, a1: &str) -> NewResponse {
        let mut answers = Answers::new();
        answers.insert("1".to_string(), "Manager".to_string());
        answers.insert("A1".to_string(), a1.to_string());
        NewResponse {
            uid: uid.to_string(),
            answers,
            progress: 100,
            step: 6,
            total_sections: 7,
            completed: true,
        }
    }

    async fn seeded() -> (TempDir, Arc<JsonFileStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        store
            .upsert_profile(
                "alice-uid-000",
                ProfileInput {
                    name: "Alice \"Al\"".to_string(),
                    email: "alice@example.com".to_string(),
                    role: "CTO".to_string(),
                },
            )
            .await
            .unwrap();
        store
            .upsert_profile(
                "carol-uid-000",
                ProfileInput {
                    name: "Carol".to_string(),
                    email: "carol@example.com".to_string(),
                    role: "Dev".to_string(),
                },
            )
            .await
            .unwrap();
        for (uid, a1) in [("alice-uid-000", "4"), ("bob-uid-0000", "2"), ("alice-uid-000", "5")] {
            store.append_response(survey_response(uid, a1)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(3)).await;
        }
        (dir, store)
    }

    #[test]
    fn test_csv_quoting() {
        assert_eq!(csv_cell("plain"), "\"plain\"");
        assert_eq!(csv_cell("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_cell("two\nlines\r\nhere"), "\"two lines here\"");
    }

    #[tokio::test]
    async fn test_grouped_users() {
        let (_dir, store) = seeded().await;
        let mut dashboard = AdminDashboard::new(store);
        dashboard.refresh().await.unwrap();
        assert!(!dashboard.has_more());

        let rows = dashboard.grouped_users();
        let uids: Vec<_> = rows.iter().map(|r| r.uid.as_str()).collect();
        assert_eq!(uids, vec!["alice-uid-000", "bob-uid-0000", "carol-uid-000"]);
        assert_eq!(rows[0].responses.len(), 2);
        assert_eq!(rows[0].responses[0].answers["A1"], "5");
        assert!(rows[1].profile.is_none());
        assert!(rows[2].responses.is_empty());
        assert_eq!(rows[2].latest_at, rows[2].profile.as_ref().map(|p| p.updated_at));
    }

    #[tokio::test]
    async fn test_export_shape() {
        let (_dir, store) = seeded().await;
        let schema = SurveySchema::for_locale(Locale::Es).unwrap();
        let mut dashboard = AdminDashboard::new(store);
        dashboard.refresh().await.unwrap();

        let csv = dashboard.export_csv(&schema);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3 + 1);

        let columns = BASE_COLUMNS.len() + schema.questions().len();
        for line in &lines {
            assert!(line.starts_with('"') && line.ends_with('"'));
            assert_eq!(line.split("\",\"").count(), columns);
        }
        assert!(lines[0].contains("\"[A1] Existe una visión clara"));
        assert!(csv.contains("\"Alice \"\"Al\"\"\""));
        assert!(lines[2].starts_with("\"bob-uid-0000\",\"bob-uid-\",\"\""));
    }

    #[tokio::test]
    async fn test_write_csv() {
        let (dir, store) = seeded().await;
        let schema = SurveySchema::for_locale(Locale::En).unwrap();
        let mut dashboard = AdminDashboard::new(store);
        dashboard.refresh().await.unwrap();

        let path = dashboard.write_csv(&dir.path().join("out"), &schema).await.unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("surveys_") && name.ends_with(".csv"));
        assert_eq!(std::fs::read_to_string(path).unwrap().lines().count(), 4);
    }

    #[tokio::test]
    async fn test_load_more_pages() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(JsonFileStore::open(dir.path()).await.unwrap());
        for i in 0..(PAGE_SIZE + 5) {
            store
                .append_response(survey_response(&format!("u{i}"), "3"))
                .await
                .unwrap();
        }
        let mut dashboard = AdminDashboard::new(store);
        dashboard.refresh().await.unwrap();
        assert_eq!(dashboard.responses().len(), PAGE_SIZE);
        assert!(dashboard.has_more());
        assert_eq!(dashboard.load_more().await.unwrap(), 5);
        assert!(!dashboard.has_more());
        assert_eq!(dashboard.load_more().await.unwrap(), 0);

        dashboard.load_all().await.unwrap();
        assert_eq!(dashboard.responses().len(), PAGE_SIZE + 5);
    }

    /// Store whose profile deletes always fail, counting batch deletes.
    struct FlakyProfiles {
        inner: JsonFileStore,
        batches: AtomicUsize,
    }

    #[async_trait]
    impl DocumentStore for FlakyProfiles {
        async fn upsert_profile(&self, uid: &str, input: ProfileInput) -> Result<UserProfile> {
            self.inner.upsert_profile(uid, input).await
        }
        async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
            self.inner.get_profile(uid).await
        }
        async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
            self.inner.list_profiles().await
        }
        async fn append_response(&self, response: NewResponse) -> Result<SurveyResponse> {
            self.inner.append_response(response).await
        }
        async fn page_responses(
            &self,
            cursor: Option<&ResponseCursor>,
            limit: usize,
        ) -> Result<Vec<SurveyResponse>> {
            self.inner.page_responses(cursor, limit).await
        }
        async fn response_ids_for(&self, uid: &str, limit: usize) -> Result<Vec<String>> {
            self.inner.response_ids_for(uid, limit).await
        }
        async fn delete_profile(&self, _uid: &str) -> Result<bool> {
            Err(KioskError::Store("permission denied".to_string()))
        }
        async fn delete_responses(&self, ids: &[String]) -> Result<usize> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.inner.delete_responses(ids).await
        }
    }

    #[tokio::test]
    async fn test_delete_user_batches_and_tolerates_profile_failure() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FlakyProfiles {
            inner: JsonFileStore::open(dir.path()).await.unwrap(),
            batches: AtomicUsize::new(0),
        });
        for _ in 0..(DELETE_BATCH + 1) {
            store.append_response(survey_response("target", "1")).await.unwrap();
        }
        store.append_response(survey_response("other", "1")).await.unwrap();

        let mut dashboard = AdminDashboard::new(store.clone());
        dashboard.refresh().await.unwrap();
        let summary = dashboard.delete_user("target").await.unwrap();

        assert!(!summary.profile_deleted);
        assert_eq!(summary.responses_deleted, DELETE_BATCH + 1);
        assert_eq!(store.batches.load(Ordering::SeqCst), 2);
        assert!(dashboard.responses().iter().all(|r| r.uid == "other"));
        assert_eq!(store.response_ids_for("other", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_user_removes_profile() {
        let (_dir, store) = seeded().await;
        let mut dashboard = AdminDashboard::new(store.clone());
        dashboard.refresh().await.unwrap();
        let summary = dashboard.delete_user("alice-uid-000").await.unwrap();
        assert!(summary.profile_deleted);
        assert_eq!(summary.responses_deleted, 2);
        assert!(store.get_profile("alice-uid-000").await.unwrap().is_none());
        assert_eq!(dashboard.grouped_users().len(), 2);
    }
}
