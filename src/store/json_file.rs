use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    DocumentStore, NewResponse, ProfileInput, ResponseCursor, SurveyResponse, UserProfile,
};
use crate::auth::short_id;
use crate::{KioskError, Result};

pub const STORE_FILE: &str = "store.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    profiles: BTreeMap<String, UserProfile>,
    #[serde(default)]
    responses: Vec<SurveyResponse>,
}

/// Both collections in one JSON document, cached in memory.
///
/// Every write builds the next state, persists it through a temporary file
/// and a rename, and only then replaces the cached copy.
pub struct JsonFileStore {
    path: PathBuf,
    data: RwLock<StoreData>,
}

impl JsonFileStore {
    /// Open `<data_dir>/store.json`, starting empty when it does not exist.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        Self::open_path(data_dir.join(STORE_FILE)).await
    }

    pub async fn open_path(path: PathBuf) -> Result<Self> {
        let data = match fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => StoreData::default(),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| KioskError::Store(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreData::default(),
            Err(e) => return Err(e.into()),
        };
        info!(
            "Opened store {} ({} profiles, {} responses)",
            path.display(),
            data.profiles.len(),
            data.responses.len()
        );
        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, data: &StoreData) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(data)?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&tmp_path, &self.path).await?;
        debug!("Store saved to {}", self.path.display());
        Ok(())
    }

    /// Apply `f` to a copy of the data and commit it once it is on disk.
    async fn update<T>(&self, f: impl FnOnce(&mut StoreData) -> T) -> Result<T> {
        let mut guard = self.data.write().await;
        let mut next = guard.clone();
        let out = f(&mut next);
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }

    fn sorted_desc(responses: &[SurveyResponse]) -> Vec<&SurveyResponse> {
        let mut sorted: Vec<&SurveyResponse> = responses.iter().collect();
        sorted.sort_by_key(|r| Reverse((r.created_at, r.id.clone())));
        sorted
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn upsert_profile(&self, uid: &str, input: ProfileInput) -> Result<UserProfile> {
        if uid.trim().is_empty() {
            return Err(KioskError::Store("profile uid is empty".to_string()));
        }
        self.update(|data| {
            let now = Utc::now();
            let created_at = data
                .profiles
                .get(uid)
                .map(|existing| existing.created_at)
                .unwrap_or(now);
            let profile = UserProfile {
                uid: uid.to_string(),
                short_id: short_id(uid),
                name: input.name,
                email: input.email,
                role: input.role,
                created_at,
                updated_at: now,
            };
            data.profiles.insert(uid.to_string(), profile.clone());
            profile
        })
        .await
    }

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        Ok(self.data.read().await.profiles.get(uid).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<UserProfile>> {
        Ok(self.data.read().await.profiles.values().cloned().collect())
    }

    async fn append_response(&self, response: NewResponse) -> Result<SurveyResponse> {
        let now = Utc::now();
        let record = SurveyResponse {
            id: uuid::Uuid::new_v4().simple().to_string(),
            uid: response.uid,
            answers: response.answers,
            progress: response.progress.min(100),
            step: response.step,
            total_sections: response.total_sections,
            completed: response.completed,
            created_at: now,
            updated_at: now,
        };
        let stored = record.clone();
        self.update(move |data| data.responses.push(record)).await?;
        debug!("Stored response {} for {}", stored.id, short_id(&stored.uid));
        Ok(stored)
    }

    async fn page_responses(
        &self,
        cursor: Option<&ResponseCursor>,
        limit: usize,
    ) -> Result<Vec<SurveyResponse>> {
        let data = self.data.read().await;
        Ok(Self::sorted_desc(&data.responses)
            .into_iter()
            .filter(|r| match cursor {
                Some(c) => (r.created_at, r.id.as_str()) < (c.created_at, c.id.as_str()),
                None => true,
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn response_ids_for(&self, uid: &str, limit: usize) -> Result<Vec<String>> {
        let data = self.data.read().await;
        Ok(Self::sorted_desc(&data.responses)
            .into_iter()
            .filter(|r| r.uid == uid)
            .take(limit)
            .map(|r| r.id.clone())
            .collect())
    }

    async fn delete_profile(&self, uid: &str) -> Result<bool> {
        if !self.data.read().await.profiles.contains_key(uid) {
            return Ok(false);
        }
        self.update(|data| data.profiles.remove(uid).is_some()).await
    }

    async fn delete_responses(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        self.update(|data| {
            let before = data.responses.len();
            data.responses.retain(|r| !ids.contains(r.id.as_str()));
            before - data.responses.len()
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Answers;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tempfile::TempDir;

    fn input(name: &str) -> ProfileInput {
        ProfileInput {
            name: name.to_string(),
            email: format!("{name}@example.com"),
            role: "Dev".to_string(),
        }
    }

    fn response(uid: &str) -> NewResponse {
        let mut answers = Answers::new();
        answers.insert("q1".to_string(), "Sí".to_string());
        NewResponse {
            uid: uid.to_string(),
            answers,
            progress: 100,
            step: 2,
            total_sections: 3,
            completed: true,
        }
    }

    async fn append_spaced(store: &JsonFileStore, uid: &str) -> SurveyResponse {
        let stored = store.append_response(response(uid)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3)).await;
        stored
    }

    #[tokio::test]
    async fn test_upsert_keeps_created_at() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();

        let first = store.upsert_profile("abcdefghij", input("ana")).await.unwrap();
        assert_eq!(first.short_id, "abcdefgh");
        tokio::time::sleep(Duration::from_millis(3)).await;

        let second = store.upsert_profile("abcdefghij", input("ana maria")).await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(second.name, "ana maria");
        assert_eq!(store.list_profiles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_uid_rejected() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        tokio_test::assert_err!(store.upsert_profile(" ", input("x")).await);
        tokio_test::assert_ok!(store.upsert_profile("u1", input("x")).await);
    }

    #[tokio::test]
    async fn test_data_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = JsonFileStore::open(dir.path()).await.unwrap();
            store.upsert_profile("u1", input("ana")).await.unwrap();
            store.append_response(response("u1")).await.unwrap();
        }
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        assert!(store.get_profile("u1").await.unwrap().is_some());
        assert_eq!(store.page_responses(None, 10).await.unwrap().len(), 1);
        assert!(!dir.path().join("store.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_pagination_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(append_spaced(&store, &format!("u{i}")).await.id);
        }
        ids.reverse();

        let first = store.page_responses(None, 2).await.unwrap();
        let cursor = ResponseCursor::from(first.last().unwrap());
        let second = store.page_responses(Some(&cursor), 2).await.unwrap();
        let cursor = ResponseCursor::from(second.last().unwrap());
        let third = store.page_responses(Some(&cursor), 2).await.unwrap();

        let paged: Vec<_> = first
            .iter()
            .chain(&second)
            .chain(&third)
            .map(|r| r.id.clone())
            .collect();
        assert_eq!(paged, ids);
        assert_eq!(third.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_uid() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).await.unwrap();
        store.upsert_profile("u1", input("ana")).await.unwrap();
        for _ in 0..3 {
            append_spaced(&store, "u1").await;
        }
        append_spaced(&store, "u2").await;

        let ids = store.response_ids_for("u1", 2).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(store.delete_responses(&ids).await.unwrap(), 2);
        assert_eq!(store.response_ids_for("u1", 10).await.unwrap().len(), 1);

        assert!(store.delete_profile("u1").await.unwrap());
        assert!(!store.delete_profile("u1").await.unwrap());
        assert_eq!(store.delete_responses(&[]).await.unwrap(), 0);
        assert_eq!(store.response_ids_for("u2", 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(STORE_FILE), "{ nope").unwrap();
        let err = JsonFileStore::open(dir.path()).await.err().unwrap();
        assert!(matches!(err, KioskError::Store(_)));
    }

    #[test]
    fn test_response_wire_names() {
        let now = Utc::now();
        let record = SurveyResponse {
            id: "r1".to_string(),
            uid: "u1".to_string(),
            answers: Answers::new(),
            progress: 100,
            step: 1,
            total_sections: 3,
            completed: true,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["totalSections"], 3);
        assert!(json.get("createdAt").is_some());
    }
}
