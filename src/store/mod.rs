//! Document store collaborator: visitor profiles and survey responses.
//!
//! Profiles are keyed by session uid and written with merge semantics.
//! Responses are append-only and listed newest first through a cursor.

mod json_file;

pub use json_file::{JsonFileStore, STORE_FILE};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::Result;

/// Question id to answer text.
pub type Answers = BTreeMap<String, String>;

/// Fields collected by the welcome form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInput {
    pub name: String,
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub short_id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Survey submission before the store assigns id and timestamps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewResponse {
    pub uid: String,
    pub answers: Answers,
    pub progress: u8,
    pub step: usize,
    pub total_sections: usize,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResponse {
    pub id: String,
    pub uid: String,
    #[serde(default)]
    pub answers: Answers,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub step: usize,
    #[serde(default)]
    pub total_sections: usize,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Position after which the next page of responses starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseCursor {
    pub created_at: DateTime<Utc>,
    pub id: String,
}

impl From<&SurveyResponse> for ResponseCursor {
    fn from(response: &SurveyResponse) -> Self {
        Self {
            created_at: response.created_at,
            id: response.id.clone(),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or merge the profile for `uid`. An existing `created_at` is kept.
    async fn upsert_profile(&self, uid: &str, input: ProfileInput) -> Result<UserProfile>;

    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>>;

    async fn list_profiles(&self) -> Result<Vec<UserProfile>>;

    async fn append_response(&self, response: NewResponse) -> Result<SurveyResponse>;

    /// Responses ordered by `created_at` descending, starting after `cursor`.
    async fn page_responses(
        &self,
        cursor: Option<&ResponseCursor>,
        limit: usize,
    ) -> Result<Vec<SurveyResponse>>;

    /// Up to `limit` response ids belonging to `uid`.
    async fn response_ids_for(&self, uid: &str, limit: usize) -> Result<Vec<String>>;

    /// Returns whether a profile existed.
    async fn delete_profile(&self, uid: &str) -> Result<bool>;

    /// Batch delete. Returns how many records were removed.
    async fn delete_responses(&self, ids: &[String]) -> Result<usize>;
}
