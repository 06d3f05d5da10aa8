//! Kiosko - kiosk session engine
//!
//! Runs an unattended visitor kiosk:
//! - Welcome form and a multi-section digital maturity survey
//! - A retrieval-backed chat agent with follow-up suggestions
//! - A success-story gallery
//! - Inactivity timeouts that sign the visitor out and start over
//! - Admin listing, CSV export and deletion of stored visitors

pub mod admin;
pub mod auth;
pub mod chat;
pub mod config;
pub mod followup;
pub mod idle;
pub mod kiosk;
pub mod locale;
pub mod rag;
pub mod store;
pub mod survey;

pub use admin::AdminDashboard;
pub use auth::{AuthProvider, LocalAnonymousAuth, SessionIdentity};
pub use chat::{ChatMessage, ChatMode, ChatSession};
pub use config::KioskConfig;
pub use followup::{parse_answer, FollowUpOption, FollowUpPack, ParsedAnswer};
pub use idle::{ActivityHub, ActivityKind, IdleController, IdleExit, IdleGuard, IdlePolicy};
pub use kiosk::{KioskApp, KioskServices, View};
pub use locale::Locale;
pub use rag::{RagClient, RagRequest, RagResponse, RetrievalBackend};
pub use store::{DocumentStore, JsonFileStore};
pub use survey::{SurveySchema, SurveySession};

/// Result type for Kiosko operations
pub type Result<T> = std::result::Result<T, KioskError>;

/// Errors that can occur in Kiosko
#[derive(Debug, thiserror::Error)]
pub enum KioskError {
    #[error("RAG service URL is not configured")]
    MissingRagUrl,

    #[error("Retrieval error: {0}")]
    Retrieval(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),
}
