//! Kiosk configuration.
//!
//! Resolution order: built-in defaults, then `<home>/config.toml`, then the
//! `KIOSKO_RAG_URL` environment variable, then command-line flags. The
//! resulting [`KioskConfig`] is handed to each collaborator explicitly.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::followup::PromptTemplate;
use crate::idle::{ActivityKind, IdlePolicy};
use crate::kiosk::{default_cases, CaseStudy};
use crate::locale::Locale;
use crate::rag::{DEFAULT_REQUEST_TIMEOUT, DEFAULT_TOP_K};
use crate::{KioskError, Result};

/// Directory under the user's home holding config and data.
pub const CONFIG_DIR: &str = ".kiosko";
pub const CONFIG_FILE: &str = "config.toml";
pub const HOME_ENV: &str = "KIOSKO_HOME";
pub const RAG_URL_ENV: &str = "KIOSKO_RAG_URL";

/// Delay before the anonymity notice moves on to the survey.
pub const DEFAULT_INTRO_DELAY: Duration = Duration::from_secs(5);

/// Configuration for a kiosk run
#[derive(Debug, Clone)]
pub struct KioskConfig {
    /// Directory holding `config.toml`, the session file, the store and drafts
    pub home: PathBuf,

    /// Base URL of the retrieval service; `/query` is appended
    pub rag_url: Option<String>,

    pub locale: Locale,

    /// Number of passages requested per query
    pub top_k: u32,

    pub request_timeout: Duration,

    /// Idle policy of the agent and usage chats
    pub chat_idle: IdlePolicy,

    /// Idle policy of the case-study gallery
    pub cases_idle: IdlePolicy,

    pub intro_delay: Duration,

    /// Prompt template overrides per locale
    pub prompt_es: Option<String>,
    pub prompt_en: Option<String>,

    pub cases: Vec<CaseStudy>,
}

impl KioskConfig {
    pub fn new(home: PathBuf) -> Self {
        Self {
            home,
            rag_url: None,
            locale: Locale::default(),
            top_k: DEFAULT_TOP_K,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            chat_idle: IdlePolicy::strict(),
            cases_idle: IdlePolicy::strict(),
            intro_delay: DEFAULT_INTRO_DELAY,
            prompt_es: None,
            prompt_en: None,
            cases: default_cases(),
        }
    }

    /// Defaults, the config file under `home` and the environment.
    pub async fn load(home: PathBuf) -> Self {
        Self::load_file(home)
            .await
            .with_env_overrides(std::env::var(RAG_URL_ENV).ok())
    }

    /// Defaults merged with `<home>/config.toml`.
    ///
    /// A missing file is normal; an unreadable or invalid one is logged and
    /// ignored so the kiosk still starts.
    pub async fn load_file(home: PathBuf) -> Self {
        let config_file = home.join(CONFIG_FILE);
        let config = Self::new(home);

        let content = match tokio::fs::read_to_string(&config_file).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No config file at {}", config_file.display());
                return config;
            }
            Err(e) => {
                warn!("Cannot read {}: {}", config_file.display(), e);
                return config;
            }
        };

        match config.clone().merge_toml(&content) {
            Ok(merged) => {
                debug!("Loaded config from {}", config_file.display());
                merged
            }
            Err(e) => {
                warn!("Ignoring invalid config {}: {}", config_file.display(), e);
                config
            }
        }
    }

    /// Apply the settings found in a `config.toml` document.
    pub fn merge_toml(mut self, content: &str) -> Result<Self> {
        let file: ConfigToml = toml::from_str(content)?;

        if let Some(url) = file.rag_url {
            self.rag_url = normalize_url(&url);
        }
        if let Some(locale) = file.locale {
            self.locale = locale;
        }
        if let Some(k) = file.top_k {
            if k == 0 {
                return Err(KioskError::Config("top_k must be at least 1".to_string()));
            }
            self.top_k = k;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = file.intro_delay_secs {
            self.intro_delay = Duration::from_secs(secs);
        }
        if let Some(chat) = file.idle.chat {
            self.chat_idle = chat.into_policy(self.chat_idle)?;
        }
        if let Some(cases) = file.idle.cases {
            self.cases_idle = cases.into_policy(self.cases_idle)?;
        }
        if file.prompts.es.is_some() {
            self.prompt_es = file.prompts.es;
        }
        if file.prompts.en.is_some() {
            self.prompt_en = file.prompts.en;
        }
        if let Some(cases) = file.cases {
            self.cases = cases;
        }
        Ok(self)
    }

    /// Apply `KIOSKO_RAG_URL` when it is set and not blank.
    pub fn with_env_overrides(mut self, rag_url: Option<String>) -> Self {
        if let Some(url) = rag_url.as_deref().and_then(normalize_url) {
            self.rag_url = Some(url);
        }
        self
    }

    pub fn with_rag_url(mut self, url: Option<String>) -> Self {
        if let Some(url) = url.as_deref().and_then(normalize_url) {
            self.rag_url = Some(url);
        }
        self
    }

    pub fn with_locale(mut self, locale: Locale) -> Self {
        self.locale = locale;
        self
    }

    pub fn with_chat_idle(mut self, policy: IdlePolicy) -> Self {
        self.chat_idle = policy;
        self
    }

    pub fn with_cases_idle(mut self, policy: IdlePolicy) -> Self {
        self.cases_idle = policy;
        self
    }

    pub fn with_intro_delay(mut self, delay: Duration) -> Self {
        self.intro_delay = delay;
        self
    }

    pub fn config_file(&self) -> PathBuf {
        self.home.join(CONFIG_FILE)
    }

    /// Where the session, store and drafts live.
    pub fn data_dir(&self) -> &Path {
        &self.home
    }

    /// Prompt template for `locale`, honoring configured overrides.
    pub fn prompt_template(&self, locale: Locale) -> PromptTemplate {
        let custom = match locale {
            Locale::Es => self.prompt_es.as_deref(),
            Locale::En => self.prompt_en.as_deref(),
        };
        match custom {
            Some(template) if !template.trim().is_empty() => PromptTemplate::new(template),
            _ => PromptTemplate::for_locale(locale),
        }
    }
}

/// Pick the kiosk home: `--home`, then `KIOSKO_HOME`, then `~/.kiosko`.
pub fn resolve_home(cli: Option<PathBuf>) -> Result<PathBuf> {
    resolve_home_from(cli, std::env::var(HOME_ENV).ok())
}

fn resolve_home_from(cli: Option<PathBuf>, env_home: Option<String>) -> Result<PathBuf> {
    if let Some(home) = cli {
        return Ok(home);
    }
    if let Some(home) = env_home.filter(|h| !h.trim().is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| KioskError::Config("Could not find home directory".to_string()))?;
    Ok(home.join(CONFIG_DIR))
}

fn normalize_url(url: &str) -> Option<String> {
    let url = url.trim().trim_end_matches('/');
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

/// Structure of `config.toml`
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigToml {
    rag_url: Option<String>,
    locale: Option<Locale>,
    top_k: Option<u32>,
    request_timeout_secs: Option<u64>,
    intro_delay_secs: Option<u64>,
    idle: IdleSection,
    prompts: PromptSection,
    cases: Option<Vec<CaseStudy>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdleSection {
    chat: Option<IdleSettings>,
    cases: Option<IdleSettings>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PromptSection {
    es: Option<String>,
    en: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum IdlePreset {
    Strict,
    Permissive,
    Flat,
}

/// `[idle.chat]` / `[idle.cases]`: a preset plus individual overrides.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IdleSettings {
    preset: Option<IdlePreset>,
    grace_secs: Option<u64>,
    warn_secs: Option<u64>,
    events: Option<Vec<ActivityKind>>,
    pause_while_pending: Option<bool>,
}

impl IdleSettings {
    fn into_policy(self, current: IdlePolicy) -> Result<IdlePolicy> {
        let mut policy = match self.preset {
            Some(IdlePreset::Strict) => IdlePolicy::strict(),
            Some(IdlePreset::Permissive) => IdlePolicy::permissive(),
            Some(IdlePreset::Flat) => {
                IdlePolicy::flat(self.warn_secs.unwrap_or(current.warn.as_secs()))
            }
            None => current,
        };
        if let Some(secs) = self.grace_secs {
            policy = policy.with_grace(Duration::from_secs(secs));
        }
        if let Some(secs) = self.warn_secs {
            policy = policy.with_warn(Duration::from_secs(secs));
        }
        if let Some(events) = self.events {
            policy = policy.with_events(events);
        }
        if let Some(pause) = self.pause_while_pending {
            policy = policy.with_pause_while_pending(pause);
        }
        if policy.grace.is_zero() && policy.warn.is_zero() {
            return Err(KioskError::Config(
                "idle grace and warn cannot both be zero".to_string(),
            ));
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = KioskConfig::new(PathBuf::from("/tmp/kiosko"));
        assert_eq!(config.rag_url, None);
        assert_eq!(config.locale, Locale::Es);
        assert_eq!(config.chat_idle, IdlePolicy::strict());
        assert_eq!(config.cases_idle.grace, Duration::from_secs(120));
        assert_eq!(config.cases_idle.warn, Duration::from_secs(10));
        assert_eq!(config.intro_delay, Duration::from_secs(5));
        assert_eq!(config.config_file(), PathBuf::from("/tmp/kiosko/config.toml"));
        assert_eq!(config.cases.len(), 10);
    }

    #[test]
    fn test_merge_toml() {
        let config = KioskConfig::new(PathBuf::from("/k"))
            .merge_toml(
                r#"
                rag_url = "http://localhost:8000/"
                locale = "en"
                top_k = 5

                [idle.chat]
                preset = "permissive"
                grace_secs = 60

                [idle.cases]
                preset = "flat"
                warn_secs = 15

                [prompts]
                en = "Answer briefly: {query}"

                [[cases]]
                name = "Demo"
                url = "https://example.com/demo"
                "#,
            )
            .unwrap();

        assert_eq!(config.rag_url.as_deref(), Some("http://localhost:8000"));
        assert_eq!(config.locale, Locale::En);
        assert_eq!(config.top_k, 5);
        assert!(config.chat_idle.is_qualifying(ActivityKind::MouseMove));
        assert_eq!(config.chat_idle.grace, Duration::from_secs(60));
        assert!(config.cases_idle.grace.is_zero());
        assert_eq!(config.cases_idle.warn, Duration::from_secs(15));
        assert!(config.cases_idle.pause_while_pending);
        assert_eq!(
            config.prompt_template(Locale::En).wrap("hi"),
            "Answer briefly: hi"
        );
        assert_eq!(config.prompt_template(Locale::Es), PromptTemplate::for_locale(Locale::Es));
        assert_eq!(config.cases.len(), 1);
    }

    #[test]
    fn test_event_override_keeps_durations() {
        let config = KioskConfig::new(PathBuf::from("/k"))
            .merge_toml(
                r#"
                [idle.chat]
                events = ["click", "typing"]
                pause_while_pending = true
                "#,
            )
            .unwrap();
        assert_eq!(config.chat_idle.grace, Duration::from_secs(120));
        assert!(config.chat_idle.typing_resets());
        assert!(!config.chat_idle.is_qualifying(ActivityKind::KeyDown));
        assert!(config.chat_idle.pause_while_pending);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let base = KioskConfig::new(PathBuf::from("/k"));
        assert!(base.clone().merge_toml("top_k = 0").is_err());
        assert!(base.clone().merge_toml("[idle.chat]\npreset = \"lazy\"").is_err());
        assert!(base
            .merge_toml("[idle.cases]\ngrace_secs = 0\nwarn_secs = 0")
            .is_err());
    }

    #[tokio::test]
    async fn test_load_file_is_lenient() {
        let dir = TempDir::new().unwrap();
        let missing = KioskConfig::load_file(dir.path().to_path_buf()).await;
        assert_eq!(missing.rag_url, None);

        std::fs::write(dir.path().join(CONFIG_FILE), "rag_url = [broken").unwrap();
        let invalid = KioskConfig::load_file(dir.path().to_path_buf()).await;
        assert_eq!(invalid.top_k, DEFAULT_TOP_K);

        std::fs::write(dir.path().join(CONFIG_FILE), "rag_url = \"http://rag\"").unwrap();
        let loaded = KioskConfig::load_file(dir.path().to_path_buf()).await;
        assert_eq!(loaded.rag_url.as_deref(), Some("http://rag"));
    }

    #[test]
    fn test_override_precedence() {
        let config = KioskConfig::new(PathBuf::from("/k"))
            .merge_toml("rag_url = \"http://file\"")
            .unwrap()
            .with_env_overrides(Some("http://env/".to_string()));
        assert_eq!(config.rag_url.as_deref(), Some("http://env"));

        let config = config
            .clone()
            .with_env_overrides(Some("  ".to_string()))
            .with_rag_url(Some("http://cli".to_string()));
        assert_eq!(config.rag_url.as_deref(), Some("http://cli"));
    }

    #[test]
    fn test_resolve_home_precedence() {
        let cli = resolve_home_from(Some(PathBuf::from("/cli")), Some("/env".to_string()));
        assert_eq!(cli.unwrap(), PathBuf::from("/cli"));

        let env = resolve_home_from(None, Some("/env".to_string()));
        assert_eq!(env.unwrap(), PathBuf::from("/env"));

        if let Ok(default) = resolve_home_from(None, Some(String::new())) {
            assert!(default.ends_with(CONFIG_DIR));
        }
    }
}
