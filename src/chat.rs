//! Chat screen state: transcript, live follow-up pack and the single
//! outstanding request.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};

use crate::followup::{parse_answer, resolve_dispatch, AffirmativeMatcher, FollowUpPack, PromptTemplate};
use crate::locale::Locale;
use crate::rag::{RagRequest, RagResponse, Reference, RetrievalBackend, DEFAULT_TOP_K};
use crate::Result;

/// Which assistant the chat talks to. Sent as `meta.mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChatMode {
    #[serde(rename = "agente")]
    Agent,
    #[serde(rename = "uso")]
    Usage,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::Agent => "agente",
            ChatMode::Usage => "uso",
        }
    }

    pub fn title(&self, locale: Locale) -> &'static str {
        match (self, locale) {
            (ChatMode::Agent, Locale::Es) => "Agente AI",
            (ChatMode::Agent, Locale::En) => "AI Agent",
            (ChatMode::Usage, Locale::Es) => "Uso de Agente AI",
            (ChatMode::Usage, Locale::En) => "Using the AI Agent",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agente" | "agent" => Ok(ChatMode::Agent),
            "uso" | "usage" => Ok(ChatMode::Usage),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            references: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>, references: Vec<Reference>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            references,
        }
    }
}

/// A send that has been recorded and is waiting for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingQuery {
    pub id: u64,
    /// Query before prompt wrapping, as chosen by the shortcut.
    pub dispatched: String,
    pub request: RagRequest,
}

pub fn greeting(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => "¡Hola! Soy tu agente Oracle. ¿Cómo te puedo ayudar hoy?",
        Locale::En => "Hi! I'm your Oracle agent. How can I help you today?",
    }
}

pub fn fallback_message(locale: Locale) -> &'static str {
    match locale {
        Locale::Es => "No pude procesar tu pregunta. Revisa la URL del servicio RAG.",
        Locale::En => "I couldn't process your question. Check the RAG service URL.",
    }
}

pub struct ChatSession {
    locale: Locale,
    mode: ChatMode,
    transcript: Vec<ChatMessage>,
    live_pack: Option<FollowUpPack>,
    pending: Option<u64>,
    next_id: u64,
    matcher: AffirmativeMatcher,
    template: PromptTemplate,
    top_k: u32,
}

impl ChatSession {
    /// New session seeded with the greeting.
    pub fn new(locale: Locale, mode: ChatMode) -> Self {
        Self {
            locale,
            mode,
            transcript: vec![ChatMessage::assistant(greeting(locale), Vec::new())],
            live_pack: None,
            pending: None,
            next_id: 1,
            matcher: AffirmativeMatcher::for_locale(locale),
            template: PromptTemplate::for_locale(locale),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_prompt_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_matcher(mut self, matcher: AffirmativeMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn with_top_k(mut self, k: u32) -> Self {
        self.top_k = k;
        self
    }

    pub fn locale(&self) -> Locale {
        self.locale
    }

    pub fn mode(&self) -> ChatMode {
        self.mode
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn live_pack(&self) -> Option<&FollowUpPack> {
        self.live_pack.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Record a typed message and prepare the backend request.
    ///
    /// Returns `None` for blank input or while another request is
    /// outstanding; nothing is recorded in that case.
    pub fn begin_send(&mut self, input: &str) -> Option<PendingQuery> {
        let input = input.trim();
        if input.is_empty() || self.pending.is_some() {
            return None;
        }

        self.transcript.push(ChatMessage::user(input));
        let dispatch = resolve_dispatch(input, self.live_pack.as_ref(), &self.matcher);
        if let Some(title) = dispatch.synthetic_turn {
            self.transcript.push(ChatMessage::user(title));
        }
        Some(self.dispatch(dispatch.query))
    }

    /// Send the suggested query of a live option picked explicitly.
    pub fn choose_option(&mut self, id: &str) -> Option<PendingQuery> {
        if self.pending.is_some() {
            return None;
        }
        let option = self.live_pack.as_ref()?.option(id)?.clone();
        self.transcript.push(ChatMessage::user(option.title));
        Some(self.dispatch(option.suggested_query))
    }

    fn dispatch(&mut self, query: String) -> PendingQuery {
        let id = self.next_id;
        self.next_id += 1;
        self.pending = Some(id);
        debug!("Chat {} dispatching query #{}", self.mode, id);
        PendingQuery {
            id,
            request: RagRequest::new(self.template.wrap(&query), self.mode.as_str())
                .with_k(self.top_k),
            dispatched: query,
        }
    }

    /// Apply the backend outcome for `pending`.
    ///
    /// Success appends the cleaned answer and replaces the live pack; failure
    /// appends the fallback message. Returns the appended message, or `None`
    /// when `pending` is not the outstanding request.
    pub fn complete(
        &mut self,
        pending: &PendingQuery,
        outcome: Result<RagResponse>,
    ) -> Option<&ChatMessage> {
        if self.pending != Some(pending.id) {
            debug!("Ignoring stale completion #{}", pending.id);
            return None;
        }
        self.pending = None;

        let message = match outcome {
            Ok(response) => {
                let parsed = parse_answer(&response.answer);
                self.live_pack = parsed.pack.into_live();
                info!(
                    "Assistant answered ({} chars, {} references, {} follow-ups)",
                    parsed.clean_text.len(),
                    response.context.len(),
                    self.live_pack.as_ref().map_or(0, |p| p.options.len())
                );
                ChatMessage::assistant(parsed.clean_text, response.context)
            }
            Err(e) => {
                error!("Retrieval error: {}", e);
                ChatMessage::assistant(fallback_message(self.locale), Vec::new())
            }
        };

        self.transcript.push(message);
        self.transcript.last()
    }

    /// Full round trip for one typed message.
    pub async fn ask(
        &mut self,
        backend: &dyn RetrievalBackend,
        input: &str,
    ) -> Option<&ChatMessage> {
        let pending = self.begin_send(input)?;
        let outcome = backend.query(&pending.request).await;
        self.complete(&pending, outcome)
    }
}
