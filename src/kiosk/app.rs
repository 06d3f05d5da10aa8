//! The kiosk itself: current view, per-view state and the line loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::cases::CaseGallery;
use super::commands::{parse_command, KioskCommand, ParsedCommand};
use super::labels::Labels;
use super::welcome::{FieldError, WelcomeField, WelcomeForm};
use crate::auth::{AuthProvider, SessionIdentity};
use crate::chat::{ChatMessage, ChatMode, ChatSession};
use crate::config::KioskConfig;
use crate::idle::{ActivityHub, ActivityKind, IdleController, IdleExit, IdleGuard, IdlePolicy};
use crate::rag::RetrievalBackend;
use crate::store::DocumentStore;
use crate::survey::{DraftStore, Question, QuestionKind, SurveySchema, SurveySession};
use crate::{KioskError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Welcome,
    SurveyIntro,
    Survey,
    Menu,
    Chat(ChatMode),
    Cases,
}

/// Entries of the main menu, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Survey,
    Agent,
    Cases,
    Usage,
}

impl MenuChoice {
    pub const ALL: [MenuChoice; 4] = [
        MenuChoice::Survey,
        MenuChoice::Agent,
        MenuChoice::Cases,
        MenuChoice::Usage,
    ];

    /// Parse a 1-based menu number.
    pub fn from_input(input: &str) -> Option<Self> {
        let number: usize = input.trim().parse().ok()?;
        Self::ALL.get(number.checked_sub(1)?).copied()
    }

    pub fn label(&self, labels: &Labels) -> &'static str {
        match self {
            MenuChoice::Survey => labels.menu_survey,
            MenuChoice::Agent => labels.menu_agent,
            MenuChoice::Cases => labels.menu_cases,
            MenuChoice::Usage => labels.menu_usage,
        }
    }

    pub fn view(&self) -> View {
        match self {
            MenuChoice::Survey => View::Survey,
            MenuChoice::Agent => View::Chat(ChatMode::Agent),
            MenuChoice::Cases => View::Cases,
            MenuChoice::Usage => View::Chat(ChatMode::Usage),
        }
    }
}

/// Things that happen without the visitor typing. Intro and expiry events
/// carry the screen generation that armed them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskEvent {
    /// The survey intro timer elapsed.
    IntroElapsed(u64),
    /// The visible idle countdown ticked; carries the seconds left.
    IdleWarning(u64),
    /// The idle countdown ran out; the session is already signed out.
    IdleExpired(u64),
}

/// Collaborators the kiosk talks to.
#[derive(Clone)]
pub struct KioskServices {
    pub auth: Arc<dyn AuthProvider>,
    pub store: Arc<dyn DocumentStore>,
    pub backend: Arc<dyn RetrievalBackend>,
}

/// Resources owned by the view on screen. Dropping it releases the idle
/// registration and stops the view's timers.
#[derive(Default)]
struct ScreenScope {
    idle: Option<IdleGuard>,
    tasks: Vec<JoinHandle<()>>,
    warned: bool,
}

impl Drop for ScreenScope {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

pub struct KioskApp {
    config: KioskConfig,
    services: KioskServices,
    labels: &'static Labels,
    schema: SurveySchema,
    drafts: DraftStore,
    hub: ActivityHub,
    events_tx: mpsc::UnboundedSender<KioskEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<KioskEvent>>,
    view: View,
    identity: Option<SessionIdentity>,
    welcome: WelcomeForm,
    survey: Option<SurveySession>,
    chat: Option<ChatSession>,
    gallery: CaseGallery,
    screen: ScreenScope,
    screen_generation: u64,
    out: Vec<String>,
    quit: bool,
}

impl KioskApp {
    pub fn new(config: KioskConfig, services: KioskServices) -> Result<Self> {
        let schema = SurveySchema::for_locale(config.locale)?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            labels: Labels::for_locale(config.locale),
            drafts: DraftStore::new(config.data_dir()),
            gallery: CaseGallery::new(config.cases.clone()),
            schema,
            config,
            services,
            hub: ActivityHub::new(),
            events_tx,
            events_rx: Some(events_rx),
            view: View::Welcome,
            identity: None,
            welcome: WelcomeForm::new(),
            survey: None,
            chat: None,
            screen: ScreenScope::default(),
            screen_generation: 0,
            out: Vec::new(),
            quit: false,
        })
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn identity(&self) -> Option<&SessionIdentity> {
        self.identity.as_ref()
    }

    pub fn chat(&self) -> Option<&ChatSession> {
        self.chat.as_ref()
    }

    pub fn survey(&self) -> Option<&SurveySession> {
        self.survey.as_ref()
    }

    pub fn gallery(&self) -> &CaseGallery {
        &self.gallery
    }

    pub fn hub(&self) -> &ActivityHub {
        &self.hub
    }

    /// Idle registration of the current view, if it has one.
    pub fn idle(&self) -> Option<&IdleGuard> {
        self.screen.idle.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.quit
    }

    /// Show the welcome screen. Call once before feeding lines.
    pub async fn start(&mut self) -> Vec<String> {
        info!("Kiosk starting ({})", self.config.locale);
        self.enter(View::Welcome).await;
        self.take_output()
    }

    /// Wait for the next timer event. Only usable while [`Self::run`] is not.
    pub async fn recv_event(&mut self) -> Option<KioskEvent> {
        self.events_rx.as_mut()?.recv().await
    }

    /// Drive the kiosk from `input_rx` until it closes or the visitor quits.
    pub async fn run(
        mut self,
        mut input_rx: mpsc::Receiver<String>,
        output_tx: mpsc::Sender<String>,
    ) -> Result<()> {
        let mut events_rx = self
            .events_rx
            .take()
            .ok_or_else(|| KioskError::Config("kiosk event loop already taken".to_string()))?;

        let greeting = self.start().await;
        if !send_all(&output_tx, greeting).await {
            return Ok(());
        }

        loop {
            let output = tokio::select! {
                line = input_rx.recv() => match line {
                    Some(line) => self.handle_line(&line).await,
                    None => break,
                },
                Some(event) = events_rx.recv() => self.handle_event(event).await,
            };
            if !send_all(&output_tx, output).await || self.quit {
                break;
            }
        }

        self.screen = ScreenScope::default();
        info!("Kiosk stopped");
        Ok(())
    }

    /// Handle one typed line and return what to print.
    pub async fn handle_line(&mut self, line: &str) -> Vec<String> {
        self.hub.emit(ActivityKind::KeyDown);
        self.screen.warned = false;

        match parse_command(line) {
            Some(ParsedCommand::Command(cmd, args)) => self.run_command(cmd, &args).await,
            Some(ParsedCommand::Unknown(name)) => {
                let mut message = format!("{}: /{}", self.labels.unknown_command, name);
                let close = KioskCommand::matches(&name);
                if !name.is_empty() && !close.is_empty() {
                    let names: Vec<String> = close.iter().map(|c| c.to_string()).collect();
                    message.push_str(&format!(". {} {}?", self.labels.suggestions, names.join(" ")));
                }
                self.say(message);
            }
            None => self.handle_input(line).await,
        }
        self.take_output()
    }

    pub async fn handle_event(&mut self, event: KioskEvent) -> Vec<String> {
        match event {
            KioskEvent::IntroElapsed(generation) => {
                if self.view == View::SurveyIntro && generation == self.screen_generation {
                    debug!("Survey intro elapsed");
                    self.enter(View::Survey).await;
                }
            }
            KioskEvent::IdleWarning(seconds) => {
                let warning = self.idle().is_some_and(|g| g.status().is_warning());
                if warning {
                    if !self.screen.warned {
                        self.screen.warned = true;
                        self.say(format!("⚠ {}", self.labels.idle_title));
                        self.say(self.labels.idle_continue);
                    }
                    self.say(self.labels.idle_countdown(seconds));
                }
            }
            KioskEvent::IdleExpired(generation) if generation == self.screen_generation => {
                info!("Idle timeout on {:?}, returning to welcome", self.view);
                self.reset_to_welcome().await;
            }
            KioskEvent::IdleExpired(_) => {
                // The visitor already left that screen, but its session was signed out.
                debug!("Late idle expiry on {:?}, keeping the view", self.view);
                self.identity = None;
            }
        }
        self.take_output()
    }

    async fn run_command(&mut self, cmd: KioskCommand, args: &str) {
        match (cmd, self.view) {
            (KioskCommand::Help, _) => {
                for cmd in KioskCommand::all() {
                    let usage = if cmd.takes_args() {
                        format!("{cmd} N")
                    } else {
                        cmd.to_string()
                    };
                    self.say(format!("  {:<10} {}", usage, cmd.description()));
                }
            }
            (KioskCommand::Restart, _) => self.restart_to_welcome().await,
            (KioskCommand::Quit, _) => {
                info!("Quit requested");
                self.screen = ScreenScope::default();
                self.quit = true;
            }
            (KioskCommand::Menu, View::Survey | View::Chat(_) | View::Cases) => {
                self.enter(View::Menu).await
            }
            (KioskCommand::Next, View::Survey) => self.survey_next(),
            (KioskCommand::Prev, View::Survey) => {
                if let Some(survey) = self.survey.as_mut() {
                    survey.prev();
                }
                self.render();
            }
            (KioskCommand::Send, View::Survey) => self.survey_submit().await,
            (KioskCommand::Pick, View::Chat(_)) => self.chat_pick(args).await,
            (KioskCommand::Close, View::Cases) => {
                if self.gallery.close() {
                    self.render();
                }
            }
            _ => self.say(self.labels.not_here),
        }
    }

    async fn handle_input(&mut self, line: &str) {
        match self.view {
            View::Welcome => self.welcome_input(line).await,
            View::SurveyIntro => self.enter(View::Survey).await,
            View::Survey => self.survey_answer(line).await,
            View::Menu => match MenuChoice::from_input(line) {
                Some(choice) => {
                    debug!("Menu choice: {:?}", choice);
                    self.enter(choice.view()).await;
                }
                None => self.render(),
            },
            View::Chat(_) => self.chat_send(line).await,
            View::Cases => self.open_case(line),
        }
    }

    /// Switch views, releasing everything the previous view held.
    async fn enter(&mut self, view: View) {
        self.screen = ScreenScope::default();
        self.screen_generation += 1;
        self.view = view;
        info!("View: {:?}", view);

        match view {
            View::Welcome => {
                self.welcome = WelcomeForm::new();
                self.bootstrap_identity().await;
            }
            View::SurveyIntro => self.arm_intro_timer(),
            View::Survey => {
                let draft = match &self.identity {
                    Some(identity) => self.drafts.load(&identity.uid).await,
                    None => Default::default(),
                };
                self.survey = Some(SurveySession::new(self.schema.clone()).with_answers(draft));
            }
            View::Menu => {}
            View::Chat(mode) => {
                let locale = self.config.locale;
                self.chat = Some(
                    ChatSession::new(locale, mode)
                        .with_prompt_template(self.config.prompt_template(locale))
                        .with_top_k(self.config.top_k),
                );
                self.attach_idle(self.config.chat_idle.clone());
            }
            View::Cases => {
                self.gallery.close();
                self.attach_idle(self.config.cases_idle.clone());
            }
        }
        self.render();
    }

    /// Sign out, then show the welcome screen.
    async fn restart_to_welcome(&mut self) {
        self.screen = ScreenScope::default();
        if let Err(e) = self.services.auth.sign_out().await {
            warn!("Sign-out on restart failed: {}", e);
        }
        self.reset_to_welcome().await;
    }

    async fn reset_to_welcome(&mut self) {
        self.identity = None;
        self.survey = None;
        self.chat = None;
        self.enter(View::Welcome).await;
    }

    async fn bootstrap_identity(&mut self) -> Option<SessionIdentity> {
        if self.identity.is_none() {
            match self.services.auth.ensure_signed_in().await {
                Ok(identity) => self.identity = Some(identity),
                Err(e) => error!("Anonymous sign-in failed: {}", e),
            }
        }
        self.identity.clone()
    }

    fn arm_intro_timer(&mut self) {
        let generation = self.screen_generation;
        let delay = self.config.intro_delay;
        let tx = self.events_tx.clone();
        self.screen.tasks.push(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(KioskEvent::IntroElapsed(generation));
        }));
    }

    fn attach_idle(&mut self, policy: IdlePolicy) {
        let expired_tx = self.events_tx.clone();
        let generation = self.screen_generation;
        let exit = IdleExit::new()
            .with_sign_out(self.services.auth.clone())
            .with_callback(move || {
                let _ = expired_tx.send(KioskEvent::IdleExpired(generation));
            });
        let guard = IdleGuard::attach(&self.hub, IdleController::new(policy, exit));

        let mut status_rx = guard.subscribe();
        let tx = self.events_tx.clone();
        let watcher = tokio::spawn(async move {
            let mut last_shown = None;
            while status_rx.changed().await.is_ok() {
                let status = *status_rx.borrow_and_update();
                if !status.is_warning() {
                    last_shown = None;
                    continue;
                }
                if last_shown != Some(status.seconds_remaining) {
                    last_shown = Some(status.seconds_remaining);
                    if tx.send(KioskEvent::IdleWarning(status.seconds_remaining)).is_err() {
                        break;
                    }
                }
            }
        });

        self.screen.idle = Some(guard);
        self.screen.tasks.push(watcher);
    }

    async fn welcome_input(&mut self, line: &str) {
        if !self.welcome.is_complete() {
            match self.welcome.fill(line) {
                Ok(()) => {}
                Err(FieldError::Required) => self.say(self.labels.required_field),
                Err(FieldError::InvalidEmail) => self.say(self.labels.invalid_email),
            }
        }
        if self.welcome.is_complete() {
            self.submit_welcome().await;
        } else {
            self.render();
        }
    }

    async fn submit_welcome(&mut self) {
        let Some(input) = self.welcome.to_input() else {
            return;
        };
        self.say(self.labels.saving);

        let Some(identity) = self.bootstrap_identity().await else {
            self.say(self.labels.save_failed);
            return;
        };
        match self.services.store.upsert_profile(&identity.uid, input).await {
            Ok(profile) => {
                info!("Profile saved for {}", profile.short_id);
                self.enter(View::SurveyIntro).await;
            }
            Err(e) => {
                error!("Failed to save profile: {}", e);
                self.say(self.labels.save_failed);
            }
        }
    }

    async fn survey_answer(&mut self, line: &str) {
        let labels = self.labels;
        let Some(survey) = self.survey.as_mut() else {
            return;
        };
        let reply = match line.trim().split_once(char::is_whitespace) {
            None => Err(labels.answer_hint.to_string()),
            Some((id, value)) => match survey.schema().question(id) {
                None => Err(labels.answer_hint.to_string()),
                Some(question) => match question.resolve_input(value) {
                    None => Err(format!("[{}] {}", question.id, labels.select_one)),
                    Some(resolved) => match survey.answer(id, &resolved) {
                        Ok(()) => Ok(format!("[{id}] = {resolved}")),
                        Err(e) => {
                            debug!("Answer rejected: {}", e);
                            Err(format!("[{id}] {}", labels.select_one))
                        }
                    },
                },
            },
        };

        match reply {
            Ok(confirmation) => {
                self.say(confirmation);
                self.save_draft().await;
            }
            Err(message) => self.say(message),
        }
    }

    async fn save_draft(&self) {
        let (Some(identity), Some(survey)) = (&self.identity, &self.survey) else {
            return;
        };
        if let Err(e) = self.drafts.save(&identity.uid, survey.answers()).await {
            warn!("Failed to save survey draft: {}", e);
        }
    }

    fn survey_next(&mut self) {
        let Some(survey) = self.survey.as_mut() else {
            return;
        };
        if survey.next() {
            self.render();
        } else {
            self.report_missing();
        }
    }

    fn report_missing(&mut self) {
        let Some(survey) = &self.survey else {
            return;
        };
        let missing: Vec<String> = survey.errors().iter().cloned().collect();
        self.say(format!("{}: {}", self.labels.missing_title, missing.join(", ")));
        self.say(self.labels.missing_body);
    }

    async fn survey_submit(&mut self) {
        let is_last = self.survey.as_ref().is_some_and(|s| s.is_last_section());
        if !is_last {
            self.say(self.labels.not_here);
            return;
        }
        let Some(identity) = self.bootstrap_identity().await else {
            self.say(self.labels.save_failed);
            return;
        };
        self.say(self.labels.saving);
        let Some(survey) = self.survey.as_mut() else {
            return;
        };
        match survey.submit(self.services.store.as_ref(), &identity.uid).await {
            Ok(_) => {
                if let Err(e) = self.drafts.remove(&identity.uid).await {
                    warn!("Failed to remove survey draft: {}", e);
                }
                self.survey = None;
                self.say(self.labels.survey_saved);
                self.enter(View::Menu).await;
            }
            Err(KioskError::Validation(_)) => self.report_missing(),
            Err(e) => {
                error!("Failed to submit survey: {}", e);
                self.say(self.labels.save_failed);
            }
        }
    }

    async fn chat_send(&mut self, line: &str) {
        let Some(chat) = self.chat.as_mut() else {
            return;
        };
        let Some(pending) = chat.begin_send(line) else {
            return;
        };
        self.out.push(self.labels.chat_thinking.to_string());

        let idle = self.screen.idle.as_ref().map(|g| g.controller().clone());
        if let Some(controller) = &idle {
            controller.begin_request();
        }
        let outcome = self.services.backend.query(&pending.request).await;
        if let Some(controller) = &idle {
            controller.end_request();
        }

        if let Some(message) = chat.complete(&pending, outcome).cloned() {
            self.show_answer(&message);
        }
    }

    async fn chat_pick(&mut self, args: &str) {
        let Some(chat) = self.chat.as_mut() else {
            return;
        };
        let option_id = args
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|i| chat.live_pack()?.options.get(i))
            .map(|o| o.id.clone());
        let Some(option_id) = option_id else {
            self.say(self.labels.not_here);
            return;
        };
        let Some(pending) = chat.choose_option(&option_id) else {
            return;
        };
        self.out.push(self.labels.chat_thinking.to_string());

        let idle = self.screen.idle.as_ref().map(|g| g.controller().clone());
        if let Some(controller) = &idle {
            controller.begin_request();
        }
        let outcome = self.services.backend.query(&pending.request).await;
        if let Some(controller) = &idle {
            controller.end_request();
        }

        if let Some(message) = chat.complete(&pending, outcome).cloned() {
            self.show_answer(&message);
        }
    }

    fn show_answer(&mut self, message: &ChatMessage) {
        self.say(message.content.clone());
        if !message.references.is_empty() {
            self.say(format!("{}:", self.labels.references));
            for reference in &message.references {
                self.say(format!("  - {reference}"));
            }
        }

        let Some(pack) = self.chat.as_ref().and_then(|c| c.live_pack()) else {
            return;
        };
        let mut lines = Vec::new();
        if let Some(hook) = pack.hook.as_deref().filter(|h| !h.trim().is_empty()) {
            lines.push(hook.to_string());
        }
        if !pack.options.is_empty() {
            lines.push(format!("{} (/pick N):", self.labels.follow_ups));
            for (i, option) in pack.options.iter().enumerate() {
                lines.push(format!("  {}) {}", i + 1, option.title));
            }
        }
        for line in lines {
            self.say(line);
        }
    }

    fn open_case(&mut self, line: &str) {
        let input = line.trim();
        let opened = match input.parse::<usize>() {
            Ok(number) => self.gallery.open(number).cloned(),
            Err(_) => self.gallery.open_by_name(input).cloned(),
        };
        match opened {
            Some(case) => {
                info!("Opened case {}", case.name);
                self.say(format!("{} <{}>", case.name, case.url));
                self.say(format!("/close {}", self.labels.close));
            }
            None => self.render(),
        }
    }

    /// Print the current view.
    fn render(&mut self) {
        let labels = self.labels;
        let mut lines: Vec<String> = Vec::new();

        match self.view {
            View::Welcome => {
                if self.welcome.pending_field() == Some(WelcomeField::Name) {
                    lines.push(labels.welcome.to_string());
                    lines.push(labels.welcome_title.to_string());
                    lines.push(labels.welcome_subtitle.to_string());
                }
                match self.welcome.pending_field() {
                    Some(WelcomeField::Name) => lines.push(format!("{}:", labels.name)),
                    Some(WelcomeField::Email) => lines.push(format!("{}:", labels.email)),
                    Some(WelcomeField::Role) => lines.push(format!("{}:", labels.role)),
                    None => {}
                }
            }
            View::SurveyIntro => {
                lines.push(labels.intro_title.to_string());
                lines.push(labels.intro_body.to_string());
                lines.push(labels.intro_continue.to_string());
            }
            View::Survey => {
                if let Some(survey) = &self.survey {
                    lines.extend(render_section(survey, labels));
                }
            }
            View::Menu => {
                lines.push(labels.menu_header.to_string());
                for (i, choice) in MenuChoice::ALL.iter().enumerate() {
                    lines.push(format!("  {}. {}", i + 1, choice.label(labels)));
                }
            }
            View::Chat(mode) => {
                lines.push(format!("== {} ==", mode.title(self.config.locale)));
                if let Some(message) = self.chat.as_ref().and_then(|c| c.transcript().last()) {
                    lines.push(message.content.clone());
                }
                lines.push(format!("/menu {}  /restart {}", labels.menu, labels.restart));
            }
            View::Cases => {
                lines.push(labels.cases_title.to_string());
                for (i, case) in self.gallery.cases().iter().enumerate() {
                    lines.push(format!("  {}. {}", i + 1, case.name));
                }
                lines.push(format!("/menu {}  /restart {}", labels.menu, labels.restart));
            }
        }

        self.out.extend(lines);
    }

    fn say(&mut self, line: impl Into<String>) {
        self.out.push(line.into());
    }

    fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.out)
    }
}

fn render_section(survey: &SurveySession, labels: &Labels) -> Vec<String> {
    let mut lines = vec![
        labels.section(survey.step() + 1, survey.section_count()),
        labels.progress(survey.answered_required(), survey.total_required()),
        format!("== {} ==", survey.section_title()),
    ];
    for question in survey.current_questions() {
        lines.extend(render_question(question, survey, labels));
    }
    lines.push(labels.answer_hint.to_string());
    let mut nav = Vec::new();
    if survey.step() > 0 {
        nav.push(format!("/prev {}", labels.prev));
    }
    if survey.is_last_section() {
        nav.push(format!("/send {}", labels.submit));
    } else {
        nav.push(format!("/next {}", labels.next));
    }
    lines.push(nav.join("  "));
    lines
}

fn render_question(question: &Question, survey: &SurveySession, labels: &Labels) -> Vec<String> {
    let marker = if survey.errors().contains(&question.id) {
        "* "
    } else {
        ""
    };
    let mut lines = vec![format!("{marker}{}", question.label())];
    match question.kind {
        QuestionKind::SingleChoice => {
            for (i, option) in question.options.iter().enumerate() {
                lines.push(format!("    {}) {}", i + 1, option));
            }
        }
        QuestionKind::Likert => lines.push("    1 2 3 4 5".to_string()),
        QuestionKind::LongText => lines.push(format!("    {}", labels.long_placeholder)),
    }
    if let Some(answer) = survey.answers().get(&question.id) {
        lines.push(format!("    → {answer}"));
    }
    lines
}

async fn send_all(output_tx: &mpsc::Sender<String>, lines: Vec<String>) -> bool {
    for line in lines {
        if output_tx.send(line).await.is_err() {
            return false;
        }
    }
    true
}
