//! Kiosk screen flow driven by text lines.
//!
//! Welcome → survey intro → survey → menu, and from the menu the survey,
//! the agent chat, the success stories or the usage chat. Every line typed
//! counts as a keydown for the idle timeouts of the chat and cases screens.

mod app;
mod cases;
mod commands;
mod labels;
mod welcome;

pub use app::{KioskApp, KioskEvent, KioskServices, MenuChoice, View};
pub use cases::{default_cases, CaseGallery, CaseStudy};
pub use commands::{parse_command, KioskCommand, ParsedCommand};
pub use labels::Labels;
pub use welcome::{FieldError, WelcomeField, WelcomeForm};
