//! Slash commands understood by the line front-end.
//!
//! Lines starting with `/` are commands; everything else is input for the
//! current view (a form field, a survey answer, a chat message, a menu pick).

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KioskCommand {
    /// List the commands available on the current view
    Help,
    /// Next survey section
    Next,
    /// Previous survey section
    Prev,
    /// Submit the survey
    Send,
    /// Back to the main menu
    Menu,
    /// Close the open case study
    Close,
    /// Pick a follow-up suggestion by number
    Pick,
    /// Sign out and return to the welcome screen
    Restart,
    /// Leave the kiosk
    Quit,
}

impl KioskCommand {
    pub fn all() -> &'static [KioskCommand] {
        &[
            KioskCommand::Help,
            KioskCommand::Next,
            KioskCommand::Prev,
            KioskCommand::Send,
            KioskCommand::Menu,
            KioskCommand::Close,
            KioskCommand::Pick,
            KioskCommand::Restart,
            KioskCommand::Quit,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            KioskCommand::Help => "help",
            KioskCommand::Next => "next",
            KioskCommand::Prev => "prev",
            KioskCommand::Send => "send",
            KioskCommand::Menu => "menu",
            KioskCommand::Close => "close",
            KioskCommand::Pick => "pick",
            KioskCommand::Restart => "restart",
            KioskCommand::Quit => "quit",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            KioskCommand::Help => "show available commands",
            KioskCommand::Next => "go to the next survey section",
            KioskCommand::Prev => "go back one survey section",
            KioskCommand::Send => "submit the survey answers",
            KioskCommand::Menu => "return to the main menu",
            KioskCommand::Close => "close the open success story",
            KioskCommand::Pick => "send a suggested follow-up, e.g. /pick 2",
            KioskCommand::Restart => "sign out and start over",
            KioskCommand::Quit => "exit the kiosk",
        }
    }

    pub fn takes_args(&self) -> bool {
        matches!(self, KioskCommand::Pick)
    }

    /// Commands whose name starts with `prefix`.
    pub fn matches(prefix: &str) -> Vec<KioskCommand> {
        let prefix = prefix.to_lowercase();
        Self::all()
            .iter()
            .filter(|cmd| cmd.name().starts_with(&prefix))
            .copied()
            .collect()
    }

    pub fn parse(name: &str) -> Option<KioskCommand> {
        let name = name.to_lowercase();
        Self::all().iter().find(|cmd| cmd.name() == name).copied()
    }
}

impl fmt::Display for KioskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCommand {
    Command(KioskCommand, String),
    Unknown(String),
}

/// Parse a line; `None` when it is not a command.
pub fn parse_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let name = parts.next().unwrap_or_default();
    let args = parts.next().unwrap_or_default().trim().to_string();

    match KioskCommand::parse(name) {
        Some(cmd) => Some(ParsedCommand::Command(cmd, args)),
        None => Some(ParsedCommand::Unknown(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        match parse_command("/next") {
            Some(ParsedCommand::Command(KioskCommand::Next, args)) => assert!(args.is_empty()),
            other => panic!("Should parse as next, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_with_args() {
        assert_eq!(
            parse_command("  /PICK 2 "),
            Some(ParsedCommand::Command(KioskCommand::Pick, "2".to_string()))
        );
    }

    #[test]
    fn test_not_a_command() {
        assert_eq!(parse_command("hola"), None);
        assert_eq!(
            parse_command("/bogus"),
            Some(ParsedCommand::Unknown("bogus".to_string()))
        );
    }

    #[test]
    fn test_matches_prefix() {
        assert_eq!(KioskCommand::matches("re"), vec![KioskCommand::Restart]);
        assert_eq!(KioskCommand::matches("").len(), KioskCommand::all().len());
        assert!(KioskCommand::Pick.takes_args());
        assert_eq!(KioskCommand::Menu.to_string(), "/menu");
    }
}
