// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Table-driven intent classification.
//!
//! Every inbound text is matched once against [`INTENT_TABLE`], in order.
//! The first matching row decides the [`Intent`]; text that matches no row
//! is a generic [`Intent::Message`]. Adding a command means adding a row.

use std::str::FromStr;

use parley_core::types::CoachMode;

/// What the user asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Start,
    Help,
    StartFeedback,
    StartModeRecommendation,
    Cancel,
    SelectMode(CoachMode),
    /// `/mode` followed by something that is not a mode name.
    UnknownMode(String),
    /// Anything else: free text for the active flow or for generation.
    Message(String),
}

impl Intent {
    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Intent::Start => "start",
            Intent::Help => "help",
            Intent::StartFeedback => "start_feedback",
            Intent::StartModeRecommendation => "start_mode_recommendation",
            Intent::Cancel => "cancel",
            Intent::SelectMode(_) => "select_mode",
            Intent::UnknownMode(_) => "unknown_mode",
            Intent::Message(_) => "message",
        }
    }

    /// Commands abandon an active sub-flow; free text feeds it.
    pub fn is_command(&self) -> bool {
        !matches!(self, Intent::Message(_))
    }
}

/// How a table row recognises its intent.
#[derive(Debug, Clone, Copy)]
pub enum Matcher {
    /// `/name`, optionally addressed (`/name@SomeBot`), any case.
    Command(&'static str),
    /// The whole message equals the phrase, ignoring case and surrounding
    /// whitespace/punctuation.
    Phrase(&'static str),
}

/// The intent a row produces; arguments are filled in from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Start,
    Help,
    StartFeedback,
    StartModeRecommendation,
    Cancel,
    Mode,
}

pub const INTENT_TABLE: &[(Matcher, IntentKind)] = &[
    (Matcher::Command("start"), IntentKind::Start),
    (Matcher::Command("help"), IntentKind::Help),
    (Matcher::Command("feedback"), IntentKind::StartFeedback),
    (Matcher::Command("recommend"), IntentKind::StartModeRecommendation),
    (Matcher::Command("mode"), IntentKind::Mode),
    (Matcher::Command("cancel"), IntentKind::Cancel),
    (Matcher::Phrase("cancel"), IntentKind::Cancel),
    (Matcher::Phrase("stop"), IntentKind::Cancel),
    (Matcher::Phrase("never mind"), IntentKind::Cancel),
];

/// Classify `text` (already trimmed, non-empty).
pub fn classify_intent(text: &str) -> Intent {
    let text = text.trim();
    for (matcher, kind) in INTENT_TABLE {
        if let Some(arg) = matcher.matches(text) {
            return build(*kind, arg);
        }
    }
    Intent::Message(text.to_string())
}

impl Matcher {
    /// On a match, returns the remaining argument text (possibly empty).
    fn matches<'a>(&self, text: &'a str) -> Option<&'a str> {
        match self {
            Matcher::Command(name) => {
                let rest = text.strip_prefix('/')?;
                let (head, arg) = rest
                    .split_once(char::is_whitespace)
                    .unwrap_or((rest, ""));
                let command = head.split_once('@').map_or(head, |(c, _)| c);
                command.eq_ignore_ascii_case(name).then(|| arg.trim())
            }
            Matcher::Phrase(phrase) => {
                let normalized = text.trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace());
                normalized.eq_ignore_ascii_case(phrase).then_some("")
            }
        }
    }
}

fn build(kind: IntentKind, arg: &str) -> Intent {
    match kind {
        IntentKind::Start => Intent::Start,
        IntentKind::Help => Intent::Help,
        IntentKind::StartFeedback => Intent::StartFeedback,
        IntentKind::StartModeRecommendation => Intent::StartModeRecommendation,
        IntentKind::Cancel => Intent::Cancel,
        IntentKind::Mode if arg.is_empty() => Intent::StartModeRecommendation,
        IntentKind::Mode => match CoachMode::from_str(arg) {
            Ok(mode) => Intent::SelectMode(mode),
            Err(_) => Intent::UnknownMode(arg.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_are_recognised() {
        assert_eq!(classify_intent("/start"), Intent::Start);
        assert_eq!(classify_intent("/HELP"), Intent::Help);
        assert_eq!(classify_intent("/feedback"), Intent::StartFeedback);
        assert_eq!(classify_intent("/recommend"), Intent::StartModeRecommendation);
        assert_eq!(classify_intent("/cancel"), Intent::Cancel);
    }

    #[test]
    fn addressed_commands_are_recognised() {
        assert_eq!(classify_intent("/feedback@ParleyBot"), Intent::StartFeedback);
        assert_eq!(
            classify_intent("/mode@ParleyBot strategic"),
            Intent::SelectMode(CoachMode::Strategic)
        );
    }

    #[test]
    fn mode_command_arguments() {
        assert_eq!(
            classify_intent("/mode Supportive"),
            Intent::SelectMode(CoachMode::Supportive)
        );
        assert_eq!(classify_intent("/mode"), Intent::StartModeRecommendation);
        assert_eq!(
            classify_intent("/mode gentle"),
            Intent::UnknownMode("gentle".into())
        );
    }

    #[test]
    fn cancel_phrases() {
        assert_eq!(classify_intent("Cancel"), Intent::Cancel);
        assert_eq!(classify_intent("  stop! "), Intent::Cancel);
        assert_eq!(classify_intent("never mind."), Intent::Cancel);
        assert!(matches!(classify_intent("please stop procrastinating"), Intent::Message(_)));
    }

    #[test]
    fn everything_else_is_a_message() {
        assert_eq!(
            classify_intent("How do I stay focused?"),
            Intent::Message("How do I stay focused?".into())
        );
        assert_eq!(classify_intent("/unknown"), Intent::Message("/unknown".into()));
        assert_eq!(classify_intent("/starting"), Intent::Message("/starting".into()));
    }

    #[test]
    fn only_free_text_is_not_a_command() {
        assert!(Intent::Cancel.is_command());
        assert!(Intent::SelectMode(CoachMode::Balanced).is_command());
        assert!(!Intent::Message("hi".into()).is_command());
        assert_eq!(Intent::StartFeedback.label(), "start_feedback");
    }
}
