// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prompt text and canned replies.

use parley_core::types::{CoachMode, HistoryEntry, HistoryRole, ProviderMessage};

use crate::recommend::Recommendation;

pub const WELCOME: &str = "Hi, I'm your coach. Tell me what's on your mind and I'll help you think it through.\n\n\
Send /help to see what else I can do.";

pub const HELP: &str = "Commands:\n\
/feedback - tell us how I'm doing\n\
/recommend - answer one question and I'll suggest a coaching style\n\
/mode <balanced|supportive|challenging|strategic> - switch coaching style\n\
/cancel - leave the current step\n\n\
Anything else you send is a conversation with your coach.";

pub const FEEDBACK_PROMPT: &str =
    "What's working and what isn't? Your next message will be saved as feedback. Send /cancel to skip.";

pub const FEEDBACK_SAVED: &str = "Thank you, your feedback has been saved.";

pub const RECOMMEND_PROMPT: &str = "In a sentence or two, what would you like help with right now, and how do you like to be coached? Send /cancel to skip.";

pub const NOTHING_TO_CANCEL: &str = "There's nothing to cancel. Just keep talking to me.";

pub const FLOW_CANCELLED: &str = "Okay, cancelled.";

pub fn mode_switched(mode: CoachMode) -> String {
    format!("Coaching style set to {mode}.")
}

pub fn unknown_mode(name: &str) -> String {
    let modes: Vec<String> = CoachMode::ALL.iter().map(ToString::to_string).collect();
    format!("I don't know the \"{name}\" style. Choose one of: {}.", modes.join(", "))
}

pub fn mode_recommended(rec: &Recommendation) -> String {
    if rec.defaulted {
        format!(
            "A {} style looks like the best fit for now. I've switched you to it; use /mode to change it any time.",
            rec.mode
        )
    } else {
        format!(
            "Based on what you said, I recommend the {} style. I've switched you to it; use /mode to change it any time.",
            rec.mode
        )
    }
}

fn mode_guidance(mode: CoachMode) -> &'static str {
    match mode {
        CoachMode::Balanced => "Mix empathy with practical next steps.",
        CoachMode::Supportive => {
            "Lead with empathy and validation. Keep suggestions gentle and small."
        }
        CoachMode::Challenging => {
            "Be direct. Name avoidance and excuses, and ask for a concrete commitment."
        }
        CoachMode::Strategic => {
            "Focus on goals, priorities and trade-offs. Propose a short structured plan."
        }
    }
}

pub fn analyzer_system_prompt(mode: CoachMode) -> String {
    format!(
        "You analyse a coaching conversation. Coaching style: {mode}. {}\n\
         Return a brief analysis with these lines:\n\
         Topic: ...\nEmotion: ...\nNeed: ...\nSuggested approach: ...",
        mode_guidance(mode)
    )
}

pub fn reporter_system_prompt(mode: CoachMode) -> String {
    format!(
        "You are a personal coach replying in a chat. Coaching style: {mode}. {}\n\
         Use the analysis you are given, but do not mention it. Reply in at most \
         three short paragraphs and end with one question.",
        mode_guidance(mode)
    )
}

/// History (oldest first) followed by the current user text.
pub fn conversation_messages(history: &[HistoryEntry], text: &str) -> Vec<ProviderMessage> {
    history
        .iter()
        .map(|h| ProviderMessage {
            role: match h.role {
                HistoryRole::User => "user".into(),
                HistoryRole::Assistant => "assistant".into(),
            },
            content: h.content.clone(),
        })
        .chain(std::iter::once(ProviderMessage {
            role: "user".into(),
            content: text.to_string(),
        }))
        .collect()
}

pub fn reporter_messages(text: &str, analysis: &str) -> Vec<ProviderMessage> {
    vec![ProviderMessage {
        role: "user".into(),
        content: format!("Analysis:\n{analysis}\n\nMessage:\n{text}"),
    }]
}
