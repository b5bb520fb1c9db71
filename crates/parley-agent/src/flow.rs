// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user conversation state machine.
//!
//! [`transition`] is a pure function from `(state, intent)` to the next
//! state, the action to perform, and the funnel events to record. It does no
//! I/O; the engine executes the action and persists the result.
//!
//! | state                       | intent            | next                  | action                 | events                     |
//! |-----------------------------|-------------------|-----------------------|------------------------|----------------------------|
//! | Idle                        | start-feedback    | AwaitingFeedback      | PromptFeedback         | feedback started           |
//! | AwaitingFeedback            | cancel            | Idle                  | FlowCancelled          | feedback cancelled         |
//! | AwaitingFeedback            | free text         | Idle                  | SaveFeedback           | feedback saved             |
//! | Idle                        | start-recommend   | AwaitingModeRec       | PromptModeRecommendation | recommendation started   |
//! | AwaitingModeRec             | cancel            | Idle                  | FlowCancelled          | recommendation cancelled   |
//! | AwaitingModeRec             | free text         | Idle                  | RecommendMode          | recommendation recommended |
//! | Idle                        | free text         | Idle                  | Generate               |                            |
//! | any sub-flow                | other command     | per Idle row          | per Idle row           | cancelled + per Idle row   |

use parley_core::types::{CoachMode, ConversationState, FlowEvent, FlowStep, Funnel};

use crate::intent::Intent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Welcome,
    ShowHelp,
    PromptFeedback,
    SaveFeedback(String),
    PromptModeRecommendation,
    RecommendMode(String),
    SwitchMode(CoachMode),
    UnknownMode(String),
    FlowCancelled(Funnel),
    NothingToCancel,
    Generate(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: ConversationState,
    pub action: Action,
    pub events: Vec<FlowEvent>,
}

impl Transition {
    fn to(next: ConversationState, action: Action) -> Self {
        Self {
            next,
            action,
            events: Vec::new(),
        }
    }

    fn with_event(mut self, funnel: Funnel, step: FlowStep) -> Self {
        self.events.push(FlowEvent { funnel, step });
        self
    }

    fn after(mut self, earlier: Vec<FlowEvent>) -> Self {
        let later = std::mem::replace(&mut self.events, earlier);
        self.events.extend(later);
        self
    }
}

/// The funnel a sub-flow state belongs to.
pub fn active_funnel(state: ConversationState) -> Option<Funnel> {
    match state {
        ConversationState::Idle => None,
        ConversationState::AwaitingFeedback => Some(Funnel::Feedback),
        ConversationState::AwaitingModeRecommendation => Some(Funnel::ModeRecommendation),
    }
}

pub fn transition(state: ConversationState, intent: &Intent) -> Transition {
    let funnel = active_funnel(state);

    match (funnel, intent) {
        (Some(f), Intent::Cancel) => {
            Transition::to(ConversationState::Idle, Action::FlowCancelled(f))
                .with_event(f, FlowStep::Cancelled)
        }
        (Some(Funnel::Feedback), Intent::Message(text)) => {
            Transition::to(ConversationState::Idle, Action::SaveFeedback(text.clone()))
                .with_event(Funnel::Feedback, FlowStep::Completed)
        }
        (Some(Funnel::ModeRecommendation), Intent::Message(text)) => Transition::to(
            ConversationState::Idle,
            Action::RecommendMode(text.clone()),
        )
        .with_event(Funnel::ModeRecommendation, FlowStep::Completed),
        // Re-issuing the command of the active flow re-prompts without
        // touching the funnel.
        (Some(Funnel::Feedback), Intent::StartFeedback) => {
            Transition::to(state, Action::PromptFeedback)
        }
        (Some(Funnel::ModeRecommendation), Intent::StartModeRecommendation) => {
            Transition::to(state, Action::PromptModeRecommendation)
        }
        // Any other command abandons the flow, then runs as if idle.
        (Some(f), command) => idle(command)
            .after(vec![FlowEvent {
                funnel: f,
                step: FlowStep::Cancelled,
            }]),
        (None, intent) => idle(intent),
    }
}

fn idle(intent: &Intent) -> Transition {
    use ConversationState::{AwaitingFeedback, AwaitingModeRecommendation, Idle};

    match intent {
        Intent::Start => Transition::to(Idle, Action::Welcome),
        Intent::Help => Transition::to(Idle, Action::ShowHelp),
        Intent::StartFeedback => Transition::to(AwaitingFeedback, Action::PromptFeedback)
            .with_event(Funnel::Feedback, FlowStep::Started),
        Intent::StartModeRecommendation => {
            Transition::to(AwaitingModeRecommendation, Action::PromptModeRecommendation)
                .with_event(Funnel::ModeRecommendation, FlowStep::Started)
        }
        Intent::Cancel => Transition::to(Idle, Action::NothingToCancel),
        Intent::SelectMode(mode) => Transition::to(Idle, Action::SwitchMode(*mode)),
        Intent::UnknownMode(name) => Transition::to(Idle, Action::UnknownMode(name.clone())),
        Intent::Message(text) => Transition::to(Idle, Action::Generate(text.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConversationState::{AwaitingFeedback, AwaitingModeRecommendation, Idle};

    fn ev(funnel: Funnel, step: FlowStep) -> FlowEvent {
        FlowEvent { funnel, step }
    }

    fn msg(text: &str) -> Intent {
        Intent::Message(text.into())
    }

    #[test]
    fn feedback_flow_happy_path() {
        let t = transition(Idle, &Intent::StartFeedback);
        assert_eq!(t.next, AwaitingFeedback);
        assert_eq!(t.action, Action::PromptFeedback);
        assert_eq!(t.events, vec![ev(Funnel::Feedback, FlowStep::Started)]);

        let t = transition(AwaitingFeedback, &msg("great bot"));
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::SaveFeedback("great bot".into()));
        assert_eq!(t.events, vec![ev(Funnel::Feedback, FlowStep::Completed)]);
    }

    #[test]
    fn feedback_flow_cancel() {
        let t = transition(AwaitingFeedback, &Intent::Cancel);
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::FlowCancelled(Funnel::Feedback));
        assert_eq!(t.events, vec![ev(Funnel::Feedback, FlowStep::Cancelled)]);
    }

    #[test]
    fn mode_recommendation_flow() {
        let t = transition(Idle, &Intent::StartModeRecommendation);
        assert_eq!(t.next, AwaitingModeRecommendation);
        assert_eq!(t.events, vec![ev(Funnel::ModeRecommendation, FlowStep::Started)]);

        let t = transition(AwaitingModeRecommendation, &msg("I need a plan"));
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::RecommendMode("I need a plan".into()));
        assert_eq!(t.events, vec![ev(Funnel::ModeRecommendation, FlowStep::Completed)]);

        let t = transition(AwaitingModeRecommendation, &Intent::Cancel);
        assert_eq!(t.action, Action::FlowCancelled(Funnel::ModeRecommendation));
    }

    #[test]
    fn idle_message_generates() {
        let t = transition(Idle, &msg("hello"));
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::Generate("hello".into()));
        assert!(t.events.is_empty());
    }

    #[test]
    fn idle_cancel_is_a_no_op() {
        let t = transition(Idle, &Intent::Cancel);
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::NothingToCancel);
        assert!(t.events.is_empty());
    }

    #[test]
    fn other_command_abandons_sub_flow() {
        let t = transition(AwaitingFeedback, &Intent::StartModeRecommendation);
        assert_eq!(t.next, AwaitingModeRecommendation);
        assert_eq!(
            t.events,
            vec![
                ev(Funnel::Feedback, FlowStep::Cancelled),
                ev(Funnel::ModeRecommendation, FlowStep::Started),
            ]
        );

        let t = transition(AwaitingModeRecommendation, &Intent::SelectMode(CoachMode::Strategic));
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::SwitchMode(CoachMode::Strategic));
        assert_eq!(t.events, vec![ev(Funnel::ModeRecommendation, FlowStep::Cancelled)]);

        let t = transition(AwaitingFeedback, &Intent::Start);
        assert_eq!(t.next, Idle);
        assert_eq!(t.action, Action::Welcome);
    }

    #[test]
    fn repeating_active_command_re_prompts() {
        let t = transition(AwaitingFeedback, &Intent::StartFeedback);
        assert_eq!(t.next, AwaitingFeedback);
        assert_eq!(t.action, Action::PromptFeedback);
        assert!(t.events.is_empty());
    }
}
