// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword-scored coach mode recommendation.
//!
//! Each mode owns a fixed keyword list. A mode scores one point per keyword
//! found as a substring of the lowercased text. The single highest score
//! wins; a tie at the top or an all-zero score falls back to
//! [`BASELINE_MODE`].

use parley_core::types::CoachMode;

pub const BASELINE_MODE: CoachMode = CoachMode::Balanced;

pub const MODE_KEYWORDS: &[(CoachMode, &[&str])] = &[
    (
        CoachMode::Supportive,
        &[
            "stress", "anxious", "anxiety", "overwhelm", "tired", "burnout", "burned out",
            "sad", "lonely", "worried", "encourag", "support", "confidence", "scared",
        ],
    ),
    (
        CoachMode::Challenging,
        &[
            "push", "lazy", "procrastinat", "accountab", "discipline", "excuse", "motivat",
            "challenge", "harder", "tough love", "honest", "stuck",
        ],
    ),
    (
        CoachMode::Strategic,
        &[
            "plan", "goal", "strategy", "priorit", "roadmap", "career", "decision", "long term",
            "long-term", "quarter", "okr", "system", "organi",
        ],
    ),
    (
        CoachMode::Balanced,
        &["balance", "general", "bit of everything", "not sure", "mix"],
    ),
];

/// Outcome of scoring a text against [`MODE_KEYWORDS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recommendation {
    pub mode: CoachMode,
    pub score: u32,
    /// True when no single mode won outright.
    pub defaulted: bool,
}

pub fn score_mode(text: &str, keywords: &[&str]) -> u32 {
    let lower = text.to_lowercase();
    keywords.iter().filter(|k| lower.contains(*k)).count() as u32
}

pub fn recommend_mode(text: &str) -> Recommendation {
    let scores: Vec<(CoachMode, u32)> = MODE_KEYWORDS
        .iter()
        .map(|(mode, keywords)| (*mode, score_mode(text, keywords)))
        .collect();

    let best = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    let leaders: Vec<CoachMode> = scores
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(m, _)| *m)
        .collect();

    match leaders.as_slice() {
        [mode] if best > 0 => Recommendation {
            mode: *mode,
            score: best,
            defaulted: false,
        },
        _ => Recommendation {
            mode: BASELINE_MODE,
            score: best,
            defaulted: true,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_mode_has_keywords() {
        for mode in CoachMode::ALL {
            assert!(
                MODE_KEYWORDS.iter().any(|(m, k)| *m == mode && !k.is_empty()),
                "{mode} has no keywords"
            );
        }
    }

    #[test]
    fn highest_score_wins() {
        let rec = recommend_mode("I keep procrastinating and need someone to push me, no excuses");
        assert_eq!(rec.mode, CoachMode::Challenging);
        assert_eq!(rec.score, 3);
        assert!(!rec.defaulted);

        let rec = recommend_mode("Help me plan my career goals for next quarter");
        assert_eq!(rec.mode, CoachMode::Strategic);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(recommend_mode("So STRESSED and Anxious").mode, CoachMode::Supportive);
    }

    #[test]
    fn zero_score_defaults_to_baseline() {
        let rec = recommend_mode("hello there");
        assert_eq!(rec.mode, BASELINE_MODE);
        assert_eq!(rec.score, 0);
        assert!(rec.defaulted);
    }

    #[test]
    fn tie_defaults_to_baseline() {
        // one supportive keyword, one strategic keyword
        let rec = recommend_mode("stress about my plan");
        assert_eq!(rec.mode, BASELINE_MODE);
        assert_eq!(rec.score, 1);
        assert!(rec.defaulted);
    }
}
