// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics.
//!
//! Figment reports what went wrong; this module works out where. Errors are
//! mapped onto [`ConfigError`] with a source span into the offending
//! `parley.toml` and, for unknown keys, a correction drawn from the key
//! catalog of [`ParleyConfig`]. A key placed in the wrong section is pointed
//! at the section that owns it (`concurrency` under `[gateway]` suggests
//! `queue.concurrency`).

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::model::{
    AgentConfig, ConversationConfig, DigestConfig, GatewayConfig, LlmConfig, OpenAiConfig,
    ParleyConfig, QueueConfig, RateLimitConfig, StorageConfig, TelegramConfig,
};

/// Jaro-Winkler score a candidate must beat to be offered as a correction.
const SUGGESTION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(parley::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Table the key was found in; `None` at the top level.
        section: Option<String>,
        /// Either a sibling key or a `section.key` path elsewhere.
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a recognized key here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(parley::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        /// Dotted path, e.g. `gateway.port`.
        key: String,
        detail: String,
        expected: String,
        #[label("wrong type")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A semantic check in [`crate::validation`] failed.
    #[error("validation error: {message}")]
    #[diagnostic(code(parley::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(parley::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Serde introspection: the field list a derived `Deserialize` declares.
mod fields {
    use std::fmt;

    use serde::de::{self, DeserializeOwned, Deserializer, Visitor};

    #[derive(Debug)]
    struct Stop;

    impl fmt::Display for Stop {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("field list captured")
        }
    }

    impl std::error::Error for Stop {}

    impl de::Error for Stop {
        fn custom<T: fmt::Display>(_msg: T) -> Self {
            Stop
        }
    }

    struct Capture<'a>(&'a mut &'static [&'static str]);

    impl<'de> Deserializer<'de> for Capture<'_> {
        type Error = Stop;

        fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Stop> {
            Err(Stop)
        }

        fn deserialize_struct<V: Visitor<'de>>(
            self,
            _name: &'static str,
            fields: &'static [&'static str],
            _visitor: V,
        ) -> Result<V::Value, Stop> {
            *self.0 = fields;
            Err(Stop)
        }

        serde::forward_to_deserialize_any! {
            bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
            bytes byte_buf option unit unit_struct newtype_struct seq tuple
            tuple_struct map enum identifier ignored_any
        }
    }

    pub(super) fn of<T: DeserializeOwned>() -> &'static [&'static str] {
        let mut fields: &'static [&'static str] = &[];
        let _ = T::deserialize(Capture(&mut fields));
        fields
    }
}

fn keys_of<T: DeserializeOwned>() -> &'static [&'static str] {
    fields::of::<T>()
}

/// Top-level section names of `parley.toml`.
pub fn sections() -> &'static [&'static str] {
    keys_of::<ParleyConfig>()
}

/// Keys accepted inside `[section]`, or `None` for an unknown section.
pub fn section_keys(section: &str) -> Option<&'static [&'static str]> {
    let keys = match section {
        "agent" => keys_of::<AgentConfig>(),
        "telegram" => keys_of::<TelegramConfig>(),
        "openai" => keys_of::<OpenAiConfig>(),
        "storage" => keys_of::<StorageConfig>(),
        "gateway" => keys_of::<GatewayConfig>(),
        "rate_limit" => keys_of::<RateLimitConfig>(),
        "queue" => keys_of::<QueueConfig>(),
        "llm" => keys_of::<LlmConfig>(),
        "conversation" => keys_of::<ConversationConfig>(),
        "digest" => keys_of::<DigestConfig>(),
        _ => return None,
    };
    Some(keys)
}

fn closest<'a>(unknown: &str, candidates: impl IntoIterator<Item = &'a str>) -> Option<&'a str> {
    candidates
        .into_iter()
        .map(|c| (strsim::jaro_winkler(unknown, c), c))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c)
}

/// Best correction for `key` found in `section` (`None` = top level).
///
/// Order of preference: a close sibling key, then the exact key in another
/// section, then (top level only) a close section name.
pub fn suggest(section: Option<&str>, key: &str) -> Option<String> {
    if let Some(keys) = section.and_then(section_keys)
        && let Some(hit) = closest(key, keys.iter().copied())
    {
        return Some(hit.to_string());
    }

    let owner = sections()
        .iter()
        .filter(|s| Some(**s) != section)
        .find(|s| section_keys(s).is_some_and(|keys| keys.contains(&key)));
    if let Some(owner) = owner {
        return Some(format!("{owner}.{key}"));
    }

    match section {
        None => closest(key, sections().iter().copied()).map(str::to_string),
        Some(_) => None,
    }
}

/// Byte offset of `key` inside `[section]` (or at the top level when
/// `section` is `None`). Also matches dotted `section.key = ...` lines
/// before the first header.
pub fn locate_key(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let body = line.trim();

        if let Some(header) = body.strip_prefix('[') {
            current = header
                .split(']')
                .next()
                .map(|h| h.trim().trim_matches('['));
        } else if !body.starts_with('#') {
            let lhs = body.split('=').next().unwrap_or_default().trim_end();
            let path: Vec<&str> = lhs.split('.').map(str::trim).collect();
            let hit = match (current, path.as_slice()) {
                (cur, [k]) => cur == section && *k == key,
                (None, [s, k]) => Some(*s) == section && *k == key,
                _ => false,
            };
            if hit && body.contains('=') {
                let within = line[indent..].find(key).unwrap_or(0);
                return Some(offset + indent + within);
            }
        }
        offset += line.len();
    }
    None
}

/// Span and source for the first loaded file that contains `key`.
fn span_for(
    section: Option<&str>,
    key: &str,
    sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    sources
        .iter()
        .find_map(|(name, content)| {
            locate_key(content, section, key).map(|at| {
                (
                    Some(SourceSpan::new(at.into(), key.len())),
                    Some(NamedSource::new(name, content.clone())),
                )
            })
        })
        .unwrap_or((None, None))
}

/// Convert a figment error (which may hold several) into diagnostics.
///
/// `sources` pairs a display name with the raw TOML of each loaded file.
pub fn from_figment(err: figment::Error, sources: &[(String, String)]) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(key, expected) => {
                    let table = match path.split_last() {
                        Some((last, parent)) if last == key => parent,
                        _ => path.as_slice(),
                    };
                    let section = table.last().map(String::as_str);
                    let (span, src) = span_for(section, key, sources);
                    ConfigError::UnknownKey {
                        key: key.clone(),
                        section: section.map(str::to_string),
                        suggestion: suggest(section, key),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::InvalidType(actual, expected) => {
                    let (span, src) = match path.as_slice() {
                        [section, key] => span_for(Some(section), key, sources),
                        _ => (None, None),
                    };
                    ConfigError::InvalidType {
                        key: path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.clone(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Print diagnostics to stderr with miette's graphical renderer.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_section() {
        assert!(sections().contains(&"queue"));
        for section in sections() {
            let keys = section_keys(section)
                .unwrap_or_else(|| panic!("section `{section}` has no key list"));
            assert!(!keys.is_empty(), "{section}");
        }
        assert!(section_keys("queue").unwrap().contains(&"lock_timeout_secs"));
        assert!(section_keys("telegram").unwrap().contains(&"webhook_secret"));
        assert_eq!(section_keys("redis"), None);
    }

    #[test]
    fn sibling_typo_is_corrected() {
        assert_eq!(suggest(Some("queue"), "concurency").as_deref(), Some("concurrency"));
        assert_eq!(
            suggest(Some("telegram"), "webhook_secrt").as_deref(),
            Some("webhook_secret")
        );
    }

    #[test]
    fn misplaced_key_points_at_owning_section() {
        assert_eq!(
            suggest(Some("gateway"), "max_attempts").as_deref(),
            Some("queue.max_attempts")
        );
        assert_eq!(suggest(None, "admin_token").as_deref(), Some("gateway.admin_token"));
    }

    #[test]
    fn top_level_typo_suggests_section() {
        assert_eq!(suggest(None, "digets").as_deref(), Some("digest"));
        assert_eq!(suggest(None, "zzzzzz"), None);
    }

    #[test]
    fn locates_key_in_its_section_only() {
        let content = "[agent]\nname = \"x\"\n\n# name = \"commented\"\n[queue]\n  name = \"jobs\"\n";
        let at = locate_key(content, Some("queue"), "name").unwrap();
        assert_eq!(&content[at..at + 4], "name");
        assert!(content[..at].ends_with("[queue]\n  "));

        let at = locate_key(content, Some("agent"), "name").unwrap();
        assert_eq!(at, "[agent]\n".len());
        assert_eq!(locate_key(content, Some("digest"), "name"), None);
    }

    #[test]
    fn locates_dotted_top_level_key() {
        let content = "digest.timezne = \"UTC\"\n[queue]\nname = \"q\"\n";
        let at = locate_key(content, Some("digest"), "timezne").unwrap();
        assert_eq!(&content[at..at + 7], "timezne");
    }

    #[test]
    fn help_text_lists_valid_keys() {
        assert_eq!(
            unknown_key_help(Some("queue.concurrency"), "host, port"),
            "did you mean `queue.concurrency`? Valid keys: host, port"
        );
        assert_eq!(unknown_key_help(None, "host"), "valid keys: host");
    }
}
