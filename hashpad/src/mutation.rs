//! Helpers feeding the single mutation path: transcript cleanup and dictation merge.

use thiserror::Error;

use crate::utils::{byte_offset_for_char, is_cjk};

pub const MAX_TRANSCRIPT_LENGTH: usize = 10_000;

/// What the core needs from an editing widget; no presentation internals.
pub trait TextSurface {
    /// Caret as a char index into `text()`, if the widget knows one.
    fn caret_position(&self) -> Option<usize>;
    fn text(&self) -> String;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("transcript exceeds maximum length of {MAX_TRANSCRIPT_LENGTH} characters")]
    TooLong,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedText {
    pub text: String,
    /// Char index just past the inserted fragment.
    pub caret: usize,
}

/// Trims a finalized phrase and strips control characters other than whitespace.
pub fn clean_transcript(text: &str) -> Result<String, TranscriptError> {
    if text.chars().count() > MAX_TRANSCRIPT_LENGTH {
        return Err(TranscriptError::TooLong);
    }

    Ok(text
        .trim()
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect())
}

/// Inserts `fragment` at `caret` (or at the end when unknown), padding with a single space on
/// each side whose neighbour is not already whitespace.
pub fn merge_transcript(document: &str, caret: Option<usize>, fragment: &str) -> MergedText {
    let total_chars = document.chars().count();
    let caret = caret.unwrap_or(total_chars).min(total_chars);
    if fragment.is_empty() {
        return MergedText {
            text: document.to_string(),
            caret,
        };
    }

    let split_at = byte_offset_for_char(document, caret);
    let (before, after) = document.split_at(split_at);

    let lead = needs_separator(before.chars().next_back(), fragment.chars().next());
    let trail = needs_separator(fragment.chars().next_back(), after.chars().next());

    let mut text = String::with_capacity(document.len() + fragment.len() + 2);
    text.push_str(before);
    if lead {
        text.push(' ');
    }
    text.push_str(fragment);
    if trail {
        text.push(' ');
    }
    text.push_str(after);

    let inserted = fragment.chars().count() + usize::from(lead) + usize::from(trail);
    MergedText {
        text,
        caret: caret + inserted,
    }
}

fn needs_separator(left: Option<char>, right: Option<char>) -> bool {
    match (left, right) {
        (Some(left), Some(right)) => {
            !left.is_whitespace() && !right.is_whitespace() && !(is_cjk(left) && is_cjk(right))
        }
        _ => false,
    }
}
