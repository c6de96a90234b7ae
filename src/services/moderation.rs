//! Profanity masking and length limiting for team-provided text.

use std::collections::HashSet;

use crate::error::ServiceError;

/// Text after moderation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Moderated {
    /// Text to store and display.
    pub text: String,
    /// At least one blocked word was masked.
    pub masked: bool,
    /// The input exceeded the length limit.
    pub truncated: bool,
}

/// Trim, mask blocked words and truncate `text` to `max_chars` characters.
///
/// Matching is case-insensitive and only hits whole words, so `class` survives a
/// list containing `ass`. Masks keep the length of the word they replace.
pub fn moderate(
    text: &str,
    max_chars: usize,
    blocked_words: &[String],
) -> Result<Moderated, ServiceError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput("text must not be empty".into()));
    }

    let blocked = blocked_words
        .iter()
        .map(|word| word.to_lowercase())
        .collect::<HashSet<_>>();

    let mut output = String::with_capacity(trimmed.len());
    let mut word = String::new();
    let mut masked = false;
    for ch in trimmed.chars() {
        if ch.is_alphanumeric() {
            word.push(ch);
            continue;
        }
        masked |= flush_word(&mut output, &mut word, &blocked);
        output.push(ch);
    }
    masked |= flush_word(&mut output, &mut word, &blocked);

    let truncated = output.chars().count() > max_chars;
    let text = if truncated {
        output
            .chars()
            .take(max_chars)
            .collect::<String>()
            .trim_end()
            .to_owned()
    } else {
        output
    };

    Ok(Moderated {
        text,
        masked,
        truncated,
    })
}

fn flush_word(output: &mut String, word: &mut String, blocked: &HashSet<String>) -> bool {
    if word.is_empty() {
        return false;
    }
    let hit = blocked.contains(&word.to_lowercase());
    if hit {
        output.extend(std::iter::repeat_n('*', word.chars().count()));
    } else {
        output.push_str(word);
    }
    word.clear();
    hit
}
