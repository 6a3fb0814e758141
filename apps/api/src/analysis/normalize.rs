//! Content normalization: bounds extracted text before it is sent to the model.

use std::sync::LazyLock;

use regex::Regex;

static EXCESS_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizerConfig {
    /// Lines at or below this many characters are dropped.
    pub min_line_length: usize,
    pub max_lines: usize,
    pub max_chars: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_line_length: 10,
            max_lines: 50,
            max_chars: 4000,
        }
    }
}

/// Extracted text after filtering and truncation. Empty means "no content".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedContent(String);

impl NormalizedContent {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn line_count(&self) -> usize {
        if self.0.is_empty() {
            0
        } else {
            self.0.lines().count()
        }
    }
}

/// Normalizes extracted text:
/// 1. keep printable ASCII and `\n`
/// 2. collapse 3+ newlines to 2
/// 3. trim
/// 4. trim each line, keep lines longer than `min_line_length`
/// 5. keep the first `max_lines` lines
/// 6. keep whole lines while the result fits in `max_chars`
pub fn normalize(text: &str, config: &NormalizerConfig) -> NormalizedContent {
    let printable: String = text
        .chars()
        .filter(|&c| c == '\n' || (' '..='~').contains(&c))
        .collect();
    let collapsed = EXCESS_NEWLINES.replace_all(&printable, "\n\n");

    let mut kept: Vec<&str> = Vec::new();
    let mut total_chars = 0;
    for line in collapsed
        .trim()
        .split('\n')
        .map(str::trim)
        .filter(|line| line.len() > config.min_line_length)
        .take(config.max_lines)
    {
        let separator = usize::from(!kept.is_empty());
        if total_chars + separator + line.len() > config.max_chars {
            break;
        }
        total_chars += separator + line.len();
        kept.push(line);
    }

    NormalizedContent(kept.join("\n"))
}
