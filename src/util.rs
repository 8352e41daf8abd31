//! Shared utility functions.

use regex::Regex;
use std::sync::LazyLock;

use tokio::task::spawn_blocking;

use crate::{Error, Result};

/// Tokens that look like file paths (`src/lib.rs`, `parser.go`, `./a/b.tsx`).
pub static FILE_PATH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:[\w.-]+/)*[\w-]+(?:\.[\w-]+)*\.(?:rs|go|py|ts|tsx|js|jsx|mjs|java|kt|rb|php|c|h|cc|cpp|hpp|cs|swift|scala|sql|sh|md|toml|ya?ml|json|html|css|scss|vue|svelte)\b",
    )
    .unwrap()
});

/// Run a synchronous store operation off the async runtime.
pub async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| Error::TaskJoin(e.to_string()))?
}

/// Lower-case `text` and replace file-path tokens with spaces so that
/// path fragments (`add_feature.rs`) do not count as request keywords.
pub fn normalize_request(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = FILE_PATH_RE.replace_all(&lowered, " ");
    stripped
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '\'' { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// File paths mentioned in `text`, de-duplicated in order of appearance.
pub fn extract_file_paths(text: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for m in FILE_PATH_RE.find_iter(text) {
        let path = m.as_str().trim_start_matches("./").to_string();
        if !seen.contains(&path) {
            seen.push(path);
        }
    }
    seen
}

/// Count whole-word occurrences of `keyword` (one or more words) in
/// normalized text.
pub fn count_keyword(normalized: &str, keyword: &str) -> usize {
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    let needle: Vec<&str> = keyword.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return 0;
    }
    words
        .windows(needle.len())
        .filter(|window| *window == needle.as_slice())
        .count()
}

/// Word positions of `keyword` in normalized text.
pub fn keyword_positions(normalized: &str, keyword: &str) -> Vec<usize> {
    let words: Vec<&str> = normalized.split(' ').filter(|w| !w.is_empty()).collect();
    let needle: Vec<&str> = keyword.split_whitespace().collect();
    if needle.is_empty() || needle.len() > words.len() {
        return Vec::new();
    }
    words
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle.as_slice())
        .map(|(i, _)| i)
        .collect()
}
