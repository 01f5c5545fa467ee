//! Text hygiene for prompts, agent output, and user-facing messages.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

const REPLACEMENTS: &[(char, &str)] = &[
    ('\u{fb00}', "ff"),
    ('\u{fb01}', "fi"),
    ('\u{fb02}', "fl"),
    ('\u{fb03}', "ffi"),
    ('\u{fb04}', "ffl"),
    ('\u{2013}', "-"),
    ('\u{2014}', "--"),
    ('\u{2018}', "'"),
    ('\u{2019}', "'"),
    ('\u{201c}', "\""),
    ('\u{201d}', "\""),
    ('\u{2026}', "..."),
];

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").expect("invalid ansi regex")
});

static REDACTION_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(api[_-]?key\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)")
            .expect("invalid api_key regex"),
        Regex::new(r"(?i)(secret\s*[:=]\s*)([A-Za-z0-9\-_.+/]+)").expect("invalid secret regex"),
        Regex::new(r"(?i)(bearer\s+)([A-Za-z0-9\-_.+=/]+)").expect("invalid bearer regex"),
        Regex::new(r"(sk-[A-Za-z0-9]{16,})").expect("invalid sk_token regex"),
    ]
});

/// Replace ligatures and typographic punctuation with plain equivalents.
pub fn sanitize(input: &str) -> String {
    if !input.chars().any(|c| REPLACEMENTS.iter().any(|(from, _)| *from == c)) {
        return input.to_string();
    }

    let mut output = String::with_capacity(input.len());
    for c in input.chars() {
        match REPLACEMENTS.iter().find(|(from, _)| *from == c) {
            Some((_, to)) => output.push_str(to),
            None => output.push(c),
        }
    }
    output
}

pub fn strip_ansi(input: &str) -> String {
    ANSI_ESCAPE.replace_all(input, "").into_owned()
}

/// Mask credential-looking substrings.
pub fn redact_secrets(input: &str) -> String {
    let mut output = input.to_string();
    for regex in REDACTION_PATTERNS.iter() {
        output = regex
            .replace_all(&output, |caps: &Captures| {
                if caps.len() > 2 {
                    format!("{}[REDACTED]", &caps[1])
                } else {
                    "[REDACTED]".to_string()
                }
            })
            .into_owned();
    }
    output
}

/// Keep at most `max_chars` characters.
pub fn truncate_chars(input: &str, max_chars: usize) -> &str {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => &input[..idx],
        None => input,
    }
}

/// Like [`truncate_chars`] but marks the cut with `...`.
pub fn preview(input: &str, max_chars: usize) -> String {
    let cut = truncate_chars(input, max_chars);
    if cut.len() < input.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}

pub fn char_len(input: &str) -> usize {
    input.chars().count()
}
