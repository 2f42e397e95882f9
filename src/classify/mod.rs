//! Heuristic prompt classification.
//!
//! Assigns a [`TaskCategory`] to a raw prompt using lexical scoring:
//! keyword membership counts one point, structural pattern matches count
//! three. No model pre-call, no network, no randomness — classification
//! is deterministic for identical input.
//!
//! The same module hosts the degenerate-prompt check and the word-set
//! similarity measure used by the abuse guard; all three are pure
//! functions over prompt text.

use crate::types::{PromptAnalysis, TaskCategory};

/// Pattern-match weight relative to a keyword hit.
const PATTERN_WEIGHT: u32 = 3;

/// Boost applied to `casual` for simple informational questions, strong
/// enough to outrank incidental keyword hits in other categories.
const SIMPLE_QUESTION_BOOST: u32 = 5;

/// Keywords per category. Matched as case-insensitive substrings.
const CODING_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "debug",
    "error",
    "bug",
    "implement",
    "refactor",
    "algorithm",
    "programming",
    "python",
    "javascript",
    "typescript",
    "rust",
    "react",
    "api",
    "database",
    "sql",
    "git",
    "regex",
    "class",
    "method",
    "variable",
    "syntax",
    "compile",
    "runtime",
    "install",
    "component",
];

const MATH_KEYWORDS: &[&str] = &[
    "calculate",
    "solve",
    "equation",
    "mathematics",
    "algebra",
    "geometry",
    "calculus",
    "probability",
    "statistics",
    "formula",
    "theorem",
    "proof",
    "derivative",
    "integral",
    "matrix",
    "vector",
    "sum",
    "average",
    "percentage",
];

const CREATIVE_KEYWORDS: &[&str] = &[
    "write",
    "story",
    "poem",
    "creative",
    "blog",
    "article",
    "essay",
    "novel",
    "character",
    "plot",
    "narrative",
    "fiction",
    "draft",
    "brainstorm",
    "imagine",
    "describe",
    "scene",
    "dialogue",
    "marketing",
    "slogan",
    "advertisement",
    "email",
    "letter",
    "script",
];

const DATA_ANALYSIS_KEYWORDS: &[&str] = &[
    "analyze",
    "data",
    "summarize",
    "extract",
    "table",
    "chart",
    "csv",
    "json",
    "dataset",
    "report",
    "trend",
    "insight",
    "pattern",
    "compare",
    "metrics",
    "dashboard",
    "visualization",
    "parse",
    "format",
    "transform",
];

const CASUAL_KEYWORDS: &[&str] = &[
    "what",
    "how",
    "why",
    "when",
    "where",
    "who",
    "explain",
    "tell",
    "help",
    "advice",
    "recommend",
    "opinion",
    "think",
    "suggest",
];

/// Openers that mark a simple informational question.
const SIMPLE_QUESTION_OPENERS: &[&str] = &[
    "what is", "what are", "who is", "who are", "where is", "when is", "why is",
];

/// Creation verbs that disqualify the simple-question boost.
const CREATION_VERBS: &[&str] = &[
    "write", "create", "code", "function", "build", "implement", "develop",
];

/// Estimate token count at 4 characters per token.
///
/// Intentionally coarse — used only for quota pre-checks, never billing.
pub fn estimate_tokens(text: &str) -> u32 {
    text.len().div_ceil(4) as u32
}

/// Classify a prompt into a task category.
///
/// Scores every category by keyword and pattern hits, boosts `casual`
/// for simple interrogatives, and picks the highest aggregate. Ties and
/// all-zero scores default to `casual`. Confidence is the winning score
/// over the total (0.5 with no signal at all).
pub fn analyze_prompt(prompt: &str) -> PromptAnalysis {
    let lower = prompt.to_lowercase();

    let mut scores: [(TaskCategory, u32); 5] = [
        (TaskCategory::Coding, 0),
        (TaskCategory::Creative, 0),
        (TaskCategory::Math, 0),
        (TaskCategory::Casual, 0),
        (TaskCategory::DataAnalysis, 0),
    ];

    for (category, score) in scores.iter_mut() {
        *score = keyword_score(&lower, *category) + PATTERN_WEIGHT * pattern_score(prompt, &lower, *category);
    }

    if is_simple_question(&lower) {
        for (category, score) in scores.iter_mut() {
            if *category == TaskCategory::Casual {
                *score += SIMPLE_QUESTION_BOOST;
            }
        }
    }

    // Highest score wins; the array is scanned in a fixed order so ties
    // resolve identically on every call. All-zero falls through to casual.
    let mut winner = TaskCategory::Casual;
    let mut max_score = 0u32;
    for (category, score) in scores.iter() {
        if *score > max_score {
            max_score = *score;
            winner = *category;
        }
    }

    let total: u32 = scores.iter().map(|(_, s)| s).sum();
    let confidence = if total > 0 {
        max_score as f32 / total as f32
    } else {
        0.5
    };

    PromptAnalysis {
        category: winner,
        confidence,
        estimated_input_tokens: estimate_tokens(prompt),
    }
}

fn keyword_score(lower: &str, category: TaskCategory) -> u32 {
    let keywords = match category {
        TaskCategory::Coding => CODING_KEYWORDS,
        TaskCategory::Creative => CREATIVE_KEYWORDS,
        TaskCategory::Math => MATH_KEYWORDS,
        TaskCategory::Casual => CASUAL_KEYWORDS,
        TaskCategory::DataAnalysis => DATA_ANALYSIS_KEYWORDS,
    };
    keywords.iter().filter(|k| lower.contains(*k)).count() as u32
}

/// Structural pattern hits for a category. Each matched pattern counts
/// once, mirroring the keyword scoring above.
fn pattern_score(prompt: &str, lower: &str, category: TaskCategory) -> u32 {
    let hits: [bool; 7] = match category {
        TaskCategory::Coding => [
            prompt.contains("```"),
            has_inline_code(prompt),
            has_definition_header(lower, "def "),
            has_definition_header(lower, "function "),
            has_definition_header(lower, "class "),
            lower.contains("import "),
            has_assignment(lower),
        ],
        TaskCategory::Math => [
            has_arithmetic_expression(prompt),
            has_percentage(prompt),
            has_decimal(prompt),
            prompt.chars().any(|c| "∫∑∏√≤≥±∞".contains(c)),
            has_equation_variable(lower),
            false,
            false,
        ],
        TaskCategory::Creative => [
            lower.contains("write a ") || lower.contains("write an ") || lower.contains("write me "),
            lower.contains("create a story")
                || lower.contains("create a poem")
                || lower.contains("create an article"),
            lower.contains("help me write"),
            false,
            false,
            false,
            false,
        ],
        TaskCategory::DataAnalysis => [
            contains_word(lower, "csv"),
            contains_word(lower, "json"),
            lower.contains("data analysis")
                || lower.contains("data science")
                || lower.contains("data mining"),
            lower.contains("summarize this") || lower.contains("summarize the"),
            false,
            false,
            false,
        ],
        TaskCategory::Casual => [false; 7],
    };
    hits.iter().filter(|h| **h).count() as u32
}

/// "What is…"-style interrogative with no creation verb — the prompt is
/// a lookup question, not a request to build something.
fn is_simple_question(lower: &str) -> bool {
    let trimmed = lower.trim();
    SIMPLE_QUESTION_OPENERS.iter().any(|o| trimmed.starts_with(o))
        && !CREATION_VERBS.iter().any(|v| lower.contains(v))
}

/// A backtick-delimited span like `` `foo()` `` on a single line.
fn has_inline_code(prompt: &str) -> bool {
    let mut open = None;
    for (i, c) in prompt.char_indices() {
        if c == '`' {
            match open {
                None => open = Some(i),
                Some(start) => {
                    if i > start + 1 {
                        return true;
                    }
                    open = None;
                }
            }
        }
    }
    false
}

/// `<header><identifier>` such as "def foo" or "class Bar".
fn has_definition_header(lower: &str, header: &str) -> bool {
    lower.match_indices(header).any(|(i, _)| {
        lower[i + header.len()..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
    })
}

/// `const x =` / `let x =` variable declarations.
fn has_assignment(lower: &str) -> bool {
    for header in ["const ", "let "] {
        for (i, _) in lower.match_indices(header) {
            let rest = &lower[i + header.len()..];
            let ident_bytes: usize = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .map(char::len_utf8)
                .sum();
            if ident_bytes > 0 && rest[ident_bytes..].trim_start().starts_with('=') {
                return true;
            }
        }
    }
    false
}

/// `<digits> <op> <digits>` arithmetic like "12 + 7" or "3*4".
fn has_arithmetic_expression(prompt: &str) -> bool {
    let bytes = prompt.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'+' | b'-' | b'*' | b'/' | b'^') {
            let before = bytes[..i]
                .iter()
                .rev()
                .find(|c| !c.is_ascii_whitespace());
            let after = bytes[i + 1..].iter().find(|c| !c.is_ascii_whitespace());
            if before.is_some_and(u8::is_ascii_digit) && after.is_some_and(u8::is_ascii_digit) {
                return true;
            }
        }
    }
    false
}

fn has_percentage(prompt: &str) -> bool {
    let bytes = prompt.as_bytes();
    prompt
        .match_indices('%')
        .any(|(i, _)| i > 0 && bytes[i - 1].is_ascii_digit())
}

fn has_decimal(prompt: &str) -> bool {
    let bytes = prompt.as_bytes();
    prompt.match_indices('.').any(|(i, _)| {
        i > 0
            && bytes[i - 1].is_ascii_digit()
            && bytes.get(i + 1).is_some_and(|c| c.is_ascii_digit())
    })
}

/// A lone `x`, `y` or `z` followed by a comparison/assignment operator.
fn has_equation_variable(lower: &str) -> bool {
    let bytes = lower.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if matches!(b, b'x' | b'y' | b'z') {
            let isolated = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
            let followed = lower[i + 1..]
                .trim_start()
                .chars()
                .next()
                .is_some_and(|c| matches!(c, '=' | '<' | '>'));
            if isolated && followed {
                return true;
            }
        }
    }
    false
}

fn contains_word(lower: &str, word: &str) -> bool {
    lower.match_indices(word).any(|(i, _)| {
        let before_ok = i == 0
            || !lower.as_bytes()[i - 1].is_ascii_alphanumeric();
        let after_ok = lower
            .as_bytes()
            .get(i + word.len())
            .is_none_or(|c| !c.is_ascii_alphanumeric());
        before_ok && after_ok
    })
}

// ============================================================================
// Degenerate-prompt detection (consumed by the abuse guard)
// ============================================================================

/// Longest run of one repeated character that still reads as typing,
/// not spam.
const MAX_REPEATED_RUN: usize = 50;

/// Hard ceiling on prompt length before it reads as a token-limit probe.
const MAX_PROMPT_CHARS: usize = 50_000;

/// Check whether a prompt is degenerate: too short, absurdly long,
/// dominated by one repeated character, or mostly non-alphanumeric.
///
/// Returns the reason when suspicious, `None` otherwise.
pub fn degenerate_prompt_reason(prompt: &str) -> Option<&'static str> {
    if prompt.trim().chars().count() < 3 {
        return Some("prompt too short");
    }

    if prompt.chars().count() > MAX_PROMPT_CHARS {
        return Some("prompt exceeds reasonable length");
    }

    let mut run = 0usize;
    let mut last = None;
    for c in prompt.chars() {
        if Some(c) == last {
            run += 1;
            if run > MAX_REPEATED_RUN {
                return Some("excessive repeated characters");
            }
        } else {
            run = 1;
            last = Some(c);
        }
    }

    let total = prompt.chars().count();
    let special = prompt
        .chars()
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count();
    if total > 0 && special * 2 > total {
        return Some("excessive special characters");
    }

    None
}

/// Word-set Jaccard similarity between two prompts, after whitespace
/// and case normalization. 1.0 for an exact normalized match.
pub fn prompt_similarity(a: &str, b: &str) -> f64 {
    let normalize = |s: &str| {
        s.to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    };
    let a = normalize(a);
    let b = normalize(b);

    if a == b {
        return 1.0;
    }

    let words_a: std::collections::HashSet<&str> = a.split(' ').collect();
    let words_b: std::collections::HashSet<&str> = b.split(' ').collect();

    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();

    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}
