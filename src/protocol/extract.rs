//! Heuristic extraction of shell-command candidates from model output.
//!
//! Three independent passes scan the text: fenced shell code blocks, inline
//! backtick spans, and `run:`/`execute:` prefix patterns. Each pass assigns a
//! confidence score; candidates are deduplicated by normalised text (keeping
//! the highest-confidence instance), filtered, sorted, and capped.
//!
//! `extract` is a pure function of its input: no I/O, no hidden state, fully
//! deterministic. All heuristics live in named constants and predicates so
//! they can be tested independently.

use once_cell::sync::Lazy;
use regex::Regex;

/// Confidence for a fenced shell block that survives with a single line.
pub const CONFIDENCE_BLOCK_SINGLE: f64 = 0.90;
/// Confidence for a fenced shell block joined from 2-5 surviving lines.
pub const CONFIDENCE_BLOCK_MULTI: f64 = 0.85;
/// Confidence for an inline backtick span that looks like a command.
pub const CONFIDENCE_BACKTICK: f64 = 0.70;
/// Confidence for a `run:`/`execute:`-prefixed command.
pub const CONFIDENCE_PREFIX: f64 = 0.60;

/// Fenced blocks surviving with more than this many lines are not treated as
/// a single command (likely a script; excluded to avoid false positives).
const MAX_BLOCK_LINES: usize = 5;

/// Character window searched around a match for a nearby explanation.
const EXPLANATION_WINDOW: usize = 150;

/// Minimum length for an accepted explanation.
const MIN_EXPLANATION_LEN: usize = 10;

/// Default number of candidates returned by [`extract`].
pub const DEFAULT_MAX_RESULTS: usize = 3;

/// Which heuristic produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrigin {
    FencedBlock,
    Backtick,
    Pattern,
}

/// An unconfirmed, heuristically detected command string.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCandidate {
    pub text: String,
    pub explanation: Option<String>,
    pub confidence: f64,
    pub origin: CandidateOrigin,
}

static SHELL_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?si)```(?:bash|sh|shell)\s*\n(.*?)\n```").unwrap());
static BACKTICK_SPAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`]+)`").unwrap());
static COMMAND_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:run|execute|try|use):\s*`?([^`\n]+)`?").unwrap());

static SHELL_PROMPT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[$#>]\s*").unwrap());
static BARE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/[\w/.-]+$").unwrap());
static LS_TOTAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^total\s+\d+").unwrap());
static LS_PERMISSIONS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[drwx-]{10}").unwrap());
static ENGLISH_SENTENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][a-z]+.*\b(?:of|the|and|or|is|are|will|can)\b").unwrap());
static EXPLANATION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[a-z](?:explanation|note|example|usage|description|find|xargs|replace)\b")
        .unwrap()
});

/// Fence-language markers sometimes left dangling inside shell blocks.
const LANGUAGE_MARKERS: [&str; 9] = [
    "bash",
    "sh",
    "shell",
    "python",
    "javascript",
    "java",
    "ruby",
    "go",
    "rust",
];

/// Utilities a backtick span must start with to be considered a command
/// (possibly preceded by `sudo`), unless it contains a pipe or redirect.
const COMMON_COMMANDS: [&str; 35] = [
    "ls", "cd", "pwd", "cat", "grep", "find", "sed", "awk", "git", "docker", "kubectl", "npm",
    "pip", "python", "echo", "mkdir", "rm", "mv", "cp", "chmod", "chown", "sudo", "apt", "yum",
    "brew", "curl", "wget", "ssh", "ps", "kill", "top", "df", "du", "tar", "gzip",
];

/// Extract command candidates from model output text.
///
/// Overlapping matches across passes are expected and resolved only by the
/// dedup step (trim+lowercase normalisation), not by cross-pass exclusion.
pub fn extract(text: &str, max_results: usize) -> Vec<CommandCandidate> {
    let mut candidates = Vec::new();

    candidates.extend(extract_from_blocks(text));
    candidates.extend(extract_from_backticks(text));
    candidates.extend(extract_from_prefixes(text));

    let mut candidates = deduplicate(candidates);

    // Stable sort: equal confidences keep discovery order, so output is
    // deterministic.
    candidates.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap());

    candidates.retain(|c| is_likely_command(&c.text));
    candidates.truncate(max_results);
    candidates
}

fn extract_from_blocks(text: &str) -> Vec<CommandCandidate> {
    let mut out = Vec::new();

    for caps in SHELL_BLOCK.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let block = caps.get(1).unwrap().as_str().trim();

        let explanation = find_explanation_near(text, whole.start(), whole.end());

        let clean_lines: Vec<String> = block
            .lines()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                let cleaned = SHELL_PROMPT.replace(line, "").to_string();
                if cleaned.is_empty() || !is_command_line(&cleaned) {
                    None
                } else {
                    Some(cleaned)
                }
            })
            .collect();

        match clean_lines.len() {
            0 => {}
            1 => out.push(CommandCandidate {
                text: clean_lines[0].clone(),
                explanation: explanation.clone(),
                confidence: CONFIDENCE_BLOCK_SINGLE,
                origin: CandidateOrigin::FencedBlock,
            }),
            n if n <= MAX_BLOCK_LINES => out.push(CommandCandidate {
                text: clean_lines.join("\n"),
                explanation: explanation.clone(),
                confidence: CONFIDENCE_BLOCK_MULTI,
                origin: CandidateOrigin::FencedBlock,
            }),
            // Longer blocks are likely scripts, not single commands.
            _ => {}
        }
    }

    out
}

/// Decide whether a cleaned line inside a shell block is an actual command
/// invocation, as opposed to captured output or prose.
fn is_command_line(cleaned: &str) -> bool {
    if BARE_PATH.is_match(cleaned)
        || cleaned.starts_with(|c: char| c.is_ascii_digit())
        || LS_TOTAL.is_match(cleaned)
        || LS_PERMISSIONS.is_match(cleaned)
        || ENGLISH_SENTENCE.is_match(cleaned)
        || EXPLANATION_WORD.is_match(cleaned)
        || LANGUAGE_MARKERS.contains(&cleaned)
    {
        return false;
    }

    // Commands usually start with a lowercase letter or a path-ish character.
    cleaned
        .chars()
        .next()
        .map(|c| c.is_lowercase() || matches!(c, '~' | '.' | '/' | '-'))
        .unwrap_or(false)
}

fn extract_from_backticks(text: &str) -> Vec<CommandCandidate> {
    let mut out = Vec::new();

    for caps in BACKTICK_SPAN.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let span = caps.get(1).unwrap().as_str().trim();

        // Skip spans inside fenced blocks (already handled by the block pass).
        if is_inside_fence(text, whole.start()) {
            continue;
        }

        if !looks_like_command(span) {
            continue;
        }

        out.push(CommandCandidate {
            text: span.to_string(),
            explanation: find_explanation_near(text, whole.start(), whole.end()),
            confidence: CONFIDENCE_BACKTICK,
            origin: CandidateOrigin::Backtick,
        });
    }

    out
}

fn extract_from_prefixes(text: &str) -> Vec<CommandCandidate> {
    let mut out = Vec::new();

    for caps in COMMAND_PREFIX.captures_iter(text) {
        let whole = caps.get(0).unwrap();
        let command = caps.get(1).unwrap().as_str().trim();

        out.push(CommandCandidate {
            text: command.to_string(),
            explanation: find_explanation_near(text, whole.start(), whole.end()),
            confidence: CONFIDENCE_PREFIX,
            origin: CandidateOrigin::Pattern,
        });
    }

    out
}

/// True when `position` falls after an odd number of triple-backtick fence
/// markers, i.e. inside a fenced block.
fn is_inside_fence(text: &str, position: usize) -> bool {
    let before = &text[..position];
    before.matches("```").count() % 2 == 1
}

/// Check whether an inline span looks like a shell command rather than
/// arbitrary inline code.
fn looks_like_command(text: &str) -> bool {
    let mut words = text.split_whitespace();
    let first = match words.next() {
        Some(w) => w,
        None => return false,
    };
    // `sudo ls` counts via its second word.
    let first = if first == "sudo" {
        match words.next() {
            Some(w) => w,
            None => first,
        }
    } else {
        first
    };

    COMMON_COMMANDS.contains(&first) || text.contains('|') || text.contains('>')
}

static EXPLANATION_PATTERNS: Lazy<[Regex; 4]> = Lazy::new(|| {
    [
        Regex::new(r"[-\u{2192}\u{2022}]\s*([^.\n]+)").unwrap(), // bullet markers
        Regex::new(r":\s*([^.\n]+)").unwrap(),                   // trailing colon clause
        Regex::new(r"//\s*([^\n]+)").unwrap(),                   // line comments
        Regex::new(r"#\s*([^\n]+)").unwrap(),                    // hash comments
    ]
});

/// Search a window around a match for a nearby explanation: a bullet marker,
/// a colon clause, or a comment. First match longer than 10 characters wins.
fn find_explanation_near(text: &str, start: usize, end: usize) -> Option<String> {
    let before_start = floor_char_boundary(text, start.saturating_sub(EXPLANATION_WINDOW));
    let after_end = floor_char_boundary(text, (end + EXPLANATION_WINDOW).min(text.len()));

    let context = format!("{} {}", &text[before_start..start], &text[end..after_end]);

    for pattern in EXPLANATION_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(&context) {
            let explanation = caps.get(1).unwrap().as_str().trim();
            if explanation.len() > MIN_EXPLANATION_LEN {
                return Some(explanation.to_string());
            }
        }
    }

    None
}

/// Snap a byte offset down to the nearest char boundary.
fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// Reject strings that do not look like commands at all.
pub fn is_likely_command(command: &str) -> bool {
    if command.len() < 2 || command.len() > 500 {
        return false;
    }

    // All-alphabetic strings are fine when short (`pwd`, `ls`), but long ones
    // are almost certainly prose.
    if command.chars().all(|c| c.is_alphabetic()) && command.len() > 10 {
        return false;
    }

    // Sentence-shaped: ends with a period and contains a space.
    if command.ends_with('.') && command.contains(' ') {
        return false;
    }

    true
}

/// Remove duplicate candidates (trim+lowercase normalisation), keeping the
/// highest-confidence instance at its first-seen position.
fn deduplicate(candidates: Vec<CommandCandidate>) -> Vec<CommandCandidate> {
    let mut out: Vec<CommandCandidate> = Vec::new();

    for candidate in candidates {
        let normalized = candidate.text.trim().to_lowercase();
        match out
            .iter_mut()
            .find(|c| c.text.trim().to_lowercase() == normalized)
        {
            Some(existing) => {
                if candidate.confidence > existing.confidence {
                    *existing = candidate;
                }
            }
            None => out.push(candidate),
        }
    }

    out
}
