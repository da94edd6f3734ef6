//! Terminal rendering for model responses and file contents.
//!
//! Fenced code blocks are highlighted through syntect; prose passes through
//! unchanged. `highlight()` renders a whole file by extension, used when the
//! assistant reads a file back to the user.

use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;
use syntect::util::as_24_bit_terminal_escaped;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);

const THEME: &str = "base16-ocean.dark";

/// Render a model response: prose stays as-is, fenced code blocks get
/// highlighted with horizontal rules above and below.
///
/// Returns a ready-to-print `String` (includes ANSI escapes).
pub fn render_response(text: &str) -> String {
    let mut output = String::new();
    let mut in_code_block = false;
    let mut code_lang = String::new();
    let mut code_content = String::new();

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            if in_code_block {
                output.push_str(&render_code_block(&code_content, &code_lang));
                code_content.clear();
                code_lang.clear();
                in_code_block = false;
            } else {
                in_code_block = true;
                code_lang = line
                    .trim_start()
                    .strip_prefix("```")
                    .unwrap_or("")
                    .trim()
                    .to_string();
            }
        } else if in_code_block {
            code_content.push_str(line);
            code_content.push('\n');
        } else {
            output.push_str(line);
            output.push('\n');
        }
    }

    // Unclosed fence at end of input still renders.
    if in_code_block && !code_content.is_empty() {
        output.push_str(&render_code_block(&code_content, &code_lang));
    }

    output
}

/// Highlight a whole file's content by its extension token.
pub fn highlight(content: &str, extension: &str) -> String {
    let syntax = SYNTAX_SET
        .find_syntax_by_extension(extension)
        .or_else(|| SYNTAX_SET.find_syntax_by_token(extension))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

    let theme = &THEME_SET.themes[THEME];
    let mut highlighter = HighlightLines::new(syntax, theme);

    let mut output = String::new();
    for line in content.lines() {
        match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => {
                output.push_str(&as_24_bit_terminal_escaped(&ranges[..], false));
                output.push_str("\x1b[0m\n");
            }
            Err(_) => {
                output.push_str(line);
                output.push('\n');
            }
        }
    }
    output
}

/// Render a single code block with syntax highlighting.
///
/// No side borders, so code lines stay clean for copy-paste. Top and bottom
/// rules are sized to content width.
fn render_code_block(code: &str, lang: &str) -> String {
    let mut output = String::new();

    let max_line = code.lines().map(|l| l.len()).max().unwrap_or(0);
    let lang_display = if lang.is_empty() { "code" } else { lang };
    let rule_width = (max_line + 2).clamp(40, 80);

    // Header: ─── lang ──────────
    let label_len = lang_display.len() + 2;
    let remaining = rule_width.saturating_sub(label_len);
    let left = 3.min(remaining);
    let right = remaining.saturating_sub(left);
    output.push_str(&format!(
        "\x1b[38;5;240m{} {} {}\x1b[0m\n",
        "─".repeat(left),
        lang_display,
        "─".repeat(right),
    ));

    let syntax = SYNTAX_SET
        .find_syntax_by_token(lang)
        .or_else(|| SYNTAX_SET.find_syntax_by_extension(lang))
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());

    let theme = &THEME_SET.themes[THEME];
    let mut highlighter = HighlightLines::new(syntax, theme);

    for line in code.lines() {
        output.push_str("  ");
        match highlighter.highlight_line(line, &SYNTAX_SET) {
            Ok(ranges) => {
                output.push_str(&as_24_bit_terminal_escaped(&ranges[..], false));
                output.push_str("\x1b[0m\n");
            }
            Err(_) => {
                output.push_str(&format!("\x1b[32m{}\x1b[0m\n", line));
            }
        }
    }

    output.push_str(&format!("\x1b[38;5;240m{}\x1b[0m\n", "─".repeat(rule_width)));

    output
}
