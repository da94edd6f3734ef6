//! Input expansion: multi-line capture and `@file` ingestion.
//!
//! A line starting with a triple-quote or triple-backtick delimiter opens a
//! quick multi-line capture ended by the same delimiter. `@path` references
//! are replaced by the file content, appended as labelled blocks after the
//! prose.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::tui;

/// Delimiters that open a quick multi-line capture.
pub const MULTILINE_DELIMITERS: [&str; 3] = ["\"\"\"", "'''", "```"];

/// Maximum near-miss suggestions shown for an unresolved `@file` reference.
const MAX_SUGGESTIONS: usize = 3;

static FILE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@([\w\./~-]+)").unwrap());

/// Return the delimiter if this line opens a quick multi-line capture.
pub fn multiline_delimiter(line: &str) -> Option<&'static str> {
    MULTILINE_DELIMITERS
        .iter()
        .find(|d| line.trim().starts_with(*d))
        .copied()
}

/// Collect a delimited multi-line block.
///
/// `read_line` yields continuation lines (`None` on EOF or interrupt, which
/// cancels the capture and returns an empty string). A line containing the
/// closing delimiter ends the block; the delimiter itself is stripped.
pub fn collect_delimited(
    first_line: &str,
    delimiter: &str,
    read_line: &mut dyn FnMut() -> Option<String>,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    if first_line.trim() != delimiter {
        lines.push(first_line.replacen(delimiter, "", 1));
    }

    loop {
        let line = match read_line() {
            Some(l) => l,
            None => {
                println!("{}", tui::warn("Multi-line input cancelled"));
                return String::new();
            }
        };
        if line.contains(delimiter) {
            lines.push(line.replace(delimiter, ""));
            break;
        }
        lines.push(line);
    }

    lines.join("\n")
}

/// Collect lines in dedicated multi-line mode until EOF.
///
/// Returns `None` when nothing was captured.
pub fn collect_until_eof(read_line: &mut dyn FnMut() -> Option<String>) -> Option<String> {
    println!("{}Multi-line input mode{}", tui::BOLD, tui::RESET);
    println!(
        "{}Type or paste your text. Press Ctrl+D on a new line to finish.{}",
        tui::DIM,
        tui::RESET
    );

    let mut lines: Vec<String> = Vec::new();
    while let Some(line) = read_line() {
        lines.push(line);
    }

    if lines.is_empty() {
        return None;
    }
    let result = lines.join("\n");
    println!(
        "{}",
        tui::ok(&format!(
            "Captured {} lines ({} characters)",
            lines.len(),
            result.len()
        ))
    );
    Some(result)
}

/// Expand `@path` references in the input.
///
/// Each resolvable reference is removed from the prose and its content
/// appended as a `--- File: ... ---` block. Unresolvable references stay in
/// place; a warning with up to three near-miss suggestions is printed.
pub fn process_file_references(text: &str) -> String {
    let mut processed = text.to_string();
    let mut blocks = String::new();

    for caps in FILE_REFERENCE.captures_iter(text) {
        let reference = caps.get(0).unwrap().as_str();
        let filepath = caps.get(1).unwrap().as_str();

        let Some(resolved) = resolve_file_path(filepath) else {
            println!("{}", tui::warn(&format!("File not found: {}", filepath)));
            if let Ok(cwd) = std::env::current_dir() {
                println!("{}   Current directory: {}{}", tui::DIM, cwd.display(), tui::RESET);
            }
            let suggestions = suggest_file_paths(filepath);
            if !suggestions.is_empty() {
                println!(
                    "{}   Did you mean: {}{}",
                    tui::DIM,
                    suggestions.join(", "),
                    tui::RESET
                );
            }
            continue;
        };

        match std::fs::read_to_string(&resolved) {
            Ok(content) => {
                println!(
                    "{}",
                    tui::ok(&format!("Loaded file: {} ({} chars)", filepath, content.len()))
                );
                blocks.push_str(&format!(
                    "\n\n--- File: {} ---\n{}\n--- End of {} ---\n",
                    filepath, content, filepath
                ));
                processed = processed.replacen(reference, "", 1);
            }
            Err(e) => {
                println!("{}", tui::err(&format!("Error reading {}: {}", filepath, e)));
            }
        }
    }

    if blocks.is_empty() {
        processed
    } else {
        format!("{}\n{}", processed.trim(), blocks)
    }
}

/// Resolve a reference: home expansion, then absolute, then relative to the
/// working directory.
fn resolve_file_path(filepath: &str) -> Option<PathBuf> {
    if let Some(stripped) = filepath.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            let path = home.join(stripped);
            if path.is_file() {
                return Some(path);
            }
        }
    }

    let path = Path::new(filepath);
    if path.is_file() {
        return Some(path.to_path_buf());
    }

    if let Ok(cwd) = std::env::current_dir() {
        let path = cwd.join(filepath);
        if path.is_file() {
            return Some(path);
        }
    }

    None
}

/// Look for a file with the same name in the working directory and its
/// immediate subdirectories.
fn suggest_file_paths(filepath: &str) -> Vec<String> {
    let filename = Path::new(filepath)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if filename.is_empty() {
        return Vec::new();
    }

    let Ok(cwd) = std::env::current_dir() else {
        return Vec::new();
    };

    let mut suggestions = Vec::new();
    if let Ok(entries) = std::fs::read_dir(&cwd) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() && entry.file_name().to_string_lossy() == filename {
                suggestions.push(filename.clone());
            } else if path.is_dir() {
                let nested = path.join(&filename);
                if nested.is_file() {
                    suggestions.push(format!(
                        "{}/{}",
                        entry.file_name().to_string_lossy(),
                        filename
                    ));
                }
            }
            if suggestions.len() >= MAX_SUGGESTIONS {
                break;
            }
        }
    }
    suggestions.truncate(MAX_SUGGESTIONS);
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scripted(lines: &[&str]) -> impl FnMut() -> Option<String> {
        let mut remaining: Vec<String> = lines.iter().map(|s| s.to_string()).collect();
        remaining.reverse();
        move || remaining.pop()
    }

    #[test]
    fn test_multiline_delimiter_detection() {
        assert_eq!(multiline_delimiter("'''"), Some("'''"));
        assert_eq!(multiline_delimiter("  \"\"\"start"), Some("\"\"\""));
        assert_eq!(multiline_delimiter("```"), Some("```"));
        assert_eq!(multiline_delimiter("hello"), None);
    }

    #[test]
    fn test_collect_delimited_basic() {
        let mut read = scripted(&["def hello():", "    pass", "'''"]);
        let result = collect_delimited("'''", "'''", &mut read);
        assert_eq!(result, "def hello():\n    pass\n");
    }

    #[test]
    fn test_collect_delimited_content_on_first_line() {
        let mut read = scripted(&["world'''"]);
        let result = collect_delimited("'''hello", "'''", &mut read);
        assert_eq!(result, "hello\nworld");
    }

    #[test]
    fn test_collect_delimited_cancelled_on_eof() {
        let mut read = scripted(&["unterminated"]);
        let result = collect_delimited("'''", "'''", &mut read);
        assert_eq!(result, "");
    }

    #[test]
    fn test_collect_until_eof() {
        let mut read = scripted(&["line one", "line two"]);
        assert_eq!(
            collect_until_eof(&mut read),
            Some("line one\nline two".to_string())
        );
    }

    #[test]
    fn test_collect_until_eof_empty() {
        let mut read = scripted(&[]);
        assert_eq!(collect_until_eof(&mut read), None);
    }

    #[test]
    fn test_file_reference_expanded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "file body").unwrap();

        let input = format!("Review this @{}", path.display());
        let expanded = process_file_references(&input);
        assert!(expanded.starts_with("Review this"));
        assert!(expanded.contains(&format!("--- File: {} ---", path.display())));
        assert!(expanded.contains("file body"));
        assert!(expanded.contains(&format!("--- End of {} ---", path.display())));
        // Reference removed from the prose portion.
        assert!(!expanded.trim_start().starts_with('@'));
    }

    #[test]
    fn test_missing_file_reference_left_in_place() {
        let input = "Look at @/tmp/definitely_not_here_4242.txt please";
        let expanded = process_file_references(input);
        assert_eq!(expanded, input);
    }

    #[test]
    fn test_plain_text_unchanged() {
        let input = "No references here";
        assert_eq!(process_file_references(input), input);
    }
}
