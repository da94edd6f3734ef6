//! ANSI styling constants and small terminal rendering helpers.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const CYAN: &str = "\x1b[36m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const RED: &str = "\x1b[31m";

/// Render a bordered panel with a title, one box-drawing line per content line.
///
/// Width adapts to the longest line, clamped to the 40..=100 range. Lines
/// longer than the inner width are truncated rather than wrapped so embedded
/// ANSI-free previews stay aligned.
pub fn panel(title: &str, body: &str) -> String {
    let inner = body
        .lines()
        .map(|l| l.chars().count())
        .max()
        .unwrap_or(0)
        .max(title.chars().count() + 2)
        .clamp(40, 100);

    let mut out = String::new();
    let title_len = title.chars().count() + 2;
    let remaining = inner.saturating_sub(title_len);
    out.push_str(&format!(
        "{}\u{256d}\u{2500} {} {}\u{256e}{}\n",
        CYAN,
        title,
        "\u{2500}".repeat(remaining),
        RESET
    ));
    for line in body.lines() {
        let mut shown: String = line.chars().take(inner).collect();
        let pad = inner.saturating_sub(shown.chars().count());
        shown.push_str(&" ".repeat(pad));
        out.push_str(&format!("{}\u{2502}{} {} {}\u{2502}{}\n", CYAN, RESET, shown, CYAN, RESET));
    }
    out.push_str(&format!(
        "{}\u{2570}{}\u{256f}{}\n",
        CYAN,
        "\u{2500}".repeat(inner + 2),
        RESET
    ));
    out
}

/// Success line: green check + message.
pub fn ok(msg: &str) -> String {
    format!("{}\u{2713} {}{}", GREEN, msg, RESET)
}

/// Error line: red cross + message.
pub fn err(msg: &str) -> String {
    format!("{}\u{2717} {}{}", RED, msg, RESET)
}

/// Warning line in yellow.
pub fn warn(msg: &str) -> String {
    format!("{}{}{}", YELLOW, msg, RESET)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panel_contains_title_and_body() {
        let p = panel("Tool: read_file", "File: /tmp/x\nReason: check");
        assert!(p.contains("Tool: read_file"));
        assert!(p.contains("File: /tmp/x"));
        assert!(p.contains("Reason: check"));
    }

    #[test]
    fn test_panel_truncates_long_lines() {
        let long = "x".repeat(300);
        let p = panel("t", &long);
        // Inner width is capped at 100, so the 300-char line must be cut.
        assert!(!p.contains(&long));
    }

    #[test]
    fn test_status_lines() {
        assert!(ok("done").contains("done"));
        assert!(err("bad").contains("bad"));
        assert!(warn("careful").contains("careful"));
    }
}
