//! Terminal output: notes, status labels and table rendering.

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";

pub const RED: &str = "\x1b[31m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

/// Check if the terminal supports color output.
pub fn supports_color() -> bool {
    std::env::var("NO_COLOR").is_err()
        && (std::env::var("COLORTERM").is_ok()
            || std::env::var("TERM")
                .map(|t| t != "dumb")
                .unwrap_or(false))
}

/// Strip ANSI escape codes from a string.
pub fn strip_ansi(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn paint(color: &str, text: &str) -> String {
    if supports_color() {
        format!("{color}{text}{RESET}")
    } else {
        text.to_string()
    }
}

/// `completed` / `failed` / `error` / `running`, colored when possible.
pub fn status_label(status: &str) -> String {
    match status {
        "completed" | "valid" => paint(GREEN, status),
        "failed" | "error" | "invalid" => paint(RED, status),
        "running" => paint(YELLOW, status),
        _ => paint(DIM, status),
    }
}

// ---------------------------------------------------------------------------
// Notes
// ---------------------------------------------------------------------------

pub fn note_info(msg: &str) {
    if supports_color() {
        println!("{CYAN}{BOLD}ℹ{RESET} {msg}");
    } else {
        println!("INFO: {msg}");
    }
}

pub fn note_warn(msg: &str) {
    if supports_color() {
        eprintln!("{YELLOW}{BOLD}⚠{RESET} {msg}");
    } else {
        eprintln!("WARN: {msg}");
    }
}

/// Errors go to stderr.
pub fn note_error(msg: &str) {
    if supports_color() {
        eprintln!("{RED}{BOLD}✗{RESET} {msg}");
    } else {
        eprintln!("ERROR: {msg}");
    }
}

pub fn note_success(msg: &str) {
    if supports_color() {
        println!("{GREEN}{BOLD}✓{RESET} {msg}");
    } else {
        println!("OK: {msg}");
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

pub enum Align {
    Left,
    Right,
}

pub struct Column {
    pub header: String,
    pub align: Align,
    pub max_width: Option<usize>,
}

impl Column {
    pub fn left(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Left, max_width: None }
    }

    pub fn right(header: impl Into<String>) -> Self {
        Self { header: header.into(), align: Align::Right, max_width: None }
    }

    pub fn max_width(mut self, width: usize) -> Self {
        self.max_width = Some(width);
        self
    }
}

/// Render rows under `columns`; cells wider than a column's `max_width`
/// are cut with an ellipsis.
pub fn render_table(columns: &[Column], rows: &[Vec<String>]) -> String {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .enumerate()
                .map(|(i, col)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    match col.max_width {
                        Some(max) => truncate(cell, max),
                        None => cell.to_string(),
                    }
                })
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = columns.iter().map(|c| visible_len(&c.header)).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(visible_len(cell));
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, col)| pad_cell(&col.header, widths[i], &col.align))
        .collect();
    if supports_color() {
        out.push_str(&format!("{BOLD}  {}  {RESET}\n", header.join("  ")));
    } else {
        out.push_str(&format!("  {}  \n", header.join("  ")));
    }

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&format!("  {}  \n", sep.join("  ")));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| pad_cell(cell, widths[i], &columns[i].align))
            .collect();
        out.push_str(&format!("  {}  \n", cells.join("  ")));
    }
    out
}

fn visible_len(s: &str) -> usize {
    strip_ansi(s).chars().count()
}

fn truncate(s: &str, max: usize) -> String {
    if visible_len(s) <= max || max == 0 {
        return s.to_string();
    }
    let plain = strip_ansi(s);
    let mut cut: String = plain.chars().take(max.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

fn pad_cell(s: &str, width: usize, align: &Align) -> String {
    let pad = width.saturating_sub(visible_len(s));
    match align {
        Align::Left => format!("{s}{}", " ".repeat(pad)),
        Align::Right => format!("{}{s}", " ".repeat(pad)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi() {
        let colored = format!("{GREEN}hello{RESET}");
        assert_eq!(strip_ansi(&colored), "hello");
    }

    #[test]
    fn renders_table() {
        let cols = vec![Column::left("Session"), Column::right("Runs")];
        let rows = vec![
            vec!["20261019-081530-abc".to_string(), "2".to_string()],
            vec!["20261019-091530-def".to_string(), "12".to_string()],
        ];
        let table = render_table(&cols, &rows);
        assert!(table.contains("20261019-081530-abc"));
        assert!(table.contains(" 2  "));
    }

    #[test]
    fn truncates_long_cells() {
        let cols = vec![Column::left("Prompt").max_width(5)];
        let table = render_table(&cols, &[vec!["abcdefghij".to_string()]]);
        assert!(table.contains("abcd…"));
        assert!(!table.contains("abcdefghij"));
    }
}
