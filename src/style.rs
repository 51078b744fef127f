/// ANSI coloring of output lines by their tag prefix. Purely cosmetic and
/// gated by the color setting; the console buffer always stores plain text.
const RESET: &str = "\x1b[0m";

const CYAN: &str = "\x1b[36m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const MAGENTA: &str = "\x1b[35m";
const BLUE: &str = "\x1b[34m";
const GREY: &str = "\x1b[90m";
const RED: &str = "\x1b[31m";

fn color_for(line: &str) -> Option<&'static str> {
    let tags: &[(&str, &str)] = &[
        ("[VOICE]", CYAN),
        ("[SHELL]", YELLOW),
        ("[CMD]", GREEN),
        ("[CONFIRM]", MAGENTA),
        ("[CALIB]", BLUE),
        ("[RESP]", GREEN),
        ("[HISTORY]", GREY),
        ("[STATUS]", CYAN),
        ("[PROMPT]", YELLOW),
        ("[ERROR]", RED),
        ("[TEST]", BLUE),
    ];
    let trimmed = line.trim_start();
    tags.iter()
        .find(|(tag, _)| trimmed.starts_with(tag))
        .map(|(_, color)| *color)
}

/// Wrap a line in its tag color when coloring is enabled. Untagged lines
/// pass through unchanged either way.
pub fn paint(line: &str, use_color: bool) -> String {
    if !use_color {
        return line.to_owned();
    }
    match color_for(line) {
        Some(color) => format!("{color}{line}{RESET}"),
        None => line.to_owned(),
    }
}
