//! Volatility command extraction from generated text
//!
//! Scans fenced blocks, inline code spans and plain lines for invocations of
//! `vol`, `vol.py`, `volatility` or `python vol.py`. Only invocations that
//! name a memory image (`-f`) count, which keeps prose such as
//! "Volatility is a framework" out of the results.

use std::collections::HashSet;

use dfir_core::Dialect;
use once_cell::sync::Lazy;
use regex::Regex;

static EXECUTABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bpython3?\s+)?\b(vol\.py|volatility3|volatility|vol)\b").unwrap()
});

/// Options whose next token is an argument, not a plugin
const OPTIONS_WITH_VALUE: &[&str] = &[
    "-f",
    "--file",
    "--filename",
    "--profile",
    "-o",
    "--output-dir",
    "-r",
    "--renderer",
    "-p",
    "--plugin-dirs",
    "-s",
    "--symbol-dirs",
    "-c",
    "--config",
    "-l",
    "--location",
    "-D",
    "--dump-dir",
    "--output",
    "--output-file",
    "--kdbg",
    "--dtb",
];

const IMAGE_FLAGS: &[&str] = &["-f", "--file", "--filename"];

/// Characters that end a command inside a line
const TERMINATORS: &[char] = &['|', '>', ';', '&'];

/// A command found in text, before validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedCommand {
    /// Normalised command text (single spaces)
    pub command: String,
    pub plugin: String,
    pub dialect: Dialect,
}

/// Extract every distinct command from `text`, in order of appearance
pub fn extract_commands(text: &str) -> Vec<ExtractedCommand> {
    let mut seen = HashSet::new();
    let mut commands = Vec::new();

    for segment in segments(text) {
        for found in commands_in(segment) {
            if seen.insert(found.command.clone()) {
                commands.push(found);
            }
        }
    }

    tracing::debug!(count = commands.len(), "Extracted commands");
    commands
}

/// Lines of text with fence markers dropped and inline code split out
fn segments(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.starts_with("```"))
        .flat_map(|line| line.split('`'))
        .map(|s| s.trim().trim_start_matches("$ ").trim_start_matches("> "))
        .filter(|s| !s.is_empty())
}

fn commands_in(segment: &str) -> Vec<ExtractedCommand> {
    let mut found = Vec::new();
    let mut consumed = 0;

    for caps in EXECUTABLE.captures_iter(segment) {
        let (Some(whole), Some(exe)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        // e.g. the `vol` in an image named `vol.mem`
        if whole.start() < consumed {
            continue;
        }

        let rest = &segment[whole.start()..];
        let end = rest[whole.len()..]
            .find(TERMINATORS)
            .map(|cut| whole.len() + cut)
            .unwrap_or(rest.len());

        if let Some(command) = parse_invocation(&rest[..end], exe.as_str()) {
            consumed = whole.start() + end;
            found.push(command);
        }
    }

    found
}

fn parse_invocation(body: &str, executable: &str) -> Option<ExtractedCommand> {
    let tokens: Vec<&str> = body.split_whitespace().collect();
    let exe_pos = match tokens.first() {
        Some(first) if first.to_lowercase().starts_with("python") => 1,
        _ => 0,
    };
    if exe_pos >= tokens.len() {
        return None;
    }

    let mut plugin: Option<(usize, &str)> = None;
    let mut image_end: Option<usize> = None;
    let mut has_profile = false;

    let mut i = exe_pos + 1;
    while i < tokens.len() {
        // Plugin arguments such as `--pid 4` are not validated
        if plugin.is_some() && image_end.is_some() {
            break;
        }

        let token = tokens[i];
        if token.starts_with('-') {
            let flag = token.split('=').next().unwrap_or(token);
            let takes_value = OPTIONS_WITH_VALUE.contains(&flag) && !token.contains('=');
            let value_end = if takes_value {
                (i + 1).min(tokens.len() - 1)
            } else {
                i
            };

            if IMAGE_FLAGS.contains(&flag) {
                image_end = Some(value_end);
            }
            if flag == "--profile" {
                has_profile = true;
            }

            i = value_end + 1;
            continue;
        }

        if plugin.is_none() {
            let candidate = clean_plugin(token);
            if !looks_like_plugin(candidate) {
                return None;
            }
            plugin = Some((i, candidate));
        }
        i += 1;
    }

    let (plugin_pos, plugin) = plugin?;
    let image_end = image_end?;

    let last = plugin_pos.max(image_end);
    let mut command = tokens[..=last].join(" ");
    if command.ends_with(|c: char| matches!(c, '.' | ',' | ':' | ')')) {
        command.pop();
    }

    let exe = executable.to_lowercase();
    let dialect = if exe == "vol.py" || exe == "volatility" || has_profile {
        Dialect::Vol2
    } else if plugin.contains('.') {
        Dialect::Vol3
    } else {
        Dialect::Unknown
    };

    Some(ExtractedCommand {
        command,
        plugin: plugin.to_string(),
        dialect,
    })
}

fn clean_plugin(token: &str) -> &str {
    token.trim_matches(|c: char| matches!(c, '.' | ',' | ':' | ';' | ')' | '(' | '"' | '\''))
}

fn looks_like_plugin(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
}
