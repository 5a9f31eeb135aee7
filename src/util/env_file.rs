//! `.env` file and `KEY=VALUE` parsing for container environment forwarding

use anyhow::{bail, Context, Result};
use regex::Regex;
use std::path::Path;

/// Parse a single `KEY=VALUE` pair as given on the command line
pub fn parse_pair(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .with_context(|| format!("Expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if !is_valid_key(key) {
        bail!("Invalid environment variable name '{}'", key);
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parse the contents of a `.env` file
///
/// Blank lines and `#` comments are skipped, an optional `export ` prefix is
/// accepted, and matching single or double quotes around the value are removed.
pub fn parse_env_content(content: &str) -> Result<Vec<(String, String)>> {
    let line_re = Regex::new(r"^(?:export\s+)?([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.*)$")
        .context("Failed to compile .env line pattern")?;

    let mut vars = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let caps = line_re
            .captures(trimmed)
            .with_context(|| format!("Malformed line {}: '{}'", index + 1, trimmed))?;

        let key = caps[1].to_string();
        let value = unquote(caps[2].trim());
        vars.push((key, value));
    }

    Ok(vars)
}

pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read env file {}", path.display()))?;
    parse_env_content(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn unquote(value: &str) -> String {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return value[1..value.len() - 1].to_string();
        }
    }
    value.to_string()
}

fn is_valid_key(key: &str) -> bool {
    let mut chars = key.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
