use super::command_registry::{lookup, RESIZE_STEP_TYPE};
use crate::flows::{Step, StepParam};

pub const PROTOCOL_PREFIX: &str = "web+wami://";
pub const DEFAULT_SHARE_TITLE: &str = "Shared Images Flow";
pub const DEFAULT_RESIZE_WIDTH: i64 = 1000;

/// Flow name and steps an activation resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedIntent {
    pub title: String,
    pub steps: Vec<Step>,
}

impl ResolvedIntent {
    /// What a share without a recognizable protocol URL turns into.
    pub fn share_default(title: Option<&str>, width: i64) -> Self {
        let title = title
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_SHARE_TITLE);
        Self {
            title: title.to_string(),
            steps: vec![Step::new(RESIZE_STEP_TYPE, vec![StepParam::int(width)])],
        }
    }
}

pub fn is_protocol_url(url: &str) -> bool {
    url.starts_with(PROTOCOL_PREFIX)
}

/// Parses `web+wami://<command>[/<arg>][?...]`.
///
/// Returns `None` when the URL is not ours, when the path does not decode
/// to UTF-8, or when it decodes to an empty title.
pub fn parse_protocol_url(url: &str, default_width: i64) -> Option<ResolvedIntent> {
    let remainder = url.strip_prefix(PROTOCOL_PREFIX)?;
    let path = remainder.split('?').next().unwrap_or("");
    let mut segments = path.split('/');
    let command = segments.next().unwrap_or("").to_lowercase();
    let width = segments
        .next()
        .and_then(parse_leading_int)
        .filter(|value| *value > 0)
        .unwrap_or(default_width);

    let decoded = urlencoding::decode(path).ok()?;
    let title = collapse_slashes(&decoded);
    if title.is_empty() {
        return None;
    }

    Some(ResolvedIntent {
        title,
        steps: vec![lookup(&command).build(width)],
    })
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut in_run = false;
    for ch in path.chars() {
        if ch == '/' {
            if !in_run {
                out.push(' ');
            }
            in_run = true;
        } else {
            out.push(ch);
            in_run = false;
        }
    }
    out.trim().to_string()
}

/// Leading-integer parse: optional sign, then digits, rest ignored.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let trimmed = raw.trim_start();
    let (sign, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (-1, &trimmed[1..]),
        Some(b'+') => (1, &trimmed[1..]),
        _ => (1, trimmed),
    };
    let end = digits
        .char_indices()
        .find(|(_, ch)| !ch.is_ascii_digit())
        .map(|(idx, _)| idx)
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|value| sign * value)
}
