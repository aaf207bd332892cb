use once_cell::sync::Lazy;
use regex::{Captures, Regex};

pub const BULLET: char = '\u{25CF}';

static BULLET_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"- ([A-Za-z0-9_])").expect("bullet pattern compiles"));

/// Renders `- word` as `● Word` for display. The input is never modified;
/// callers keep the raw text for editing and storage.
pub fn render_content(raw: &str) -> String {
    BULLET_PATTERN
        .replace_all(raw, |caps: &Captures| {
            let mut out = String::with_capacity(caps[0].len() + 2);
            out.push(BULLET);
            out.push(' ');
            out.extend(caps[1].chars().flat_map(char::to_uppercase));
            out
        })
        .into_owned()
}
