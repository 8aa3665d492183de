//! Display name cleanup.

use regex::Regex;
use std::sync::OnceLock;

/// Strip color codes and placeholder glyphs from a server name.
///
/// Each `^` together with the character after it becomes one space, as does
/// U+FFFD together with the character after it. `█` becomes one space.
pub fn sanitize_name(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new("(?s)\\^.?|\u{2588}|\u{FFFD}.?").unwrap());
    re.replace_all(raw, " ").into_owned()
}
