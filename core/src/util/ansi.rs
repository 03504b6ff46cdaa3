use std::sync::OnceLock;

use regex::Regex;

/// Strip ANSI escape sequences (CSI and OSC) from backend output before it is
/// mirrored to a non-TTY stderr.
pub fn strip_ansi(input: &str) -> String {
    static ANSI_RE: OnceLock<Regex> = OnceLock::new();
    let re = ANSI_RE.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)").unwrap()
    });
    re.replace_all(input, "").into_owned()
}
