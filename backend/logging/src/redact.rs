//! Log Redaction Layer
//!
//! Scrubs API keys and bearer tokens from strings before they reach a log.

use regex::Regex;
use std::sync::LazyLock;

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(sk-(?:ant-)?[a-zA-Z0-9_\-]{20,})|(gh[pousr]_[A-Za-z0-9]{20,})|(Bearer\s+[a-zA-Z0-9\-\._~+/]+=*)")
        .expect("static regex")
});

static ENV_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b([A-Z0-9_]*(?:TOKEN|SECRET|PASSWORD|API_KEY))=(\S+)").expect("static regex")
});

/// Redacts sensitive patterns in a string.
pub fn redact_sensitive_data(input: &str) -> String {
    let redacted = API_KEY_RE.replace_all(input, "[REDACTED_TOKEN]");
    ENV_SECRET_RE
        .replace_all(&redacted, "$1=[REDACTED]")
        .into_owned()
}
