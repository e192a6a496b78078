//! Small helpers shared by the Corral crates: secret redaction, path
//! expansion, and loading of the workflow-service configuration file.

use once_cell::sync::Lazy;
use regex::Regex;

pub mod config;
pub mod path_processing;

pub use config::{ConfigError, ServiceConfig, default_config_path, load_config, load_config_from_path};
pub use path_processing::expand_tilde;

static SENSITIVE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)(authorization:\s*)([^\r\n]+)", "${1}<redacted>"),
        (r"(?i)([A-Z0-9_]*?(?:KEY|TOKEN|SECRET|PASSWORD)=)([^\s]+)", "${1}<redacted>"),
        (r#"(?i)("[a-z0-9_]*(?:password|secret|token)"\s*:\s*)"[^"]*""#, "${1}\"<redacted>\""),
        (r"(?i)(://[^:/@\s]+:)[^@\s]+@", "${1}<redacted>@"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|regex| (regex, replacement)))
    .collect()
});

/// Redacts values that look like secrets in a string.
///
/// Covers authorization headers, `NAME_PASSWORD=value` style assignments,
/// JSON fields whose key mentions a password/secret/token, and credentials
/// embedded in URLs.
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for (pattern, replacement) in SENSITIVE_PATTERNS.iter() {
        redacted = pattern.replace_all(&redacted, *replacement).into_owned();
    }
    redacted
}
