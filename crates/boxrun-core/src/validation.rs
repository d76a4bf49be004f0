//! Input validation gate
//!
//! Checks that run before any container resource is committed. Everything in
//! this module is a pure function of its arguments: no engine access, no
//! filesystem access, no logging side effects beyond the returned error.

use crate::config::{limits, RuntimeConfig};
use crate::errors::SandboxError;
use crate::executors::ExecutionRequest;
use regex::Regex;
use std::sync::OnceLock;

fn image_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9:/_-]*$").expect("static regex"))
}

fn language_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_+-]*$").expect("static regex"))
}

fn memory_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\d+)([kmg])$").expect("static regex"))
}

/// Image references may only use alphanumerics, `:`, `/`, `-` and `_`.
pub fn is_safe_image_name(image: &str) -> bool {
    image_name_pattern().is_match(image)
}

pub fn is_valid_language_id(language: &str) -> bool {
    language_pattern().is_match(language)
}

/// True if any `/`- or `\`-separated segment of `value` is `..`.
pub fn has_traversal_segment(value: &str) -> bool {
    value.split(['/', '\\']).any(|segment| segment == "..")
}

/// Parse `256m` style limits into bytes. Case-insensitive; `None` on malformed
/// input or overflow.
pub fn parse_memory_limit(value: &str) -> Option<u64> {
    let lowered = value.to_ascii_lowercase();
    let captures = memory_pattern().captures(&lowered)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let multiplier: u64 = match captures.get(2)?.as_str() {
        "k" => 1024,
        "m" => 1024 * 1024,
        "g" => 1024 * 1024 * 1024,
        _ => return None,
    };
    amount.checked_mul(multiplier)
}

/// Bounds-check a caller supplied timeout.
pub fn check_timeout(timeout_seconds: i64) -> Result<u64, SandboxError> {
    let min = limits::MIN_TIMEOUT_SECONDS;
    let max = limits::MAX_TIMEOUT_SECONDS;
    match u64::try_from(timeout_seconds) {
        Ok(value) if (min..=max).contains(&value) => Ok(value),
        _ => Err(SandboxError::InvalidTimeout {
            actual: timeout_seconds,
            min,
            max,
        }),
    }
}

/// Reject `value` when it contains a parent-directory segment.
pub fn ensure_safe_path(field: &str, value: &str) -> Result<(), SandboxError> {
    if has_traversal_segment(value) {
        return Err(SandboxError::UnsafePath {
            field: field.to_string(),
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validate one execution request against its runtime configuration.
///
/// Order matters only for which error is reported first; all checks are
/// side-effect free.
pub fn validate_request(
    code: &str,
    timeout_override: Option<u64>,
    config: &RuntimeConfig,
) -> Result<ExecutionRequest, SandboxError> {
    if code.trim().is_empty() {
        return Err(SandboxError::EmptyCode);
    }

    let max = config.max_code_length();
    // Byte length bounds char count from above, so counting is only needed
    // for payloads that might be over the limit.
    if code.len() > max {
        let actual = code.chars().count();
        if actual > max {
            return Err(SandboxError::PayloadTooLarge { actual, max });
        }
    }

    let timeout_seconds = match timeout_override {
        Some(value) => check_timeout(i64::try_from(value).unwrap_or(i64::MAX))?,
        None => config.timeout_seconds(),
    };

    if !is_safe_image_name(config.image()) {
        return Err(SandboxError::UnsafePath {
            field: "image".to_string(),
            value: config.image().to_string(),
        });
    }
    for arg in config.command() {
        ensure_safe_path("command", arg)?;
    }

    Ok(ExecutionRequest {
        code: code.to_string(),
        timeout_seconds,
    })
}
