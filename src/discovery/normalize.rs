//! Canonical action names.
//!
//! Search results identify actions as `<vendor>_<semver>_<canonical>_global`,
//! e.g. `calendly_1.0.0_calendly_create_scheduling_link_global`. Compiled
//! tools only know the canonical segment, which is also the dedup key.

use regex::Regex;
use std::sync::OnceLock;

/// `<vendor>_<major>.<minor>[.<patch>...]_<canonical>_global`. Vendor is
/// lowercase alphanumeric; anything else passes through untouched.
const DECORATED_PATTERN: &str = r"^[a-z0-9]+_[0-9]+(?:\.[0-9]+)+_(.+)_global$";

static DECORATED: OnceLock<Option<Regex>> = OnceLock::new();

fn decorated() -> Option<&'static Regex> {
    DECORATED
        .get_or_init(|| Regex::new(DECORATED_PATTERN).ok())
        .as_ref()
}

/// Strips vendor/version decoration. Names that do not match pass through.
///
/// Stripping repeats until the name stops changing, so the result is always
/// a fixed point and normalizing twice equals normalizing once.
pub fn normalize_action_name(raw: &str) -> String {
    let Some(pattern) = decorated() else {
        return raw.to_string();
    };

    let mut current = raw;
    while let Some(canonical) = pattern.captures(current).and_then(|caps| caps.get(1)) {
        current = canonical.as_str();
    }
    current.to_string()
}
