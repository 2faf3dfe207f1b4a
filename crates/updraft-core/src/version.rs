use std::sync::LazyLock;

use regex::Regex;
use semver::Version;

static FULL_TRIPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,30}\.\d{1,30}\.\d{1,30}").expect("static pattern must compile")
});

static LEADING_NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,30}(\.\d{1,30})*").expect("static pattern must compile")
});

/// Normalizes a loosely formed version string into a semantic version.
///
/// `"11"` becomes `11.0.0` and `"11.2"` becomes `11.2.0`. Anything that
/// already carries three numeric components must parse as-is; `"11.2.3.4"`
/// is rejected rather than guessed at. Returns `None` for absent, empty, or
/// unparseable input.
pub fn coerce_version(input: Option<&str>) -> Option<Version> {
    let raw = input?.trim();
    if raw.is_empty() {
        return None;
    }

    if FULL_TRIPLE.is_match(raw) {
        return Version::parse(raw).ok();
    }

    let leading = LEADING_NUMERIC.find(raw)?;
    let padding = match leading.as_str().split('.').count() {
        1 => ".0.0",
        2 => ".0",
        _ => return None,
    };
    let candidate = format!(
        "{}{}{}",
        &raw[..leading.end()],
        padding,
        &raw[leading.end()..]
    );
    Version::parse(&candidate).ok()
}
