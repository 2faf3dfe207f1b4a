use std::fmt;

use semver::{Version, VersionReq};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid version range '{0}'")]
pub struct RangeError(pub String);

/// A registry version range: `||`-separated alternatives of comparator sets.
///
/// Bare partials (`1.2`, `1.x`) cover only the named component, hyphen
/// ranges (`1.0.0 - 2.0.0`) are inclusive, and comparators may be separated
/// by whitespace or commas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    source: String,
    alternatives: Vec<VersionReq>,
}

impl VersionRange {
    pub fn parse(input: &str) -> Result<Self, RangeError> {
        let source = input.trim();
        let invalid = || RangeError(source.to_string());

        let alternatives = source
            .split("||")
            .map(|alternative| {
                let comparators = translate_comparator_set(alternative).ok_or_else(invalid)?;
                VersionReq::parse(&comparators).map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|requirement| requirement.matches(version))
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn translate_comparator_set(alternative: &str) -> Option<String> {
    let tokens = join_detached_operators(alternative);
    if tokens.is_empty() {
        return Some("*".to_string());
    }

    let mut comparators = Vec::new();
    let mut index = 0;
    while index < tokens.len() {
        if tokens.get(index + 1).map(String::as_str) == Some("-") {
            let upper = tokens.get(index + 2)?;
            comparators.extend(translate_hyphen(&tokens[index], upper)?);
            index += 3;
            continue;
        }
        comparators.push(translate_comparator(&tokens[index])?);
        index += 1;
    }

    Some(comparators.join(", "))
}

/// Splits on whitespace and commas, reattaching `>= 1.2.0` style operators
/// to their operand.
fn join_detached_operators(alternative: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut pending_operator: Option<&str> = None;
    for token in alternative
        .split(|ch: char| ch.is_whitespace() || ch == ',')
        .filter(|token| !token.is_empty())
    {
        if token.chars().all(is_operator_char) {
            pending_operator = Some(token);
            continue;
        }
        match pending_operator.take() {
            Some(operator) => tokens.push(format!("{operator}{token}")),
            None => tokens.push(token.to_string()),
        }
    }
    tokens
}

fn translate_hyphen(lower: &str, upper: &str) -> Option<Vec<String>> {
    let lower = strip_wildcards(strip_version_prefix(lower));
    let upper = strip_wildcards(strip_version_prefix(upper));
    let mut comparators = Vec::new();
    if !lower.is_empty() {
        comparators.push(format!(">={lower}"));
    }
    if !upper.is_empty() {
        comparators.push(format!("<={upper}"));
    }
    if comparators.is_empty() {
        comparators.push("*".to_string());
    }
    Some(comparators)
}

fn translate_comparator(token: &str) -> Option<String> {
    let operand_start = token
        .find(|ch: char| !is_operator_char(ch))
        .unwrap_or(token.len());
    let (operator, operand) = token.split_at(operand_start);
    let operator = if operator == "~>" { "~" } else { operator };
    let operand = strip_wildcards(strip_version_prefix(operand));

    match operator {
        "" | "=" if operand.is_empty() => Some("*".to_string()),
        "" | "=" if component_count(&operand) == 3 => Some(format!("={operand}")),
        "" | "=" => Some(format!("~{operand}")),
        ">=" | "^" | "~" if operand.is_empty() => Some("*".to_string()),
        ">" | "<" | "<=" if operand.is_empty() => None,
        ">" | "<" | ">=" | "<=" | "^" | "~" => Some(format!("{operator}{operand}")),
        _ => None,
    }
}

fn is_operator_char(ch: char) -> bool {
    matches!(ch, '<' | '>' | '=' | '^' | '~')
}

fn strip_version_prefix(operand: &str) -> &str {
    operand.trim_start_matches(['v', '='])
}

/// Drops `x`/`X`/`*` components so `1.2.x` reads as the partial `1.2`.
fn strip_wildcards(operand: &str) -> String {
    if operand.contains(['-', '+']) {
        return operand.to_string();
    }
    operand
        .split('.')
        .take_while(|part| !matches!(*part, "x" | "X" | "*"))
        .collect::<Vec<_>>()
        .join(".")
}

fn component_count(operand: &str) -> usize {
    let core = operand.split(['-', '+']).next().unwrap_or(operand);
    core.split('.').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(input: &str) -> Version {
        Version::parse(input).expect("valid version")
    }

    #[test]
    fn bare_partial_covers_only_named_components() {
        let range = VersionRange::parse("1.2").expect("must parse");
        assert!(range.matches(&v("1.2.0")));
        assert!(range.matches(&v("1.2.9")));
        assert!(!range.matches(&v("1.3.0")));

        let range = VersionRange::parse("1.x").expect("must parse");
        assert!(range.matches(&v("1.9.0")));
        assert!(!range.matches(&v("2.0.0")));
    }

    #[test]
    fn union_matches_any_alternative() {
        let range = VersionRange::parse("^8 || ^9").expect("must parse");
        assert!(range.matches(&v("8.4.1")));
        assert!(range.matches(&v("9.0.0")));
        assert!(!range.matches(&v("7.2.0")));
        assert!(!range.matches(&v("10.0.0")));
    }

    #[test]
    fn hyphen_range_is_inclusive() {
        let range = VersionRange::parse("1.0.0 - 2.0.0").expect("must parse");
        assert!(range.matches(&v("1.0.0")));
        assert!(range.matches(&v("2.0.0")));
        assert!(!range.matches(&v("2.0.1")));

        let range = VersionRange::parse("1 - 2.3").expect("must parse");
        assert!(range.matches(&v("2.3.7")));
        assert!(!range.matches(&v("2.4.0")));
    }

    #[test]
    fn detached_operators_and_star() {
        let range = VersionRange::parse(">= 12.0.0 < 13").expect("must parse");
        assert!(range.matches(&v("12.5.0")));
        assert!(!range.matches(&v("13.0.0")));

        let range = VersionRange::parse("*").expect("must parse");
        assert!(range.matches(&v("0.1.0")));
        assert_eq!(range.to_string(), "*");
    }

    #[test]
    fn rejects_tags_and_garbage() {
        assert!(VersionRange::parse("latest").is_err());
        assert!(VersionRange::parse("^1 || next").is_err());
        assert!(VersionRange::parse("1.0.0 -").is_err());
    }
}
