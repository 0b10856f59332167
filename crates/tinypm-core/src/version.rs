//! Semantic-version range matching.

use semver::{Version, VersionReq};

/// Find the highest version in `versions` that satisfies `range`.
///
/// Pre-release versions are excluded from normal ranges per semver
/// rules. Unparseable versions are skipped; an unparseable range
/// matches nothing.
#[must_use]
pub fn max_satisfying<'a, I>(versions: I, range: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let req = parse_range(range)?;

    versions
        .into_iter()
        .filter_map(|v| Version::parse(v).ok().map(|parsed| (v, parsed)))
        .filter(|(_, parsed)| req.matches(parsed))
        .max_by(|a, b| a.1.cmp(&b.1))
        .map(|(v, _)| v)
}

/// Check whether a single version satisfies a range.
///
/// Returns `false` when either side fails to parse.
#[must_use]
pub fn satisfies(version: &str, range: &str) -> bool {
    let Ok(version) = Version::parse(version) else {
        return false;
    };
    parse_range(range).is_some_and(|req| req.matches(&version))
}

/// Parse an npm-style version range.
///
/// Handles:
/// - Standard semver ranges: `^1.0.0`, `~1.0.0`, `>=1.0.0, <2.0.0`
/// - Exact versions: `1.2.3` (npm treats a bare version as `=1.2.3`,
///   while Rust's semver would read it as a caret range)
/// - X-ranges: `1.x`, `1.2.x`, `*`
fn parse_range(range: &str) -> Option<VersionReq> {
    let range = range.trim();

    if range.is_empty() {
        return None;
    }

    if range.contains('x') || range.contains('X') || range == "*" {
        return VersionReq::parse(&convert_x_range(range)).ok();
    }

    if Version::parse(range).is_ok() {
        return VersionReq::parse(&format!("={range}")).ok();
    }

    VersionReq::parse(range).ok()
}

/// Convert x-range to a semver range.
fn convert_x_range(range: &str) -> String {
    let range = range.trim();

    if range == "*" || range == "x" || range == "X" {
        return ">=0.0.0".to_string();
    }

    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, "x" | "X" | "*"] => {
            // "1.x" -> ">=1.0.0, <2.0.0"
            if let Ok(m) = major.parse::<u64>() {
                return format!(">={m}.0.0, <{}.0.0", m + 1);
            }
        }
        [major, minor, "x" | "X" | "*"] => {
            // "1.2.x" -> ">=1.2.0, <1.3.0"
            if let (Ok(m), Ok(n)) = (major.parse::<u64>(), minor.parse::<u64>()) {
                return format!(">={m}.{n}.0, <{m}.{}.0", n + 1);
            }
        }
        _ => {}
    }

    // Fallback: just replace x with 0
    range.replace(['x', 'X'], "0")
}
