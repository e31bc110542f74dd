//! Version predicates over OSV ranges.
//!
//! Go module versions (`v1.2.3`) and toolchain versions (`go1.21.3`) are both
//! canonicalized to semver before comparison. Only `SEMVER` ranges filter;
//! `GIT` and `ECOSYSTEM` ranges are treated as affected so a missing range
//! type never hides a real vulnerability.

use semver::{Prerelease, Version};

use crate::{Affected, Range, RangeKind};

/// Parse a module or toolchain version into canonical semver.
///
/// Accepts `v1.2.3`, `1.2.3`, `go1.21.3`, `go1.21` (padded to `1.21.0`), and
/// pre-release toolchain forms such as `go1.21rc2` (`1.21.0-rc2`). Returns
/// `None` for strings that cannot be interpreted as a version.
pub fn canonical_version(raw: &str) -> Option<Version> {
    let mut v = raw.trim();
    if let Some(rest) = v.strip_prefix("go") {
        v = rest;
    }
    v = v.strip_prefix('v').unwrap_or(v);
    if v.is_empty() {
        return None;
    }

    // Toolchain pre-releases are spelled without a dash: go1.21rc2.
    let (core, pre) = split_prerelease(v);

    let mut parts = core.splitn(3, '.');
    let major: u64 = parts.next()?.parse().ok()?;
    let minor: u64 = match parts.next() {
        Some(p) => p.parse().ok()?,
        None => 0,
    };
    let patch: u64 = match parts.next() {
        // The patch component may itself carry a dash pre-release (0.3.7-pre).
        Some(p) => match p.split_once('-') {
            Some((num, tail)) => {
                let mut version = Version::new(major, minor, num.parse().ok()?);
                version.pre = Prerelease::new(tail).ok()?;
                return Some(version);
            }
            None => p.parse().ok()?,
        },
        None => 0,
    };

    let mut version = Version::new(major, minor, patch);
    if let Some(pre) = pre {
        version.pre = Prerelease::new(pre).ok()?;
    }
    Some(version)
}

/// Split `1.21rc2` into (`1.21`, `rc2`). Dash-separated pre-releases are left
/// for semver itself.
fn split_prerelease(v: &str) -> (&str, Option<&str>) {
    if v.contains('-') {
        return (v, None);
    }
    for marker in ["rc", "beta", "alpha"] {
        if let Some(idx) = v.find(marker) {
            let (core, pre) = v.split_at(idx);
            if !core.is_empty() && core.ends_with(|c: char| c.is_ascii_digit() || c == '.') {
                return (core.trim_end_matches('.'), Some(pre));
            }
        }
    }
    (v, None)
}

/// Whether `version` falls inside any of the given ranges.
///
/// The events of a `SEMVER` range form a linear `introduced`/`fixed`
/// sequence; a version is affected iff the most recent event at or before it
/// is an `introduced`. Ranges of other kinds do not filter: if no semver
/// range is present at all, the version is conservatively affected.
pub fn affects(ranges: &[Range], version: &Version) -> bool {
    let mut any_semver = false;
    for range in ranges {
        if range.kind != RangeKind::Semver {
            continue;
        }
        any_semver = true;
        if semver_affects(range, version) {
            return true;
        }
    }
    !any_semver
}

/// The single-range semver predicate behind [`affects`].
pub fn semver_affects(range: &Range, version: &Version) -> bool {
    // Latest event at or before `version` wins. Events are not trusted to be
    // sorted; a fixed event processed later overrides an introduced event at
    // the same version, so the fix boundary itself is unaffected.
    let mut latest: Option<(Version, bool)> = None;
    for event in &range.events {
        let (raw, introduced) = match (&event.introduced, &event.fixed) {
            (Some(v), _) => (v.as_str(), true),
            (_, Some(v)) => (v.as_str(), false),
            _ => continue,
        };
        let event_version = if raw == "0" {
            Version::new(0, 0, 0)
        } else {
            match canonical_version(raw) {
                Some(v) => v,
                None => continue,
            }
        };
        if event_version <= *version
            && latest
                .as_ref()
                .map_or(true, |(best, _)| event_version >= *best)
        {
            latest = Some((event_version, introduced));
        }
    }
    latest.map_or(false, |(_, introduced)| introduced)
}

/// The latest fix for a module across all of an entry's affected blocks.
///
/// Returns the largest `fixed` event, rendered as `vX.Y.Z`, unless a later
/// `introduced` event re-opens the range past that fix, in which case there
/// is no fix yet.
pub fn latest_fixed(affected: &[Affected], module_path: &str) -> Option<String> {
    let mut max_fixed: Option<Version> = None;
    let mut introduced = Vec::new();

    for a in affected.iter().filter(|a| a.module.path == module_path) {
        for range in &a.ranges {
            if range.kind != RangeKind::Semver {
                continue;
            }
            for event in &range.events {
                if let Some(raw) = &event.fixed {
                    if let Some(v) = canonical_version(raw) {
                        if max_fixed.as_ref().map_or(true, |best| v > *best) {
                            max_fixed = Some(v);
                        }
                    }
                } else if let Some(raw) = &event.introduced {
                    if raw != "0" {
                        if let Some(v) = canonical_version(raw) {
                            introduced.push(v);
                        }
                    }
                }
            }
        }
    }

    let fixed = max_fixed?;
    if introduced.iter().any(|v| *v > fixed) {
        // Re-introduced past the last fix: no fix exists yet.
        return None;
    }
    Some(format!("v{fixed}"))
}
