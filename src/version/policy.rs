// ABOUTME: Next-version computation with patch/minor rollover.
// ABOUTME: Pure function of (current version, increment kind).

use crate::types::{IncrementKind, Version, VersionError};

/// Counter value at which patch and minor roll into the next component.
pub const ROLLOVER_THRESHOLD: u64 = 10;

/// Compute the version that follows `current` for the given increment.
///
/// - `major`: `(M+1, 0, 0)`
/// - `minor`: `(M+1, 0, 0)` once minor has reached the threshold, else `(M, m+1, 0)`
/// - `patch` / `auto`: the minor rule once patch has reached the threshold,
///   else `(M, m, p+1)`
///
/// Deterministic and side-effect free; persisting the result is the caller's job.
pub fn next_version(current: Version, kind: IncrementKind) -> Result<Version, VersionError> {
    match kind {
        IncrementKind::Major => bump_major(current),
        IncrementKind::Minor => bump_minor(current),
        IncrementKind::Patch | IncrementKind::Auto => {
            if current.patch >= ROLLOVER_THRESHOLD {
                bump_minor(current)
            } else {
                let patch = checked(current.patch, "patch")?;
                Ok(Version::new(current.major, current.minor, patch))
            }
        }
    }
}

fn bump_major(current: Version) -> Result<Version, VersionError> {
    Ok(Version::new(checked(current.major, "major")?, 0, 0))
}

fn bump_minor(current: Version) -> Result<Version, VersionError> {
    if current.minor >= ROLLOVER_THRESHOLD {
        bump_major(current)
    } else {
        Ok(Version::new(current.major, checked(current.minor, "minor")?, 0))
    }
}

fn checked(value: u64, component: &str) -> Result<u64, VersionError> {
    value
        .checked_add(1)
        .ok_or_else(|| VersionError::Overflow(component.to_string()))
}
