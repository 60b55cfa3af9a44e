//! Version numbers parsed from migration file names.

/// Returned by [`parse_version`] when a name carries no usable version.
pub const NO_VERSION: i64 = -1;

/// The last-applied version of a path that has never been migrated.
///
/// Because selection is strictly `version > last_applied`, a file parsed to
/// version `0` can never run. Versions start at `1`.
pub const INITIAL_VERSION: i64 = 0;

/// Extracts the version from a migration file name.
///
/// The version is the maximal run of ASCII digits at the very start of the
/// name. Names that do not start with a digit (including ones starting with a
/// sign) and runs too large for an `i64` yield [`NO_VERSION`].
///
/// # Examples
///
/// ```
/// use pathmigrate::version::{parse_version, NO_VERSION};
///
/// assert_eq!(parse_version("123_test_abc_1.sql"), 123);
/// assert_eq!(parse_version("0123testabc1.sql"), 123);
/// assert_eq!(parse_version("-22_testabc1.sql"), NO_VERSION);
/// ```
pub fn parse_version(name: &str) -> i64 {
    let digits = name
        .as_bytes()
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();

    if digits == 0 {
        return NO_VERSION;
    }

    name[..digits].parse().unwrap_or(NO_VERSION)
}
