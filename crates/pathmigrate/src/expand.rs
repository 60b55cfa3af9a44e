//! Placeholder substitution in migration scripts.
//!
//! Scripts may reference configured values as `${KEY}` or `$KEY`. Unknown
//! keys resolve to the empty string. How much of that syntax is honored is
//! chosen by [`Expansion`]:
//!
//! | Mode       | `${KEY}` | `$KEY` |
//! |------------|----------|--------|
//! | `Full`     | yes      | yes    |
//! | `Braced`   | yes      | no     |
//! | `Disabled` | no       | no     |
//! | `Auto`     | `Full` when values are configured, else `Disabled` |
//!
//! A bare `$` only starts a placeholder when followed by a letter or `_`, so
//! `$1` parameters and `$$` dollar quoting pass through. `Braced` additionally
//! keeps tagged dollar quotes such as `$body$` intact.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use pathmigrate_core::Expansion;
use regex::{Captures, Regex};

static FULL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\$|\$\{([^}]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex")
});

static BRACED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\$|\$\{([^}]*)\}").expect("valid regex"));

/// Substitutes placeholders in `content` according to `mode`.
///
/// Returns the input unchanged (borrowed) when nothing is expanded.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use pathmigrate::expand::expand;
/// use pathmigrate_core::Expansion;
///
/// let values = HashMap::from([("OWNER".to_string(), "app".to_string())]);
/// let sql = "ALTER TABLE t OWNER TO ${OWNER};";
/// assert_eq!(expand(sql, &values, Expansion::Auto), "ALTER TABLE t OWNER TO app;");
/// ```
pub fn expand<'a>(
    content: &'a str,
    values: &HashMap<String, String>,
    mode: Expansion,
) -> Cow<'a, str> {
    let re: &Regex = match resolve(mode, values) {
        Expansion::Full => &FULL_RE,
        Expansion::Braced => &BRACED_RE,
        Expansion::Disabled | Expansion::Auto => return Cow::Borrowed(content),
    };

    re.replace_all(content, |caps: &Captures<'_>| {
        match caps.get(1).or_else(|| caps.get(2)) {
            Some(key) => values.get(key.as_str()).cloned().unwrap_or_default(),
            // `$$` is kept as is.
            None => caps[0].to_string(),
        }
    })
}

/// Resolves `Auto` to the concrete mode for `values`.
pub fn resolve(mode: Expansion, values: &HashMap<String, String>) -> Expansion {
    match mode {
        Expansion::Auto if values.is_empty() => Expansion::Disabled,
        Expansion::Auto => Expansion::Full,
        other => other,
    }
}
