//! Namespace prefix grammar and `<prefix>_<local>` id splitting.

/// `[A-Za-z][A-Za-z0-9.-]*`
#[must_use]
pub fn is_valid_prefix(prefix: &str) -> bool {
    let mut chars = prefix.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// Split an id at its first `_` into `(prefix, local)`.
///
/// Returns `None` when there is no separator or either side is empty.
#[must_use]
pub fn split_id(id: &str) -> Option<(&str, &str)> {
    let (prefix, local) = id.split_once('_')?;
    (!prefix.is_empty() && !local.is_empty()).then_some((prefix, local))
}
