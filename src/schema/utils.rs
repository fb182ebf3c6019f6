// Utility functions for the schema module
//
// Path handling shared by `Schema` and `Node`.

/// Splits a `/`-delimited path into its non-empty segments.
pub(crate) fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Splits a path into its parent path and final segment.
pub(crate) fn split_last(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.rfind('/') {
        Some(pos) => Some((&trimmed[..pos], &trimmed[pos + 1..])),
        None => Some(("", trimmed)),
    }
}

/// Parses a list segment. Only plain decimal digits are accepted.
pub(crate) fn parse_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}

/// Appends `segment` to `prefix` with a separating slash.
pub(crate) fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}/{}", prefix, segment)
    }
}
