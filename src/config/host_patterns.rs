//! `Host` pattern matching for the SSH client config

/// Whether a `Host` line's pattern list applies to `alias`.
///
/// At least one positive pattern must match and no negated (`!`) pattern may
/// match.
pub(crate) fn host_matches(patterns: &[String], alias: &str) -> bool {
    let mut matched = false;

    for raw in patterns {
        let entry = raw.trim();
        if entry.is_empty() {
            continue;
        }

        let (negated, pattern) = entry
            .strip_prefix('!')
            .map(|p| (true, p))
            .unwrap_or((false, entry));

        let is_match = glob_match(pattern, alias);
        if negated {
            if is_match {
                return false;
            }
            continue;
        }

        if is_match {
            matched = true;
        }
    }

    matched
}

/// True for patterns that cannot name a single concrete host
pub(crate) fn is_wildcard(pattern: &str) -> bool {
    let trimmed = pattern.trim();
    trimmed.is_empty()
        || trimmed.starts_with('!')
        || trimmed.contains('*')
        || trimmed.contains('?')
        || trimmed.contains('[')
        || trimmed.contains(']')
}

pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let (mut p_idx, mut t_idx) = (0usize, 0usize);
    let mut star_idx = None;
    let mut match_idx = 0usize;
    let p_bytes = pattern.as_bytes();
    let t_bytes = text.as_bytes();

    while t_idx < t_bytes.len() {
        if p_idx < p_bytes.len() && (p_bytes[p_idx] == b'?' || p_bytes[p_idx] == t_bytes[t_idx]) {
            p_idx += 1;
            t_idx += 1;
            continue;
        }

        if p_idx < p_bytes.len() && p_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = t_idx;
            p_idx += 1;
            continue;
        }

        if let Some(star_pos) = star_idx {
            p_idx = star_pos + 1;
            match_idx += 1;
            t_idx = match_idx;
            continue;
        }

        return false;
    }

    while p_idx < p_bytes.len() && p_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == p_bytes.len()
}
