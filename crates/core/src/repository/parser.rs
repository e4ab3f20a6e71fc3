use super::{ParseError, RepositoryRef};

/// Parse a repository URL into `(owner, name)`.
///
/// Accepts `https://github.com/owner/repo`, `github.com/owner/repo`,
/// `owner/repo` and deeper paths such as `.../owner/repo/tree/main`.
/// Only the first two non-empty path segments are used. Without a scheme, a
/// dotted first segment is taken as a host only when the input has at least
/// three path segments, so `my.team/service` keeps `my.team` as the owner.
pub fn parse_repository_url(input: &str) -> Result<RepositoryRef, ParseError> {
    let source_url = input.trim();
    let invalid = || ParseError::InvalidUrl(source_url.to_string());

    // Drop query and fragment
    let without_suffix = source_url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();

    let path = match without_suffix.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_suffix,
    };

    let mut segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    // Scheme-less host, e.g. "github.com/owner/repo". With only two segments
    // the first is an owner, even when it contains a dot.
    if !without_suffix.contains("://") && segments.len() >= 3 && segments[0].contains('.') {
        segments.remove(0);
    }

    let mut segments = segments.into_iter();
    let owner = segments.next().ok_or_else(invalid)?;
    let name = segments.next().ok_or_else(invalid)?;
    let name = name.strip_suffix(".git").unwrap_or(name);
    if name.is_empty() {
        return Err(invalid());
    }

    Ok(RepositoryRef {
        owner: owner.to_string(),
        name: name.to_string(),
        source_url: source_url.to_string(),
    })
}
