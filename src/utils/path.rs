use crate::DiscoveryError;
use crate::Result;

/// Joins hierarchical key segments.
///
/// Empty segments, `.` and repeated separators are dropped and `..` removes
/// the previous segment, so `join_path(["", "discovery/service/", "nodes"])`
/// yields `discovery/service/nodes`. The result never carries a leading or
/// trailing slash.
pub fn join_path<I, S>(segments: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parts: Vec<String> = Vec::new();
    for segment in segments {
        for part in segment.as_ref().split('/') {
            match part.trim() {
                "" | "." => {}
                ".." => {
                    parts.pop();
                }
                p => parts.push(p.to_string()),
            }
        }
    }
    parts.join("/")
}

/// Splits `host:port[,host:port...][/pathPrefix]` into endpoints and prefix.
///
/// The prefix is everything after the first `/`; it is empty when absent.
pub fn parse_uris(uris: &str) -> Result<(Vec<String>, String)> {
    let mut parts = uris.splitn(2, '/');
    let hosts = parts.next().unwrap_or_default();
    let prefix = join_path([parts.next().unwrap_or_default()]);

    let endpoints: Vec<String> = hosts
        .split(',')
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();

    if endpoints.is_empty() {
        return Err(DiscoveryError::InvalidUri(uris.to_string()).into());
    }

    Ok((endpoints, prefix))
}

/// Returns true if `key` lives strictly below `directory`.
pub fn is_descendant(
    directory: &str,
    key: &str,
) -> bool {
    if directory.is_empty() {
        return !key.is_empty();
    }
    key.len() > directory.len() + 1
        && key.starts_with(directory)
        && key.as_bytes()[directory.len()] == b'/'
}
