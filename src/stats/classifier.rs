/// Label used when no host can be extracted from a target.
pub const UNKNOWN_DOMAIN: &str = "unknown";

// Host -> canonical source label. Matching is case-insensitive.
const KNOWN_HOSTS: &[(&str, &str)] = &[
    ("api.launchpad.net", "launchpad"),
    ("docs.nvidia.com", "nvidia"),
    ("www.nvidia.com", "nvidia"),
    ("kernel.ubuntu.com", "ubuntu-kernel"),
];

/// Maps a raw request target to the canonical domain it is tracked under.
///
/// Known upstream hosts collapse onto a short label. Anything else is tracked
/// under its own host, verbatim. Never fails: a target with no usable host
/// yields [`UNKNOWN_DOMAIN`].
pub fn classify(target: &str) -> String {
    let host = match extract_host(target) {
        Some(host) => host,
        None => return UNKNOWN_DOMAIN.to_string(),
    };

    let bare = strip_port(host);
    KNOWN_HOSTS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(bare))
        .map(|(_, label)| (*label).to_string())
        .unwrap_or_else(|| host.to_string())
}

/// Authority part of `target` without scheme, userinfo, path, query or fragment.
fn extract_host(target: &str) -> Option<&str> {
    let target = target.trim();
    let rest = match target.find("://") {
        Some(idx) => &target[idx + 3..],
        None => target,
    };

    let end = rest.find(&['/', '?', '#'][..]).unwrap_or(rest.len());
    let authority = &rest[..end];
    let host = match authority.rfind('@') {
        Some(idx) => &authority[idx + 1..],
        None => authority,
    };

    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

fn strip_port(host: &str) -> &str {
    match host.rsplit_once(':') {
        Some((name, port)) if !name.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}
