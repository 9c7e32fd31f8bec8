use data_encoding::BASE64_MIME;
use hmac::{Hmac, Mac};
use sha1::Sha1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternKind {
    Exact(String),
    Glob(String),
    Hashed { salt: Vec<u8>, hash: Vec<u8> },
}

/// One comma-separated element of a known_hosts host field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostPattern {
    negated: bool,
    kind: PatternKind,
}

impl HostPattern {
    pub(crate) fn parse(raw: &str) -> Result<Self, String> {
        let (negated, pattern) = raw
            .strip_prefix('!')
            .map(|p| (true, p))
            .unwrap_or((false, raw));

        if pattern.is_empty() {
            return Err("empty host pattern".to_string());
        }

        let kind = if let Some(hashed) = pattern.strip_prefix("|1|") {
            let (salt, hash) = hashed
                .split_once('|')
                .ok_or_else(|| "hashed host entry is missing its hash".to_string())?;
            let salt = BASE64_MIME
                .decode(salt.as_bytes())
                .map_err(|e| format!("invalid hashed host salt: {e}"))?;
            let hash = BASE64_MIME
                .decode(hash.as_bytes())
                .map_err(|e| format!("invalid hashed host hash: {e}"))?;
            PatternKind::Hashed { salt, hash }
        } else if pattern.starts_with('|') {
            return Err(format!("unsupported hashed host format '{pattern}'"));
        } else if pattern.contains(['*', '?']) {
            PatternKind::Glob(pattern.to_ascii_lowercase())
        } else {
            PatternKind::Exact(pattern.to_ascii_lowercase())
        };

        Ok(Self { negated, kind })
    }

    fn matches(&self, host_port: &str) -> bool {
        match &self.kind {
            PatternKind::Exact(pattern) => pattern == host_port,
            PatternKind::Glob(pattern) => glob_match(pattern, host_port),
            PatternKind::Hashed { salt, hash } => {
                let Ok(mut hmac) = Hmac::<Sha1>::new_from_slice(salt) else {
                    return false;
                };
                hmac.update(host_port.as_bytes());
                hmac.verify_slice(hash).is_ok()
            }
        }
    }
}

/// The full host field of a known_hosts line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HostPatterns(Vec<HostPattern>);

impl HostPatterns {
    pub(crate) fn parse(field: &str) -> Result<Self, String> {
        field
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(HostPattern::parse)
            .collect::<Result<Vec<_>, _>>()
            .and_then(|patterns| {
                if patterns.is_empty() {
                    Err("empty host field".to_string())
                } else {
                    Ok(Self(patterns))
                }
            })
    }

    /// `host_port` is the bare host for port 22 and `[host]:port` otherwise;
    /// a bare pattern never vouches for a non-standard port.
    pub(crate) fn matches(&self, host_port: &str) -> bool {
        let host_port = host_port.to_ascii_lowercase();
        let mut matched = false;

        for pattern in &self.0 {
            if !pattern.matches(&host_port) {
                continue;
            }
            if pattern.negated {
                return false;
            }
            matched = true;
        }

        matched
    }
}

pub(crate) fn host_port_key(host: &str, port: u16) -> String {
    if port == 22 {
        host.to_string()
    } else {
        format!("[{}]:{}", host, port)
    }
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
        } else if p_idx < p_bytes.len() && p_bytes[p_idx] == b'*' {
            star_idx = Some(p_idx);
            match_idx = t_idx;
            p_idx += 1;
        } else if let Some(star_pos) = star_idx {
            p_idx = star_pos + 1;
            match_idx += 1;
            t_idx = match_idx;
        } else {
            return false;
        }
    }

    while p_idx < p_bytes.len() && p_bytes[p_idx] == b'*' {
        p_idx += 1;
    }

    p_idx == p_bytes.len()
}
