use russh::keys::{self, PublicKey};

use super::matchers::HostPatterns;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Marker {
    None,
    Revoked,
    CertAuthority,
}

#[derive(Debug, Clone)]
pub(crate) struct TrustEntry {
    pub(crate) marker: Marker,
    pub(crate) patterns: HostPatterns,
    pub(crate) key: PublicKey,
    pub(crate) line: usize,
}

/// Parse every record of a known_hosts file.
///
/// Errors carry the 1-based line number of the first malformed record.
pub(crate) fn parse_entries(content: &str) -> Result<Vec<TrustEntry>, String> {
    let mut entries = Vec::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry = parse_line(trimmed, line_no).map_err(|reason| format!("line {line_no}: {reason}"))?;
        entries.push(entry);
    }

    Ok(entries)
}

fn parse_line(line: &str, line_no: usize) -> Result<TrustEntry, String> {
    let mut fields = line.split_whitespace().peekable();

    let marker = match fields.peek() {
        Some(first) if first.starts_with('@') => {
            let marker = match *first {
                "@revoked" => Marker::Revoked,
                "@cert-authority" => Marker::CertAuthority,
                other => return Err(format!("unknown marker '{other}'")),
            };
            fields.next();
            marker
        }
        _ => Marker::None,
    };

    let (Some(hosts_field), Some(key_type), Some(key_data)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err("expected 'hosts key-type base64-key'".to_string());
    };

    let patterns = HostPatterns::parse(hosts_field)?;
    let key = keys::parse_public_key_base64(key_data)
        .map_err(|e| format!("undecodable {key_type} key: {e}"))?;

    let actual_type = key.algorithm().as_str().to_string();
    if actual_type != key_type {
        return Err(format!(
            "key type '{key_type}' does not match encoded key '{actual_type}'"
        ));
    }

    Ok(TrustEntry {
        marker,
        patterns,
        key,
        line: line_no,
    })
}
