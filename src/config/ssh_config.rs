use std::path::{Path, PathBuf};

use crate::config::paths::{expand_tilde, ssh_dir};
use crate::error::{ConfigError, SshError};
use crate::ssh::target::{DEFAULT_PORT, Target};

/// A concrete `Host` alias from an OpenSSH client config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub alias: String,
    pub hostname: String,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
}

impl HostEntry {
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Resolve to a dialable target, falling back to `default_user`.
    pub fn to_target(&self, default_user: &str) -> Result<Target, SshError> {
        let user = self.user.as_deref().unwrap_or(default_user);
        if user.is_empty() {
            return Err(SshError::InvalidTarget {
                input: self.alias.clone(),
                reason: "empty user".to_string(),
            });
        }
        if self.hostname.is_empty() {
            return Err(SshError::InvalidTarget {
                input: self.alias.clone(),
                reason: "empty host".to_string(),
            });
        }
        Ok(Target::new(self.hostname.clone(), self.port(), user))
    }
}

#[derive(Default, Debug, Clone)]
struct HostBlock {
    patterns: Vec<String>,
    hostname: Option<String>,
    user: Option<String>,
    port: Option<u16>,
    identity_file: Option<PathBuf>,
}

/// Read host entries from `path`. A missing file yields no hosts.
pub fn load_hosts(path: &Path) -> Result<Vec<HostEntry>, ConfigError> {
    if !path.exists() {
        tracing::debug!("No SSH config at {:?}", path);
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(parse_ssh_config(&content))
}

pub fn parse_ssh_config(content: &str) -> Vec<HostEntry> {
    let mut hosts = Vec::new();
    let mut current = HostBlock::default();
    let mut in_match_block = false;

    for raw_line in content.lines() {
        let line = strip_comments(raw_line);
        let tokens = split_tokens(line.trim());
        let Some(first) = tokens.first() else {
            continue;
        };

        let (key, inline_value) = split_key(first);
        let value = inline_value.or_else(|| tokens.get(1).cloned());

        match key.as_str() {
            "match" => {
                flush_block(&mut current, &mut hosts);
                current = HostBlock::default();
                in_match_block = true;
            }
            "host" => {
                flush_block(&mut current, &mut hosts);
                in_match_block = false;
                current = HostBlock::default();
                current.patterns = tokens[1..].to_vec();
            }
            _ if in_match_block || current.patterns.is_empty() => {}
            // First occurrence wins, as in OpenSSH.
            "hostname" => {
                if current.hostname.is_none() {
                    current.hostname = value;
                }
            }
            "user" => {
                if current.user.is_none() {
                    current.user = value;
                }
            }
            "port" => {
                if current.port.is_none() {
                    current.port = value.and_then(|v| v.parse::<u16>().ok()).filter(|p| *p != 0);
                }
            }
            "identityfile" => {
                if current.identity_file.is_none() {
                    current.identity_file = value.map(|v| expand_identity_path(&v));
                }
            }
            _ => {}
        }
    }

    flush_block(&mut current, &mut hosts);
    hosts
}

fn flush_block(current: &mut HostBlock, hosts: &mut Vec<HostEntry>) {
    for pattern in &current.patterns {
        if should_skip_pattern(pattern) {
            continue;
        }
        if hosts.iter().any(|h: &HostEntry| &h.alias == pattern) {
            continue;
        }

        hosts.push(HostEntry {
            alias: pattern.clone(),
            hostname: current.hostname.clone().unwrap_or_else(|| pattern.clone()),
            user: current.user.clone(),
            port: current.port,
            identity_file: current.identity_file.clone(),
        });
    }
    current.patterns.clear();
}

fn should_skip_pattern(pattern: &str) -> bool {
    let trimmed = pattern.trim();
    trimmed.is_empty()
        || trimmed.starts_with('!')
        || trimmed.contains(['*', '?', '[', ']'])
}

/// Keyword, lowercased, plus any `Key=value` inline value.
fn split_key(token: &str) -> (String, Option<String>) {
    match token.split_once('=') {
        Some((key, value)) if !value.is_empty() => {
            (key.to_ascii_lowercase(), Some(value.to_string()))
        }
        Some((key, _)) => (key.to_ascii_lowercase(), None),
        None => (token.to_ascii_lowercase(), None),
    }
}

fn expand_identity_path(raw: &str) -> PathBuf {
    let expanded = expand_tilde(raw.trim_matches('"'));
    if expanded.is_absolute() {
        return expanded;
    }

    match ssh_dir() {
        Some(dir) => dir.join(expanded),
        None => expanded,
    }
}

fn strip_comments(line: &str) -> String {
    let mut result = String::new();
    let mut in_quotes = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                result.push(ch);
            }
            '#' if !in_quotes => break,
            _ => result.push(ch),
        }
    }
    result
}

fn split_tokens(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    let mut in_quotes = false;

    while let Some(ch) = chars.next() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '\\' => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_basic_host() {
        let content = r#"
            Host my-server
              HostName 10.0.0.5
              User alice
              Port 2222
              IdentityFile /keys/id_ed25519
        "#;

        let hosts = parse_ssh_config(content);
        assert_eq!(hosts.len(), 1);
        let host = &hosts[0];
        assert_eq!(host.alias, "my-server");
        assert_eq!(host.hostname, "10.0.0.5");
        assert_eq!(host.user.as_deref(), Some("alice"));
        assert_eq!(host.port(), 2222);
        assert_eq!(host.identity_file, Some(PathBuf::from("/keys/id_ed25519")));
    }

    #[test]
    fn keywords_are_case_insensitive_values_preserved() {
        let hosts = parse_ssh_config("HOST Box\n  hostname Box.Example.COM\n  USER Carol\n");
        assert_eq!(hosts[0].alias, "Box");
        assert_eq!(hosts[0].hostname, "Box.Example.COM");
        assert_eq!(hosts[0].user.as_deref(), Some("Carol"));
    }

    #[test]
    fn equals_separated_values() {
        let hosts = parse_ssh_config("Host eq\n  HostName=eq.example.com\n  Port=2200\n");
        assert_eq!(hosts[0].hostname, "eq.example.com");
        assert_eq!(hosts[0].port, Some(2200));
    }

    #[test]
    fn missing_hostname_defaults_to_alias() {
        let hosts = parse_ssh_config("Host example\n  User bob\n");
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].hostname, "example");
        assert_eq!(hosts[0].port(), 22);
    }

    #[test]
    fn skips_wildcards_and_match_blocks() {
        let content = r#"
            Host *
              User root
            Host web*
              HostName web.example.com
            Match host foo
              HostName ignored.example.com
            Host api
              HostName api.example.com
        "#;
        let hosts = parse_ssh_config(content);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].alias, "api");
        assert_eq!(hosts[0].user, None);
    }

    #[test]
    fn multiple_aliases_share_block() {
        let hosts = parse_ssh_config("Host alpha beta\n  HostName 192.168.1.10 # lab\n");
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].hostname, "192.168.1.10");
        assert_eq!(hosts[1].alias, "beta");
    }

    #[test]
    fn to_target_falls_back_to_default_user() {
        let hosts = parse_ssh_config("Host db\n  HostName db.internal\n  Port 2022\n");
        let target = hosts[0].to_target("dave").unwrap();
        assert_eq!(target, Target::new("db.internal", 2022, "dave"));
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let hosts = load_hosts(&dir.path().join("config")).unwrap();
        assert!(hosts.is_empty());
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        std::fs::write(&path, "Host one\nHost two\n  Port 2\n").unwrap();
        let hosts = load_hosts(&path).unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[1].port, Some(2));
    }
}
