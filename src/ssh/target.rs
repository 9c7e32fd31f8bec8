use std::fmt;

use crate::error::SshError;

pub const DEFAULT_PORT: u16 = 22;

/// Remote endpoint and the account to log in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub user: String,
}

impl Target {
    pub fn new(host: impl Into<String>, port: u16, user: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
        }
    }

    /// Parse `host`, `host:port`, `[v6]:port` or a bare IPv6 literal.
    pub fn parse(address: &str, user: &str) -> Result<Self, SshError> {
        let invalid = |reason: &str| SshError::InvalidTarget {
            input: address.to_string(),
            reason: reason.to_string(),
        };

        let address = address.trim();
        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest
                .split_once(']')
                .ok_or_else(|| invalid("unterminated '['"))?;
            let port = match tail {
                "" => None,
                tail => Some(
                    tail.strip_prefix(':')
                        .ok_or_else(|| invalid("expected ':' after ']'"))?,
                ),
            };
            (host, port)
        } else if address.matches(':').count() > 1 {
            (address, None)
        } else {
            match address.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (address, None),
            }
        };

        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        if user.is_empty() {
            return Err(invalid("empty user"));
        }

        let port = match port {
            None => DEFAULT_PORT,
            Some(raw) => match raw.parse::<u16>() {
                Ok(0) | Err(_) => return Err(invalid("invalid port")),
                Ok(port) => port,
            },
        };

        Ok(Self::new(host, port, user))
    }

    /// `host:port` form suitable for dialing.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user, self.address())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_defaults_to_port_22() {
        let target = Target::parse("example.com", "alice").unwrap();
        assert_eq!(target, Target::new("example.com", 22, "alice"));
        assert_eq!(target.address(), "example.com:22");
        assert_eq!(target.to_string(), "alice@example.com:22");
    }

    #[test]
    fn explicit_port_is_used() {
        let target = Target::parse("10.0.0.5:2222", "bob").unwrap();
        assert_eq!(target.host, "10.0.0.5");
        assert_eq!(target.port, 2222);
    }

    #[test]
    fn ipv6_forms() {
        let bracketed = Target::parse("[::1]:2200", "root").unwrap();
        assert_eq!(bracketed.host, "::1");
        assert_eq!(bracketed.port, 2200);
        assert_eq!(bracketed.address(), "[::1]:2200");

        let bare = Target::parse("fe80::1", "root").unwrap();
        assert_eq!(bare.host, "fe80::1");
        assert_eq!(bare.port, 22);
    }

    #[test]
    fn rejects_bad_input() {
        for address in ["", ":22", "host:0", "host:99999", "host:abc", "[::1", "[::1]x"] {
            assert!(
                matches!(
                    Target::parse(address, "alice"),
                    Err(SshError::InvalidTarget { .. })
                ),
                "{address:?} should be rejected"
            );
        }
        assert!(Target::parse("example.com", "").is_err());
    }
}
