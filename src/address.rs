use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AddressError {
    #[error("Invalid port in listen address '{address}': {port}")]
    InvalidPort { address: String, port: String },

    #[error("Invalid host in listen address '{address}': IPv6 hosts need brackets")]
    InvalidHost { address: String, host: String },
}

/// Listen address in the `host:port` form the runtimes accept.
///
/// An empty host (`":9000"`) binds every interface. Input without a colon
/// falls back to [`DEFAULT_HOST`] and [`DEFAULT_PORT`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenAddress {
    host: String,
    port: u16,
}

impl Default for ListenAddress {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl ListenAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();

        let Some((host, port)) = input.rsplit_once(':') else {
            return Ok(Self::default());
        };

        let host = match host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
        {
            Some(bracketed) => bracketed,
            None if host.contains(':') => {
                return Err(AddressError::InvalidHost {
                    address: input.to_string(),
                    host: host.to_string(),
                })
            }
            None => host,
        };

        let port = port
            .parse::<u16>()
            .map_err(|_| AddressError::InvalidPort {
                address: input.to_string(),
                port: port.to_string(),
            })?;

        let host = if host.is_empty() { DEFAULT_HOST } else { host };

        Ok(Self::new(host, port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_wildcard(&self) -> bool {
        self.host == DEFAULT_HOST
    }

    /// Site address for a Caddyfile: wildcard binds are written `:port`.
    pub fn caddy_site(&self) -> String {
        if self.is_wildcard() {
            format!(":{}", self.port)
        } else {
            self.to_string()
        }
    }
}

impl FromStr for ListenAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_only_binds_all_interfaces() {
        let addr = ListenAddress::parse(":9000").unwrap();
        assert_eq!(addr.host(), "0.0.0.0");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn test_host_and_port() {
        let addr = ListenAddress::parse("127.0.0.1:9000").unwrap();
        assert_eq!(addr.host(), "127.0.0.1");
        assert_eq!(addr.port(), 9000);
        assert_eq!(addr.to_string(), "127.0.0.1:9000");
    }

    #[test]
    fn test_no_colon_uses_defaults() {
        for input in ["localhost", "", "   "] {
            let addr = ListenAddress::parse(input).unwrap();
            assert_eq!(addr, ListenAddress::default(), "input {:?}", input);
        }
        assert_eq!(ListenAddress::default().port(), 8080);
    }

    #[test]
    fn test_bracketed_ipv6() {
        let addr = ListenAddress::parse("[::1]:9443").unwrap();
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.port(), 9443);
        assert_eq!(addr.to_string(), "[::1]:9443");
    }

    #[test]
    fn test_unbracketed_ipv6_is_rejected() {
        for input in ["::1", "::1:9000", "fe80::1:8080"] {
            assert!(
                matches!(
                    ListenAddress::parse(input),
                    Err(AddressError::InvalidHost { .. })
                ),
                "input {:?}",
                input
            );
        }

        let err = ListenAddress::parse("::1").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid host in listen address '::1': IPv6 hosts need brackets"
        );
        assert!(ListenAddress::parse("[::1]:9443").is_ok());
    }

    #[test]
    fn test_invalid_port() {
        let err = ListenAddress::parse("127.0.0.1:http").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid port in listen address '127.0.0.1:http': http"
        );
        assert!(ListenAddress::parse(":70000").is_err());
    }

    #[test]
    fn test_caddy_site() {
        assert_eq!(ListenAddress::parse(":8080").unwrap().caddy_site(), ":8080");
        assert_eq!(
            ListenAddress::parse("127.0.0.1:8080")
                .unwrap()
                .caddy_site(),
            "127.0.0.1:8080"
        );
    }
}
