//! Request-target splitting.
//!
//! A minimal absolute-URL split producing the pieces the message layer
//! needs: scheme, host, port, and the origin-form path-and-query. The
//! components are owned strings; nothing is rewritten in place and
//! percent-encoding is passed through untouched.

use crate::errno::{Errno, Result};

/// Parsed request target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpTarget {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    /// Origin-form target: path plus optional `?query`, fragment
    /// stripped. Always starts with `/`.
    pub path_and_query: String,
}

impl HttpTarget {
    /// Split an absolute `http://` or `https://` URL.
    pub fn parse(url: &str) -> Result<HttpTarget> {
        let (scheme, rest) = url.split_once("://").ok_or(Errno::InvalidArgument)?;
        let scheme = scheme.to_ascii_lowercase();
        let default_port = match scheme.as_str() {
            "http" => 80,
            "https" => 443,
            _ => return Err(Errno::InvalidArgument),
        };

        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(Errno::InvalidArgument);
        }

        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => (
                h,
                p.parse::<u16>().map_err(|_| Errno::InvalidArgument)?,
            ),
            None => (authority, default_port),
        };
        if host.is_empty() {
            return Err(Errno::InvalidArgument);
        }

        let path_and_query = match path.find('#') {
            Some(i) => &path[..i],
            None => path,
        };

        Ok(HttpTarget {
            scheme,
            host: host.to_string(),
            port,
            path_and_query: path_and_query.to_string(),
        })
    }

    /// `Host` header value: the port is included only when non-default.
    pub fn host_header(&self) -> String {
        let default = if self.scheme == "https" { 443 } else { 80 };
        if self.port == default {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// True for `https` targets.
    pub fn is_tls(&self) -> bool {
        self.scheme == "https"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let t = HttpTarget::parse("http://example.com/index.html").unwrap();
        assert_eq!(t.scheme, "http");
        assert_eq!(t.host, "example.com");
        assert_eq!(t.port, 80);
        assert_eq!(t.path_and_query, "/index.html");
        assert_eq!(t.host_header(), "example.com");
    }

    #[test]
    fn test_parse_port_and_query() {
        let t = HttpTarget::parse("http://example.com:8080/a/b?k=v&x=1").unwrap();
        assert_eq!(t.port, 8080);
        assert_eq!(t.path_and_query, "/a/b?k=v&x=1");
        assert_eq!(t.host_header(), "example.com:8080");
    }

    #[test]
    fn test_parse_https_default_port() {
        let t = HttpTarget::parse("https://example.com").unwrap();
        assert_eq!(t.port, 443);
        assert_eq!(t.path_and_query, "/");
        assert!(t.is_tls());
    }

    #[test]
    fn test_fragment_stripped() {
        let t = HttpTarget::parse("http://example.com/page#section").unwrap();
        assert_eq!(t.path_and_query, "/page");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(HttpTarget::parse("example.com/no-scheme").is_err());
        assert!(HttpTarget::parse("ftp://example.com/").is_err());
        assert!(HttpTarget::parse("http:///nohost").is_err());
        assert!(HttpTarget::parse("http://host:badport/").is_err());
    }
}
