//! Service endpoints and request addressing.
//!
//! An endpoint such as `https://oss-cn-hangzhou.aliyuncs.com` is combined
//! with a bucket name in one of three ways:
//!
//! * virtual-hosted style (the default): `bucket.endpoint-host/key`
//! * path style (IP endpoints): `endpoint-host/bucket/key`
//! * CNAME: the endpoint host already maps to a single bucket, so the bucket
//!   never appears in the URL.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::net::IpAddr;
use std::str::FromStr;

/// Where requests are sent, and how buckets are addressed there.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Endpoint {
    scheme: String,
    host: String,
    cname: bool,
}

impl Endpoint {
    /// Parses `endpoint` and marks it as a user-owned CNAME domain.
    pub fn cname(endpoint: &str) -> Result<Endpoint, ParseEndpointError> {
        let mut parsed: Endpoint = endpoint.parse()?;
        parsed.cname = true;
        Ok(parsed)
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_cname(&self) -> bool {
        self.cname
    }

    /// True for endpoints that cannot carry a bucket subdomain.
    pub fn is_ip(&self) -> bool {
        let host = match self.host.rfind(':') {
            Some(idx) if self.host[idx + 1..].chars().all(|c| c.is_ascii_digit()) => {
                &self.host[..idx]
            }
            _ => self.host.as_str(),
        };
        host.parse::<IpAddr>().is_ok()
    }

    /// True when the bucket belongs in the request path rather than the host.
    pub fn path_style(&self) -> bool {
        !self.cname && self.is_ip()
    }

    /// The `Host` this request is addressed to.
    pub fn host_for(&self, bucket: Option<&str>) -> String {
        match bucket {
            Some(bucket) if !self.cname && !self.is_ip() => {
                format!("{}.{}", bucket, self.host)
            }
            _ => self.host.clone(),
        }
    }
}

impl FromStr for Endpoint {
    type Err = ParseEndpointError;

    fn from_str(s: &str) -> Result<Endpoint, ParseEndpointError> {
        let (scheme, rest) = match s.find("://") {
            Some(pos) => (&s[..pos], &s[pos + 3..]),
            None => ("https", s),
        };
        match scheme {
            "http" | "https" => {}
            other => return Err(ParseEndpointError::new(&format!("scheme {}", other))),
        }
        let host = rest.find('/').map(|pos| &rest[..pos]).unwrap_or(rest);
        if host.is_empty() {
            return Err(ParseEndpointError::new(s));
        }
        Ok(Endpoint {
            scheme: scheme.to_owned(),
            host: host.to_owned(),
            cname: false,
        })
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)
    }
}

/// An error produced when the user supplies a malformed endpoint.
#[derive(Debug, PartialEq)]
pub struct ParseEndpointError {
    message: String,
}

impl ParseEndpointError {
    fn new(input: &str) -> Self {
        ParseEndpointError {
            message: format!("Not a valid OSS endpoint: {}", input),
        }
    }
}

impl Error for ParseEndpointError {}

impl Display for ParseEndpointError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::Endpoint;

    #[test]
    fn parses_scheme_and_host() {
        let e: Endpoint = "https://oss-cn-hangzhou.aliyuncs.com".parse().unwrap();
        assert_eq!(e.scheme(), "https");
        assert_eq!(e.host(), "oss-cn-hangzhou.aliyuncs.com");
        assert!(!e.is_cname());
    }

    #[test]
    fn defaults_to_https() {
        let e: Endpoint = "oss-cn-shanghai.aliyuncs.com".parse().unwrap();
        assert_eq!(e.scheme(), "https");
    }

    #[test]
    fn rejects_unknown_scheme() {
        assert!("ftp://example.com".parse::<Endpoint>().is_err());
        assert!("https://".parse::<Endpoint>().is_err());
    }

    #[test]
    fn virtual_hosted_by_default() {
        let e: Endpoint = "https://oss-cn-hangzhou.aliyuncs.com".parse().unwrap();
        assert_eq!(
            e.host_for(Some("examplebucket")),
            "examplebucket.oss-cn-hangzhou.aliyuncs.com"
        );
        assert!(!e.path_style());
    }

    #[test]
    fn ip_endpoints_use_path_style() {
        let e: Endpoint = "http://192.168.1.1:8080".parse().unwrap();
        assert!(e.is_ip());
        assert!(e.path_style());
        assert_eq!(e.host_for(Some("examplebucket")), "192.168.1.1:8080");
    }

    #[test]
    fn cname_keeps_bare_host() {
        let e = Endpoint::cname("http://img.example.com").unwrap();
        assert!(e.is_cname());
        assert!(!e.path_style());
        assert_eq!(e.host_for(Some("examplebucket")), "img.example.com");
    }

    #[test]
    fn service_requests_use_bare_host() {
        let e: Endpoint = "https://oss-cn-hangzhou.aliyuncs.com".parse().unwrap();
        assert_eq!(e.host_for(None), "oss-cn-hangzhou.aliyuncs.com");
    }
}
