//! Request signing.
//!
//! Follows the OSS header-signature scheme: an HMAC-SHA1 over a canonical
//! string assembled from the verb, entity headers, the date, the sorted
//! `x-oss-*` headers and the canonical resource. Pre-signed URLs reuse the
//! same canonical construction with the expiry timestamp in the date slot.
//!
//! Please note that this module does not expect URIs to already be encoded.

use bytes::Bytes;
use hmac::{Hmac, Mac, NewMac};
use log::debug;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use sha1::Sha1;
use time::OffsetDateTime;

use std::collections::BTreeMap;
use std::fmt;
use std::str;
use std::sync::Arc;

use crate::core::executor::CancellationToken;
use crate::credential::OssCredentials;
use crate::signature::endpoint::Endpoint;
use crate::signature::oss_time::rfc1123;
use crate::signature::stream::{BodySource, ByteStream, ProgressCallback, RateLimit};

pub type Params = BTreeMap<String, Option<String>>;

/// Query parameters that participate in the canonical resource. Anything
/// else still travels on the wire but never signs.
const SUBRESOURCES: &[&str] = &[
    "acl",
    "bucketInfo",
    "continuation-token",
    "cors",
    "delete",
    "encoding-type",
    "lifecycle",
    "location",
    "logging",
    "objectMeta",
    "partNumber",
    "referer",
    "response-cache-control",
    "response-content-disposition",
    "response-content-encoding",
    "response-content-language",
    "response-content-type",
    "response-expires",
    "restore",
    "security-token",
    "stat",
    "storageCapacity",
    "symlink",
    "uploadId",
    "uploads",
    "versionId",
    "website",
    "x-oss-process",
];

/// The signing scheme in force for a request. The canonical construction and
/// the MAC are selected together; mixing them is a programming error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureVersion {
    V1,
}

impl SignatureVersion {
    pub fn version(self) -> u32 {
        match self {
            SignatureVersion::V1 => 1,
        }
    }
}

impl Default for SignatureVersion {
    fn default() -> Self {
        SignatureVersion::V1
    }
}

/// Possible payloads included in a `SignedRequest`.
pub enum SignedRequestPayload {
    /// Transfer payload in a single chunk.
    Buffer(Bytes),
    /// Transfer payload in multiple chunks; consumed by the first attempt.
    Stream(ByteStream),
    /// A payload that can be opened again for every attempt.
    Source(Arc<dyn BodySource>),
}

impl SignedRequestPayload {
    /// Whether a fresh stream can be produced after a failed attempt.
    pub fn rewindable(&self) -> bool {
        match self {
            SignedRequestPayload::Buffer(_) => true,
            SignedRequestPayload::Source(_) => true,
            SignedRequestPayload::Stream(_) => false,
        }
    }

    pub fn size_hint(&self) -> Option<u64> {
        match self {
            SignedRequestPayload::Buffer(bytes) => Some(bytes.len() as u64),
            SignedRequestPayload::Stream(stream) => stream.size_hint().map(|n| n as u64),
            SignedRequestPayload::Source(source) => source.len(),
        }
    }
}

impl fmt::Debug for SignedRequestPayload {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SignedRequestPayload::Buffer(ref buf) => {
                write!(f, "SignedRequestPayload::Buffer(len = {})", buf.len())
            }
            SignedRequestPayload::Stream(ref stream) => write!(
                f,
                "SignedRequestPayload::Stream(size_hint = {:?})",
                stream.size_hint()
            ),
            SignedRequestPayload::Source(ref source) => {
                write!(f, "SignedRequestPayload::Source(len = {:?})", source.len())
            }
        }
    }
}

/// Per-request behavior toggles; fixed once the request enters the pipeline.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestFlags {
    /// Compute and attach `Content-MD5` when the caller did not.
    pub content_md5: bool,
    /// The request path is pre-composed; use it verbatim.
    pub param_in_path: bool,
    /// Install CRC-64 computation on the request and response bodies.
    pub check_crc64: bool,
}

/// A data structure for all the elements of an HTTP request that are
/// involved in the OSS signing process.
pub struct SignedRequest {
    /// The HTTP method.
    pub method: String,
    /// Where the request is addressed.
    pub endpoint: Endpoint,
    /// The bucket, absent for service-level operations.
    pub bucket: Option<String>,
    /// The object key, absent for service- and bucket-level operations.
    pub key: Option<String>,
    /// The HTTP request headers, keyed by lowercased name.
    pub headers: BTreeMap<String, Vec<Vec<u8>>>,
    /// The HTTP request parameters.
    pub params: Params,
    /// The HTTP content.
    pub payload: Option<SignedRequestPayload>,
    /// Behavior toggles.
    pub flags: RequestFlags,
    /// Pre-composed path and query, used verbatim under `flags.param_in_path`.
    pub path: Option<String>,
    /// Fully materialized URL; requests carrying one are never signed.
    pub url: Option<String>,
    /// Reported to after every body chunk.
    pub progress: Option<ProgressCallback>,
    /// Consulted before every body chunk is released to the transport.
    pub rate_limiter: Option<Arc<dyn RateLimit>>,
    /// Observed at chunk boundaries and between attempts.
    pub cancellation: Option<CancellationToken>,
    version: SignatureVersion,
}

impl SignedRequest {
    fn new(method: &str, endpoint: &Endpoint, bucket: Option<&str>, key: Option<&str>) -> Self {
        SignedRequest {
            method: method.to_string(),
            endpoint: endpoint.clone(),
            bucket: bucket.map(str::to_owned),
            key: key.map(str::to_owned),
            headers: BTreeMap::new(),
            params: Params::new(),
            payload: None,
            flags: RequestFlags::default(),
            path: None,
            url: None,
            progress: None,
            rate_limiter: None,
            cancellation: None,
            version: SignatureVersion::V1,
        }
    }

    /// A request against the service itself (no bucket).
    pub fn for_service(method: &str, endpoint: &Endpoint) -> Self {
        SignedRequest::new(method, endpoint, None, None)
    }

    /// A request against a bucket.
    pub fn for_bucket(method: &str, endpoint: &Endpoint, bucket: &str) -> Self {
        SignedRequest::new(method, endpoint, Some(bucket), None)
    }

    /// A request against an object.
    pub fn for_object(method: &str, endpoint: &Endpoint, bucket: &str, key: &str) -> Self {
        SignedRequest::new(method, endpoint, Some(bucket), Some(key))
    }

    /// A request carrying a fully materialized URL (typically pre-signed);
    /// the pipeline dispatches it without signing.
    pub fn from_url(method: &str, url: &str) -> Result<Self, String> {
        let endpoint: Endpoint = url
            .parse()
            .map_err(|e| format!("invalid request url: {}", e))?;
        let mut request = SignedRequest::new(method, &endpoint, None, None);
        request.url = Some(url.to_owned());
        Ok(request)
    }

    pub fn signature_version(&self) -> SignatureVersion {
        self.version
    }

    /// Returns the current HTTP method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Sets the value of the "content-type" header.
    pub fn set_content_type(&mut self, content_type: &str) {
        self.remove_header("Content-Type");
        self.add_header("Content-Type", content_type);
    }

    /// Sets the new body (payload) from a buffer.
    pub fn set_payload<B: Into<Bytes>>(&mut self, payload: Option<B>) {
        self.payload = payload.map(|chunk| SignedRequestPayload::Buffer(chunk.into()));
    }

    /// Sets the new body (payload) as a one-shot stream.
    pub fn set_payload_stream(&mut self, stream: ByteStream) {
        self.payload = Some(SignedRequestPayload::Stream(stream));
    }

    /// Sets the new body (payload) as a re-openable source.
    pub fn set_payload_source(&mut self, source: Arc<dyn BodySource>) {
        self.payload = Some(SignedRequestPayload::Source(source));
    }

    /// If the key exists in headers, remove it entirely.
    pub fn remove_header(&mut self, key: &str) {
        let key_lower = key.to_ascii_lowercase();
        self.headers.remove(&key_lower);
    }

    /// Add a value to the array of headers for the specified key.
    /// Headers are kept sorted by key name for use at signing (BTreeMap).
    pub fn add_header<K: ToString>(&mut self, key: K, value: &str) {
        let mut key_lower = key.to_string();
        key_lower.make_ascii_lowercase();

        let value_vec = value.as_bytes().to_vec();

        self.headers.entry(key_lower).or_default().push(value_vec);
    }

    pub fn add_optional_header<K: ToString, V: ToString>(&mut self, key: K, value: Option<V>) {
        if let Some(ref value) = value {
            self.add_header(key, &value.to_string());
        }
    }

    /// First value of a header, if present.
    pub fn header_value(&self, key: &str) -> Option<String> {
        let key_lower = key.to_ascii_lowercase();
        self.headers
            .get(&key_lower)
            .and_then(|values| values.first())
            .map(|value| String::from_utf8_lossy(value).into_owned())
    }

    pub fn has_header(&self, key: &str) -> bool {
        self.headers.contains_key(&key.to_ascii_lowercase())
    }

    /// Adds a valued parameter to the HTTP request.
    pub fn add_param<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.params.insert(key.into(), Some(value.into()));
    }

    /// Adds a value-less parameter, e.g. the `uploads` subresource.
    pub fn add_param_flag<S: Into<String>>(&mut self, key: S) {
        self.params.insert(key.into(), None);
    }

    /// Sets parameters from a given `Params` map.
    pub fn set_params(&mut self, params: Params) {
        self.params = params;
    }

    /// Whether every attempt can produce a fresh body stream.
    pub fn payload_rewindable(&self) -> bool {
        match &self.payload {
            None => true,
            Some(payload) => payload.rewindable(),
        }
    }

    /// Checks the request invariants before anything touches the network.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_some() {
            return Ok(());
        }
        if let Some(bucket) = &self.bucket {
            validate_bucket_name(bucket)?;
        } else if self.key.is_some() {
            return Err("object requests require a bucket".to_owned());
        }
        if let Some(key) = &self.key {
            validate_object_key(key)?;
        }
        Ok(())
    }

    /// Ensures the standing headers are present: host, user-agent, and the
    /// content-length rules for body-less requests.
    pub fn complement(&mut self, user_agent: &str) {
        self.remove_header("Host");
        self.add_header("Host", &self.endpoint.host_for(self.bucket.as_deref()));
        if !self.has_header("User-Agent") {
            self.add_header("User-Agent", user_agent);
        }
        let payload_len = self.payload.as_ref().map(SignedRequestPayload::size_hint);
        match payload_len {
            None => {
                self.remove_header("Content-Length");
                // The service expects an explicit zero on GET and POST.
                if self.method == "GET" || self.method == "POST" {
                    self.add_header("Content-Length", "0");
                }
            }
            Some(len) => {
                if !self.has_header("Content-Length") {
                    if let Some(len) = len {
                        self.add_header("Content-Length", &len.to_string());
                    }
                }
            }
        }
    }

    /// The canonical resource: `/bucket/key` plus the sorted subresource
    /// query, raw and unencoded.
    pub fn canonical_resource(&self) -> String {
        let mut resource = match (&self.bucket, &self.key) {
            (Some(bucket), Some(key)) => format!("/{}/{}", bucket, key),
            (Some(bucket), None) => format!("/{}/", bucket),
            _ => "/".to_owned(),
        };

        let subresources: Vec<String> = self
            .params
            .iter()
            .filter(|(key, _)| SUBRESOURCES.contains(&key.as_str()))
            .map(|(key, value)| match value {
                Some(value) if !value.is_empty() => format!("{}={}", key, value),
                _ => key.clone(),
            })
            .collect();
        if !subresources.is_empty() {
            resource.push('?');
            resource.push_str(&subresources.join("&"));
        }
        resource
    }

    /// The string that gets signed. `date` is the RFC-1123 date for header
    /// signing, or the decimal expiry timestamp for pre-signed URLs.
    pub fn string_to_sign(&self, date: &str) -> String {
        let md5 = self.header_value("Content-MD5").unwrap_or_default();
        let content_type = self.header_value("Content-Type").unwrap_or_default();

        let mut string_to_sign = format!(
            "{}\n{}\n{}\n{}\n",
            &self.method, md5, content_type, date
        );
        for (key, values) in self.headers.iter() {
            if !key.starts_with("x-oss-") {
                continue;
            }
            string_to_sign.push_str(&format!("{}:{}\n", key, canonical_values(values)));
        }
        string_to_sign.push_str(&self.canonical_resource());
        string_to_sign
    }

    /// Signs the request: refreshes `Date`, attaches the security token when
    /// one is present, and sets the `Authorization` header.
    ///
    /// Requests carrying a materialized URL are left untouched.
    pub fn sign(&mut self, credentials: &OssCredentials) {
        if self.url.is_some() {
            return;
        }

        let date = rfc1123(&OffsetDateTime::now_utc());
        self.remove_header("Date");
        self.add_header("Date", &date);

        if let Some(token) = credentials.session_token() {
            self.remove_header("x-oss-security-token");
            self.add_header("x-oss-security-token", token);
        }

        let string_to_sign = self.string_to_sign(&date);
        debug!("string to sign: {:?}", string_to_sign);

        let signature = match self.version {
            SignatureVersion::V1 => sign_string(&string_to_sign, credentials.access_key_secret()),
        };
        let auth_header = format!("OSS {}:{}", credentials.access_key_id(), signature);
        self.remove_header("Authorization");
        self.add_header("Authorization", &auth_header);
    }

    /// Builds a pre-signed URL that a holder can use until `expires`
    /// (seconds since the epoch) without further credentials.
    pub fn presigned_url(
        &mut self,
        credentials: &OssCredentials,
        expires: i64,
    ) -> Result<String, String> {
        self.validate()?;

        if let Some(token) = credentials.session_token() {
            self.params
                .insert("security-token".to_owned(), Some(token.to_owned()));
        }

        let expires_str = expires.to_string();
        let string_to_sign = self.string_to_sign(&expires_str);
        debug!("string to sign: {:?}", string_to_sign);
        let signature = match self.version {
            SignatureVersion::V1 => sign_string(&string_to_sign, credentials.access_key_secret()),
        };

        self.params.insert("Expires".to_owned(), Some(expires_str));
        self.params.insert(
            "OSSAccessKeyId".to_owned(),
            Some(credentials.access_key_id().to_owned()),
        );
        self.params.insert("Signature".to_owned(), Some(signature));

        Ok(format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            self.endpoint.host_for(self.bucket.as_deref()),
            self.path_and_query()
        ))
    }

    /// The encoded path and query string for the wire.
    pub fn path_and_query(&self) -> String {
        if self.flags.param_in_path {
            return self.path.clone().unwrap_or_else(|| "/".to_owned());
        }

        let mut path = String::new();
        if self.endpoint.path_style() {
            if let Some(bucket) = &self.bucket {
                path.push('/');
                path.push_str(bucket);
            }
        }
        path.push('/');
        if let Some(key) = &self.key {
            path.push_str(&encode_uri_path(key));
        }

        let query = build_query_string(&self.params);
        if !query.is_empty() {
            path.push('?');
            path.push_str(&query);
        }
        path
    }

    /// The full URL this request dispatches to.
    pub fn wire_url(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "{}://{}{}",
            self.endpoint.scheme(),
            self.endpoint.host_for(self.bucket.as_deref()),
            self.path_and_query()
        )
    }
}

impl fmt::Debug for SignedRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SignedRequest")
            .field("method", &self.method)
            .field("bucket", &self.bucket)
            .field("key", &self.key)
            .field("params", &self.params)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Buckets: 3-63 characters of lowercase letters, digits and hyphens, with
/// no hyphen at either end.
pub fn validate_bucket_name(bucket: &str) -> Result<(), String> {
    if bucket.len() < 3 || bucket.len() > 63 {
        return Err(format!(
            "bucket name must be 3-63 characters long: {:?}",
            bucket
        ));
    }
    if bucket.starts_with('-') || bucket.ends_with('-') {
        return Err(format!(
            "bucket name must not begin or end with a hyphen: {:?}",
            bucket
        ));
    }
    if !bucket
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(format!(
            "bucket name may only contain lowercase letters, digits and hyphens: {:?}",
            bucket
        ));
    }
    Ok(())
}

/// Keys: 1-1023 bytes of UTF-8, not starting with `/` or `\`.
pub fn validate_object_key(key: &str) -> Result<(), String> {
    if key.is_empty() || key.len() > 1023 {
        return Err(format!("object key must be 1-1023 bytes long: {:?}", key));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(format!(
            "object key must not begin with '/' or '\\': {:?}",
            key
        ));
    }
    Ok(())
}

/// Takes a string to sign and signs it with the account secret.
pub fn sign_string(string_to_sign: &str, secret: &str) -> String {
    let signing_hmac = hmac(secret.as_ref(), string_to_sign.as_ref())
        .finalize()
        .into_bytes();

    base64::encode_config(signing_hmac, base64::STANDARD)
}

#[inline]
fn hmac(secret: &[u8], message: &[u8]) -> Hmac<Sha1> {
    let mut hmac = Hmac::<Sha1>::new_varkey(secret).expect("failed to create hmac");
    hmac.update(message);
    hmac
}

/// Canonicalizes repeated header values by joining them with commas.
fn canonical_values(values: &[Vec<u8>]) -> String {
    let mut st = String::new();
    for v in values {
        let s = str::from_utf8(v).unwrap_or_default();
        if !st.is_empty() {
            st.push(',');
        }
        st.push_str(s.trim());
    }
    st
}

/// Canonicalizes query while iterating through the given parameters.
pub fn build_query_string(params: &Params) -> String {
    if params.is_empty() {
        return String::new();
    }

    let mut output = String::new();
    for (key, val) in params.iter() {
        if !output.is_empty() {
            output.push('&');
        }
        output.push_str(&encode_uri_strict(key));

        match val {
            Some(value) if !value.is_empty() => {
                output.push('=');
                output.push_str(&encode_uri_strict(value));
            }
            _ => {}
        }
    }

    output
}

// Do not URI-encode any of the unreserved characters that RFC 3986 defines:
// A-Z, a-z, 0-9, hyphen ( - ), underscore ( _ ), period ( . ), and tilde ( ~ ).
//
// Percent-encode all other characters with %XY, where X and Y are hexadecimal
// characters (0-9 and uppercase A-F). For example, the space character must be
// encoded as %20 (not using '+', as some encoding schemes do) and extended UTF-8
// characters must be in the form %XY%ZA%BC
/// This constant is used to maintain the strict URI encoding standard as proposed by RFC 3986
pub const STRICT_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// This struct is used to maintain the URI path encoding
pub const STRICT_PATH_ENCODE_SET: AsciiSet = STRICT_ENCODE_SET.remove(b'/');

#[inline]
#[doc(hidden)]
pub fn encode_uri_path(uri: &str) -> String {
    utf8_percent_encode(uri, &STRICT_PATH_ENCODE_SET).collect::<String>()
}

#[inline]
fn encode_uri_strict(uri: &str) -> String {
    utf8_percent_encode(uri, &STRICT_ENCODE_SET).collect::<String>()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE: &str = "Wed, 28 Nov 2018 09:26:08 GMT";

    fn endpoint() -> Endpoint {
        "https://oss-cn-hangzhou.aliyuncs.com".parse().unwrap()
    }

    fn credentials() -> OssCredentials {
        OssCredentials::new("test-id", "test-secret", None, None)
    }

    #[test]
    fn canonical_string_for_simple_get() {
        let request = SignedRequest::for_object("GET", &endpoint(), "examplebucket", "nelson");
        assert_eq!(
            request.string_to_sign(DATE),
            "GET\n\n\nWed, 28 Nov 2018 09:26:08 GMT\n/examplebucket/nelson"
        );
        assert_eq!(
            sign_string(&request.string_to_sign(DATE), "test-secret"),
            "3b77Z9t4EfHdnnPjMhEkuiYV0d4="
        );
    }

    #[test]
    fn canonical_string_with_oss_headers() {
        let mut request = SignedRequest::for_object("PUT", &endpoint(), "oss-example", "nelson");
        request.set_content_type("text/html");
        request.add_header("x-oss-magic", "abracadabra");
        request.add_header("x-oss-meta-author", "foo@bar.com");

        assert_eq!(
            request.string_to_sign(DATE),
            format!(
                "PUT\n\ntext/html\n{}\nx-oss-magic:abracadabra\n\
                 x-oss-meta-author:foo@bar.com\n/oss-example/nelson",
                DATE
            )
        );
        assert_eq!(
            sign_string(&request.string_to_sign(DATE), "test-secret"),
            "JLN5CUWxGniHf4flCssogC8uyV8="
        );
    }

    #[test]
    fn header_names_sign_case_insensitively() {
        let mut lower = SignedRequest::for_object("PUT", &endpoint(), "oss-example", "nelson");
        lower.add_header("x-oss-meta-a", "v");

        let mut upper = SignedRequest::for_object("PUT", &endpoint(), "oss-example", "nelson");
        upper.add_header("X-OSS-META-A", "v");

        assert_eq!(lower.string_to_sign(DATE), upper.string_to_sign(DATE));
    }

    #[test]
    fn header_values_are_trimmed_in_canonical_form() {
        let mut request = SignedRequest::for_object("PUT", &endpoint(), "oss-example", "nelson");
        request.add_header("x-oss-magic", "  abracadabra  ");
        assert!(request
            .string_to_sign(DATE)
            .contains("x-oss-magic:abracadabra\n"));
    }

    #[test]
    fn only_subresources_sign_but_all_params_travel() {
        let mut request = SignedRequest::for_bucket("GET", &endpoint(), "bucket");
        request.add_param_flag("uploads");
        request.add_param("prefix", "p");

        assert_eq!(request.canonical_resource(), "/bucket/?uploads");
        assert_eq!(build_query_string(&request.params), "prefix=p&uploads");

        // A non-whitelisted parameter never changes the signature.
        let mut bare = SignedRequest::for_bucket("GET", &endpoint(), "bucket");
        bare.add_param_flag("uploads");
        assert_eq!(request.string_to_sign(DATE), bare.string_to_sign(DATE));
    }

    #[test]
    fn canonical_resource_shapes() {
        let service = SignedRequest::for_service("GET", &endpoint());
        assert_eq!(service.canonical_resource(), "/");

        let bucket = SignedRequest::for_bucket("GET", &endpoint(), "bucket");
        assert_eq!(bucket.canonical_resource(), "/bucket/");

        let object = SignedRequest::for_object("GET", &endpoint(), "bucket", "a/b.txt");
        assert_eq!(object.canonical_resource(), "/bucket/a/b.txt");
    }

    #[test]
    fn sign_sets_date_token_and_authorization() {
        let creds = OssCredentials::new("test-id", "test-secret", Some("tok".to_owned()), None);
        let mut request = SignedRequest::for_object("GET", &endpoint(), "examplebucket", "nelson");
        request.sign(&creds);

        assert!(request.has_header("Date"));
        assert_eq!(request.header_value("x-oss-security-token").unwrap(), "tok");
        let auth = request.header_value("Authorization").unwrap();
        assert!(auth.starts_with("OSS test-id:"), "got {}", auth);
    }

    #[test]
    fn signing_is_deterministic() {
        let canonical = "GET\n\n\nWed, 28 Nov 2018 09:26:08 GMT\n/examplebucket/nelson";
        assert_eq!(
            sign_string(canonical, "test-secret"),
            sign_string(canonical, "test-secret")
        );
    }

    #[test]
    fn presigned_url_carries_signature_params() {
        let mut request = SignedRequest::for_object("GET", &endpoint(), "examplebucket", "nelson");
        let url = request.presigned_url(&credentials(), 1_543_503_968).unwrap();

        assert!(url.starts_with(
            "https://examplebucket.oss-cn-hangzhou.aliyuncs.com/nelson?"
        ));
        assert!(url.contains("Expires=1543503968"));
        assert!(url.contains("OSSAccessKeyId=test-id"));
        // base64 '+'/'=' must be percent-encoded in the query.
        assert!(url.contains("Signature=rCooN347WLWedYMY2rF0fS8xJwk%3D"));
    }

    #[test]
    fn presigned_url_uses_expires_in_the_date_slot() {
        let request = SignedRequest::for_object("GET", &endpoint(), "examplebucket", "nelson");
        assert_eq!(
            request.string_to_sign("1543503968"),
            "GET\n\n\n1543503968\n/examplebucket/nelson"
        );
    }

    #[test]
    fn wire_url_virtual_hosted() {
        let mut request = SignedRequest::for_object("GET", &endpoint(), "bucket", "dir/ob ject");
        request.add_param("prefix", "p");
        assert_eq!(
            request.wire_url(),
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/dir/ob%20ject?prefix=p"
        );
    }

    #[test]
    fn wire_url_path_style_for_ip_endpoints() {
        let endpoint: Endpoint = "http://127.0.0.1:9000".parse().unwrap();
        let request = SignedRequest::for_object("GET", &endpoint, "bucket", "key");
        assert_eq!(request.wire_url(), "http://127.0.0.1:9000/bucket/key");
    }

    #[test]
    fn param_in_path_uses_the_precomposed_path() {
        let mut request = SignedRequest::for_bucket("GET", &endpoint(), "bucket");
        request.flags.param_in_path = true;
        request.path = Some("/?uploads".to_owned());
        request.add_param("ignored", "x");
        assert_eq!(
            request.wire_url(),
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/?uploads"
        );
    }

    #[test]
    fn bucket_names_are_validated() {
        assert!(validate_bucket_name("abc").is_ok());
        assert!(validate_bucket_name("my-bucket-01").is_ok());
        assert!(validate_bucket_name("AB").is_err());
        assert!(validate_bucket_name("Bucket").is_err());
        assert!(validate_bucket_name("-bucket").is_err());
        assert!(validate_bucket_name("bucket-").is_err());
        assert!(validate_bucket_name("bu_cket").is_err());
    }

    #[test]
    fn object_keys_are_validated() {
        assert!(validate_object_key("a").is_ok());
        assert!(validate_object_key("dir/file.txt").is_ok());
        assert!(validate_object_key("").is_err());
        assert!(validate_object_key("/leading").is_err());
        assert!(validate_object_key("\\leading").is_err());
        assert!(validate_object_key(&"k".repeat(1024)).is_err());
    }

    #[test]
    fn body_less_get_carries_explicit_zero_length() {
        let mut request = SignedRequest::for_bucket("GET", &endpoint(), "bucket");
        request.complement("agent/1.0");
        assert_eq!(request.header_value("Content-Length").unwrap(), "0");

        let mut delete = SignedRequest::for_object("DELETE", &endpoint(), "bucket", "key");
        delete.complement("agent/1.0");
        assert!(!delete.has_header("Content-Length"));
    }

    #[test]
    fn complement_sets_host_and_user_agent() {
        let mut request = SignedRequest::for_bucket("PUT", &endpoint(), "bucket");
        request.set_payload(Some(&b"data"[..]));
        request.complement("agent/1.0");
        assert_eq!(
            request.header_value("Host").unwrap(),
            "bucket.oss-cn-hangzhou.aliyuncs.com"
        );
        assert_eq!(request.header_value("User-Agent").unwrap(), "agent/1.0");
        assert_eq!(request.header_value("Content-Length").unwrap(), "4");
    }

    #[test]
    fn url_requests_skip_signing() {
        let mut request =
            SignedRequest::from_url("GET", "https://bucket.example.com/key?Signature=abc")
                .unwrap();
        request.sign(&credentials());
        assert!(!request.has_header("Authorization"));
        assert_eq!(
            request.wire_url(),
            "https://bucket.example.com/key?Signature=abc"
        );
    }

    #[test]
    fn stream_payloads_are_not_rewindable() {
        let mut request = SignedRequest::for_object("PUT", &endpoint(), "bucket", "key");
        assert!(request.payload_rewindable());

        request.set_payload(Some(&b"buffered"[..]));
        assert!(request.payload_rewindable());

        request.set_payload_stream(ByteStream::from(b"oneshot".to_vec()));
        assert!(!request.payload_rewindable());
    }
}
