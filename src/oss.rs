//! The operation catalog: an `Oss` trait and the `OssClient` that implements
//! it by driving typed requests through the shared pipeline.

use std::mem;

use async_trait::async_trait;
use xml::EventWriter;

use crate::core::error::{OssError, OSS_CRC64_HEADER, OSS_REQUEST_ID_HEADER};
use crate::core::proto::xml::util as xml_util;
use crate::core::request::{HttpConfig, TlsError};
use crate::core::Client;
use crate::core::{BufferedHttpResponse, DispatchSignedRequest, HttpClient, HttpResponse};
use crate::credential::{EnvironmentProvider, ProvideOssCredentials};
use crate::request::*;
use crate::signature::stream::{BodyTap, ByteStream, DigestStream};
use crate::signature::{Endpoint, SignedRequest};

/// Trait representing the capabilities of the OSS API. OSS clients implement
/// this trait.
#[async_trait]
pub trait Oss {
    /// Creates a new bucket, optionally with a canned ACL and a default
    /// storage class.
    async fn create_bucket(
        &self,
        input: CreateBucketRequest,
    ) -> Result<CreateBucketOutput, OssError<CreateBucketError>>;

    /// Deletes an empty bucket owned by the caller.
    async fn delete_bucket(
        &self,
        input: DeleteBucketRequest,
    ) -> Result<DeleteBucketOutput, OssError<DeleteBucketError>>;

    /// Lists up to `max_keys` objects, optionally grouped by a delimiter.
    async fn list_objects(
        &self,
        input: ListObjectsRequest,
    ) -> Result<ListObjectsOutput, OssError<ListObjectsError>>;

    /// Stores an object. The whole object is verified end-to-end with
    /// CRC-64 when checking is enabled on the client.
    async fn put_object(
        &self,
        input: PutObjectRequest,
    ) -> Result<PutObjectOutput, OssError<PutObjectError>>;

    /// Retrieves an object as a stream. Unless the request is ranged, the
    /// stream verifies the service-reported CRC-64 at end-of-stream.
    async fn get_object(
        &self,
        input: GetObjectRequest,
    ) -> Result<GetObjectOutput, OssError<GetObjectError>>;

    /// Retrieves an object's metadata without its data.
    async fn head_object(
        &self,
        input: HeadObjectRequest,
    ) -> Result<HeadObjectOutput, OssError<HeadObjectError>>;

    /// Deletes an object. Deleting a missing key succeeds.
    async fn delete_object(
        &self,
        input: DeleteObjectRequest,
    ) -> Result<DeleteObjectOutput, OssError<DeleteObjectError>>;

    /// Server-side copy within or across buckets.
    async fn copy_object(
        &self,
        input: CopyObjectRequest,
    ) -> Result<CopyObjectOutput, OssError<CopyObjectError>>;

    /// Creates a symlink object pointing at `target`.
    async fn put_symlink(
        &self,
        input: PutSymlinkRequest,
    ) -> Result<PutSymlinkOutput, OssError<PutSymlinkError>>;

    /// Reads the target of a symlink object.
    async fn get_symlink(
        &self,
        input: GetSymlinkRequest,
    ) -> Result<GetSymlinkOutput, OssError<GetSymlinkError>>;

    /// Starts a multipart upload and returns its upload id.
    async fn initiate_multipart_upload(
        &self,
        input: InitiateMultipartUploadRequest,
    ) -> Result<InitiateMultipartUploadOutput, OssError<InitiateMultipartUploadError>>;

    /// Uploads one part of a multipart upload.
    async fn upload_part(
        &self,
        input: UploadPartRequest,
    ) -> Result<UploadPartOutput, OssError<UploadPartError>>;

    /// Stitches uploaded parts into the final object.
    async fn complete_multipart_upload(
        &self,
        input: CompleteMultipartUploadRequest,
    ) -> Result<CompleteMultipartUploadOutput, OssError<CompleteMultipartUploadError>>;

    /// Abandons a multipart upload and frees its parts.
    async fn abort_multipart_upload(
        &self,
        input: AbortMultipartUploadRequest,
    ) -> Result<AbortMultipartUploadOutput, OssError<AbortMultipartUploadError>>;

    /// Builds a URL that authorizes `method` on the object until `expires`,
    /// verified server-side against the same canonical form used for
    /// header signing.
    async fn presigned_url(
        &self,
        input: PresignedUrlRequest,
    ) -> Result<String, OssError<PresignedUrlError>>;
}

/// A client for the OSS API.
#[derive(Clone)]
pub struct OssClient {
    client: Client,
    endpoint: Endpoint,
}

impl OssClient {
    /// Creates a client backed by the shared transport and credentials from
    /// the environment.
    pub fn new(endpoint: Endpoint) -> Self {
        OssClient {
            client: Client::shared(),
            endpoint,
        }
    }

    /// Creates a client with credentials from the environment and a
    /// transport built from the connection settings in `config`.
    pub fn new_with_config(
        config: crate::core::ClientConfig,
        endpoint: Endpoint,
    ) -> Result<Self, TlsError> {
        let dispatcher = HttpClient::new_with_config(HttpConfig {
            connect_timeout: config.connect_timeout,
            verify_ssl: config.verify_ssl,
            max_connections: config.max_connections,
        })?;
        Ok(OssClient {
            client: Client::new_with(EnvironmentProvider::default(), dispatcher, config),
            endpoint,
        })
    }

    pub fn new_with<P, D>(
        credentials_provider: P,
        dispatcher: D,
        config: crate::core::ClientConfig,
        endpoint: Endpoint,
    ) -> Self
    where
        P: ProvideOssCredentials + Send + Sync + 'static,
        D: DispatchSignedRequest + Send + Sync + 'static,
    {
        OssClient {
            client: Client::new_with(credentials_provider, dispatcher, config),
            endpoint,
        }
    }

    pub fn new_with_client(client: Client, endpoint: Endpoint) -> OssClient {
        OssClient { client, endpoint }
    }

    /// The pipeline client, e.g. for `disable()`.
    pub fn client(&self) -> &Client {
        &self.client
    }
}

impl OssClient {
    async fn sign_and_dispatch<E>(
        &self,
        request: SignedRequest,
        from_response: fn(BufferedHttpResponse) -> OssError<E>,
    ) -> Result<HttpResponse, OssError<E>> {
        let mut response = self.client.sign_and_dispatch(request).await?;
        if !response.status.is_success() {
            let response = response.buffer().await.map_err(OssError::HttpDispatch)?;
            return Err(from_response(response));
        }

        Ok(response)
    }

    fn add_metadata_headers(
        request: &mut SignedRequest,
        metadata: &Option<std::collections::BTreeMap<String, String>>,
    ) {
        if let Some(metadata) = metadata {
            for (name, value) in metadata.iter() {
                let header = format!("x-oss-meta-{}", name);
                request.add_header(header, value);
            }
        }
    }

    fn harvest_metadata(
        response: &HttpResponse,
    ) -> std::collections::BTreeMap<String, String> {
        let mut metadata = std::collections::BTreeMap::new();
        for (name, value) in response.headers.iter() {
            let name = name.as_str();
            if let Some(stripped) = name.strip_prefix("x-oss-meta-") {
                metadata.insert(stripped.to_owned(), value.clone());
            }
        }
        metadata
    }
}

#[async_trait]
impl Oss for OssClient {
    async fn create_bucket(
        &self,
        input: CreateBucketRequest,
    ) -> Result<CreateBucketOutput, OssError<CreateBucketError>> {
        let mut request = SignedRequest::for_bucket("PUT", &self.endpoint, &input.bucket);
        request.set_content_type("application/xml");
        request.add_optional_header("x-oss-acl", input.acl.as_ref());

        if let Some(ref configuration) = input.create_bucket_configuration {
            let mut writer = EventWriter::new(Vec::new());
            CreateBucketConfigurationSerializer::serialize(
                &mut writer,
                "CreateBucketConfiguration",
                configuration,
            )
            .map_err(|e| OssError::ParseError(e.to_string()))?;
            request.set_payload(Some(writer.into_inner()));
        } else {
            request.set_payload(Some(Vec::new()));
        }

        let mut response = self
            .sign_and_dispatch(request, CreateBucketError::from_response)
            .await?;

        let mut result = CreateBucketOutput::default();
        result.location = response.headers.remove("Location");
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn delete_bucket(
        &self,
        input: DeleteBucketRequest,
    ) -> Result<DeleteBucketOutput, OssError<DeleteBucketError>> {
        let request = SignedRequest::for_bucket("DELETE", &self.endpoint, &input.bucket);

        let mut response = self
            .sign_and_dispatch(request, DeleteBucketError::from_response)
            .await?;

        let mut result = DeleteBucketOutput::default();
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn list_objects(
        &self,
        input: ListObjectsRequest,
    ) -> Result<ListObjectsOutput, OssError<ListObjectsError>> {
        let mut request = SignedRequest::for_bucket("GET", &self.endpoint, &input.bucket);
        if let Some(ref prefix) = input.prefix {
            request.add_param("prefix", prefix.as_str());
        }
        if let Some(ref marker) = input.marker {
            request.add_param("marker", marker.as_str());
        }
        if let Some(ref delimiter) = input.delimiter {
            request.add_param("delimiter", delimiter.as_str());
        }
        if let Some(max_keys) = input.max_keys {
            request.add_param("max-keys", max_keys.to_string());
        }
        if let Some(ref encoding_type) = input.encoding_type {
            request.add_param("encoding-type", encoding_type.as_str());
        }

        let mut response = self
            .sign_and_dispatch(request, ListObjectsError::from_response)
            .await?;

        let request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        let mut result = xml_util::parse_response(&mut response, |tag, stack| {
            ListObjectsOutputDeserializer::deserialize(tag, stack)
        })
        .await?;
        result.request_id = request_id;
        Ok(result)
    }

    async fn put_object(
        &self,
        input: PutObjectRequest,
    ) -> Result<PutObjectOutput, OssError<PutObjectError>> {
        let mut request =
            SignedRequest::for_object("PUT", &self.endpoint, &input.bucket, &input.key);
        request.add_optional_header("Cache-Control", input.cache_control.as_ref());
        request.add_optional_header("Content-Disposition", input.content_disposition.as_ref());
        request.add_optional_header("Content-Encoding", input.content_encoding.as_ref());
        request.add_optional_header("Content-Length", input.content_length.as_ref());
        request.add_optional_header("Content-Type", input.content_type.as_ref());
        request.add_optional_header("x-oss-object-acl", input.acl.as_ref());
        request.add_optional_header("x-oss-storage-class", input.storage_class.as_ref());
        Self::add_metadata_headers(&mut request, &input.metadata);

        request.flags.content_md5 = input.content_md5;
        request.flags.check_crc64 = true;

        if let Some(body) = input.body {
            request.set_payload_stream(body);
        }

        let mut response = self
            .sign_and_dispatch(request, PutObjectError::from_response)
            .await?;

        let mut result = PutObjectOutput::default();
        result.e_tag = response.headers.remove("ETag");
        result.hash_crc64ecma = response.headers.remove(OSS_CRC64_HEADER);
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn get_object(
        &self,
        input: GetObjectRequest,
    ) -> Result<GetObjectOutput, OssError<GetObjectError>> {
        let mut request =
            SignedRequest::for_object("GET", &self.endpoint, &input.bucket, &input.key);
        let ranged = input.range.is_some();
        request.add_optional_header("Range", input.range.as_ref());
        if let Some(ref value) = input.response_content_type {
            request.add_param("response-content-type", value.as_str());
        }
        if let Some(ref value) = input.response_content_disposition {
            request.add_param("response-content-disposition", value.as_str());
        }
        request.flags.check_crc64 = true;

        let mut response = self
            .sign_and_dispatch(request, GetObjectError::from_response)
            .await?;

        let mut result = GetObjectOutput::default();
        result.metadata = Self::harvest_metadata(&response);
        result.content_length = response
            .headers
            .remove("Content-Length")
            .and_then(|value| value.parse::<i64>().ok());
        result.content_type = response.headers.remove("Content-Type");
        result.e_tag = response.headers.remove("ETag");
        result.last_modified = response.headers.remove("Last-Modified");
        result.hash_crc64ecma = response.headers.remove(OSS_CRC64_HEADER);
        result.object_type = response.headers.remove("x-oss-object-type");
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);

        let body = mem::replace(
            &mut response.body,
            ByteStream::new(futures::stream::empty()),
        );
        let expected_crc = if self.client.config().enable_crc64 && !ranged {
            result
                .hash_crc64ecma
                .as_ref()
                .and_then(|value| value.parse::<u64>().ok())
        } else {
            None
        };
        result.body = Some(match expected_crc {
            Some(expected) => DigestStream::new(body)
                .with_tap(BodyTap::new(true, false))
                .expect_crc64(expected, result.request_id.clone().unwrap_or_default())
                .into_byte_stream(),
            None => body,
        });
        Ok(result)
    }

    async fn head_object(
        &self,
        input: HeadObjectRequest,
    ) -> Result<HeadObjectOutput, OssError<HeadObjectError>> {
        let request =
            SignedRequest::for_object("HEAD", &self.endpoint, &input.bucket, &input.key);

        let mut response = self
            .sign_and_dispatch(request, HeadObjectError::from_response)
            .await?;

        let mut result = HeadObjectOutput::default();
        result.metadata = Self::harvest_metadata(&response);
        result.content_length = response
            .headers
            .remove("Content-Length")
            .and_then(|value| value.parse::<i64>().ok());
        result.content_type = response.headers.remove("Content-Type");
        result.e_tag = response.headers.remove("ETag");
        result.last_modified = response.headers.remove("Last-Modified");
        result.hash_crc64ecma = response.headers.remove(OSS_CRC64_HEADER);
        result.object_type = response.headers.remove("x-oss-object-type");
        result.storage_class = response.headers.remove("x-oss-storage-class");
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn delete_object(
        &self,
        input: DeleteObjectRequest,
    ) -> Result<DeleteObjectOutput, OssError<DeleteObjectError>> {
        let mut request =
            SignedRequest::for_object("DELETE", &self.endpoint, &input.bucket, &input.key);
        if let Some(ref version_id) = input.version_id {
            request.add_param("versionId", version_id.as_str());
        }

        let mut response = self
            .sign_and_dispatch(request, DeleteObjectError::from_response)
            .await?;

        let mut result = DeleteObjectOutput::default();
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn copy_object(
        &self,
        input: CopyObjectRequest,
    ) -> Result<CopyObjectOutput, OssError<CopyObjectError>> {
        let mut request =
            SignedRequest::for_object("PUT", &self.endpoint, &input.bucket, &input.key);
        request.add_header(
            "x-oss-copy-source",
            &format!("/{}/{}", input.copy_source_bucket, input.copy_source_key),
        );
        request.add_optional_header(
            "x-oss-metadata-directive",
            input.metadata_directive.as_ref(),
        );
        Self::add_metadata_headers(&mut request, &input.metadata);

        let mut response = self
            .sign_and_dispatch(request, CopyObjectError::from_response)
            .await?;

        let request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        let mut result = xml_util::parse_response(&mut response, |tag, stack| {
            CopyObjectResultDeserializer::deserialize(tag, stack)
        })
        .await?;
        result.request_id = request_id;
        Ok(result)
    }

    async fn put_symlink(
        &self,
        input: PutSymlinkRequest,
    ) -> Result<PutSymlinkOutput, OssError<PutSymlinkError>> {
        let mut request =
            SignedRequest::for_object("PUT", &self.endpoint, &input.bucket, &input.key);
        request.add_param_flag("symlink");
        request.add_header("x-oss-symlink-target", &input.target);

        let mut response = self
            .sign_and_dispatch(request, PutSymlinkError::from_response)
            .await?;

        let mut result = PutSymlinkOutput::default();
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn get_symlink(
        &self,
        input: GetSymlinkRequest,
    ) -> Result<GetSymlinkOutput, OssError<GetSymlinkError>> {
        let mut request =
            SignedRequest::for_object("GET", &self.endpoint, &input.bucket, &input.key);
        request.add_param_flag("symlink");

        let mut response = self
            .sign_and_dispatch(request, GetSymlinkError::from_response)
            .await?;

        let mut result = GetSymlinkOutput::default();
        result.target = response.headers.remove("x-oss-symlink-target");
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn initiate_multipart_upload(
        &self,
        input: InitiateMultipartUploadRequest,
    ) -> Result<InitiateMultipartUploadOutput, OssError<InitiateMultipartUploadError>> {
        let mut request =
            SignedRequest::for_object("POST", &self.endpoint, &input.bucket, &input.key);
        request.add_param_flag("uploads");
        request.add_optional_header("Content-Type", input.content_type.as_ref());

        let mut response = self
            .sign_and_dispatch(request, InitiateMultipartUploadError::from_response)
            .await?;

        let request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        let mut result = xml_util::parse_response(&mut response, |tag, stack| {
            InitiateMultipartUploadOutputDeserializer::deserialize(tag, stack)
        })
        .await?;
        result.request_id = request_id;
        Ok(result)
    }

    async fn upload_part(
        &self,
        input: UploadPartRequest,
    ) -> Result<UploadPartOutput, OssError<UploadPartError>> {
        if input.upload_id.is_empty() {
            return Err(OssError::Validation("upload id must not be empty".to_owned()));
        }
        if input.part_number < 1 || input.part_number > 10_000 {
            return Err(OssError::Validation(format!(
                "part number must be between 1 and 10000: {}",
                input.part_number
            )));
        }

        let mut request =
            SignedRequest::for_object("PUT", &self.endpoint, &input.bucket, &input.key);
        request.add_param("partNumber", input.part_number.to_string());
        request.add_param("uploadId", input.upload_id.as_str());
        request.add_optional_header("Content-Length", input.content_length.as_ref());
        request.flags.check_crc64 = true;

        if let Some(body) = input.body {
            request.set_payload_stream(body);
        }

        let mut response = self
            .sign_and_dispatch(request, UploadPartError::from_response)
            .await?;

        let mut result = UploadPartOutput::default();
        result.e_tag = response.headers.remove("ETag");
        result.hash_crc64ecma = response.headers.remove(OSS_CRC64_HEADER);
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn complete_multipart_upload(
        &self,
        input: CompleteMultipartUploadRequest,
    ) -> Result<CompleteMultipartUploadOutput, OssError<CompleteMultipartUploadError>> {
        if input.upload_id.is_empty() {
            return Err(OssError::Validation("upload id must not be empty".to_owned()));
        }
        if input.parts.is_empty() {
            return Err(OssError::Validation(
                "a multipart upload needs at least one part".to_owned(),
            ));
        }

        let mut request =
            SignedRequest::for_object("POST", &self.endpoint, &input.bucket, &input.key);
        request.add_param("uploadId", input.upload_id.as_str());
        request.set_content_type("application/xml");

        let mut writer = EventWriter::new(Vec::new());
        CompleteMultipartUploadSerializer::serialize(
            &mut writer,
            "CompleteMultipartUpload",
            &input,
        )
        .map_err(|e| OssError::ParseError(e.to_string()))?;
        request.set_payload(Some(writer.into_inner()));

        let mut response = self
            .sign_and_dispatch(request, CompleteMultipartUploadError::from_response)
            .await?;

        let request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        let mut result = xml_util::parse_response(&mut response, |tag, stack| {
            CompleteMultipartUploadOutputDeserializer::deserialize(tag, stack)
        })
        .await?;
        result.request_id = request_id;
        Ok(result)
    }

    async fn abort_multipart_upload(
        &self,
        input: AbortMultipartUploadRequest,
    ) -> Result<AbortMultipartUploadOutput, OssError<AbortMultipartUploadError>> {
        if input.upload_id.is_empty() {
            return Err(OssError::Validation("upload id must not be empty".to_owned()));
        }

        let mut request =
            SignedRequest::for_object("DELETE", &self.endpoint, &input.bucket, &input.key);
        request.add_param("uploadId", input.upload_id.as_str());

        let mut response = self
            .sign_and_dispatch(request, AbortMultipartUploadError::from_response)
            .await?;

        let mut result = AbortMultipartUploadOutput::default();
        result.request_id = response.headers.remove(OSS_REQUEST_ID_HEADER);
        Ok(result)
    }

    async fn presigned_url(
        &self,
        input: PresignedUrlRequest,
    ) -> Result<String, OssError<PresignedUrlError>> {
        let credentials = self.client.credentials().await?;

        let mut request =
            SignedRequest::for_object(&input.method, &self.endpoint, &input.bucket, &input.key);
        for (name, value) in input.headers.iter() {
            request.add_header(name.as_str(), value);
        }
        request.set_params(input.params);

        request
            .presigned_url(&credentials, input.expires)
            .map_err(OssError::Validation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::request::{HttpDispatchError, HttpRequest};
    use crate::core::ClientConfig;
    use crate::credential::StaticProvider;
    use async_trait::async_trait;
    use bytes::Bytes;
    use futures::TryStreamExt;
    use http::{HeaderMap, StatusCode};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Clone, Default)]
    struct CannedDispatcher {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: &'static str,
        seen: Arc<Mutex<Vec<HttpRequest>>>,
    }

    #[async_trait]
    impl DispatchSignedRequest for CannedDispatcher {
        async fn dispatch(
            &self,
            mut request: HttpRequest,
            _timeout: Option<Duration>,
        ) -> Result<HttpResponse, HttpDispatchError> {
            if let Some(mut body) = request.body.take() {
                while body
                    .try_next()
                    .await
                    .map_err(|e| HttpDispatchError::new(e.to_string()))?
                    .is_some()
                {}
            }
            self.seen.lock().unwrap().push(request);

            let mut headers: HeaderMap<String> = HeaderMap::<String>::default();
            for (name, value) in &self.headers {
                headers.insert(
                    http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                    value.clone(),
                );
            }
            Ok(HttpResponse {
                status: StatusCode::from_u16(self.status).unwrap(),
                headers,
                body: ByteStream::from(self.body.as_bytes().to_vec()),
            })
        }
    }

    fn client_with(dispatcher: CannedDispatcher) -> OssClient {
        OssClient::new_with(
            StaticProvider::new_minimal("test-id".to_owned(), "test-secret".to_owned()),
            dispatcher,
            ClientConfig::default(),
            "https://oss-cn-hangzhou.aliyuncs.com".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn put_object_harvests_response_headers() {
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![
                ("etag", "\"ABCDEF\"".to_owned()),
                (
                    "x-oss-hash-crc64ecma",
                    crate::signature::checksum::crc64(b"data").to_string(),
                ),
                ("x-oss-request-id", "REQ1".to_owned()),
            ],
            body: "",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher.clone());

        let output = client
            .put_object(PutObjectRequest {
                bucket: "bucket".to_owned(),
                key: "key".to_owned(),
                body: Some(ByteStream::from(b"data".to_vec())),
                content_type: Some("text/plain".to_owned()),
                ..PutObjectRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(output.e_tag.as_deref(), Some("\"ABCDEF\""));
        assert_eq!(
            output.hash_crc64ecma.as_deref(),
            Some(crate::signature::checksum::crc64(b"data").to_string().as_str())
        );
        assert_eq!(output.request_id.as_deref(), Some("REQ1"));

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(
            seen[0].url,
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/key"
        );
        assert_eq!(seen[0].method, "PUT");
    }

    #[tokio::test]
    async fn put_object_crc_mismatch_is_rejected() {
        // "data" has a different CRC than the scripted reply claims.
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![("x-oss-hash-crc64ecma", "1".to_owned())],
            body: "",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher);

        let result = client
            .put_object(PutObjectRequest {
                bucket: "bucket".to_owned(),
                key: "key".to_owned(),
                body: Some(ByteStream::from(b"data".to_vec())),
                ..PutObjectRequest::default()
            })
            .await;

        assert!(matches!(result, Err(OssError::Checksum(_))));
    }

    #[tokio::test]
    async fn get_object_verifies_the_download_crc() {
        let crc = crate::signature::checksum::crc64(b"object body").to_string();
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![("x-oss-hash-crc64ecma", crc)],
            body: "object body",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher);

        let output = client
            .get_object(GetObjectRequest {
                bucket: "bucket".to_owned(),
                key: "key".to_owned(),
                ..GetObjectRequest::default()
            })
            .await
            .unwrap();

        let chunks: Vec<Bytes> = output.body.unwrap().try_collect().await.unwrap();
        let mut data = Vec::new();
        for chunk in chunks {
            data.extend_from_slice(&chunk);
        }
        assert_eq!(data, b"object body");
    }

    #[tokio::test]
    async fn get_object_download_crc_mismatch_fails_the_stream() {
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![("x-oss-hash-crc64ecma", "99".to_owned())],
            body: "object body",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher);

        let output = client
            .get_object(GetObjectRequest {
                bucket: "bucket".to_owned(),
                key: "key".to_owned(),
                ..GetObjectRequest::default()
            })
            .await
            .unwrap();

        let result: Result<Vec<Bytes>, _> = output.body.unwrap().try_collect().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn list_objects_parses_the_xml_body() {
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![("x-oss-request-id", "REQLIST".to_owned())],
            body: "<ListBucketResult><Name>bucket</Name><MaxKeys>2</MaxKeys>\
                   <IsTruncated>false</IsTruncated>\
                   <Contents><Key>a.txt</Key><Size>1</Size></Contents>\
                   </ListBucketResult>",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher.clone());

        let output = client
            .list_objects(ListObjectsRequest {
                bucket: "bucket".to_owned(),
                prefix: Some("a".to_owned()),
                max_keys: Some(2),
                ..ListObjectsRequest::default()
            })
            .await
            .unwrap();

        assert_eq!(output.name, "bucket");
        assert_eq!(output.contents.len(), 1);
        assert_eq!(output.contents[0].key, "a.txt");
        assert_eq!(output.request_id.as_deref(), Some("REQLIST"));

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(
            seen[0].url,
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/?max-keys=2&prefix=a"
        );
    }

    #[tokio::test]
    async fn initiate_multipart_upload_sends_the_uploads_subresource() {
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![],
            body: "<InitiateMultipartUploadResult><Bucket>bucket</Bucket>\
                   <Key>key</Key><UploadId>UP1</UploadId>\
                   </InitiateMultipartUploadResult>",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher.clone());

        let output = client
            .initiate_multipart_upload(InitiateMultipartUploadRequest {
                bucket: "bucket".to_owned(),
                key: "key".to_owned(),
                content_type: None,
            })
            .await
            .unwrap();
        assert_eq!(output.upload_id, "UP1");

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(
            seen[0].url,
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/key?uploads"
        );
        assert_eq!(seen[0].method, "POST");
    }

    #[tokio::test]
    async fn complete_multipart_upload_requires_parts() {
        let client = client_with(CannedDispatcher {
            status: 200,
            ..CannedDispatcher::default()
        });

        let result = client
            .complete_multipart_upload(CompleteMultipartUploadRequest {
                bucket: "bucket".to_owned(),
                key: "key".to_owned(),
                upload_id: "UP1".to_owned(),
                parts: vec![],
            })
            .await;

        assert!(matches!(result, Err(OssError::Validation(_))));
    }

    #[tokio::test]
    async fn upload_part_validates_the_part_number() {
        let client = client_with(CannedDispatcher {
            status: 200,
            ..CannedDispatcher::default()
        });

        for part_number in &[0, 10_001] {
            let result = client
                .upload_part(UploadPartRequest {
                    bucket: "bucket".to_owned(),
                    key: "key".to_owned(),
                    upload_id: "UP1".to_owned(),
                    part_number: *part_number,
                    ..UploadPartRequest::default()
                })
                .await;
            assert!(matches!(result, Err(OssError::Validation(_))));
        }
    }

    #[tokio::test]
    async fn get_symlink_reads_the_target_header() {
        let dispatcher = CannedDispatcher {
            status: 200,
            headers: vec![("x-oss-symlink-target", "real/object.txt".to_owned())],
            body: "",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher.clone());

        let output = client
            .get_symlink(GetSymlinkRequest {
                bucket: "bucket".to_owned(),
                key: "link".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(output.target.as_deref(), Some("real/object.txt"));

        let seen = dispatcher.seen.lock().unwrap();
        assert_eq!(
            seen[0].url,
            "https://bucket.oss-cn-hangzhou.aliyuncs.com/link?symlink"
        );
    }

    #[tokio::test]
    async fn not_found_is_classified_from_the_envelope() {
        let dispatcher = CannedDispatcher {
            status: 404,
            headers: vec![],
            body: "<Error><Code>NoSuchKey</Code>\
                   <Message>The specified key does not exist.</Message>\
                   <RequestId>REQ404</RequestId></Error>",
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher);

        let result = client
            .get_object(GetObjectRequest {
                bucket: "bucket".to_owned(),
                key: "missing".to_owned(),
                ..GetObjectRequest::default()
            })
            .await;

        match result {
            Err(OssError::Service(GetObjectError::NoSuchKey(message))) => {
                assert_eq!(message, "The specified key does not exist.")
            }
            _ => panic!("expected NoSuchKey"),
        }
    }

    #[tokio::test]
    async fn presigned_url_is_built_without_touching_the_transport() {
        let dispatcher = CannedDispatcher {
            status: 200,
            ..CannedDispatcher::default()
        };
        let client = client_with(dispatcher.clone());

        let url = client
            .presigned_url(PresignedUrlRequest {
                method: "GET".to_owned(),
                bucket: "examplebucket".to_owned(),
                key: "nelson".to_owned(),
                expires: 1_543_503_968,
                ..PresignedUrlRequest::default()
            })
            .await
            .unwrap();

        assert!(url.contains("Signature=rCooN347WLWedYMY2rF0fS8xJwk%3D"));
        assert!(dispatcher.seen.lock().unwrap().is_empty());
    }
}
