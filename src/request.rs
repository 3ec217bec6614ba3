//! Typed inputs, outputs and errors for the operation catalog, plus the XML
//! payload (de)serializers they use.

use std::collections::BTreeMap;
use std::default::Default;
use std::error::Error;
use std::fmt;
use std::io::Write;

use xml::EventWriter;

use crate::core::error::OssError;
use crate::core::proto::xml::error::parse_error_envelope;
use crate::core::proto::xml::util::{
    deserialize_elements, skip_tree, string_field, write_characters_element, Next, Peek,
    XmlParseError,
};
use crate::core::request::BufferedHttpResponse;
use crate::signature::signer::Params;
use crate::signature::stream::ByteStream;

/// Shared classification glue: parse the server's XML error envelope and let
/// the operation map well-known codes; malformed envelopes surface as parse
/// errors, empty bodies as the raw response.
macro_rules! oss_operation_error {
    ($name:ident { $($code:literal => $variant:ident,)* }) => {
        #[derive(Debug, PartialEq)]
        pub enum $name {
            $(
                $variant(String),
            )*
        }

        impl $name {
            pub fn from_response(res: BufferedHttpResponse) -> OssError<$name> {
                if !res.body.is_empty() {
                    match parse_error_envelope(&res) {
                        Ok(envelope) => match &envelope.code[..] {
                            $(
                                $code => {
                                    return OssError::Service($name::$variant(envelope.message))
                                }
                            )*
                            _ => {}
                        },
                        Err(XmlParseError(message)) => return OssError::ParseError(message),
                    }
                }
                OssError::Unknown(res)
            }
        }

        impl fmt::Display for $name {
            #[allow(unused_variables)]
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                match *self {
                    $(
                        $name::$variant(ref cause) => write!(f, "{}", cause),
                    )*
                }
            }
        }

        impl Error for $name {}
    };
}

// ---------------------------------------------------------------------------
// CreateBucket

/// The configuration sent along with a new bucket.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateBucketConfiguration {
    /// The storage class objects in this bucket default to, e.g. `Standard`,
    /// `IA` or `Archive`.
    pub storage_class: Option<String>,
}

pub struct CreateBucketConfigurationSerializer;
impl CreateBucketConfigurationSerializer {
    pub fn serialize<W>(
        writer: &mut EventWriter<W>,
        name: &str,
        obj: &CreateBucketConfiguration,
    ) -> Result<(), xml::writer::Error>
    where
        W: Write,
    {
        writer.write(xml::writer::XmlEvent::start_element(name))?;
        if let Some(ref value) = obj.storage_class {
            write_characters_element(writer, "StorageClass", value)?;
        }
        writer.write(xml::writer::XmlEvent::end_element())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateBucketRequest {
    /// The name of the bucket to create.
    pub bucket: String,
    /// The canned ACL to apply to the bucket: `private`, `public-read` or
    /// `public-read-write`.
    pub acl: Option<String>,
    pub create_bucket_configuration: Option<CreateBucketConfiguration>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreateBucketOutput {
    pub location: Option<String>,
    pub request_id: Option<String>,
}

oss_operation_error!(CreateBucketError {
    "BucketAlreadyExists" => BucketAlreadyExists,
    "TooManyBuckets" => TooManyBuckets,
    "InvalidBucketName" => InvalidBucketName,
});

// ---------------------------------------------------------------------------
// DeleteBucket

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteBucketRequest {
    pub bucket: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteBucketOutput {
    pub request_id: Option<String>,
}

oss_operation_error!(DeleteBucketError {
    "NoSuchBucket" => NoSuchBucket,
    "BucketNotEmpty" => BucketNotEmpty,
});

// ---------------------------------------------------------------------------
// ListObjects

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    /// Limits the listing to keys that begin with the prefix.
    pub prefix: Option<String>,
    /// Key to start listing after, for continuation.
    pub marker: Option<String>,
    /// Groups keys sharing a prefix up to the delimiter into
    /// `common_prefixes`.
    pub delimiter: Option<String>,
    pub max_keys: Option<i64>,
    pub encoding_type: Option<String>,
}

/// One key in a listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: String,
    pub e_tag: String,
    pub size: i64,
    pub storage_class: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListObjectsOutput {
    pub name: String,
    pub prefix: String,
    pub marker: String,
    pub max_keys: i64,
    pub delimiter: Option<String>,
    pub is_truncated: bool,
    /// Where to restart a truncated listing.
    pub next_marker: Option<String>,
    pub contents: Vec<ObjectSummary>,
    pub common_prefixes: Vec<String>,
    pub request_id: Option<String>,
}

#[allow(dead_code)]
struct ObjectSummaryDeserializer;
impl ObjectSummaryDeserializer {
    fn deserialize<T: Peek + Next>(
        tag_name: &str,
        stack: &mut T,
    ) -> Result<ObjectSummary, XmlParseError> {
        deserialize_elements::<_, ObjectSummary, _>(tag_name, stack, |name, stack, obj| {
            match name {
                "Key" => obj.key = string_field("Key", stack)?,
                "LastModified" => obj.last_modified = string_field("LastModified", stack)?,
                "ETag" => obj.e_tag = string_field("ETag", stack)?,
                "Size" => obj.size = string_field("Size", stack)?.parse::<i64>()?,
                "StorageClass" => obj.storage_class = string_field("StorageClass", stack)?,
                _ => skip_tree(stack),
            }
            Ok(())
        })
    }
}

pub struct ListObjectsOutputDeserializer;
impl ListObjectsOutputDeserializer {
    pub fn deserialize<T: Peek + Next>(
        tag_name: &str,
        stack: &mut T,
    ) -> Result<ListObjectsOutput, XmlParseError> {
        deserialize_elements::<_, ListObjectsOutput, _>(tag_name, stack, |name, stack, obj| {
            match name {
                "Name" => obj.name = string_field("Name", stack)?,
                "Prefix" => obj.prefix = string_field("Prefix", stack)?,
                "Marker" => obj.marker = string_field("Marker", stack)?,
                "MaxKeys" => obj.max_keys = string_field("MaxKeys", stack)?.parse::<i64>()?,
                "Delimiter" => obj.delimiter = Some(string_field("Delimiter", stack)?),
                "IsTruncated" => {
                    obj.is_truncated = string_field("IsTruncated", stack)? == "true"
                }
                "NextMarker" => obj.next_marker = Some(string_field("NextMarker", stack)?),
                "Contents" => {
                    obj.contents
                        .push(ObjectSummaryDeserializer::deserialize("Contents", stack)?);
                }
                "CommonPrefixes" => {
                    let prefix = deserialize_elements::<_, CommonPrefixHolder, _>(
                        "CommonPrefixes",
                        stack,
                        |name, stack, holder| {
                            match name {
                                "Prefix" => holder.0 = string_field("Prefix", stack)?,
                                _ => skip_tree(stack),
                            }
                            Ok(())
                        },
                    )?;
                    obj.common_prefixes.push(prefix.0);
                }
                _ => skip_tree(stack),
            }
            Ok(())
        })
    }
}

#[derive(Default)]
struct CommonPrefixHolder(String);

oss_operation_error!(ListObjectsError {
    "NoSuchBucket" => NoSuchBucket,
});

// ---------------------------------------------------------------------------
// PutObject

#[derive(Default)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    /// The object data. Use a buffered payload on the request for automatic
    /// retry support.
    pub body: Option<ByteStream>,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    /// Compute and send `Content-MD5` so the service verifies the payload.
    pub content_md5: bool,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    /// User metadata, sent as `x-oss-meta-*` headers.
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutObjectOutput {
    pub e_tag: Option<String>,
    pub hash_crc64ecma: Option<String>,
    pub request_id: Option<String>,
}

oss_operation_error!(PutObjectError {
    "NoSuchBucket" => NoSuchBucket,
    "InvalidDigest" => InvalidDigest,
});

// ---------------------------------------------------------------------------
// GetObject

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    /// e.g. `bytes=0-1023`. Ranged downloads skip CRC-64 verification.
    pub range: Option<String>,
    pub response_content_type: Option<String>,
    pub response_content_disposition: Option<String>,
}

#[derive(Default)]
pub struct GetObjectOutput {
    /// The object data, streamed. When CRC-64 checking is active the stream
    /// fails at end-of-stream if the content does not match what the service
    /// reported.
    pub body: Option<ByteStream>,
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub last_modified: Option<String>,
    pub hash_crc64ecma: Option<String>,
    pub object_type: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub request_id: Option<String>,
}

oss_operation_error!(GetObjectError {
    "NoSuchBucket" => NoSuchBucket,
    "NoSuchKey" => NoSuchKey,
    "InvalidRange" => InvalidRange,
});

// ---------------------------------------------------------------------------
// HeadObject

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadObjectRequest {
    pub bucket: String,
    pub key: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct HeadObjectOutput {
    pub content_length: Option<i64>,
    pub content_type: Option<String>,
    pub e_tag: Option<String>,
    pub last_modified: Option<String>,
    pub hash_crc64ecma: Option<String>,
    pub object_type: Option<String>,
    pub storage_class: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub request_id: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum HeadObjectError {
    NoSuchBucket(String),
    NoSuchKey(String),
}

impl HeadObjectError {
    /// HEAD responses have no body, so classification falls back to the
    /// status line.
    pub fn from_response(res: BufferedHttpResponse) -> OssError<HeadObjectError> {
        if res.body.is_empty() {
            if res.status.as_u16() == 404 {
                return OssError::Service(HeadObjectError::NoSuchKey(String::new()));
            }
            return OssError::Unknown(res);
        }
        match parse_error_envelope(&res) {
            Ok(envelope) => match &envelope.code[..] {
                "NoSuchBucket" => OssError::Service(HeadObjectError::NoSuchBucket(envelope.message)),
                "NoSuchKey" => OssError::Service(HeadObjectError::NoSuchKey(envelope.message)),
                _ => OssError::Unknown(res),
            },
            Err(XmlParseError(message)) => OssError::ParseError(message),
        }
    }
}

impl fmt::Display for HeadObjectError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            HeadObjectError::NoSuchBucket(ref cause) => write!(f, "{}", cause),
            HeadObjectError::NoSuchKey(ref cause) => write!(f, "{}", cause),
        }
    }
}

impl Error for HeadObjectError {}

// ---------------------------------------------------------------------------
// DeleteObject

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteObjectRequest {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteObjectOutput {
    pub request_id: Option<String>,
}

oss_operation_error!(DeleteObjectError {
    "NoSuchBucket" => NoSuchBucket,
});

// ---------------------------------------------------------------------------
// CopyObject

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyObjectRequest {
    pub bucket: String,
    pub key: String,
    pub copy_source_bucket: String,
    pub copy_source_key: String,
    /// `COPY` (default) keeps the source metadata, `REPLACE` takes the
    /// metadata from this request.
    pub metadata_directive: Option<String>,
    pub metadata: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CopyObjectOutput {
    pub e_tag: Option<String>,
    pub last_modified: Option<String>,
    pub request_id: Option<String>,
}

pub struct CopyObjectResultDeserializer;
impl CopyObjectResultDeserializer {
    pub fn deserialize<T: Peek + Next>(
        tag_name: &str,
        stack: &mut T,
    ) -> Result<CopyObjectOutput, XmlParseError> {
        deserialize_elements::<_, CopyObjectOutput, _>(tag_name, stack, |name, stack, obj| {
            match name {
                "ETag" => obj.e_tag = Some(string_field("ETag", stack)?),
                "LastModified" => obj.last_modified = Some(string_field("LastModified", stack)?),
                _ => skip_tree(stack),
            }
            Ok(())
        })
    }
}

oss_operation_error!(CopyObjectError {
    "NoSuchBucket" => NoSuchBucket,
    "NoSuchKey" => NoSuchKey,
});

// ---------------------------------------------------------------------------
// Symlinks

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutSymlinkRequest {
    pub bucket: String,
    pub key: String,
    /// The object key the symlink points to.
    pub target: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutSymlinkOutput {
    pub request_id: Option<String>,
}

oss_operation_error!(PutSymlinkError {
    "NoSuchBucket" => NoSuchBucket,
});

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetSymlinkRequest {
    pub bucket: String,
    pub key: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GetSymlinkOutput {
    pub target: Option<String>,
    pub request_id: Option<String>,
}

oss_operation_error!(GetSymlinkError {
    "NoSuchBucket" => NoSuchBucket,
    "NoSuchKey" => NoSuchKey,
});

// ---------------------------------------------------------------------------
// Multipart uploads

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitiateMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub content_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InitiateMultipartUploadOutput {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub request_id: Option<String>,
}

pub struct InitiateMultipartUploadOutputDeserializer;
impl InitiateMultipartUploadOutputDeserializer {
    pub fn deserialize<T: Peek + Next>(
        tag_name: &str,
        stack: &mut T,
    ) -> Result<InitiateMultipartUploadOutput, XmlParseError> {
        deserialize_elements::<_, InitiateMultipartUploadOutput, _>(
            tag_name,
            stack,
            |name, stack, obj| {
                match name {
                    "Bucket" => obj.bucket = string_field("Bucket", stack)?,
                    "Key" => obj.key = string_field("Key", stack)?,
                    "UploadId" => obj.upload_id = string_field("UploadId", stack)?,
                    _ => skip_tree(stack),
                }
                Ok(())
            },
        )
    }
}

oss_operation_error!(InitiateMultipartUploadError {
    "NoSuchBucket" => NoSuchBucket,
});

#[derive(Default)]
pub struct UploadPartRequest {
    pub bucket: String,
    pub key: String,
    /// From `InitiateMultipartUpload`.
    pub upload_id: String,
    /// 1 through 10000.
    pub part_number: i64,
    pub body: Option<ByteStream>,
    pub content_length: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UploadPartOutput {
    pub e_tag: Option<String>,
    pub hash_crc64ecma: Option<String>,
    pub request_id: Option<String>,
}

oss_operation_error!(UploadPartError {
    "NoSuchBucket" => NoSuchBucket,
    "NoSuchUpload" => NoSuchUpload,
});

/// One finished part, echoing the ETag the service returned for it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompletedPart {
    pub part_number: i64,
    pub e_tag: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompleteMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    /// Must be non-empty and in ascending part-number order.
    pub parts: Vec<CompletedPart>,
}

pub struct CompleteMultipartUploadSerializer;
impl CompleteMultipartUploadSerializer {
    pub fn serialize<W>(
        writer: &mut EventWriter<W>,
        name: &str,
        obj: &CompleteMultipartUploadRequest,
    ) -> Result<(), xml::writer::Error>
    where
        W: Write,
    {
        writer.write(xml::writer::XmlEvent::start_element(name))?;
        for part in &obj.parts {
            writer.write(xml::writer::XmlEvent::start_element("Part"))?;
            write_characters_element(writer, "PartNumber", &part.part_number.to_string())?;
            write_characters_element(writer, "ETag", &part.e_tag)?;
            writer.write(xml::writer::XmlEvent::end_element())?;
        }
        writer.write(xml::writer::XmlEvent::end_element())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct CompleteMultipartUploadOutput {
    pub location: String,
    pub bucket: String,
    pub key: String,
    pub e_tag: String,
    pub request_id: Option<String>,
}

pub struct CompleteMultipartUploadOutputDeserializer;
impl CompleteMultipartUploadOutputDeserializer {
    pub fn deserialize<T: Peek + Next>(
        tag_name: &str,
        stack: &mut T,
    ) -> Result<CompleteMultipartUploadOutput, XmlParseError> {
        deserialize_elements::<_, CompleteMultipartUploadOutput, _>(
            tag_name,
            stack,
            |name, stack, obj| {
                match name {
                    "Location" => obj.location = string_field("Location", stack)?,
                    "Bucket" => obj.bucket = string_field("Bucket", stack)?,
                    "Key" => obj.key = string_field("Key", stack)?,
                    "ETag" => obj.e_tag = string_field("ETag", stack)?,
                    _ => skip_tree(stack),
                }
                Ok(())
            },
        )
    }
}

oss_operation_error!(CompleteMultipartUploadError {
    "NoSuchUpload" => NoSuchUpload,
    "InvalidPart" => InvalidPart,
    "InvalidPartOrder" => InvalidPartOrder,
});

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbortMultipartUploadRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AbortMultipartUploadOutput {
    pub request_id: Option<String>,
}

oss_operation_error!(AbortMultipartUploadError {
    "NoSuchUpload" => NoSuchUpload,
});

// ---------------------------------------------------------------------------
// Pre-signed URLs

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresignedUrlRequest {
    /// The HTTP method the URL authorizes.
    pub method: String,
    pub bucket: String,
    pub key: String,
    /// Absolute expiry, seconds since the epoch.
    pub expires: i64,
    /// Headers the eventual request must carry, e.g. `Content-Type`; these
    /// participate in the signature.
    pub headers: BTreeMap<String, String>,
    /// Extra query parameters; whitelisted ones participate in the
    /// signature.
    pub params: Params,
}

/// Pre-signed URL construction has no service-side error codes; failures
/// are validation or credentials problems.
#[derive(Debug, PartialEq)]
pub enum PresignedUrlError {}

impl fmt::Display for PresignedUrlError {
    fn fmt(&self, _f: &mut fmt::Formatter) -> fmt::Result {
        match *self {}
    }
}

impl Error for PresignedUrlError {}
