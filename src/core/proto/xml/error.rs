//! The server's XML error envelope.
//!
//! Failed calls answer with a small document rooted at `Error`:
//!
//! ```xml
//! <Error>
//!   <Code>NoSuchKey</Code>
//!   <Message>The specified key does not exist.</Message>
//!   <RequestId>5C3D9175B6FC201293AD4172</RequestId>
//!   <HostId>bucket.oss-cn-hangzhou.aliyuncs.com</HostId>
//! </Error>
//! ```

use xml::reader::{EventReader, ParserConfig};

use crate::core::error::OSS_REQUEST_ID_HEADER;
use crate::core::proto::xml::util::{
    deserialize_elements, find_start_element, peek_at_name, skip_tree, string_field, Next, Peek,
    XmlParseError, XmlResponse,
};
use crate::core::request::BufferedHttpResponse;

/// The parsed error envelope. Children the server omitted are left empty.
#[derive(Debug, Default, PartialEq, Clone)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub request_id: String,
    pub host_id: String,
}

pub struct ErrorEnvelopeDeserializer;
impl ErrorEnvelopeDeserializer {
    pub fn deserialize<T: Peek + Next>(
        tag_name: &str,
        stack: &mut T,
    ) -> Result<ErrorEnvelope, XmlParseError> {
        deserialize_elements::<_, ErrorEnvelope, _>(tag_name, stack, |name, stack, obj| {
            match name {
                "Code" => {
                    obj.code = string_field("Code", stack)?;
                }
                "Message" => {
                    obj.message = string_field("Message", stack)?;
                }
                "RequestId" => {
                    obj.request_id = string_field("RequestId", stack)?;
                }
                "HostId" => {
                    obj.host_id = string_field("HostId", stack)?;
                }
                _ => skip_tree(stack),
            }
            Ok(())
        })
    }
}

/// Parses the envelope out of a buffered error response.
///
/// A body whose root element is not `Error` is a protocol violation and
/// yields a parse error carrying the raw payload. The request id falls back
/// to the `x-oss-request-id` header when the body omits it.
pub fn parse_error_envelope(response: &BufferedHttpResponse) -> Result<ErrorEnvelope, XmlParseError> {
    let reader = EventReader::new_with_config(
        response.body.as_ref(),
        ParserConfig::new().trim_whitespace(false),
    );
    let mut stack = XmlResponse::new(reader.into_iter().peekable());
    find_start_element(&mut stack);

    let root = peek_at_name(&mut stack)?;
    if root != "Error" {
        return Err(XmlParseError(format!(
            "Xml format invalid, root node name is not Error. the content is:\n{}",
            response.body_as_str()
        )));
    }

    let mut envelope = ErrorEnvelopeDeserializer::deserialize("Error", &mut stack)?;
    if envelope.request_id.is_empty() {
        if let Some(request_id) = response.headers.get(OSS_REQUEST_ID_HEADER) {
            envelope.request_id = request_id.clone();
        }
    }
    Ok(envelope)
}
