use crate::protocol::error::Result;
use crate::protocol::{CallRequest, CallResult};

/// Codec for the call envelopes carried inside frames.
///
/// Envelopes are encoded with postcard; values inside them are already
/// marshalled [`Payload`](crate::protocol::Payload)s.
///
/// # Example
///
/// ```
/// use tether_common::transport::MessageCodec;
/// use tether_common::protocol::{CallRequest, CallResult};
///
/// let request = CallRequest::new("demo.Counter", "count", vec![], vec![]);
/// let encoded = MessageCodec::encode_request(&request).unwrap();
/// assert_eq!(MessageCodec::decode_request(&encoded).unwrap(), request);
///
/// let encoded = MessageCodec::encode_result(&CallResult::NoReturn).unwrap();
/// assert_eq!(MessageCodec::decode_result(&encoded).unwrap(), CallResult::NoReturn);
/// ```
pub struct MessageCodec;

impl MessageCodec {
    pub fn encode_request(request: &CallRequest) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(request)?)
    }

    pub fn decode_request(data: &[u8]) -> Result<CallRequest> {
        Ok(postcard::from_bytes(data)?)
    }

    pub fn encode_result(result: &CallResult) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(result)?)
    }

    pub fn decode_result(data: &[u8]) -> Result<CallResult> {
        Ok(postcard::from_bytes(data)?)
    }
}
