pub mod body;
pub mod codec;
pub mod request;
pub mod response;

pub use body::{ByteStream, ByteStreamSender, Charset, MessageBody, StreamElement, StructuredBody};
pub use codec::{Frame, FrameEncoder, Http1Reader, ReadLimits, RequestEvent, ResponseHead};
pub use request::{Method, Request, RequestHead};
pub use response::{reason_phrase, Response};
