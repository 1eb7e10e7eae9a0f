//! Wire codec turning [`Message`]s into frames and back.
//!
//! Frames are bincode-encoded [`WireFrame`] records carried inside a
//! length-delimited stream. The codec enforces the maximum frame size that the
//! composite layer has to respect: [`DEFAULT_PART_SIZE`] leaves room for the
//! header inside a [`DEFAULT_MAX_FRAME_SIZE`] frame.

pub mod error;

use bincode::{Decode, Encode, config, decode_from_slice, encode_to_vec};
use bytes::Bytes;

pub use error::CodecError;

use crate::message::{
    Body,
    FaultCode,
    Message,
    MessageId,
    MessageKind,
    MessageType,
    ServiceName,
    SessionId,
};

/// Largest encoded frame accepted on the wire (64 KiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Largest body carried by a single part (60 KiB).
pub const DEFAULT_PART_SIZE: usize = 60 * 1024;

const FLAG_PART: u8 = 0b0000_0001;
const FLAG_POLL: u8 = 0b0000_0010;
const FLAG_GROUP: u8 = 0b0000_0100;
const FLAG_NO_DATA: u8 = 0b0000_1000;
const FLAG_COMPRESSED: u8 = 0b0001_0000;
const FLAG_TEXT: u8 = 0b0010_0000;

/// On-the-wire representation of a message header and body.
#[derive(Debug, Encode, Decode, PartialEq, Eq)]
struct WireFrame {
    kind: u8,
    message_type: u8,
    flags: u8,
    session_id: Option<String>,
    service_name: Option<String>,
    message_id: Option<(u64, u64)>,
    correlation_id: Option<u64>,
    mask: Option<String>,
    fault_code: Option<u16>,
    body_offset: u64,
    body: Vec<u8>,
}

/// Encodes and decodes messages, enforcing a frame size limit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WireCodec {
    max_frame_size: usize,
}

impl Default for WireCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_FRAME_SIZE) }
}

impl WireCodec {
    /// Create a codec rejecting frames above `max_frame_size` bytes.
    #[must_use]
    pub const fn new(max_frame_size: usize) -> Self { Self { max_frame_size } }

    /// Configured frame limit.
    #[must_use]
    pub const fn max_frame_size(&self) -> usize { self.max_frame_size }

    /// Encode `message` into one frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialisation fails or
    /// [`CodecError::FrameTooLarge`] if the frame exceeds the limit.
    pub fn encode(&self, message: &Message) -> Result<Bytes, CodecError> {
        let frame = to_wire(message);
        let bytes = encode_to_vec(&frame, config::standard())?;
        if bytes.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: bytes.len(),
                limit: self.max_frame_size,
            });
        }
        Ok(Bytes::from(bytes))
    }

    /// Decode one frame into a message.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::FrameTooLarge`] for oversized input,
    /// [`CodecError::Decode`] for malformed bytes and the specific header
    /// errors for unknown tags or invalid text bodies.
    pub fn decode(&self, bytes: &[u8]) -> Result<Message, CodecError> {
        if bytes.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: bytes.len(),
                limit: self.max_frame_size,
            });
        }
        let (frame, _): (WireFrame, usize) = decode_from_slice(bytes, config::standard())?;
        from_wire(frame)
    }
}

fn kind_tag(kind: MessageKind) -> u8 {
    match kind {
        MessageKind::Request => 1,
        MessageKind::Reply => 2,
        MessageKind::Fault => 3,
        MessageKind::KeepAlive => 4,
    }
}

fn kind_from_tag(tag: u8) -> Result<MessageKind, CodecError> {
    match tag {
        1 => Ok(MessageKind::Request),
        2 => Ok(MessageKind::Reply),
        3 => Ok(MessageKind::Fault),
        4 => Ok(MessageKind::KeepAlive),
        other => Err(CodecError::UnknownKind(other)),
    }
}

fn to_wire(message: &Message) -> WireFrame {
    let mut flags = 0;
    for (set, flag) in [
        (message.is_part(), FLAG_PART),
        (message.is_poll_request(), FLAG_POLL),
        (message.is_group(), FLAG_GROUP),
        (message.is_no_data(), FLAG_NO_DATA),
        (message.is_compressed(), FLAG_COMPRESSED),
        (message.body().is_text(), FLAG_TEXT),
    ] {
        if set {
            flags |= flag;
        }
    }
    WireFrame {
        kind: kind_tag(message.kind()),
        message_type: message.message_type().tag(),
        flags,
        session_id: message.session_id().map(|id| id.as_str().to_owned()),
        service_name: message.service_name().map(|name| name.as_str().to_owned()),
        message_id: message
            .message_id()
            .map(|id| (id.message_sequence_nr(), id.part_sequence_nr())),
        correlation_id: message.correlation_id(),
        mask: message.mask().map(str::to_owned),
        fault_code: message.fault_code().map(FaultCode::code),
        body_offset: message.body_offset() as u64,
        body: message.body().as_bytes().to_vec(),
    }
}

fn from_wire(frame: WireFrame) -> Result<Message, CodecError> {
    let kind = kind_from_tag(frame.kind)?;
    let message_type = MessageType::from_tag(frame.message_type)
        .ok_or(CodecError::UnknownMessageType(frame.message_type))?;
    let fault_code = match frame.fault_code {
        Some(code) => Some(FaultCode::from_code(code).ok_or(CodecError::UnknownFaultCode(code))?),
        None => None,
    };
    let body = if frame.flags & FLAG_TEXT == 0 {
        Body::Binary(Bytes::from(frame.body))
    } else {
        Body::Text(String::from_utf8(frame.body).map_err(|e| CodecError::InvalidText(e.utf8_error()))?)
    };
    let body_offset =
        usize::try_from(frame.body_offset).map_err(|_| CodecError::OffsetOverflow(frame.body_offset))?;

    let mut message = Message::request(message_type)
        .with_body(body)
        .with_part(frame.flags & FLAG_PART != 0)
        .with_group(frame.flags & FLAG_GROUP != 0)
        .with_no_data(frame.flags & FLAG_NO_DATA != 0)
        .with_compressed(frame.flags & FLAG_COMPRESSED != 0);
    message.set_kind(kind);
    message.set_poll_request(frame.flags & FLAG_POLL != 0);
    message.set_session_id(frame.session_id.map(SessionId::new));
    if let Some(name) = frame.service_name {
        message = message.with_service(ServiceName::new(name));
    }
    if let Some((msg, part)) = frame.message_id {
        message.set_message_id(MessageId::new(msg, part));
    }
    message.set_correlation_id(frame.correlation_id);
    message.set_mask(frame.mask);
    message.set_fault_code(fault_code);
    message.set_body_offset(body_offset);
    Ok(message)
}
