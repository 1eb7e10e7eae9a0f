//! Logical messages exchanged between clients, the connector and backends.
//!
//! A [`Message`] is the unit every other layer works with: the composite
//! sender cuts one into parts, the receiver stitches parts back into one, the
//! requester drives them across pooled connections and the subscription queue
//! fans published ones out to subscribers. The transport layer treats the
//! body as opaque.

pub mod body;
pub mod id;

use std::fmt;

pub use body::Body;
pub use id::{MessageId, SequenceTracker};

/// Role of a frame within an exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Outbound call towards a peer.
    Request,
    /// Successful answer to a request.
    Reply,
    /// Explicit protocol fault returned by the peer.
    Fault,
    /// Connection keep-alive probe or its echo.
    KeepAlive,
}

/// Operation carried by a message, used to dispatch complete requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    Attach,
    Detach,
    CreateSession,
    DeleteSession,
    Execute,
    Subscribe,
    ChangeSubscription,
    Unsubscribe,
    ReceivePublication,
    Publish,
    KeepAlive,
}

impl MessageType {
    /// Stable wire tag for the operation.
    #[must_use]
    pub const fn tag(self) -> u8 {
        match self {
            Self::Attach => 1,
            Self::Detach => 2,
            Self::CreateSession => 3,
            Self::DeleteSession => 4,
            Self::Execute => 5,
            Self::Subscribe => 6,
            Self::ChangeSubscription => 7,
            Self::Unsubscribe => 8,
            Self::ReceivePublication => 9,
            Self::Publish => 10,
            Self::KeepAlive => 11,
        }
    }

    /// Resolve a wire tag produced by [`MessageType::tag`].
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            1 => Self::Attach,
            2 => Self::Detach,
            3 => Self::CreateSession,
            4 => Self::DeleteSession,
            5 => Self::Execute,
            6 => Self::Subscribe,
            7 => Self::ChangeSubscription,
            8 => Self::Unsubscribe,
            9 => Self::ReceivePublication,
            10 => Self::Publish,
            11 => Self::KeepAlive,
            _ => return None,
        })
    }
}

/// Machine readable reason attached to fault messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultCode {
    BadRequest,
    UnknownService,
    UnknownSession,
    NotSubscribed,
    ServiceUnavailable,
    Internal,
}

impl FaultCode {
    /// Stable numeric code used on the wire.
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::BadRequest => 400,
            Self::UnknownService => 404,
            Self::UnknownSession => 410,
            Self::NotSubscribed => 412,
            Self::ServiceUnavailable => 503,
            Self::Internal => 500,
        }
    }

    /// Resolve a numeric code produced by [`FaultCode::code`].
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            400 => Self::BadRequest,
            404 => Self::UnknownService,
            410 => Self::UnknownSession,
            412 => Self::NotSubscribed,
            503 => Self::ServiceUnavailable,
            500 => Self::Internal,
            _ => return None,
        })
    }
}

/// Identifier of a client session or subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a session identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    /// Borrow the identifier text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// Name of a backend service registered with the connector.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceName(String);

impl ServiceName {
    /// Wrap a service name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    /// Borrow the name text.
    #[must_use]
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ServiceName {
    fn from(value: &str) -> Self { Self::new(value) }
}

/// One logical unit of application or control data.
///
/// A message is either complete (`is_part() == false`) or one fragment of an
/// ordered sequence. Fragments carry no index: order is the emission order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    message_type: MessageType,
    is_part: bool,
    is_poll_request: bool,
    is_group: bool,
    no_data: bool,
    compressed: bool,
    session_id: Option<SessionId>,
    service_name: Option<ServiceName>,
    message_id: Option<MessageId>,
    correlation_id: Option<u64>,
    mask: Option<String>,
    fault_code: Option<FaultCode>,
    body_offset: usize,
    body: Body,
}

impl Message {
    fn with_kind(kind: MessageKind, message_type: MessageType) -> Self {
        Self {
            kind,
            message_type,
            is_part: false,
            is_poll_request: false,
            is_group: false,
            no_data: false,
            compressed: false,
            session_id: None,
            service_name: None,
            message_id: None,
            correlation_id: None,
            mask: None,
            fault_code: None,
            body_offset: 0,
            body: Body::empty(),
        }
    }

    /// Create an empty request for `message_type`.
    #[must_use]
    pub fn request(message_type: MessageType) -> Self {
        Self::with_kind(MessageKind::Request, message_type)
    }

    /// Create an empty reply addressed like `request`.
    #[must_use]
    pub fn reply_to(request: &Message) -> Self {
        let mut reply = Self::with_kind(MessageKind::Reply, request.message_type);
        reply.copy_routing_from(request);
        reply
    }

    /// Create a fault reply addressed like `request`.
    #[must_use]
    pub fn fault_for(request: &Message, code: FaultCode, text: impl Into<String>) -> Self {
        let mut fault = Self::with_kind(MessageKind::Fault, request.message_type);
        fault.copy_routing_from(request);
        fault.fault_code = Some(code);
        fault.body = Body::Text(text.into());
        fault
    }

    /// Create a keep-alive probe.
    #[must_use]
    pub fn keep_alive() -> Self { Self::with_kind(MessageKind::KeepAlive, MessageType::KeepAlive) }

    /// Create a pull frame asking the peer for the next part of `pending`.
    #[must_use]
    pub fn poll_request(pending: &Message, message_id: MessageId) -> Self {
        let mut poll = Self::with_kind(MessageKind::Request, pending.message_type);
        poll.session_id.clone_from(&pending.session_id);
        poll.service_name.clone_from(&pending.service_name);
        poll.correlation_id = pending.correlation_id;
        poll.is_poll_request = true;
        poll.message_id = Some(message_id);
        poll
    }

    fn copy_routing_from(&mut self, other: &Message) {
        self.session_id.clone_from(&other.session_id);
        self.service_name.clone_from(&other.service_name);
        self.message_id = other.message_id;
        self.correlation_id = other.correlation_id;
        self.is_group = other.is_group;
    }

    /// Set the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the session identifier.
    #[must_use]
    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    /// Set the service name.
    #[must_use]
    pub fn with_service(mut self, service_name: ServiceName) -> Self {
        self.service_name = Some(service_name);
        self
    }

    /// Set the publish or subscription mask.
    #[must_use]
    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// Mark the message as a fragment that is followed by more fragments.
    #[must_use]
    pub fn with_part(mut self, is_part: bool) -> Self {
        self.is_part = is_part;
        self
    }

    /// Flag the message as a member of a group call.
    #[must_use]
    pub fn with_group(mut self, is_group: bool) -> Self {
        self.is_group = is_group;
        self
    }

    /// Flag a publication poll reply that carries no message.
    #[must_use]
    pub fn with_no_data(mut self, no_data: bool) -> Self {
        self.no_data = no_data;
        self
    }

    /// Flag the body as compressed by the application.
    #[must_use]
    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Frame role.
    #[must_use]
    pub const fn kind(&self) -> MessageKind { self.kind }

    /// Operation carried by the frame.
    #[must_use]
    pub const fn message_type(&self) -> MessageType { self.message_type }

    /// Whether more fragments follow this one.
    #[must_use]
    pub const fn is_part(&self) -> bool { self.is_part }

    /// Whether this frame asks for the next fragment of a large transfer.
    #[must_use]
    pub const fn is_poll_request(&self) -> bool { self.is_poll_request }

    /// Whether the frame belongs to a group call.
    #[must_use]
    pub const fn is_group(&self) -> bool { self.is_group }

    /// Whether a publication poll returned without data.
    #[must_use]
    pub const fn is_no_data(&self) -> bool { self.no_data }

    /// Whether the body is compressed.
    #[must_use]
    pub const fn is_compressed(&self) -> bool { self.compressed }

    /// Whether the frame is a protocol fault.
    #[must_use]
    pub fn is_fault(&self) -> bool { self.kind == MessageKind::Fault }

    /// Whether the frame is a keep-alive probe or echo.
    #[must_use]
    pub fn is_keep_alive(&self) -> bool { self.kind == MessageKind::KeepAlive }

    /// Session identifier, if any.
    #[must_use]
    pub fn session_id(&self) -> Option<&SessionId> { self.session_id.as_ref() }

    /// Service name, if any.
    #[must_use]
    pub fn service_name(&self) -> Option<&ServiceName> { self.service_name.as_ref() }

    /// Sequence identifier stamped by the requester.
    #[must_use]
    pub const fn message_id(&self) -> Option<MessageId> { self.message_id }

    /// Correlation identifier of an outstanding asynchronous send.
    #[must_use]
    pub const fn correlation_id(&self) -> Option<u64> { self.correlation_id }

    /// Publish or subscription mask.
    #[must_use]
    pub fn mask(&self) -> Option<&str> { self.mask.as_deref() }

    /// Fault reason, present on fault messages.
    #[must_use]
    pub const fn fault_code(&self) -> Option<FaultCode> { self.fault_code }

    /// Offset of this frame's body within the logical message body.
    #[must_use]
    pub const fn body_offset(&self) -> usize { self.body_offset }

    /// Length in bytes of the body carried by this frame.
    #[must_use]
    pub fn body_length(&self) -> usize { self.body.len() }

    /// Borrow the body.
    #[must_use]
    pub fn body(&self) -> &Body { &self.body }

    /// Take the body, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body { std::mem::take(&mut self.body) }

    /// Replace the body.
    pub fn set_body(&mut self, body: Body) { self.body = body; }

    /// Stamp the sequence identifier.
    pub fn set_message_id(&mut self, message_id: MessageId) { self.message_id = Some(message_id); }

    /// Stamp or clear the correlation identifier.
    pub fn set_correlation_id(&mut self, correlation_id: Option<u64>) {
        self.correlation_id = correlation_id;
    }

    /// Set or clear the session identifier.
    pub fn set_session_id(&mut self, session_id: Option<SessionId>) { self.session_id = session_id; }

    pub(crate) fn set_part(&mut self, is_part: bool) { self.is_part = is_part; }

    pub(crate) fn set_group(&mut self, is_group: bool) { self.is_group = is_group; }

    pub(crate) fn set_body_offset(&mut self, offset: usize) { self.body_offset = offset; }

    pub(crate) fn set_kind(&mut self, kind: MessageKind) { self.kind = kind; }

    pub(crate) fn set_poll_request(&mut self, is_poll_request: bool) {
        self.is_poll_request = is_poll_request;
    }

    pub(crate) fn set_fault_code(&mut self, code: Option<FaultCode>) { self.fault_code = code; }

    pub(crate) fn set_mask(&mut self, mask: Option<String>) { self.mask = mask; }

    /// Copy every header field of `self` into a new message carrying `body`.
    pub(crate) fn header_with_body(&self, body: Body) -> Self {
        let mut copy = self.clone_header();
        copy.body = body;
        copy
    }

    fn clone_header(&self) -> Self {
        Self {
            kind: self.kind,
            message_type: self.message_type,
            is_part: self.is_part,
            is_poll_request: self.is_poll_request,
            is_group: self.is_group,
            no_data: self.no_data,
            compressed: self.compressed,
            session_id: self.session_id.clone(),
            service_name: self.service_name.clone(),
            message_id: self.message_id,
            correlation_id: self.correlation_id,
            mask: self.mask.clone(),
            fault_code: self.fault_code,
            body_offset: self.body_offset,
            body: Body::empty(),
        }
    }
}
