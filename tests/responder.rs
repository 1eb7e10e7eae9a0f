//! End-to-end broker behaviour: a client requester talks through the wire
//! codec to a responder, which forwards session traffic to a backend and
//! serves a publish queue.

mod common;

use std::{sync::Arc, time::Duration};

use common::{TIMEOUT, TestResult, payload, size};
use connector_testing::{MockFactory, ResponderPeer, backend, reply_expect};
use rstest::rstest;
use service_connector::{
    FaultCode,
    Message,
    MessageId,
    MessageType,
    PoolConfig,
    Requester,
    RequesterConfig,
    Responder,
    ResponderConfig,
    ResponderContext,
    ServiceHandle,
    ServiceName,
    SessionId,
    SubscriptionQueue,
    WireCodec,
};

const PART: usize = 64;

struct Broker {
    context: Arc<ResponderContext>,
    client: Arc<Requester>,
    quotes: Arc<SubscriptionQueue>,
    backend: MockFactory,
}

impl Broker {
    fn new(no_data: Duration) -> Self {
        let config = ResponderConfig::default()
            .part_size(size(PART))
            .no_data_interval(no_data);
        let context = Arc::new(ResponderContext::new(config).expect("broker config"));

        let backend = MockFactory::new(
            backend(size(PART), |request| {
                if request.body().as_bytes() == b"boom" {
                    return Message::fault_for(&request, FaultCode::Internal, "backend exploded");
                }
                let mut body = request.body().as_bytes().to_vec();
                body.reverse();
                Message::reply_to(&request).with_body(body)
            })
            .shared(),
        );
        let upstream = backend.pool(PoolConfig::default().max_connections(2));
        let requester = Requester::new(upstream, RequesterConfig::default().part_size(size(PART)))
            .expect("backend requester");
        context.services().register(
            ServiceName::from("backend"),
            ServiceHandle::Session(Arc::new(requester)),
        );

        let quotes = Arc::new(SubscriptionQueue::new(ServiceName::from("quotes")));
        context.services().register(
            ServiceName::from("quotes"),
            ServiceHandle::Publish(Arc::clone(&quotes)),
        );

        let peer = ResponderPeer::new(Responder::new(Arc::clone(&context)))
            .with_codec(WireCodec::default())
            .shared();
        let client_pool = MockFactory::new(peer).pool(PoolConfig::default().max_connections(2));
        let client = Requester::new(client_pool, RequesterConfig::default().part_size(size(PART)))
            .expect("client requester");

        Self {
            context,
            client: Arc::new(client),
            quotes,
            backend,
        }
    }

    async fn call(&self, request: Message) -> Message {
        reply_expect!(self.client.send_and_receive(request, TIMEOUT))
    }

    async fn create_session(&self) -> SessionId {
        let reply = self
            .call(Message::request(MessageType::CreateSession).with_service(ServiceName::from("backend")))
            .await;
        reply.session_id().cloned().expect("session id in reply")
    }

    async fn subscribe(&self, mask: &str) -> SessionId {
        let reply = self
            .call(
                Message::request(MessageType::Subscribe)
                    .with_service(ServiceName::from("quotes"))
                    .with_mask(mask),
            )
            .await;
        reply.session_id().cloned().expect("subscription id in reply")
    }

    async fn publish(&self, mask: &str, body: Vec<u8>) -> Message {
        self.call(
            Message::request(MessageType::Publish)
                .with_service(ServiceName::from("quotes"))
                .with_mask(mask)
                .with_body(body),
        )
        .await
    }
}

fn on_session(message_type: MessageType, session: &SessionId) -> Message {
    Message::request(message_type).with_session(session.clone())
}

fn reversed(len: usize) -> Vec<u8> {
    let mut body = payload(len);
    body.reverse();
    body
}

#[tokio::test]
async fn attach_and_detach_track_clients() {
    let broker = Broker::new(TIMEOUT);
    broker.call(Message::request(MessageType::Attach)).await;
    broker.call(Message::request(MessageType::Attach)).await;
    assert_eq!(broker.context.clients(), 2);
    broker.call(Message::request(MessageType::Detach)).await;
    assert_eq!(broker.context.clients(), 1);
}

#[rstest]
#[case(10)]
#[case(PART)]
#[case(PART * 3 + 1)]
#[tokio::test]
async fn execute_is_forwarded_to_the_backend(#[case] len: usize) {
    let broker = Broker::new(TIMEOUT);
    let session = broker.create_session().await;
    assert!(session.as_str().starts_with("backend-"));

    let reply = broker
        .call(on_session(MessageType::Execute, &session).with_body(payload(len)))
        .await;
    assert!(!reply.is_fault(), "unexpected fault: {}", reply.body().to_text());
    assert_eq!(reply.body().as_bytes(), reversed(len).as_slice());
    assert_eq!(reply.session_id(), Some(&session));
    assert!(!broker.backend.frames().is_empty());
    assert_eq!(broker.context.composites().inbound_len(), 0);
    assert_eq!(broker.context.composites().outbound_len(), 0);
}

#[tokio::test]
async fn backend_faults_are_relayed() {
    let broker = Broker::new(TIMEOUT);
    let session = broker.create_session().await;
    let reply = broker
        .call(on_session(MessageType::Execute, &session).with_body("boom"))
        .await;
    assert!(reply.is_fault());
    assert_eq!(reply.fault_code(), Some(FaultCode::Internal));
    assert_eq!(reply.body().to_text(), "backend exploded");
}

#[tokio::test]
async fn deleted_sessions_are_unknown() {
    let broker = Broker::new(TIMEOUT);
    let session = broker.create_session().await;
    let reply = broker.call(on_session(MessageType::DeleteSession, &session)).await;
    assert!(!reply.is_fault());
    assert!(broker.context.sessions().is_empty());

    let reply = broker
        .call(on_session(MessageType::Execute, &session).with_body("late"))
        .await;
    assert_eq!(reply.fault_code(), Some(FaultCode::UnknownSession));
}

#[rstest]
#[case(Message::request(MessageType::CreateSession).with_service(ServiceName::from("nope")), FaultCode::UnknownService)]
#[case(Message::request(MessageType::CreateSession), FaultCode::BadRequest)]
#[case(Message::request(MessageType::CreateSession).with_service(ServiceName::from("quotes")), FaultCode::BadRequest)]
#[case(Message::request(MessageType::Subscribe).with_service(ServiceName::from("quotes")), FaultCode::BadRequest)]
#[case(Message::request(MessageType::Subscribe).with_service(ServiceName::from("quotes")).with_mask("EUR\u{7}"), FaultCode::BadRequest)]
#[case(Message::request(MessageType::Publish).with_service(ServiceName::from("quotes")).with_mask("EUR%"), FaultCode::BadRequest)]
#[case(Message::request(MessageType::ReceivePublication).with_session(SessionId::from("ghost")), FaultCode::UnknownSession)]
#[case(Message::request(MessageType::KeepAlive), FaultCode::BadRequest)]
#[tokio::test]
async fn bad_requests_become_faults(#[case] request: Message, #[case] code: FaultCode) {
    let broker = Broker::new(TIMEOUT);
    let reply = broker.call(request).await;
    assert!(reply.is_fault());
    assert_eq!(reply.fault_code(), Some(code), "{}", reply.body().to_text());
}

#[tokio::test]
async fn publications_reach_matching_subscribers() {
    let broker = Broker::new(TIMEOUT);
    let eur = broker.subscribe("EUR%%%").await;
    let usd = broker.subscribe("USD%%%").await;
    assert_eq!(broker.quotes.subscriber_count(), 2);

    broker.publish("EURUSD", payload(8)).await;
    broker.publish("USDJPY", payload(3 * PART)).await;

    let reply = broker.call(on_session(MessageType::ReceivePublication, &eur)).await;
    assert_eq!(reply.mask(), Some("EURUSD"));
    assert_eq!(reply.body().as_bytes(), payload(8).as_slice());

    let reply = broker.call(on_session(MessageType::ReceivePublication, &usd)).await;
    assert_eq!(reply.mask(), Some("USDJPY"));
    assert_eq!(reply.body().as_bytes(), payload(3 * PART).as_slice());
}

#[tokio::test]
async fn change_subscription_redirects_future_reads() {
    let broker = Broker::new(TIMEOUT);
    let id = broker.subscribe("EUR%%%").await;
    let reply = broker
        .call(on_session(MessageType::ChangeSubscription, &id).with_mask("GBP%%%"))
        .await;
    assert!(!reply.is_fault());

    broker.publish("EURUSD", payload(1)).await;
    broker.publish("GBPUSD", payload(2)).await;
    let reply = broker.call(on_session(MessageType::ReceivePublication, &id)).await;
    assert_eq!(reply.mask(), Some("GBPUSD"));
}

#[tokio::test(start_paused = true)]
async fn idle_receive_reports_no_data() {
    let broker = Broker::new(Duration::from_secs(1));
    let id = broker.subscribe("EUR%%%").await;
    let reply = broker.call(on_session(MessageType::ReceivePublication, &id)).await;
    assert!(!reply.is_fault());
    assert!(reply.is_no_data());
    assert!(reply.body().is_empty());
}

#[tokio::test]
async fn unsubscribe_ends_a_pending_receive() -> TestResult {
    let broker = Broker::new(Duration::from_secs(60));
    let id = broker.subscribe("%%%%").await;
    let pending = broker
        .client
        .send(on_session(MessageType::ReceivePublication, &id), TIMEOUT);
    while !broker.quotes.is_listening(&id) {
        tokio::task::yield_now().await;
    }

    let reply = broker.call(on_session(MessageType::Unsubscribe, &id)).await;
    assert!(!reply.is_fault());
    let reply = pending.await?;
    assert_eq!(reply.fault_code(), Some(FaultCode::NotSubscribed));
    assert_eq!(broker.quotes.subscriber_count(), 0);
    Ok(())
}

#[tokio::test]
async fn keep_alive_is_echoed() {
    let broker = Broker::new(TIMEOUT);
    let responder = Responder::new(Arc::clone(&broker.context));
    let reply = responder.handle(Message::keep_alive()).await;
    assert!(reply.is_keep_alive());
}

#[tokio::test]
async fn poll_without_pending_reply_is_a_fault() {
    let broker = Broker::new(TIMEOUT);
    let responder = Responder::new(Arc::clone(&broker.context));
    let request = on_session(MessageType::Execute, &SessionId::from("backend-9"));
    let reply = responder
        .handle(Message::poll_request(&request, MessageId::new(1, 1)))
        .await;
    assert_eq!(reply.fault_code(), Some(FaultCode::BadRequest));
}

#[tokio::test]
async fn oversized_request_is_refused_mid_upload() {
    let config = ResponderConfig::default()
        .part_size(size(PART))
        .max_message_size(2 * PART);
    let context = Arc::new(ResponderContext::new(config).expect("broker config"));
    let responder = Responder::new(context);
    let peer = ResponderPeer::new(responder).shared();
    let client = Requester::new(
        MockFactory::new(peer).pool(PoolConfig::default()),
        RequesterConfig::default().part_size(size(PART)),
    )
    .expect("client requester");

    let reply = reply_expect!(client.send_and_receive(
        Message::request(MessageType::Publish)
            .with_service(ServiceName::from("quotes"))
            .with_mask("EURUSD")
            .with_body(payload(4 * PART)),
        TIMEOUT,
    ));
    assert!(reply.is_fault());
    assert_eq!(reply.fault_code(), Some(FaultCode::BadRequest));
}

#[tokio::test]
async fn unrelated_request_does_not_join_an_upload_in_progress() {
    let broker = Broker::new(TIMEOUT);
    let session = broker.create_session().await;
    let responder = Responder::new(Arc::clone(&broker.context));
    let frame = |id: MessageId, body: Vec<u8>, part: bool| {
        let mut frame = on_session(MessageType::Execute, &session)
            .with_body(body)
            .with_part(part);
        frame.set_message_id(id);
        frame
    };

    let ack = responder.handle(frame(MessageId::new(7, 1), payload(10), true)).await;
    assert!(ack.is_part() && !ack.is_fault());

    let reply = responder
        .handle(frame(MessageId::new(8, 2), b"hello".to_vec(), false))
        .await;
    assert!(!reply.is_fault(), "{}", reply.body().to_text());
    assert_eq!(reply.body().as_bytes(), b"olleh");
    assert_eq!(broker.context.composites().inbound_len(), 1);

    let reply = responder
        .handle(frame(MessageId::new(7, 3), payload(3), false))
        .await;
    let mut expected = payload(10);
    expected.extend(payload(3));
    expected.reverse();
    assert_eq!(reply.body().as_bytes(), expected.as_slice());
    assert_eq!(broker.context.composites().inbound_len(), 0);
}
