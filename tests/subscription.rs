//! Multi-subscriber delivery through a shared subscription queue.

mod common;

use std::{sync::Arc, time::Duration};

use common::{TIMEOUT, TestResult};
use rstest::{fixture, rstest};
use service_connector::{
    ListenEvent,
    Message,
    MessageType,
    PollOutcome,
    ServiceName,
    SessionId,
    SubscriptionMask,
    SubscriptionQueue,
};

const NO_DATA: Duration = Duration::from_secs(30);

#[fixture]
fn queue() -> Arc<SubscriptionQueue> { Arc::new(SubscriptionQueue::new(ServiceName::from("quotes"))) }

fn publication(mask: &str, body: &str) -> Message {
    Message::request(MessageType::Publish)
        .with_service(ServiceName::from("quotes"))
        .with_mask(mask)
        .with_body(body)
}

fn subscribe(queue: &SubscriptionQueue, id: &str, mask: &str) -> SessionId {
    let id = SessionId::from(id);
    queue
        .subscribe(id.clone(), SubscriptionMask::new(mask).expect("valid mask"), NO_DATA)
        .expect("fresh subscriber");
    id
}

fn drain(queue: &SubscriptionQueue, id: &SessionId) -> Vec<String> {
    std::iter::from_fn(|| queue.get_message(id))
        .map(|m| m.body().to_text().into_owned())
        .collect()
}

#[rstest]
#[tokio::test]
async fn disjoint_masks_are_isolated(queue: Arc<SubscriptionQueue>) {
    let eur = subscribe(&queue, "eur", "EUR%%%");
    let usd = subscribe(&queue, "usd", "USD%%%");

    for (mask, body) in [("EURGBP", "1"), ("USDJPY", "2"), ("EURCHF", "3"), ("GBPUSD", "4")] {
        queue.insert(publication(mask, body));
    }

    assert_eq!(drain(&queue, &eur), vec!["1", "3"]);
    assert_eq!(drain(&queue, &usd), vec!["2"]);
    assert!(queue.unsubscribe(&usd));
    assert!(queue.is_empty(), "every cursor is past the tail");
}

#[rstest]
#[tokio::test]
async fn identical_masks_each_see_every_message(queue: Arc<SubscriptionQueue>) {
    let ids: Vec<_> = (0..3)
        .map(|n| subscribe(&queue, &format!("s{n}"), "%%%%"))
        .collect();
    for body in ["a", "b", "c"] {
        queue.insert(publication("TICK", body));
    }

    for id in &ids {
        assert_eq!(drain(&queue, id), vec!["a", "b", "c"]);
    }
    assert!(queue.unsubscribe(&ids[0]));
    assert!(queue.is_empty());
}

#[rstest]
#[tokio::test]
async fn slow_subscriber_holds_the_queue(queue: Arc<SubscriptionQueue>) {
    let fast = subscribe(&queue, "fast", "%%%%");
    let slow = subscribe(&queue, "slow", "%%%%");
    for body in ["a", "b", "c", "d"] {
        queue.insert(publication("TICK", body));
    }

    assert_eq!(drain(&queue, &fast).len(), 4);
    queue.insert(publication("TICK", "e"));
    assert_eq!(queue.len(), 5, "slow subscriber still references the head");

    assert_eq!(drain(&queue, &slow), vec!["a", "b", "c", "d", "e"]);
    assert!(queue.unsubscribe(&slow));
    assert_eq!(queue.len(), 1, "fast subscriber keeps e");
}

#[rstest]
#[tokio::test]
async fn listener_in_another_task_is_woken(queue: Arc<SubscriptionQueue>) -> TestResult {
    let id = subscribe(&queue, "waiter", "EUR%%%");
    let waiter = {
        let queue = Arc::clone(&queue);
        let id = id.clone();
        tokio::spawn(async move { queue.poll(&id).await })
    };
    while !queue.is_listening(&id) {
        tokio::task::yield_now().await;
    }

    queue.insert(publication("USDJPY", "ignored"));
    assert!(queue.is_listening(&id), "non-matching publication leaves the listener");
    queue.insert(publication("EURUSD", "1.08"));

    let outcome = tokio::time::timeout(TIMEOUT, waiter).await??;
    let PollOutcome::Message(message) = outcome else {
        return Err(format!("unexpected outcome {outcome:?}").into());
    };
    assert_eq!(message.body().to_text(), "1.08");
    Ok(())
}

#[rstest]
#[tokio::test]
async fn unsubscribe_wakes_a_pending_poll(queue: Arc<SubscriptionQueue>) -> TestResult {
    let id = subscribe(&queue, "leaver", "%%%%");
    let waiter = {
        let queue = Arc::clone(&queue);
        let id = id.clone();
        tokio::spawn(async move { queue.poll(&id).await })
    };
    while !queue.is_listening(&id) {
        tokio::task::yield_now().await;
    }

    assert!(queue.unsubscribe(&id));
    let outcome = tokio::time::timeout(TIMEOUT, waiter).await??;
    assert_eq!(outcome, PollOutcome::Unsubscribed);
    assert!(!queue.unsubscribe(&id));
    Ok(())
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn no_data_fires_after_the_interval(queue: Arc<SubscriptionQueue>) {
    let id = SessionId::from("idle");
    queue
        .subscribe(
            id.clone(),
            SubscriptionMask::new("%%%%").expect("valid mask"),
            Duration::from_secs(2),
        )
        .expect("fresh subscriber");

    let started = tokio::time::Instant::now();
    assert_eq!(queue.listen(&id).await, ListenEvent::NoData);
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert!(!queue.is_listening(&id));

    queue.insert(publication("TICK", "late"));
    assert_eq!(queue.listen(&id).await, ListenEvent::MessageReady);
}

#[rstest]
#[tokio::test]
async fn dropping_the_queue_releases_listeners(queue: Arc<SubscriptionQueue>) {
    let id = subscribe(&queue, "orphan", "%%%%");
    let handle = queue.listen(&id);
    drop(queue);
    assert_eq!(handle.await, ListenEvent::Unsubscribed);
}
