//! Unit tests for the composite sender and receiver.

use std::num::NonZeroUsize;

use rstest::rstest;

use super::{CompositeError, CompositeReceiver, CompositeSender, CompositeStatus};
use crate::message::{Body, FaultCode, Message, MessageType};

fn part_size(size: usize) -> NonZeroUsize { NonZeroUsize::new(size).expect("non-zero") }

fn binary_request(len: usize) -> Message {
    let body: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
    Message::request(MessageType::Execute).with_body(body)
}

fn reassemble(sender: CompositeSender) -> CompositeReceiver {
    let mut parts = sender;
    let first = parts.next_part().expect("sender yields a first part");
    let mut receiver = CompositeReceiver::new(first);
    for part in parts {
        receiver.add(part).expect("part within limits");
    }
    receiver
}

#[test]
fn sender_cuts_250_bytes_into_three_parts() {
    let sender = CompositeSender::new(binary_request(250), part_size(100));
    let parts: Vec<Message> = sender.collect();

    let sizes: Vec<usize> = parts.iter().map(Message::body_length).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
    let flags: Vec<bool> = parts.iter().map(Message::is_part).collect();
    assert_eq!(flags, vec![true, true, false]);
    let offsets: Vec<usize> = parts.iter().map(Message::body_offset).collect();
    assert_eq!(offsets, vec![0, 100, 200]);
}

#[test]
fn receiver_completes_only_on_terminal_part() {
    let mut sender = CompositeSender::new(binary_request(250), part_size(100));
    let mut receiver = CompositeReceiver::new(sender.first_part());
    assert!(!receiver.is_complete());

    let second = sender.next_part().expect("second part");
    assert_eq!(receiver.add(second), Ok(CompositeStatus::Incomplete));
    assert!(!receiver.is_complete());

    let third = sender.next_part().expect("third part");
    assert_eq!(receiver.add(third), Ok(CompositeStatus::Complete));
    assert!(receiver.is_complete());
    assert_eq!(receiver.body().len(), 250);
    assert!(!sender.has_next());
    assert!(sender.next_part().is_none());
}

#[rstest]
#[case::empty(0, 1)]
#[case::exact(100, 2)]
#[case::one_over(101, 2)]
#[case::multiple(300, 4)]
fn exact_multiples_end_with_empty_terminal(#[case] len: usize, #[case] expected_parts: usize) {
    let parts: Vec<Message> = CompositeSender::new(binary_request(len), part_size(100)).collect();
    assert_eq!(parts.len(), expected_parts);
    let last = parts.last().expect("at least one part");
    assert!(!last.is_part());
    assert!(parts[..parts.len() - 1].iter().all(Message::is_part));
    if len % 100 == 0 {
        assert_eq!(last.body_length(), 0);
    }
}

#[rstest]
#[case(0)]
#[case(99)]
#[case(100)]
#[case(101)]
#[case(1000)]
fn binary_round_trip_preserves_body(#[case] len: usize) {
    let original = binary_request(len);
    let expected = original.body().clone();
    let receiver = reassemble(CompositeSender::new(original, part_size(100)));
    assert!(receiver.is_complete());
    assert_eq!(receiver.into_message().body(), &expected);
}

#[test]
fn text_parts_split_on_char_boundaries() {
    let text = "héllo wörld ✓".repeat(20);
    let message = Message::request(MessageType::Execute).with_body(text.as_str());
    let sender = CompositeSender::new(message, part_size(7));

    let receiver = reassemble(sender);
    let message = receiver.into_message();
    assert_eq!(message.body(), &Body::Text(text));
    assert!(!message.is_part());
}

#[test]
fn first_part_rewinds_the_cursor() {
    let mut sender = CompositeSender::new(binary_request(30), part_size(10));
    let _ = sender.first_part();
    let _ = sender.next_part();
    let again = sender.first_part();
    assert_eq!(again.body_offset(), 0);
    assert!(sender.has_next());
}

#[test]
fn fault_part_collapses_composite() {
    let mut sender = CompositeSender::new(binary_request(300), part_size(100));
    let mut receiver = CompositeReceiver::new(sender.first_part());
    let request = Message::request(MessageType::Execute);
    let fault = Message::fault_for(&request, FaultCode::Internal, "backend failed");

    assert_eq!(receiver.add(fault.clone()), Ok(CompositeStatus::Fault));
    assert!(receiver.is_fault());
    assert!(receiver.is_complete());
    assert_eq!(receiver.body_length(), 0);
    assert_eq!(receiver.part_count(), 0);

    let late = sender.next_part().expect("more parts");
    assert_eq!(receiver.add(late), Ok(CompositeStatus::Fault));
    assert_eq!(receiver.into_message(), fault);
}

#[test]
fn size_cap_rejects_oversized_part() {
    let mut sender = CompositeSender::new(binary_request(250), part_size(100));
    let mut receiver =
        CompositeReceiver::with_limit(sender.first_part(), 150).expect("first part fits");
    let err = receiver
        .add(sender.next_part().expect("second part"))
        .expect_err("second part exceeds cap");
    assert_eq!(
        err,
        CompositeError::MessageTooLarge {
            attempted: 200,
            limit: 150,
        }
    );
    assert_eq!(receiver.body_length(), 100);
}

#[test]
fn reassembled_message_keeps_routing_header() {
    let message = binary_request(25)
        .with_session("s-1".into())
        .with_service("echo".into());
    let receiver = reassemble(CompositeSender::new(message, part_size(10)));
    let message = receiver.into_message();
    assert_eq!(message.session_id().map(|s| s.as_str()), Some("s-1"));
    assert_eq!(message.service_name().map(|s| s.as_str()), Some("echo"));
    assert_eq!(message.body_offset(), 0);
}
