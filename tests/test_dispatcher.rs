//! Command dispatch behavior tests
//!
//! Each test feeds one inbound message through the dispatcher and checks the
//! two observable effects: the output state and what was published.

use nats_led_agent::agent::Dispatcher;
use nats_led_agent::device::LedController;
use nats_led_agent::error::ErrorKind;
use nats_led_agent::testing::{FakeDevice, RecordingBus};
use nats_led_agent::transport::InboundMessage;

fn dispatcher_with(device: &FakeDevice) -> Dispatcher {
    Dispatcher::new(LedController::new(Some(Box::new(device.clone()))))
}

#[tokio::test]
async fn test_toggle_from_off_turns_on_and_replies() {
    let device = FakeDevice::new(false);
    let mut dispatcher = dispatcher_with(&device);
    let mut bus = RecordingBus::new();
    let message = InboundMessage::new("led0", &b"toggle"[..]).with_reply_to("sub1");

    dispatcher.on_message(&message, &mut bus).await.unwrap();

    assert!(device.state());
    assert_eq!(
        bus.published(),
        vec![("led0".to_string(), Some("sub1".to_string()), b"on".to_vec())]
    );
}

#[tokio::test]
async fn test_on_payload_with_trailing_byte_is_rejected() {
    let device = FakeDevice::new(false);
    let mut dispatcher = dispatcher_with(&device);
    let mut bus = RecordingBus::new();
    let message = InboundMessage::new("led0", &b"on1"[..]).with_reply_to("sub1");

    let error = dispatcher.on_message(&message, &mut bus).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::UnrecognizedCommand);
    assert!(!error.is_fatal());
    assert!(device.writes().is_empty());
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn test_other_subject_is_not_found() {
    let device = FakeDevice::new(false);
    let mut dispatcher = dispatcher_with(&device);
    let mut bus = RecordingBus::new();
    let message = InboundMessage::new("temp0", &b"on"[..]).with_reply_to("sub1");

    let error = dispatcher.on_message(&message, &mut bus).await.unwrap_err();

    assert_eq!(error.kind(), ErrorKind::UnknownSubject);
    assert!(!error.is_fatal());
    assert!(device.writes().is_empty());
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn test_each_command_replies_with_resulting_state() {
    let cases: [(&[u8], bool, &[u8]); 4] = [
        (b"on", false, b"on"),
        (b"off", true, b"off"),
        (b"toggle", true, b"off"),
        (b"toggle", false, b"on"),
    ];

    for (payload, initial, expected) in cases {
        let device = FakeDevice::new(initial);
        let mut dispatcher = dispatcher_with(&device);
        let mut bus = RecordingBus::new();
        let message = InboundMessage::new("led0", payload).with_reply_to("_INBOX.a");

        dispatcher.on_message(&message, &mut bus).await.unwrap();

        let published = bus.published();
        assert_eq!(published.len(), 1, "payload {payload:?}");
        assert_eq!(published[0].0, "led0");
        assert_eq!(published[0].1.as_deref(), Some("_INBOX.a"));
        assert_eq!(published[0].2, expected.to_vec());
        assert_eq!(device.state(), expected == b"on");
    }
}

#[tokio::test]
async fn test_set_on_is_idempotent_without_reply_to() {
    let device = FakeDevice::new(true);
    let mut dispatcher = dispatcher_with(&device);
    let mut bus = RecordingBus::new();
    let message = InboundMessage::new("led0", &b"on"[..]);

    dispatcher.on_message(&message, &mut bus).await.unwrap();
    dispatcher.on_message(&message, &mut bus).await.unwrap();

    assert!(device.state());
    assert_eq!(device.writes(), vec![true, true]);
    assert!(bus.published().is_empty());
}

#[tokio::test]
async fn test_unreadable_device_toggles_to_on() {
    let device = FakeDevice::new(true).failing_reads();
    let mut dispatcher = dispatcher_with(&device);
    let mut bus = RecordingBus::new();
    let message = InboundMessage::new("led0", &b"toggle"[..]).with_reply_to("sub1");

    dispatcher.on_message(&message, &mut bus).await.unwrap();

    assert_eq!(device.writes(), vec![true]);
    assert_eq!(bus.published()[0].2, b"on".to_vec());
}
