//! Full agent lifecycle tests against a scripted NATS server
//!
//! The agent runs on its own task with a fake transport stack; the test
//! plays the server side of each connection.


use nats_led_agent::agent::{AgentLifecycle, BootPhase, CONTROL_SUBSCRIPTION_ID};
use nats_led_agent::error::ErrorKind;
use nats_led_agent::net::{NetworkInterface, ProvisioningMode};
use nats_led_agent::testing::{FakeDevice, FakeInterface, FakeStack, ScriptedServer};
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{test_config, test_interface};

#[tokio::test]
async fn test_no_interface_halts_before_connect() {
    let (stack, _servers) = FakeStack::new();
    let probe = stack.probe();

    let halt = AgentLifecycle::new(test_config(), stack, None, None)
        .run()
        .await;

    assert_eq!(halt.phase, BootPhase::ProvisionNetwork);
    assert_eq!(halt.error.kind(), ErrorKind::NoInterface);
    assert_ne!(halt.exit_code(), 0);
    assert_eq!(probe.acquired(), 0);
    assert_eq!(probe.opened(), 0);
}

#[tokio::test]
async fn test_dynamic_provisioning_timeout_halts() {
    let (stack, _servers) = FakeStack::new();
    let probe = stack.probe();
    let mut config = test_config();
    config.network.provisioning = ProvisioningMode::Dynamic;

    let halt = AgentLifecycle::new(config, stack, Some(test_interface()), None)
        .run()
        .await;

    assert_eq!(halt.phase, BootPhase::ProvisionNetwork);
    assert_eq!(halt.error.kind(), ErrorKind::ProvisionTimeout);
    assert_eq!(probe.acquired(), 0);
}

#[tokio::test]
async fn test_toggle_round_trip_then_server_close() {
    let (stack, mut servers) = FakeStack::new();
    let probe = stack.probe();
    let device = FakeDevice::new(false);

    let agent = AgentLifecycle::new(
        test_config(),
        stack,
        Some(test_interface()),
        Some(Box::new(device.clone())),
    );
    let agent_task = tokio::spawn(agent.run());

    let mut server = ScriptedServer::new(servers.recv().await.unwrap());
    let connect = server.accept_handshake().await.unwrap();
    assert_eq!(connect["name"], "nats-led-agent");
    assert_eq!(connect["echo"], false);

    let sub = server.expect_subscription().await.unwrap();
    assert_eq!(sub, vec!["led0".to_string(), CONTROL_SUBSCRIPTION_ID.to_string()]);

    server
        .deliver("led0", CONTROL_SUBSCRIPTION_ID, Some("sub1"), b"toggle")
        .await
        .unwrap();
    let reply = server.read_publish().await.unwrap();
    assert_eq!(reply.subject, "led0");
    assert_eq!(reply.reply_to.as_deref(), Some("sub1"));
    assert_eq!(reply.payload, b"on".to_vec());
    assert!(device.state());

    // Grammar errors are skipped without a reply
    server
        .deliver("led0", CONTROL_SUBSCRIPTION_ID, Some("sub2"), b"on1")
        .await
        .unwrap();
    server
        .deliver("led0", CONTROL_SUBSCRIPTION_ID, Some("sub3"), b"off")
        .await
        .unwrap();
    let reply = server.read_publish().await.unwrap();
    assert_eq!(reply.subject, "led0");
    assert_eq!(reply.reply_to.as_deref(), Some("sub3"));
    assert_eq!(reply.payload, b"off".to_vec());

    server.close().await.unwrap();

    let halt = tokio::time::timeout(Duration::from_secs(5), agent_task)
        .await
        .expect("agent should halt once the server hangs up")
        .unwrap();

    assert_eq!(halt.phase, BootPhase::RunForever);
    assert_eq!(halt.error.kind(), ErrorKind::ConnectionLost);
    assert_eq!(device.writes(), vec![true, false]);
    assert_eq!(probe.acquired(), 1);
    assert_eq!(probe.released(), 1);
}

#[tokio::test]
async fn test_subscribe_rejection_halts_in_subscribe_phase() {
    let (stack, mut servers) = FakeStack::new();
    let agent = AgentLifecycle::new(test_config(), stack, Some(test_interface()), None);
    let agent_task = tokio::spawn(agent.run());

    let mut server = ScriptedServer::new(servers.recv().await.unwrap());
    server.accept_handshake().await.unwrap();
    let sub = server.read_line().await.unwrap();
    assert!(sub.starts_with("SUB led0 "));
    server
        .send(b"-ERR 'Permissions Violation for Subscription to led0'\r\n")
        .await
        .unwrap();

    let halt = agent_task.await.unwrap();

    assert_eq!(halt.phase, BootPhase::Subscribe);
    assert_eq!(halt.error.kind(), ErrorKind::SubscribeFailed);
}

#[tokio::test]
async fn test_connect_retries_until_server_answers() {
    let (stack, mut servers) = FakeStack::new();
    let probe = stack.probe();
    let mut config = test_config();
    config.nats.connect_attempts = 3;
    config.nats.connect_timeout_secs = 1;

    let agent = AgentLifecycle::new(config, stack, Some(test_interface()), None);
    let agent_task = tokio::spawn(agent.run());

    // First attempt: hang up right away
    drop(servers.recv().await.unwrap());

    // Second attempt succeeds
    let mut server = ScriptedServer::new(servers.recv().await.unwrap());
    server.accept_handshake().await.unwrap();
    server.expect_subscription().await.unwrap();
    server.close().await.unwrap();

    let halt = agent_task.await.unwrap();
    assert_eq!(halt.phase, BootPhase::RunForever);
    assert_eq!(probe.acquired(), 2);
    assert_eq!(probe.released(), 2);
}

#[tokio::test]
async fn test_static_address_is_applied_to_interface() {
    let (stack, _servers) = FakeStack::new();
    let stack = stack.failing_open();
    let iface = Arc::new(FakeInterface::new("eth0"));
    let shared: Arc<dyn NetworkInterface> = iface.clone();

    let halt = AgentLifecycle::new(test_config(), stack, Some(shared), None)
        .run()
        .await;

    assert_eq!(halt.phase, BootPhase::Connect);
    assert_eq!(halt.error.kind(), ErrorKind::ConnectFailed);
    assert_eq!(
        iface.static_assignments(),
        vec!["192.168.0.1".parse::<std::net::IpAddr>().unwrap()]
    );
}
