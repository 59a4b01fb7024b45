//! Integration tests for polymod-bridge-i2c.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use polymod_bridge_i2c::bus::mock::Transaction;
use polymod_bridge_i2c::bus::{BusCommand, BusHandle, MockBus, TransportCommand};
use polymod_bridge_i2c::decoder::{ChangeRecord, decode_changes};
use polymod_bridge_i2c::endpoint::{Dispatcher, OscClient, OscServer, RecordingSink};
use polymod_bridge_i2c::scheduler::{PollScheduler, PollSettings, PollState};
use polymod_bridge_i2c::translator;
use polymod_common::{ControlArg, ControlMessage, decode, encode};
use tokio::net::UdpSocket;
use tokio_test::assert_ok;

/// Buffer from module 4 with one analog record (pin 0, value 512).
const ANALOG_BUFFER: [u8; 4] = [0x00, 0x02, 0x00, 0xFF];

async fn recv_message(socket: &UdpSocket) -> ControlMessage {
    let mut buf = vec![0u8; 1536];
    let (len, _) = assert_ok!(
        tokio::time::timeout(Duration::from_secs(2), socket.recv_from(&mut buf))
            .await
            .expect("Timed out waiting for OSC message")
    );
    let mut messages = assert_ok!(decode(&buf[..len]));
    assert_eq!(messages.len(), 1);
    messages.remove(0)
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Condition not reached in time");
}

/// The bus buffer for module 4 ends up as one analog message.
#[test]
fn test_end_to_end_record_translation() {
    let (records, err) = decode_changes(4, &ANALOG_BUFFER);
    assert!(err.is_none());
    assert_eq!(
        records,
        vec![ChangeRecord::Analog {
            module: 4,
            pin: 0,
            value: 512
        }]
    );

    let msg = translator::to_outbound(&records[0]);
    assert_eq!(msg.address, "/module/analog");
    assert_eq!(
        msg.args,
        vec![ControlArg::Int(4), ControlArg::Int(0), ControlArg::Float(0.5)]
    );
}

/// Same scenario, driven through the poll loop.
#[tokio::test]
async fn test_poll_cycle_publishes_changes() {
    let bus = MockBus::new();
    let sink = RecordingSink::new();
    bus.queue_read(4, &ANALOG_BUFFER);

    let mut scheduler =
        PollScheduler::new(BusHandle::new(bus.clone()), sink.clone(), PollSettings::default());
    scheduler.step().await; // configuring
    scheduler.step().await; // ticking
    assert_eq!(scheduler.step().await, PollState::Ticking);

    assert_eq!(
        sink.messages(),
        vec![
            ControlMessage::new("/module/analog")
                .with_args([4, 0])
                .with_arg(0.5f32)
        ]
    );
}

/// A reset produces one `/matrix/reset` and one full state request in any
/// scheduler state, and does not move the scheduler.
#[tokio::test(start_paused = true)]
async fn test_reset_in_every_state() {
    let bus = MockBus::new();
    let sink = RecordingSink::new();
    let handle = BusHandle::new(bus.clone());
    let dispatcher = Dispatcher::new(handle.clone(), sink.clone());
    let mut scheduler = PollScheduler::new(handle, RecordingSink::new(), PollSettings::default());

    let mut seen = Vec::new();
    for _ in 0..5 {
        if scheduler.state() == PollState::Polling && !seen.contains(&PollState::Recovering) {
            bus.fail_next_read("no acknowledgement");
        }
        let state = scheduler.step().await;
        bus.clear_transactions();
        sink.take();

        dispatcher.dispatch(&ControlMessage::new("/reset"));

        assert_eq!(sink.take(), vec![translator::matrix_reset()], "in {}", state);
        assert_eq!(
            bus.writes(),
            vec![TransportCommand::request_full_state()],
            "in {}",
            state
        );
        assert_eq!(scheduler.state(), state);
        seen.push(state);
    }

    assert!(seen.contains(&PollState::Ticking));
    assert!(seen.contains(&PollState::Polling));
    assert!(seen.contains(&PollState::Recovering));
    assert!(seen.contains(&PollState::Configuring));
}

/// Inbound messages over UDP reach the bus and outbound replies reach the panel.
#[tokio::test]
async fn test_udp_round_trip() {
    let panel = assert_ok!(UdpSocket::bind("127.0.0.1:0").await);
    let panel_addr = assert_ok!(panel.local_addr());

    let server = assert_ok!(OscServer::bind("127.0.0.1:0".parse().unwrap()).await);
    let server_addr: SocketAddr = assert_ok!(server.local_addr());
    let client = Arc::new(assert_ok!(OscClient::connect(panel_addr).await));

    let bus = MockBus::new();
    let dispatcher = Dispatcher::new(BusHandle::new(bus.clone()), client);
    let task = tokio::spawn(server.serve(dispatcher));

    let digital = ControlMessage::new("/module/digital").with_args([4, 2, 1]);
    assert_ok!(panel.send_to(&assert_ok!(encode(&digital)), server_addr).await);
    let unknown = ControlMessage::new("/matrix/connect").with_args([1, 2, 3, 4]);
    assert_ok!(panel.send_to(&assert_ok!(encode(&unknown)), server_addr).await);
    let reset = ControlMessage::new("/reset");
    assert_ok!(panel.send_to(&assert_ok!(encode(&reset)), server_addr).await);

    assert_eq!(recv_message(&panel).await, translator::matrix_reset());

    wait_for(|| bus.writes().len() == 2).await;
    assert_eq!(
        bus.writes(),
        vec![
            TransportCommand::write_digital(4, 2, 1),
            TransportCommand::request_full_state(),
        ]
    );

    task.abort();
}

/// Undecodable datagrams are dropped without stopping the listener.
#[tokio::test]
async fn test_listener_survives_garbage() {
    let panel = assert_ok!(UdpSocket::bind("127.0.0.1:0").await);
    let server = assert_ok!(OscServer::bind("127.0.0.1:0".parse().unwrap()).await);
    let server_addr = assert_ok!(server.local_addr());

    let bus = MockBus::new();
    let dispatcher = Dispatcher::new(BusHandle::new(bus.clone()), RecordingSink::new());
    let task = tokio::spawn(server.serve(dispatcher));

    assert_ok!(panel.send_to(b"\x00\x01garbage", server_addr).await);
    let digital = ControlMessage::new("/module/digital").with_args([5, 0, 0]);
    assert_ok!(panel.send_to(&assert_ok!(encode(&digital)), server_addr).await);

    wait_for(|| bus.count_writes(BusCommand::WriteDigital) == 1).await;
    task.abort();
}

/// With the poll loop and the listener sharing one thread, inbound writes only
/// land between a finished polling pass and the next tick sequence.
#[tokio::test]
async fn test_inbound_writes_land_between_poll_cycles() {
    let panel = assert_ok!(UdpSocket::bind("127.0.0.1:0").await);
    let server = assert_ok!(OscServer::bind("127.0.0.1:0".parse().unwrap()).await);
    let server_addr = assert_ok!(server.local_addr());

    let bus = MockBus::new();
    let handle = BusHandle::new(bus.clone());
    let settings = PollSettings {
        modules: vec![4, 5],
        tick_count: 2,
        ..PollSettings::default()
    };
    let scheduler = PollScheduler::new(handle.clone(), RecordingSink::new(), settings);
    let dispatcher = Dispatcher::new(handle, RecordingSink::new());

    let server_task = tokio::spawn(server.serve(dispatcher));
    let poll_task = tokio::spawn(scheduler.run());
    wait_for(|| bus.count_writes(BusCommand::Tick) > 0).await;

    let digital = ControlMessage::new("/module/digital").with_args([5, 1, 1]);
    assert_ok!(panel.send_to(&assert_ok!(encode(&digital)), server_addr).await);

    wait_for(|| bus.count_writes(BusCommand::WriteDigital) == 1).await;
    poll_task.abort();
    server_task.abort();

    let transactions = bus.transactions();
    let index = transactions
        .iter()
        .position(|t| {
            matches!(t, Transaction::Write(cmd) if cmd.command == BusCommand::WriteDigital)
        })
        .expect("digital write recorded");

    assert!(index > 0);
    assert_eq!(
        transactions[index - 1],
        Transaction::Read {
            address: 5,
            max_bytes: 12
        }
    );
    if let Some(next) = transactions.get(index + 1) {
        assert_eq!(*next, Transaction::Write(TransportCommand::tick(0)));
    }
}
