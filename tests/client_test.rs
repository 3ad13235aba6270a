//! Client socket state machine tests
//!
//! Covers:
//! - Write ordering and single flush in flight
//! - bufferedAmount accounting and drain notifications
//! - Close / closeImmediately transitions
//! - Remote half-close racing a local flush
//! - Secure upgrade sequencing
//! - Read guard, suspend/resume

mod common;

use bytes::Bytes;
use common::{
    collect_events, connecting_socket, open_socket, open_socket_with_watermark, socket_with, Call,
};
use std::time::Duration;
use tcpnet::base::classify::{ErrorCategory, ErrorName};
use tcpnet::base::error::SocketError;
use tcpnet::base::neterror::{NetError, OK};
use tcpnet::base::readystate::ReadyState;
use tcpnet::socket::client::SocketEvent;
use tcpnet::socket::options::ConnectOptions;
use tcpnet::socket::transport::TransportEvent;
use tokio::time::timeout;

fn drained() -> TransportEvent {
    TransportEvent::DrainReady(OK)
}

#[test]
fn test_sends_reach_transport_in_order() {
    let (socket, log) = open_socket();

    assert!(socket.send("a").unwrap());
    assert!(socket.send("b").unwrap());
    assert!(socket.send("c").unwrap());
    // One flush in flight: "b" and "c" wait for the next cycle.
    assert_eq!(log.batches().len(), 1);

    socket.dispatch(drained());
    socket.dispatch(drained());

    assert_eq!(
        log.batches(),
        vec![
            vec![Bytes::from_static(b"a")],
            vec![Bytes::from_static(b"b"), Bytes::from_static(b"c")],
        ]
    );
    assert_eq!(log.written(), b"abc");
}

#[test]
fn test_buffered_amount_tracks_queue() {
    let (socket, _log) = open_socket();
    socket.send(vec![0u8; 10]).unwrap();
    socket.send(vec![0u8; 20]).unwrap();
    socket.send(vec![0u8; 5]).unwrap();
    assert_eq!(socket.buffered_amount(), 35);

    socket.dispatch(drained());
    assert_eq!(socket.buffered_amount(), 25);
    socket.dispatch(drained());
    assert_eq!(socket.buffered_amount(), 0);
}

#[tokio::test]
async fn test_drain_fires_after_backpressure() {
    let (socket, _log) = open_socket_with_watermark(4);

    assert!(socket.send("abc").unwrap());
    assert!(!socket.send("def").unwrap());
    assert_eq!(socket.buffered_amount(), 6);

    socket.dispatch(drained());
    socket.dispatch(drained());
    assert_eq!(socket.buffered_amount(), 0);

    socket.close();
    assert_eq!(
        collect_events(&socket).await,
        vec![SocketEvent::Drain, SocketEvent::Closed]
    );
}

#[tokio::test]
async fn test_no_drain_without_backpressure() {
    let (socket, _log) = open_socket_with_watermark(64);
    assert!(socket.send("abc").unwrap());
    socket.dispatch(drained());
    socket.close();
    assert_eq!(collect_events(&socket).await, vec![SocketEvent::Closed]);
}

#[tokio::test]
async fn test_connect_opens() {
    let (socket, _log) = connecting_socket();
    assert_eq!(socket.ready_state(), ReadyState::Connecting);
    assert!(matches!(
        socket.send("early"),
        Err(SocketError::NotOpen {
            state: ReadyState::Connecting
        })
    ));

    socket.dispatch(TransportEvent::Connected);
    assert_eq!(socket.ready_state(), ReadyState::Open);
    socket.opened().await.unwrap();
    assert_eq!(socket.next_event().await.unwrap(), Some(SocketEvent::Opened));
}

#[tokio::test]
async fn test_connect_failure_is_classified() {
    let (socket, _log) = connecting_socket();
    socket.dispatch(TransportEvent::Error(NetError::ConnectionRefused.as_i32()));
    assert_eq!(socket.ready_state(), ReadyState::Closed);

    let err = socket.opened().await.unwrap_err();
    let classified = err.classified().unwrap();
    assert_eq!(classified.category, ErrorCategory::Network);
    assert_eq!(classified.name, ErrorName::ConnectionRefusedError);

    let events = collect_events(&socket).await;
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], SocketEvent::Errored(_)));
    assert_eq!(events[1], SocketEvent::Closed);
}

#[tokio::test]
async fn test_close_while_connecting() {
    let (socket, log) = connecting_socket();
    socket.close();
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(log.count(&Call::CloseOutput), 1);

    // A late handshake completion is ignored.
    socket.dispatch(TransportEvent::Connected);
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert!(socket.opened().await.is_err());
}

#[tokio::test]
async fn test_close_with_empty_queue() {
    let (socket, log) = open_socket();
    socket.close();
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(log.count(&Call::CloseOutput), 1);
    assert_eq!(log.count(&Call::CloseInput), 1);
    socket.closed().await.unwrap();
}

#[tokio::test]
async fn test_close_waits_for_flush() {
    let (socket, log) = open_socket();
    socket.send("pending").unwrap();
    socket.close();
    assert_eq!(socket.ready_state(), ReadyState::Closing);
    assert_eq!(log.count(&Call::CloseOutput), 0);
    assert!(matches!(
        socket.send("more"),
        Err(SocketError::NotOpen {
            state: ReadyState::Closing
        })
    ));

    socket.dispatch(drained());
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(log.written(), b"pending");
    socket.closed().await.unwrap();
}

#[tokio::test]
async fn test_close_immediately_discards_queue() {
    let (socket, log) = open_socket_with_watermark(4);
    for _ in 0..10 {
        let _ = socket.send("chunk");
    }
    socket.close_immediately();
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(socket.buffered_amount(), 0);
    assert_eq!(log.batches().len(), 1);

    // Completion of the abandoned flush changes nothing.
    socket.dispatch(drained());
    assert_eq!(log.batches().len(), 1);
    assert_eq!(collect_events(&socket).await, vec![SocketEvent::Closed]);
}

#[test]
fn test_operations_after_close_are_usage_errors() {
    let (socket, _log) = open_socket();
    socket.close();

    let err = socket.send("late").unwrap_err();
    assert!(err.is_usage_error());
    assert_eq!(
        err,
        SocketError::NotOpen {
            state: ReadyState::Closed
        }
    );
    assert!(socket.upgrade_to_secure().is_err());

    // Closing twice is harmless.
    socket.close();
    socket.close_immediately();
}

#[tokio::test]
async fn test_remote_half_close_waits_for_flush() {
    let (socket, log) = open_socket();
    socket.send("reply").unwrap();

    socket.dispatch(TransportEvent::InputClosed(OK));
    assert_eq!(socket.ready_state(), ReadyState::Open);
    assert_eq!(log.count(&Call::CloseOutput), 0);

    socket.dispatch(drained());
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(log.written(), b"reply");
    socket.closed().await.unwrap();
}

#[test]
fn test_half_close_keeps_accepting_writes() {
    let (socket, log) = open_socket();
    socket.send("a").unwrap();
    socket.dispatch(TransportEvent::InputClosed(OK));
    socket.send("b").unwrap();

    socket.dispatch(drained());
    assert_eq!(socket.ready_state(), ReadyState::Open);
    socket.dispatch(drained());
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(log.written(), b"ab");
}

#[tokio::test]
async fn test_half_close_then_flush_failure() {
    let (socket, _log) = open_socket();
    socket.send("reply").unwrap();
    socket.dispatch(TransportEvent::InputClosed(OK));
    socket.dispatch(TransportEvent::DrainReady(NetError::ConnectionReset.as_i32()));

    assert_eq!(socket.ready_state(), ReadyState::Closed);
    let err = socket.closed().await.unwrap_err();
    assert_eq!(err.classified().unwrap().name, ErrorName::NetworkInterruptError);
}

#[tokio::test]
async fn test_remote_close_while_idle() {
    let (socket, _log) = open_socket();
    socket.dispatch(TransportEvent::InputClosed(OK));
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(collect_events(&socket).await, vec![SocketEvent::Closed]);
}

#[tokio::test]
async fn test_remote_reset_during_flush_closes_now() {
    let (socket, _log) = open_socket();
    socket.send("lost").unwrap();
    socket.dispatch(TransportEvent::InputClosed(NetError::ConnectionReset.as_i32()));
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(socket.buffered_amount(), 0);
    assert!(socket.closed().await.is_err());
}

#[test]
fn test_upgrade_while_idle_is_immediate() {
    let (socket, log) = open_socket();
    assert!(!socket.secure());
    socket.upgrade_to_secure().unwrap();
    assert!(socket.secure());
    assert_eq!(log.calls(), vec![Call::StartTls]);

    // Already secure.
    socket.upgrade_to_secure().unwrap();
    assert_eq!(log.count(&Call::StartTls), 1);
}

#[test]
fn test_upgrade_deferred_behind_flush() {
    let (socket, log) = open_socket();
    socket.send("plain").unwrap();
    socket.upgrade_to_secure().unwrap();
    assert!(!socket.secure());

    socket.send("secret").unwrap();
    assert_eq!(socket.buffered_amount(), 11);
    assert_eq!(log.count(&Call::StartTls), 0);
    assert_eq!(log.batches().len(), 1);

    socket.dispatch(drained());
    assert!(socket.secure());
    assert_eq!(
        log.calls(),
        vec![
            Call::Write(vec![Bytes::from_static(b"plain")]),
            Call::StartTls,
            Call::Write(vec![Bytes::from_static(b"secret")]),
        ]
    );

    socket.dispatch(drained());
    assert_eq!(socket.buffered_amount(), 0);
}

#[test]
fn test_upgrade_ignored_without_support() {
    let (socket, log) = socket_with(ReadyState::Open, &ConnectOptions::default(), false);
    socket.upgrade_to_secure().unwrap();
    assert!(!socket.secure());
    assert_eq!(log.count(&Call::StartTls), 0);
}

#[test]
fn test_secure_socket_upgrade_is_noop() {
    let options = ConnectOptions::new().secure(true);
    let (socket, log) = socket_with(ReadyState::Open, &options, true);
    assert!(socket.secure());
    socket.upgrade_to_secure().unwrap();
    assert_eq!(log.count(&Call::StartTls), 0);
}

#[tokio::test]
async fn test_read_delivers_data_then_end() {
    let (socket, _log) = open_socket();
    socket.dispatch(TransportEvent::Data(Bytes::from_static(b"one")));
    socket.dispatch(TransportEvent::Data(Bytes::from_static(b"two")));
    socket.dispatch(TransportEvent::InputClosed(OK));

    assert_eq!(socket.read().await.unwrap(), Some(Bytes::from_static(b"one")));
    assert_eq!(socket.read().await.unwrap(), Some(Bytes::from_static(b"two")));
    assert_eq!(socket.read().await.unwrap(), None);
}

#[tokio::test]
async fn test_read_reports_classified_error() {
    let (socket, _log) = open_socket();
    socket.dispatch(TransportEvent::Error(NetError::CertDateInvalid.as_i32()));
    let err = socket.read().await.unwrap_err();
    let classified = err.classified().unwrap();
    assert_eq!(classified.category, ErrorCategory::Security);
    assert_eq!(classified.name, ErrorName::SecurityExpiredCertificateError);
}

#[tokio::test]
async fn test_second_read_is_usage_error() {
    let (socket, _log) = open_socket();
    let mut first = Box::pin(socket.read());
    assert!(futures::poll!(first.as_mut()).is_pending());

    assert_eq!(socket.read().await.unwrap_err(), SocketError::ReadPending);
    assert_eq!(socket.next_event().await.unwrap_err(), SocketError::ReadPending);

    socket.dispatch(TransportEvent::Data(Bytes::from_static(b"x")));
    assert_eq!(first.await.unwrap(), Some(Bytes::from_static(b"x")));
}

#[tokio::test]
async fn test_nested_suspend_holds_data() {
    let (socket, log) = open_socket();
    socket.suspend();
    socket.suspend();
    assert_eq!(socket.suspend_count(), 2);
    assert_eq!(log.count(&Call::SuspendInput), 1);

    socket.dispatch(TransportEvent::Data(Bytes::from_static(b"held")));
    socket.resume();
    assert_eq!(log.count(&Call::ResumeInput), 0);
    let mut read = Box::pin(socket.read());
    assert!(futures::poll!(read.as_mut()).is_pending());

    socket.resume();
    assert_eq!(socket.suspend_count(), 0);
    assert_eq!(log.count(&Call::ResumeInput), 1);
    assert_eq!(read.await.unwrap(), Some(Bytes::from_static(b"held")));

    // Resume at zero does nothing.
    socket.resume();
    assert_eq!(socket.suspend_count(), 0);
    assert_eq!(log.count(&Call::ResumeInput), 1);
}

#[tokio::test]
async fn test_suspend_leaves_writes_alone() {
    let (socket, log) = open_socket();
    socket.suspend();
    socket.send("out").unwrap();
    assert_eq!(log.written(), b"out");
}

#[tokio::test]
async fn test_held_data_delivered_before_close() {
    let (socket, _log) = open_socket();
    socket.suspend();
    socket.dispatch(TransportEvent::Data(Bytes::from_static(b"late")));
    socket.close_immediately();
    assert_eq!(
        collect_events(&socket).await,
        vec![
            SocketEvent::Data(Bytes::from_static(b"late")),
            SocketEvent::Closed
        ]
    );
}

#[test]
fn test_send_range() {
    let (socket, log) = open_socket();
    let chunk = Bytes::from_static(b"hello");
    socket.send_range(chunk.clone(), 1, 3).unwrap();
    assert_eq!(log.written(), b"ell");

    assert_eq!(
        socket.send_range(chunk, 4, 2).unwrap_err(),
        SocketError::InvalidRange {
            offset: 4,
            length: 2,
            size: 5
        }
    );
}

#[tokio::test]
async fn test_write_waits_for_drain() {
    let (socket, _log) = open_socket_with_watermark(2);
    let mut write = Box::pin(socket.write("abc"));
    assert!(futures::poll!(write.as_mut()).is_pending());

    socket.dispatch(drained());
    timeout(Duration::from_secs(1), write).await.unwrap().unwrap();

    // Under the watermark the write completes at once.
    socket.write("a").await.unwrap();
}

#[tokio::test]
async fn test_write_fails_when_socket_closes() {
    let (socket, _log) = open_socket_with_watermark(2);
    let mut write = Box::pin(socket.write("abc"));
    assert!(futures::poll!(write.as_mut()).is_pending());

    socket.close_immediately();
    let err = timeout(Duration::from_secs(1), write).await.unwrap().unwrap_err();
    assert!(matches!(err, SocketError::NotOpen { .. }));
}

#[test]
fn test_drop_closes_immediately() {
    let (socket, log) = open_socket();
    socket.send("unsent").unwrap();
    drop(socket);
    assert_eq!(log.count(&Call::CloseOutput), 1);
    assert_eq!(log.count(&Call::CloseInput), 1);
}

#[test]
fn test_socket_metadata() {
    let (socket, _log) = open_socket();
    assert_eq!(socket.host(), "example.com");
    assert_eq!(socket.port(), 7000);
    assert_eq!(socket.ready_state().to_string(), "open");
}
