mod common;

use bytes::Bytes;
use proptest::prelude::*;
use msgendpoint::{CloseCode, Message, MessagingError, ProtocolType, SocketDriver};
use common::{attached_bridge, Reply, ScriptedConnection, SocketEvent};

const TRANSIENT: [u16; 4] = [1001, 1006, 1013, 4001];

#[derive(Debug, Clone)]
enum Op {
    Open,
    Write(usize),
    Receive(u8),
    EngineClose(u16),
    EngineClosed,
    ApplicationClose(bool),
    ReleaseSend(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Open),
        (1usize..32).prop_map(Op::Write),
        any::<u8>().prop_map(Op::Receive),
        prop_oneof![Just(1000u16), Just(1001), Just(4001), Just(4002), 1000u16..5000].prop_map(Op::EngineClose),
        Just(Op::EngineClosed),
        any::<bool>().prop_map(Op::ApplicationClose),
        any::<usize>().prop_map(Op::ReleaseSend),
    ]
}

proptest! {
    #[test]
    fn close_code_classification(code in any::<u16>(), message in "[a-z ]{0,16}") {
        let error = MessagingError::from_close(CloseCode::new(code), message.clone());
        if code == 1000 {
            prop_assert!(error.is_none());
        } else {
            let error = error.unwrap();
            prop_assert_eq!(error.is_recoverable(), TRANSIENT.contains(&code));
            prop_assert_eq!(error.close_code().as_u16(), code);
            prop_assert_eq!(error.message(), message.as_str());
        }
    }

    #[test]
    fn application_errors_map_to_user_codes(recoverable in any::<bool>()) {
        let error = MessagingError::transport("boom", recoverable);
        let expected = if recoverable { 4001 } else { 4002 };
        prop_assert_eq!(CloseCode::for_error(Some(&error)).as_u16(), expected);
        prop_assert_eq!(CloseCode::for_error(None), CloseCode::NORMAL);
    }

    #[test]
    fn acks_follow_issue_order(
        lengths in prop::collection::vec(1usize..64, 1..20),
        picks in prop::collection::vec(any::<usize>(), 20),
    ) {
        let connection = ScriptedConnection::new(Reply::Immediate, Reply::Hold, Reply::Immediate);
        let (bridge, socket) = attached_bridge(&connection, ProtocolType::MessageStream);
        bridge.request_open();
        for len in &lengths {
            bridge.write(Bytes::from(vec![7u8; *len]));
        }

        let mut pick = picks.into_iter().cycle();
        while connection.held_sends() > 0 {
            let index = pick.next().unwrap_or(0) % connection.held_sends();
            connection.release_send(index, Ok(()));
        }

        prop_assert_eq!(socket.acked(), lengths.clone());
        prop_assert_eq!(bridge.stats().bytes_acknowledged, lengths.iter().sum::<usize>() as u64);
    }

    #[test]
    fn closed_is_delivered_once_and_last(
        protocol in prop_oneof![Just(ProtocolType::MessageStream), Just(ProtocolType::ByteStream)],
        ops in prop::collection::vec(op(), 0..40),
    ) {
        let connection = ScriptedConnection::new(Reply::Immediate, Reply::Hold, Reply::Immediate);
        let (bridge, socket) = attached_bridge(&connection, protocol);

        for op in ops {
            match op {
                Op::Open => bridge.request_open(),
                Op::Write(len) => bridge.write(Bytes::from(vec![1u8; len])),
                Op::Receive(byte) => {
                    if connection.open_calls() > 0 {
                        connection.replicator().receive(Message::from_data(vec![byte]));
                    }
                }
                Op::EngineClose(code) => bridge.request_close(CloseCode::new(code), "engine"),
                Op::EngineClosed => bridge.close(),
                Op::ApplicationClose(with_error) => {
                    if connection.open_calls() > 0 {
                        let error = with_error.then(|| MessagingError::transport("app", true));
                        connection.replicator().close(error);
                    }
                }
                Op::ReleaseSend(pick) => {
                    if connection.held_sends() > 0 {
                        let index = pick % connection.held_sends();
                        connection.release_send(index, Ok(()));
                    }
                }
            }
        }

        // the engine always tears down eventually
        bridge.close();
        while connection.held_sends() > 0 {
            connection.release_send(0, Ok(()));
        }

        let events = socket.events();
        let closed: Vec<_> = events.iter().filter(|e| matches!(e, SocketEvent::Closed { .. })).collect();
        prop_assert_eq!(closed.len(), 1);
        let last_is_closed = matches!(events.last(), Some(SocketEvent::Closed { .. }));
        prop_assert!(last_is_closed);
        prop_assert!(connection.close_calls().len() <= 1);
    }
}
