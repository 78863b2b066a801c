#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::time::Duration;

use common::{Line, LineAdapter, MockWsServer};
use futures_util::StreamExt as _;
use tokio::time::{sleep, timeout};
use xstream::ws::config::Config;
use xstream::ws::{ChannelStream, Client, ConnectionState, ProtocolAdapter, WsError};

async fn connected_client(server: &MockWsServer, config: Config) -> Client<LineAdapter> {
    let client = Client::new(&server.ws_url("/ws"), config, LineAdapter);
    client.connect().await.unwrap();
    client
}

async fn next_line(stream: &mut ChannelStream<Line>) -> Line {
    timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for a message")
        .expect("stream ended")
        .unwrap()
}

async fn assert_silent(stream: &mut ChannelStream<Line>) {
    let result = timeout(Duration::from_millis(200), stream.next()).await;
    assert!(result.is_err(), "expected no message, got {result:?}");
}

async fn assert_ended(stream: &mut ChannelStream<Line>) {
    let next = timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for the stream to end");
    assert!(next.is_none(), "expected end of stream, got {next:?}");
}

mod connection {
    use super::*;

    #[tokio::test]
    async fn send_after_connect_and_not_after_disconnect() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        assert!(client.connection_state().is_connected());
        client.send("hello".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "hello");

        client.disconnect().await.unwrap();

        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        let error = client.send("late".to_owned()).unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));

        let error = client.disconnect().await.unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
    }

    #[tokio::test]
    async fn connect_twice_is_rejected() {
        let server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let error = client.connect().await.unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::AlreadyConnected)));
        assert!(client.connection_state().is_connected());
    }

    #[tokio::test]
    async fn reconnect_after_disconnect() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        client.disconnect().await.unwrap();
        client.connect().await.unwrap();

        client.send("again".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "again");
    }

    #[tokio::test]
    async fn unsupported_scheme_fails_before_network() {
        let client = Client::new("http://127.0.0.1:1/ws", Config::default(), LineAdapter);

        let error = client.connect().await.unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::InvalidEndpoint(_))));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn refused_connection_is_handshake_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new(&format!("ws://{addr}"), Config::default(), LineAdapter);

        let error = client.connect().await.unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::HandshakeFailed(_))));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn full_queue_is_not_connected() {
        let mut server = MockWsServer::start().await;
        let config = Config::builder().outbound_capacity(1).build();
        let client = connected_client(&server, config).await;

        // Current-thread runtime: the session task cannot drain the queue between these
        client.send("first".to_owned()).unwrap();
        let error = client.send("second".to_owned()).unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
        assert!(client.connection_state().is_connected());

        assert_eq!(server.recv().await.unwrap(), "first");
        sleep(Duration::from_millis(200)).await;
        assert!(server.drain().is_empty(), "rejected payload must not be queued");

        client.send("third".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "third");
    }

    #[tokio::test]
    async fn state_receiver_observes_transitions() {
        let server = MockWsServer::start().await;
        let client = Client::new(&server.ws_url("/ws"), Config::default(), LineAdapter);
        let mut state = client.state_receiver();

        client.connect().await.unwrap();
        assert!(state.borrow_and_update().is_connected());

        client.disconnect().await.unwrap();
        state.changed().await.unwrap();
        assert_eq!(*state.borrow_and_update(), ConnectionState::Disconnected);
    }
}

mod heartbeat {
    use super::*;

    #[tokio::test]
    async fn pings_at_fixed_rate_until_disconnect() {
        let mut server = MockWsServer::start().await;
        let client = Client::new(&server.ws_url("/ws"), Config::default(), LineAdapter);

        client
            .connect_with_heartbeat(Duration::from_millis(200))
            .await
            .unwrap();
        sleep(Duration::from_millis(1100)).await;

        let pings = server.drain().iter().filter(|m| *m == "ping").count();
        assert!((4..=6).contains(&pings), "expected about 5 pings, got {pings}");

        client.disconnect().await.unwrap();
        sleep(Duration::from_millis(100)).await;
        drop(server.drain());

        sleep(Duration::from_millis(500)).await;
        assert!(server.drain().is_empty(), "no pings after disconnect");
    }

    #[tokio::test]
    async fn configured_payload_is_sent() {
        let mut server = MockWsServer::start().await;
        let config = Config::builder()
            .heartbeat_interval(Duration::from_millis(100))
            .heartbeat_payload("{\"op\":\"ping\"}")
            .build();
        let _client = connected_client(&server, config).await;

        assert_eq!(server.recv().await.unwrap(), "{\"op\":\"ping\"}");
    }
}

mod routing {
    use super::*;

    #[tokio::test]
    async fn messages_reach_only_their_channel() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut a = client.subscribe("A", &[]);
        let mut b = client.subscribe("B", &["depth".to_owned()]);
        assert_eq!(server.recv().await.unwrap(), "SUB A");
        assert_eq!(server.recv().await.unwrap(), "SUB B depth");

        server.send("A:1");

        assert_eq!(next_line(&mut a).await.payload, "1");
        assert_silent(&mut b).await;
    }

    #[tokio::test]
    async fn frame_with_several_messages_keeps_order() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut a = client.subscribe("A", &[]);
        let mut b = client.subscribe("B", &[]);
        server.recv().await.unwrap();
        server.recv().await.unwrap();

        server.send("A:1\nB:x\nunkeyed\nC:ignored\nA:2");

        assert_eq!(next_line(&mut a).await.payload, "1");
        assert_eq!(next_line(&mut a).await.payload, "2");
        assert_eq!(next_line(&mut b).await.payload, "x");
    }

    #[tokio::test]
    async fn channel_error_does_not_end_stream() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut a = client.subscribe("A", &[]);
        server.recv().await.unwrap();

        server.send("A:error no such channel");
        server.send("A:after");

        let error = timeout(Duration::from_secs(2), a.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(
            error.ws_error(),
            Some(WsError::ChannelError { channel, reason })
                if channel == "A" && reason == "no such channel"
        ));
        assert_eq!(next_line(&mut a).await.payload, "after");
    }
}

mod subscription {
    use super::*;

    #[tokio::test]
    async fn subscribe_while_disconnected_fails_immediately() {
        let client = Client::new("ws://127.0.0.1:1", Config::default(), LineAdapter);
        let mut stream = client.subscribe("A", &[]);

        let error = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancel_unsubscribes_and_drops_later_messages() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut a = client.subscribe("A", &[]);
        server.recv().await.unwrap();

        assert!(a.cancel());
        assert!(!a.cancel());
        assert_eq!(server.recv().await.unwrap(), "UNSUB A");
        assert_eq!(client.subscription_count(), 0);

        server.send("A:late");
        assert_ended(&mut a).await;
    }

    #[tokio::test]
    async fn dropping_stream_unsubscribes() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let a = client.subscribe("A", &[]);
        server.recv().await.unwrap();

        drop(a);

        assert_eq!(server.recv().await.unwrap(), "UNSUB A");
        assert!(client.active_channels().is_empty());
    }

    #[tokio::test]
    async fn cancel_handles_race_to_one_unsubscribe() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let a = client.subscribe("A", &[]);
        server.recv().await.unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let handle = a.cancel_handle();
                tokio::spawn(async move { handle.cancel() })
            })
            .collect();
        let mut winners = 0;
        for handle in handles {
            winners += usize::from(handle.await.unwrap());
        }
        drop(a);

        assert_eq!(winners, 1);
        assert_eq!(server.recv().await.unwrap(), "UNSUB A");
        client.send("marker".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "marker");
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_stream() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut first = client.subscribe("A", &[]);
        let mut second = client.subscribe("A", &[]);
        server.recv().await.unwrap();
        server.recv().await.unwrap();

        assert_eq!(client.subscription_count(), 1);
        assert_ended(&mut first).await;

        // Tearing down the replaced stream leaves its successor alone
        drop(first);
        server.send("A:1");
        assert_eq!(next_line(&mut second).await.payload, "1");

        client.send("marker".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "marker");
    }

    #[tokio::test]
    async fn batch_shares_one_stream_and_one_unsubscribe() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let internal = vec!["X".to_owned(), "Y".to_owned(), "Z".to_owned()];
        let mut batch = client.subscribe_batch("ext", &internal, &["key".to_owned()]);
        assert_eq!(server.recv().await.unwrap(), "SUB ext key");

        let mut channels = client.active_channels();
        channels.sort();
        assert_eq!(channels, internal);

        server.send("X:1\nY:2\nZ:3");
        let received: Vec<String> = vec![
            next_line(&mut batch).await.channel,
            next_line(&mut batch).await.channel,
            next_line(&mut batch).await.channel,
        ];
        assert_eq!(received, internal);

        assert!(batch.cancel());
        assert_eq!(server.recv().await.unwrap(), "UNSUB ext");
        assert_eq!(client.subscription_count(), 0);

        client.send("marker".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "marker");
    }

    #[tokio::test]
    async fn send_and_subscribe_writes_raw_command() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut login = client.send_and_subscribe("LOGIN secret".to_owned(), "login");
        assert_eq!(server.recv().await.unwrap(), "LOGIN secret");

        server.send("login:ok");
        assert_eq!(next_line(&mut login).await.payload, "ok");
    }

    #[tokio::test]
    async fn disconnect_ends_every_stream() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut a = client.subscribe("A", &[]);
        let mut b = client.subscribe("B", &[]);
        server.recv().await.unwrap();
        server.recv().await.unwrap();

        client.disconnect().await.unwrap();

        assert_eq!(client.subscription_count(), 0);
        assert_ended(&mut a).await;
        assert_ended(&mut b).await;
    }
}

mod unsolicited_close {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;

    #[tokio::test]
    async fn peer_close_fires_signal_and_keeps_registry() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;

        let mut a = client.subscribe("A", &[]);
        server.recv().await.unwrap();
        let lost = client.on_unsolicited_disconnect();

        server.close_all();

        let close = timeout(Duration::from_secs(2), lost)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(close.code, Some(1001));
        assert_eq!(close.reason, "server going away");
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert_eq!(client.subscription_count(), 1);
        assert_silent(&mut a).await;

        let error = client.send("late".to_owned()).unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
    }

    #[tokio::test]
    async fn disconnect_does_not_fire_signal() {
        let server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;
        let mut closes = client.unsolicited_disconnects();

        client.disconnect().await.unwrap();
        sleep(Duration::from_millis(200)).await;

        assert!(matches!(closes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn streams_fail_when_configured() {
        let mut server = MockWsServer::start().await;
        let config = Config::builder().fail_subscriptions_on_close(true).build();
        let client = connected_client(&server, config).await;

        let internal = vec!["X".to_owned(), "Y".to_owned()];
        let mut batch = client.subscribe_batch("ext", &internal, &[]);
        server.recv().await.unwrap();
        let lost = client.on_unsolicited_disconnect();

        server.close_all();
        timeout(Duration::from_secs(2), lost)
            .await
            .unwrap()
            .unwrap();

        let error = timeout(Duration::from_secs(2), batch.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::UnsolicitedClose(close)) if close.code == Some(1001)));
        assert_ended(&mut batch).await;
        assert_eq!(client.subscription_count(), 0);
    }

    /// Panics while decoding any frame that contains `boom`.
    struct FragileAdapter;

    impl ProtocolAdapter for FragileAdapter {
        type Message = Line;

        fn decode_inbound(&self, frame: &str) -> xstream::Result<Vec<Line>> {
            assert!(!frame.contains("boom"), "cannot decode {frame}");
            LineAdapter.decode_inbound(frame)
        }

        fn channel_key(&self, message: &Line) -> xstream::Result<String> {
            LineAdapter.channel_key(message)
        }

        fn subscribe_command(&self, channel: &str, params: &[String]) -> xstream::Result<String> {
            LineAdapter.subscribe_command(channel, params)
        }

        fn unsubscribe_command(&self, channel: &str) -> xstream::Result<String> {
            LineAdapter.unsubscribe_command(channel)
        }
    }

    #[tokio::test]
    async fn adapter_panic_ends_session_cleanly() {
        let server = MockWsServer::start().await;
        let client = Client::new(&server.ws_url("/ws"), Config::default(), FragileAdapter);
        client.connect().await.unwrap();
        let lost = client.on_unsolicited_disconnect();

        server.send("A:boom");

        let close = timeout(Duration::from_secs(2), lost)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(close.code, None);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);

        let error = client.send("late".to_owned()).unwrap_err();
        assert!(matches!(error.ws_error(), Some(WsError::NotConnected)));
        client.connect().await.unwrap();
    }

    #[tokio::test]
    async fn connect_again_after_peer_close() {
        let mut server = MockWsServer::start().await;
        let client = connected_client(&server, Config::default()).await;
        let lost = client.on_unsolicited_disconnect();

        server.close_all();
        timeout(Duration::from_secs(2), lost)
            .await
            .unwrap()
            .unwrap();

        client.connect().await.unwrap();
        client.send("back".to_owned()).unwrap();
        assert_eq!(server.recv().await.unwrap(), "back");
    }
}
