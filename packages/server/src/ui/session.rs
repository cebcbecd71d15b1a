//! Per-connection transport loops.
//!
//! Each admitted connection runs two independent tasks:
//!
//! - [`receiver_loop`] decodes inbound frames, stamps them with the
//!   connection's identity and hands them to the hub. It is the only place
//!   that asks the hub to remove the connection.
//! - [`pusher_loop`] drains the outbound queue to the transport and writes
//!   liveness probes. It never talks to the hub.
//!
//! The two share nothing but the connection's `closer` token: whichever loop
//! ends first cancels it, which ends the other.
//!
//! Both loops are generic over `Stream`/`Sink` so they run against axum's
//! split WebSocket in production and against in-memory channels in tests.

use std::{fmt::Display, ops::ControlFlow, sync::Arc, time::Duration};

use agora_shared::time::Clock;
use axum::extract::ws::Message as Frame;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{Instant, MissedTickBehavior, interval_at, timeout},
};
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{HubError, Message, MessageBody, MessageStore, StoreError},
    hub::{ConnectionInfo, HubHandle},
    infrastructure::dto::websocket::{ClientFrame, WireMessage},
};

/// Collaborators and deadlines used by [`receiver_loop`].
#[derive(Clone)]
pub struct InboundContext {
    pub hub: HubHandle,
    pub store: Arc<dyn MessageStore>,
    pub clock: Arc<dyn Clock>,
    pub read_timeout: Duration,
    pub persist_timeout: Duration,
}

/// Deadlines used by [`pusher_loop`].
#[derive(Debug, Clone, Copy)]
pub struct OutboundTiming {
    pub ping_interval: Duration,
    pub write_timeout: Duration,
}

#[derive(Debug, Error)]
enum WriteError {
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Read frames until the transport terminates, then remove the connection
/// from the hub exactly once and close the transport.
///
/// Terminal conditions: end of stream, a read error, a close frame, no
/// traffic within `read_timeout`, the `closer` being cancelled, or the hub
/// having stopped.
pub async fn receiver_loop<S, E>(
    mut stream: S,
    info: ConnectionInfo,
    closer: CancellationToken,
    context: InboundContext,
) where
    S: Stream<Item = Result<Frame, E>> + Unpin,
    E: Display,
{
    loop {
        let next = tokio::select! {
            _ = closer.cancelled() => {
                tracing::debug!("Transport for '{}' closed by the other side", info.username);
                break;
            }
            next = timeout(context.read_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                tracing::info!(
                    "No traffic from '{}' for {:?}, closing",
                    info.username,
                    context.read_timeout
                );
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::warn!("WebSocket error from '{}': {}", info.username, e);
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Frame::Text(text) => {
                if handle_text(text.as_str(), &info, &context).is_break() {
                    break;
                }
            }
            Frame::Binary(data) => {
                tracing::warn!(
                    "Ignoring {} byte binary frame from '{}'",
                    data.len(),
                    info.username
                );
            }
            Frame::Ping(_) | Frame::Pong(_) => {
                tracing::trace!("Keep-alive from '{}'", info.username);
            }
            Frame::Close(_) => {
                tracing::info!("Client '{}' requested close", info.username);
                break;
            }
        }
    }

    if let Err(e) = context.hub.remove(&info).await {
        tracing::debug!("Could not remove '{}' ({}): {}", info.username, info.id, e);
    }
    closer.cancel();
}

fn handle_text(text: &str, info: &ConnectionInfo, context: &InboundContext) -> ControlFlow<()> {
    let frame = match ClientFrame::parse(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Ignoring malformed frame from '{}': {}", info.username, e);
            return ControlFlow::Continue(());
        }
    };
    let body = match MessageBody::try_from(frame) {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!("Ignoring frame from '{}': {}", info.username, e);
            return ControlFlow::Continue(());
        }
    };

    let message = Message::from_participant(
        info.id,
        &info.username,
        &info.room,
        context.clock.now(),
        body,
    );
    tracing::debug!(
        "Received '{}' from '{}' in '{}'",
        message.kind(),
        info.username,
        info.room
    );

    if let MessageBody::Chat { content } = &message.body {
        persist(
            context.store.clone(),
            context.persist_timeout,
            info.username.as_str().to_string(),
            content.clone(),
        );
    }

    match context.hub.submit(message) {
        Ok(()) => ControlFlow::Continue(()),
        Err(HubError::IntakeSaturated) => {
            tracing::error!(
                "CRITICAL: hub intake saturated, dropped message from '{}' in '{}'",
                info.username,
                info.room
            );
            ControlFlow::Continue(())
        }
        Err(HubError::Stopped) => ControlFlow::Break(()),
    }
}

/// Fire-and-forget persistence. Failures are logged and never retried.
fn persist(store: Arc<dyn MessageStore>, deadline: Duration, username: String, content: String) {
    tokio::spawn(async move {
        let result = match timeout(deadline, store.save(username.clone(), content)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to persist message from '{}': {}", username, e);
        }
    });
}

/// Drain `outbound` to the transport and probe liveness every `ping_interval`.
///
/// A closed queue produces a final close frame. Any failed or stalled write
/// ends the loop. On exit the `closer` is cancelled so the read side stops too.
pub async fn pusher_loop<K>(
    mut sink: K,
    mut outbound: mpsc::Receiver<Message>,
    closer: CancellationToken,
    timing: OutboundTiming,
) where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    let mut ticker = interval_at(Instant::now() + timing.ping_interval, timing.ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = closer.cancelled() => {
                let _ = write(&mut sink, Frame::Close(None), timing.write_timeout).await;
                break;
            }
            next = outbound.recv() => {
                let Some(message) = next else {
                    let _ = write(&mut sink, Frame::Close(None), timing.write_timeout).await;
                    break;
                };
                let json = match serde_json::to_string(&WireMessage::from(&message)) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!("Failed to encode '{}' message: {}", message.kind(), e);
                        continue;
                    }
                };
                if let Err(e) = write(&mut sink, Frame::Text(json.into()), timing.write_timeout).await {
                    tracing::warn!("Failed to push message: {}", e);
                    break;
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = write(&mut sink, Frame::Ping(Default::default()), timing.write_timeout).await {
                    tracing::info!("Liveness probe failed: {}", e);
                    break;
                }
            }
        }
    }

    closer.cancel();
}

async fn write<K>(sink: &mut K, frame: Frame, deadline: Duration) -> Result<(), WriteError>
where
    K: Sink<Frame> + Unpin,
    K::Error: Display,
{
    match timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WriteError::Transport(e.to_string())),
        Err(_) => Err(WriteError::Timeout(deadline)),
    }
}

#[cfg(test)]
mod tests {
    use agora_shared::time::FixedClock;
    use chrono::Utc;
    use futures_util::{FutureExt, stream};
    use tokio_util::sync::PollSender;

    use super::*;
    use crate::{
        config::HubConfig,
        domain::{ConnectionId, MessageKind, RoomId, Username, store::MockMessageStore},
        hub::{Connection, Hub, Session},
        infrastructure::store::InMemoryMessageStore,
    };

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - receiver_loop: フレームの解析、送信者情報の上書き、永続化、Hub への受け渡し、終了時の退室
    // - pusher_loop: キューの送出、キュー閉鎖時の close フレーム、書き込み失敗・停滞時の終了
    //
    // 【なぜこのテストが必要か】
    // - 送信者が名乗る username/room を信用しないことを保証する
    // - 退室要求が受信側からのみ、1 回だけ出されることを保証する
    // ========================================

    const WAIT: Duration = Duration::from_secs(2);

    fn name(value: &str) -> Username {
        Username::new(value.to_string()).unwrap()
    }

    fn general() -> RoomId {
        RoomId::new("general".to_string()).unwrap()
    }

    fn text(json: &str) -> Result<Frame, axum::Error> {
        Ok(Frame::Text(json.to_string().into()))
    }

    fn context(hub: &HubHandle, store: Arc<dyn MessageStore>, read_timeout: Duration) -> InboundContext {
        InboundContext {
            hub: hub.clone(),
            store,
            clock: Arc::new(FixedClock::from_millis(1_700_000_000_000)),
            read_timeout,
            persist_timeout: Duration::from_secs(1),
        }
    }

    async fn next(session: &mut Session) -> Message {
        timeout(WAIT, session.outbound.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("outbound queue closed")
    }

    /// Admit `username` into "general" and consume its own join and roster.
    async fn admit(hub: &HubHandle, username: &str) -> Session {
        let (connection, mut session) = Connection::open(name(username), general(), 64);
        hub.admit(connection).await.unwrap();
        assert_eq!(next(&mut session).await.kind(), MessageKind::UserJoined);
        assert_eq!(next(&mut session).await.kind(), MessageKind::UsersList);
        session
    }

    /// Admit `username` next to `observer` and consume the announcements it causes.
    async fn admit_peer(hub: &HubHandle, observer: &mut Session, username: &str) -> Session {
        let session = admit(hub, username).await;
        assert_eq!(next(observer).await.kind(), MessageKind::UserJoined);
        assert_eq!(next(observer).await.kind(), MessageKind::UsersList);
        session
    }

    fn timing(write_timeout: Duration) -> OutboundTiming {
        OutboundTiming {
            ping_interval: Duration::from_secs(3600),
            write_timeout,
        }
    }

    #[tokio::test]
    async fn test_receiver_stamps_identity_and_forwards_to_hub() {
        // テスト項目: 受信メッセージは接続自身の username/room で上書きされ、Hub に渡される
        // given (前提条件):
        let (hub, _task) = Hub::spawn(HubConfig::default(), Arc::new(FixedClock::from_millis(0)));
        let mut alice = admit(&hub, "alice").await;
        let bob = admit_peer(&hub, &mut alice, "bob").await;
        let store = Arc::new(InMemoryMessageStore::new(10, Arc::new(FixedClock::from_millis(0))));
        let frames = stream::iter(vec![
            text(r#"{"type": "chat", "username": "mallory", "room_id": "elsewhere", "content": "hello"}"#),
            text(r#"{"type": "users_list", "content": "[\"eve\"]"}"#),
            text("plain words"),
            text(r#"{"type": "webrtc_offer", "target_user": "alice", "payload": {"offer": {"type": "offer", "sdp": "v=0"}}}"#),
            Ok(Frame::Close(None)),
        ]);

        // when (操作):
        receiver_loop(
            frames,
            bob.info.clone(),
            bob.closer.clone(),
            context(&hub, store.clone(), WAIT),
        )
        .await;

        // then (期待する結果):
        let first = next(&mut alice).await;
        assert_eq!(first.kind(), MessageKind::Chat);
        assert_eq!(first.sender, "bob");
        assert_eq!(first.room, general());
        assert_eq!(first.content(), "hello");
        assert_eq!(first.timestamp.timestamp_millis(), 1_700_000_000_000);

        let second = next(&mut alice).await;
        assert_eq!(second.content(), "plain words");

        let third = next(&mut alice).await;
        assert_eq!(third.kind(), MessageKind::WebrtcOffer);
        assert_eq!(third.sender, "bob");

        assert_eq!(next(&mut alice).await.kind(), MessageKind::UserLeft);
        assert!(bob.closer.is_cancelled());

        // only the two chat messages are persisted
        timeout(WAIT, async {
            while store.recent(10).await.unwrap().len() < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        let saved = store.recent(10).await.unwrap();
        assert_eq!(saved.len(), 2);
        assert!(saved.iter().all(|m| m.username == "bob"));
    }

    #[tokio::test]
    async fn test_receiver_survives_persistence_failure() {
        // テスト項目: 永続化が失敗しても配信は継続される
        // given (前提条件):
        let (hub, _task) = Hub::spawn(HubConfig::default(), Arc::new(FixedClock::from_millis(0)));
        let mut alice = admit(&hub, "alice").await;
        let (called_tx, mut called_rx) = mpsc::unbounded_channel();
        let mut store = MockMessageStore::new();
        store
            .expect_save()
            .withf(|username, content| username == "bob" && content == "hi")
            .times(1)
            .returning(move |_, _| {
                let _ = called_tx.send(());
                Err(StoreError::Unavailable("database down".to_string()))
            });
        let bob = admit_peer(&hub, &mut alice, "bob").await;
        let frames = stream::iter(vec![text(r#"{"content": "hi"}"#)]);

        // when (操作):
        receiver_loop(
            frames,
            bob.info.clone(),
            bob.closer.clone(),
            context(&hub, Arc::new(store), WAIT),
        )
        .await;

        // then (期待する結果):
        assert_eq!(next(&mut alice).await.content(), "hi");
        timeout(WAIT, called_rx.recv()).await.unwrap();
    }

    #[tokio::test]
    async fn test_receiver_removes_connection_after_read_timeout() {
        // テスト項目: 読み取りタイムアウトで接続が Hub から削除され、トランスポートが閉じられる
        // given (前提条件):
        let (hub, _task) = Hub::spawn(HubConfig::default(), Arc::new(FixedClock::from_millis(0)));
        let mut alice = admit(&hub, "alice").await;
        let bob = admit_peer(&hub, &mut alice, "bob").await;
        let store = Arc::new(InMemoryMessageStore::new(10, Arc::new(FixedClock::from_millis(0))));
        let silent = stream::pending::<Result<Frame, axum::Error>>();

        // when (操作):
        receiver_loop(
            silent,
            bob.info.clone(),
            bob.closer.clone(),
            context(&hub, store, Duration::from_millis(50)),
        )
        .await;

        // then (期待する結果):
        let left = next(&mut alice).await;
        assert_eq!(left.kind(), MessageKind::UserLeft);
        assert_eq!(left.sender, "bob");
        assert!(bob.closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_receiver_stops_when_closer_is_cancelled() {
        // テスト項目: closer がキャンセルされると受信ループは終了する
        // given (前提条件):
        let (hub, _task) = Hub::spawn(HubConfig::default(), Arc::new(FixedClock::from_millis(0)));
        let bob = admit(&hub, "bob").await;
        let store = Arc::new(InMemoryMessageStore::new(10, Arc::new(FixedClock::from_millis(0))));
        let silent = stream::pending::<Result<Frame, axum::Error>>();
        bob.closer.cancel();

        // when (操作):
        let result = timeout(
            WAIT,
            receiver_loop(silent, bob.info.clone(), bob.closer.clone(), context(&hub, store, WAIT)),
        )
        .await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert_eq!(hub.roster(&general()).await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_receiver_keeps_reading_when_hub_intake_is_saturated() {
        // テスト項目: Hub のインテークが満杯でもメッセージを破棄するだけで接続は維持される
        // given (前提条件): ループを動かさない容量 1 の Hub
        let (_hub, handle) = Hub::new(
            HubConfig { intake_capacity: 1 },
            Arc::new(FixedClock::from_millis(0)),
        );
        let (_connection, bob) = Connection::open(name("bob"), general(), 8);
        let store = Arc::new(InMemoryMessageStore::new(10, Arc::new(FixedClock::from_millis(0))));
        let mut frames = stream::iter(vec![
            text(r#"{"content": "accepted"}"#),
            text(r#"{"content": "dropped"}"#),
            Ok(Frame::Close(None)),
        ])
        .chain(stream::pending());

        // when (操作):
        let result = timeout(
            WAIT,
            receiver_loop(
                frames.by_ref(),
                bob.info.clone(),
                bob.closer.clone(),
                context(&handle, store, Duration::from_secs(60)),
            ),
        )
        .await;

        // then (期待する結果): close フレームまで読み進めてから終了している
        assert!(result.is_ok());
        assert!(frames.next().now_or_never().is_none());
        assert!(bob.closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_pusher_writes_queue_then_close_frame() {
        // テスト項目: キューのメッセージを JSON テキストとして送出し、キューが閉じたら close フレームを送る
        // given (前提条件):
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (frames_tx, mut frames_rx) = mpsc::channel(8);
        let closer = CancellationToken::new();
        let message = Message::from_participant(
            ConnectionId::generate(),
            &name("bob"),
            &general(),
            Utc::now(),
            MessageBody::Chat {
                content: "hi".to_string(),
            },
        );
        queue_tx.send(message).await.unwrap();
        drop(queue_tx);

        // when (操作):
        pusher_loop(
            PollSender::new(frames_tx),
            queue_rx,
            closer.clone(),
            timing(WAIT),
        )
        .await;

        // then (期待する結果):
        let Some(Frame::Text(json)) = frames_rx.recv().await else {
            panic!("expected a text frame");
        };
        let wire: WireMessage = serde_json::from_str(json.as_str()).unwrap();
        assert_eq!(wire.r#type, MessageKind::Chat);
        assert_eq!(wire.username, "bob");
        assert_eq!(wire.content, "hi");
        assert!(matches!(frames_rx.recv().await, Some(Frame::Close(None))));
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_pusher_sends_liveness_probes() {
        // テスト項目: 一定間隔で ping フレームを送る
        // given (前提条件):
        let (_queue_tx, queue_rx) = mpsc::channel::<Message>(8);
        let (frames_tx, mut frames_rx) = mpsc::channel(8);
        let closer = CancellationToken::new();
        let timing = OutboundTiming {
            ping_interval: Duration::from_millis(20),
            write_timeout: WAIT,
        };
        let task = tokio::spawn(pusher_loop(PollSender::new(frames_tx), queue_rx, closer.clone(), timing));

        // when (操作):
        let frame = timeout(WAIT, frames_rx.recv()).await.unwrap();

        // then (期待する結果):
        assert!(matches!(frame, Some(Frame::Ping(_))));
        closer.cancel();
        timeout(WAIT, task).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pusher_stops_when_transport_fails() {
        // テスト項目: 書き込みに失敗したら送出ループは終了し、closer をキャンセルする
        // given (前提条件):
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (frames_tx, frames_rx) = mpsc::channel::<Frame>(8);
        drop(frames_rx);
        let closer = CancellationToken::new();
        queue_tx
            .send(Message::user_joined(&name("bob"), &general(), Utc::now()))
            .await
            .unwrap();

        // when (操作):
        let result = timeout(
            WAIT,
            pusher_loop(PollSender::new(frames_tx), queue_rx, closer.clone(), timing(WAIT)),
        )
        .await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert!(closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_pusher_treats_stalled_write_as_fatal() {
        // テスト項目: 書き込みが期限内に終わらない場合は致命的として終了する
        // given (前提条件): 容量 1 の送出先を埋めて誰も読まない
        let (queue_tx, queue_rx) = mpsc::channel(8);
        let (frames_tx, _frames_rx) = mpsc::channel::<Frame>(1);
        frames_tx.send(Frame::Ping(Default::default())).await.unwrap();
        let closer = CancellationToken::new();
        queue_tx
            .send(Message::user_joined(&name("bob"), &general(), Utc::now()))
            .await
            .unwrap();

        // when (操作):
        let result = timeout(
            WAIT,
            pusher_loop(
                PollSender::new(frames_tx),
                queue_rx,
                closer.clone(),
                timing(Duration::from_millis(50)),
            ),
        )
        .await;

        // then (期待する結果):
        assert!(result.is_ok());
        assert!(closer.is_cancelled());
    }
}
