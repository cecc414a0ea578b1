//! Signaling coordinator: the one task that owns all shared signaling state.
//!
//! Architecture:
//! ```text
//!   socket A ──▶ ┐                          ┌──▶ queue A ──▶ socket A
//!   socket B ──▶ ├─ commands ─▶ Coordinator ├──▶ queue B ──▶ socket B
//!   bridge   ──▶ ┘   (mpsc)    registry     └──▶ ...
//!                              calls
//!                              presence
//! ```
//!
//! WebSocket tasks only parse frames and enqueue commands. The coordinator
//! handles one command at a time, to completion, so registry mutations,
//! routing decisions and presence broadcasts are serialized without locks,
//! and frames from one connection are processed in the order they arrived.
//!
//! The coordinator never waits on a client: outbound frames go into each
//! connection's bounded queue with `try_send`, and a full queue drops the
//! frame. There is no replay for a connection that is gone.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tandem_common::config::SignalingConfig;
use tandem_common::validation::validate_display_name;
use tandem_common::{ConnectionId, RelayError, RelayResult};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::presence::PresenceBroadcaster;
use crate::protocol::{BridgeControl, ClientMessage, ServerMessage};
use crate::registry::{DuplicatePolicy, ParticipantRegistry, Registration};
use crate::router::{Delivery, Fanout, NegotiationRouter};
use crate::session::CallPhase;

/// A frame queued for one connection. Broadcasts share one allocation.
pub type Outbound = Arc<ServerMessage>;

/// Commands sent to the coordinator task.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// A socket was accepted; frames for it go into `outbound`.
    Connect {
        connection: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    },
    /// A parsed frame from a client.
    Client {
        connection: ConnectionId,
        message: ClientMessage,
    },
    /// A frame from a client that could not be accepted (e.g. unparseable).
    Reject {
        connection: ConnectionId,
        error: RelayError,
    },
    /// The socket closed.
    Disconnect { connection: ConnectionId },
    /// A payload from the translation bridge, for every client.
    Translation { payload: serde_json::Value },
    /// Get coordinator statistics.
    GetStats {
        reply: oneshot::Sender<CoordinatorStats>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    pub connections: usize,
    pub participants: usize,
    pub pending_offers: usize,
    pub active_calls: usize,
    pub presence_broadcasts: u64,
}

/// Cloneable front door to the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    commands: mpsc::Sender<CoordinatorCommand>,
    bridge: broadcast::Sender<BridgeControl>,
    client_queue_capacity: usize,
}

impl CoordinatorHandle {
    /// Register a new socket. Returns its id and the queue of frames to write to it.
    pub async fn connect(&self) -> RelayResult<(ConnectionId, mpsc::Receiver<Outbound>)> {
        let connection = ConnectionId::generate();
        let (outbound, inbox) = mpsc::channel(self.client_queue_capacity);
        self.send(CoordinatorCommand::Connect {
            connection,
            outbound,
        })
        .await?;
        Ok((connection, inbox))
    }

    pub async fn dispatch(&self, connection: ConnectionId, message: ClientMessage) -> RelayResult<()> {
        self.send(CoordinatorCommand::Client {
            connection,
            message,
        })
        .await
    }

    pub async fn reject(&self, connection: ConnectionId, error: RelayError) -> RelayResult<()> {
        self.send(CoordinatorCommand::Reject { connection, error }).await
    }

    pub async fn disconnect(&self, connection: ConnectionId) -> RelayResult<()> {
        self.send(CoordinatorCommand::Disconnect { connection }).await
    }

    pub async fn translation(&self, payload: serde_json::Value) -> RelayResult<()> {
        self.send(CoordinatorCommand::Translation { payload }).await
    }

    pub async fn stats(&self) -> RelayResult<CoordinatorStats> {
        let (reply, rx) = oneshot::channel();
        self.send(CoordinatorCommand::GetStats { reply }).await?;
        rx.await.map_err(|_| RelayError::CoordinatorUnavailable)
    }

    /// Control messages (language changes) for translation collaborators.
    pub fn subscribe_bridge(&self) -> broadcast::Receiver<BridgeControl> {
        self.bridge.subscribe()
    }

    async fn send(&self, command: CoordinatorCommand) -> RelayResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RelayError::CoordinatorUnavailable)
    }
}

pub struct Coordinator {
    registry: ParticipantRegistry,
    router: NegotiationRouter,
    presence: PresenceBroadcaster,
    connections: HashMap<ConnectionId, mpsc::Sender<Outbound>>,
    bridge: broadcast::Sender<BridgeControl>,
}

impl Coordinator {
    /// Start the coordinator task and return a handle to it.
    ///
    /// The task stops once every handle has been dropped.
    pub fn spawn(config: &SignalingConfig) -> CoordinatorHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(config.command_queue_capacity);
        let (bridge_tx, _) = broadcast::channel(config.bridge_control_capacity);

        let policy = if config.replace_duplicate_names {
            DuplicatePolicy::Replace
        } else {
            DuplicatePolicy::Reject
        };
        let coordinator = Coordinator {
            registry: ParticipantRegistry::new(policy),
            router: NegotiationRouter::new(),
            presence: PresenceBroadcaster::new(),
            connections: HashMap::new(),
            bridge: bridge_tx.clone(),
        };

        tokio::spawn(async move {
            coordinator.run(cmd_rx).await;
            tracing::info!("Signaling coordinator shut down");
        });

        CoordinatorHandle {
            commands: cmd_tx,
            bridge: bridge_tx,
            client_queue_capacity: config.client_queue_capacity,
        }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<CoordinatorCommand>) {
        while let Some(command) = cmd_rx.recv().await {
            self.handle(command);
        }
    }

    fn handle(&mut self, command: CoordinatorCommand) {
        match command {
            CoordinatorCommand::Connect {
                connection,
                outbound,
            } => {
                self.connections.insert(connection, outbound);
                tracing::debug!(
                    session = %connection,
                    connections = self.connections.len(),
                    "Client attached to coordinator"
                );
            }

            CoordinatorCommand::Client {
                connection,
                message,
            } => match self.on_client(connection, message) {
                Ok(deliveries) => {
                    for delivery in deliveries {
                        self.deliver(delivery);
                    }
                }
                Err(error) => self.reject(connection, error),
            },

            CoordinatorCommand::Reject { connection, error } => self.reject(connection, error),

            CoordinatorCommand::Disconnect { connection } => self.on_disconnect(connection),

            CoordinatorCommand::Translation { payload } => {
                tracing::debug!(clients = self.connections.len(), "Translation broadcast");
                self.deliver(Delivery {
                    fanout: Fanout::All,
                    message: ServerMessage::Translation(payload),
                });
            }

            CoordinatorCommand::GetStats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn on_client(
        &mut self,
        connection: ConnectionId,
        message: ClientMessage,
    ) -> RelayResult<Vec<Delivery>> {
        match message {
            ClientMessage::JoinUser(name) => {
                validate_display_name(&name)?;
                if let Registration::Replaced { displaced } =
                    self.registry.register(&name, connection)?
                {
                    tracing::debug!(
                        user = %name,
                        displaced = %displaced,
                        "Displaced connection no longer receives routed frames"
                    );
                }
                Ok(vec![self.presence.announce(&self.registry)])
            }
            ClientMessage::Offer(payload) => {
                self.router.offer(&self.registry, connection, payload)
            }
            ClientMessage::Answer(payload) => {
                self.router.answer(&self.registry, connection, payload)
            }
            ClientMessage::IceCandidate(payload) => {
                self.router.candidate(&self.registry, connection, payload)
            }
            ClientMessage::EndCall(parties) => self.router.end_call(&self.registry, parties),
            ClientMessage::CallEnded(pair) => self.router.call_ended(&self.registry, pair),
            ClientMessage::SetLangs(langs) => {
                tracing::info!(src = %langs.src, tgt = %langs.tgt, "Language pair change requested");
                if self.bridge.send(BridgeControl::from(langs)).is_err() {
                    tracing::warn!("No translation bridge connected, language change dropped");
                }
                Ok(Vec::new())
            }
        }
    }

    fn on_disconnect(&mut self, connection: ConnectionId) {
        self.connections.remove(&connection);

        let Some(name) = self.registry.evict(connection) else {
            tracing::debug!(session = %connection, "Anonymous client detached");
            return;
        };

        for delivery in self.router.participant_left(&self.registry, &name) {
            self.deliver(delivery);
        }
        let presence = self.presence.announce(&self.registry);
        self.deliver(presence);
    }

    fn reject(&self, connection: ConnectionId, error: RelayError) {
        tracing::warn!(
            session = %connection,
            code = error.error_code(),
            error = %error,
            "Signaling operation rejected"
        );
        self.deliver(Delivery::to(connection, ServerMessage::Error(error.to_body())));
    }

    fn deliver(&self, delivery: Delivery) {
        let message: Outbound = Arc::new(delivery.message);
        match delivery.fanout {
            Fanout::To(connection) => match self.connections.get(&connection) {
                Some(outbound) => push(connection, outbound, &message),
                None => tracing::debug!(
                    session = %connection,
                    event = message.event_name(),
                    "Target connection is gone, frame dropped"
                ),
            },
            Fanout::AllExcept(skip) => {
                for (connection, outbound) in &self.connections {
                    if *connection != skip {
                        push(*connection, outbound, &message);
                    }
                }
            }
            Fanout::All => {
                for (connection, outbound) in &self.connections {
                    push(*connection, outbound, &message);
                }
            }
        }
    }

    fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            connections: self.connections.len(),
            participants: self.registry.len(),
            pending_offers: self.router.calls().count(CallPhase::Offered),
            active_calls: self.router.calls().count(CallPhase::Answered),
            presence_broadcasts: self.presence.announced(),
        }
    }
}

fn push(connection: ConnectionId, outbound: &mpsc::Sender<Outbound>, message: &Outbound) {
    match outbound.try_send(Arc::clone(message)) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => tracing::warn!(
            session = %connection,
            event = message.event_name(),
            "Client queue full, frame dropped"
        ),
        Err(TrySendError::Closed(_)) => tracing::debug!(
            session = %connection,
            event = message.event_name(),
            "Client queue closed, frame dropped"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        AnswerPayload, CallerPair, CandidatePayload, LanguagePair, OfferPayload,
    };
    use serde_json::json;
    use std::time::Duration;

    struct Client {
        id: ConnectionId,
        inbox: mpsc::Receiver<Outbound>,
    }

    impl Client {
        async fn connect(handle: &CoordinatorHandle) -> Self {
            let (id, inbox) = handle.connect().await.unwrap();
            Self { id, inbox }
        }

        async fn next(&mut self) -> ServerMessage {
            let frame = tokio::time::timeout(Duration::from_secs(1), self.inbox.recv())
                .await
                .expect("timed out waiting for a frame")
                .expect("queue closed");
            (*frame).clone()
        }

        fn assert_silent(&mut self) {
            assert!(self.inbox.try_recv().is_err(), "unexpected frame");
        }

        async fn joined_names(&mut self) -> Vec<String> {
            match self.next().await {
                ServerMessage::Joined(snapshot) => {
                    snapshot.names().into_iter().map(String::from).collect()
                }
                other => panic!("expected joined, got {other:?}"),
            }
        }

        async fn error_code(&mut self) -> String {
            match self.next().await {
                ServerMessage::Error(body) => body.error,
                other => panic!("expected error, got {other:?}"),
            }
        }
    }

    /// Commands are processed in order, so a stats round-trip means every
    /// earlier command has been handled.
    async fn settle(handle: &CoordinatorHandle) {
        handle.stats().await.unwrap();
    }

    async fn join(handle: &CoordinatorHandle, client: &Client, name: &str) {
        handle
            .dispatch(client.id, ClientMessage::JoinUser(name.into()))
            .await
            .unwrap();
    }

    fn offer(from: &str, to: &str) -> OfferPayload {
        OfferPayload {
            from: from.into(),
            to: to.into(),
            offer: json!({"type": "offer", "sdp": "X"}),
        }
    }

    fn answer(from: &str, to: &str) -> AnswerPayload {
        AnswerPayload {
            from: from.into(),
            to: to.into(),
            answer: json!({"type": "answer", "sdp": "Y"}),
        }
    }

    /// alice, bob and an observer that never joins; joined frames drained.
    async fn two_party() -> (CoordinatorHandle, Client, Client, Client) {
        let handle = Coordinator::spawn(&SignalingConfig::default());
        let mut alice = Client::connect(&handle).await;
        let mut bob = Client::connect(&handle).await;
        let mut observer = Client::connect(&handle).await;

        join(&handle, &alice, "alice").await;
        join(&handle, &bob, "bob").await;
        for client in [&mut alice, &mut bob, &mut observer] {
            assert_eq!(client.joined_names().await, vec!["alice"]);
            assert_eq!(client.joined_names().await, vec!["alice", "bob"]);
        }
        (handle, alice, bob, observer)
    }

    #[tokio::test]
    async fn full_call_scenario() {
        let (handle, mut alice, mut bob, mut observer) = two_party().await;

        handle
            .dispatch(alice.id, ClientMessage::Offer(offer("alice", "bob")))
            .await
            .unwrap();
        assert_eq!(bob.next().await, ServerMessage::Offer(offer("alice", "bob")));

        handle
            .dispatch(bob.id, ClientMessage::Answer(answer("alice", "bob")))
            .await
            .unwrap();
        assert_eq!(alice.next().await, ServerMessage::Answer(answer("alice", "bob")));

        let candidate = CandidatePayload::Bare(json!({"candidate": "c", "sdpMid": "0"}));
        handle
            .dispatch(alice.id, ClientMessage::IceCandidate(candidate.clone()))
            .await
            .unwrap();
        assert_eq!(bob.next().await, ServerMessage::IceCandidate(candidate.clone()));
        assert_eq!(observer.next().await, ServerMessage::IceCandidate(candidate));

        let pair = CallerPair("alice".into(), "bob".into());
        handle
            .dispatch(bob.id, ClientMessage::CallEnded(pair.clone()))
            .await
            .unwrap();
        assert_eq!(alice.next().await, ServerMessage::CallEnded(pair.clone()));
        assert_eq!(bob.next().await, ServerMessage::CallEnded(pair));

        settle(&handle).await;
        alice.assert_silent();
        bob.assert_silent();
        observer.assert_silent();
        assert_eq!(handle.stats().await.unwrap().active_calls, 0);
    }

    #[tokio::test]
    async fn unknown_target_does_not_disturb_other_calls() {
        let (handle, mut alice, mut bob, mut observer) = two_party().await;

        handle
            .dispatch(alice.id, ClientMessage::Offer(offer("alice", "ghost")))
            .await
            .unwrap();
        assert_eq!(alice.error_code().await, "PARTICIPANT_NOT_FOUND");

        handle
            .dispatch(alice.id, ClientMessage::Offer(offer("alice", "bob")))
            .await
            .unwrap();
        assert!(matches!(bob.next().await, ServerMessage::Offer(_)));
        handle
            .dispatch(bob.id, ClientMessage::Answer(answer("alice", "bob")))
            .await
            .unwrap();
        assert!(matches!(alice.next().await, ServerMessage::Answer(_)));

        settle(&handle).await;
        observer.assert_silent();
    }

    #[tokio::test]
    async fn unjoined_offer_cannot_block_the_callee() {
        let (handle, mut alice, mut bob, mut observer) = two_party().await;

        handle
            .dispatch(observer.id, ClientMessage::Offer(offer("ghost", "bob")))
            .await
            .unwrap();
        assert_eq!(observer.error_code().await, "NOT_JOINED");
        handle.disconnect(observer.id).await.unwrap();

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.pending_offers, 0);
        bob.assert_silent();

        handle
            .dispatch(alice.id, ClientMessage::Offer(offer("alice", "bob")))
            .await
            .unwrap();
        assert_eq!(bob.next().await, ServerMessage::Offer(offer("alice", "bob")));
        settle(&handle).await;
        alice.assert_silent();
    }

    #[tokio::test]
    async fn offer_under_another_name_is_refused() {
        let (handle, mut alice, mut bob, _observer) = two_party().await;

        handle
            .dispatch(bob.id, ClientMessage::Offer(offer("alice", "bob")))
            .await
            .unwrap();
        assert_eq!(bob.error_code().await, "SENDER_MISMATCH");
        assert_eq!(handle.stats().await.unwrap().pending_offers, 0);
        alice.assert_silent();
    }

    #[tokio::test]
    async fn duplicate_name_is_refused_without_presence_broadcast() {
        let (handle, mut alice, mut bob, mut observer) = two_party().await;

        join(&handle, &observer, "alice").await;
        assert_eq!(observer.error_code().await, "DUPLICATE_REGISTRATION");

        settle(&handle).await;
        alice.assert_silent();
        bob.assert_silent();
        assert_eq!(handle.stats().await.unwrap().participants, 2);
    }

    #[tokio::test]
    async fn busy_callee_rejects_second_offer() {
        let (handle, alice, mut bob, mut carol) = two_party().await;
        join(&handle, &carol, "carol").await;
        bob.joined_names().await;
        carol.joined_names().await;

        handle
            .dispatch(alice.id, ClientMessage::Offer(offer("alice", "bob")))
            .await
            .unwrap();
        assert!(matches!(bob.next().await, ServerMessage::Offer(_)));

        handle
            .dispatch(carol.id, ClientMessage::Offer(offer("carol", "bob")))
            .await
            .unwrap();
        assert_eq!(carol.error_code().await, "PARTICIPANT_BUSY");
        settle(&handle).await;
        bob.assert_silent();
    }

    #[tokio::test]
    async fn disconnect_evicts_and_ends_the_call() {
        let (handle, alice, mut bob, mut observer) = two_party().await;

        handle
            .dispatch(alice.id, ClientMessage::Offer(offer("alice", "bob")))
            .await
            .unwrap();
        bob.next().await;
        handle
            .dispatch(bob.id, ClientMessage::Answer(answer("alice", "bob")))
            .await
            .unwrap();

        handle.disconnect(alice.id).await.unwrap();
        assert_eq!(
            bob.next().await,
            ServerMessage::CallEnded(CallerPair("alice".into(), "bob".into()))
        );
        assert_eq!(bob.joined_names().await, vec!["bob"]);
        assert_eq!(observer.joined_names().await, vec!["bob"]);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.participants, 1);
        assert_eq!(stats.connections, 2);
        assert_eq!(stats.active_calls, 0);

        // The name is free again.
        join(&handle, &observer, "alice").await;
        assert_eq!(observer.joined_names().await, vec!["bob", "alice"]);
    }

    #[tokio::test]
    async fn unparseable_frame_is_reported_to_sender_only() {
        let (handle, mut alice, mut bob, _observer) = two_party().await;

        let parse = serde_json::from_str::<ClientMessage>("{").unwrap_err();
        handle.reject(alice.id, parse.into()).await.unwrap();
        assert_eq!(alice.error_code().await, "MALFORMED_PAYLOAD");

        settle(&handle).await;
        bob.assert_silent();
    }

    #[tokio::test]
    async fn translation_reaches_every_connection() {
        let (handle, mut alice, mut bob, mut observer) = two_party().await;
        let payload = json!({"type": "translation", "text": "namaste", "audio_b64": "AAA="});

        handle.translation(payload.clone()).await.unwrap();
        for client in [&mut alice, &mut bob, &mut observer] {
            assert_eq!(client.next().await, ServerMessage::Translation(payload.clone()));
        }
    }

    #[tokio::test]
    async fn set_langs_is_forwarded_to_bridges() {
        let (handle, alice, _bob, _observer) = two_party().await;
        let mut bridge = handle.subscribe_bridge();

        handle
            .dispatch(
                alice.id,
                ClientMessage::SetLangs(LanguagePair {
                    src: "en".into(),
                    tgt: "de".into(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(
            bridge.recv().await.unwrap(),
            BridgeControl::SetLangs {
                src: "en".into(),
                tgt: "de".into()
            }
        );
    }

    #[tokio::test]
    async fn invalid_name_is_rejected() {
        let handle = Coordinator::spawn(&SignalingConfig::default());
        let mut client = Client::connect(&handle).await;

        join(&handle, &client, "   ").await;
        assert_eq!(client.error_code().await, "INVALID_NAME");
        assert_eq!(handle.stats().await.unwrap().participants, 0);
    }
}
