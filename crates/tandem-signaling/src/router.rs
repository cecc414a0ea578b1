//! Negotiation router: moves offers, answers, candidates and hang-ups
//! between the two named parties of a call.
//!
//! The router decides *who* receives a frame; it never touches sockets.
//! Each operation returns the deliveries the coordinator should perform, or
//! the error to report back to the sender. Nothing here can panic on an
//! unknown name: every lookup goes through [`ParticipantRegistry::resolve`].
//!
//! ```text
//!   Idle ──offer──▶ Offered ──answer──▶ Answered
//!     ▲                │                    │
//!     └──── end-call / call-ended / peer gone ┘
//! ```

use tandem_common::{ConnectionId, RelayError, RelayResult};

use crate::protocol::{
    AnswerPayload, CallParties, CallerPair, CandidatePayload, OfferPayload, ServerMessage,
};
use crate::registry::ParticipantRegistry;
use crate::session::{CallPhase, CallSession, CallSessions};

/// Which connections a frame goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fanout {
    To(ConnectionId),
    AllExcept(ConnectionId),
    All,
}

/// One frame to hand to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub fanout: Fanout,
    pub message: ServerMessage,
}

impl Delivery {
    pub fn to(connection: ConnectionId, message: ServerMessage) -> Self {
        Self {
            fanout: Fanout::To(connection),
            message,
        }
    }
}

#[derive(Debug, Default)]
pub struct NegotiationRouter {
    calls: CallSessions,
}

impl NegotiationRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> &CallSessions {
        &self.calls
    }

    /// `offer{from, to}` goes to `to` only. `sender` must have joined as `from`.
    pub fn offer(
        &mut self,
        registry: &ParticipantRegistry,
        sender: ConnectionId,
        payload: OfferPayload,
    ) -> RelayResult<Vec<Delivery>> {
        authorize(registry, sender, &payload.from, "offer")?;
        let target = registry.resolve(&payload.to)?;
        let phase = self.calls.begin_offer(&payload.from, &payload.to)?;

        tracing::info!(
            from = %payload.from,
            to = %payload.to,
            phase = ?phase,
            "Offer routed"
        );
        Ok(vec![Delivery::to(target, ServerMessage::Offer(payload))])
    }

    /// `answer{from, to}` is sent by `to` and goes back to `from` only.
    pub fn answer(
        &mut self,
        registry: &ParticipantRegistry,
        sender: ConnectionId,
        payload: AnswerPayload,
    ) -> RelayResult<Vec<Delivery>> {
        authorize(registry, sender, &payload.to, "answer")?;
        let caller = registry.resolve(&payload.from)?;
        self.calls.mark_answered(&payload.from, &payload.to)?;

        tracing::info!(from = %payload.from, to = %payload.to, "Answer routed, call connected");
        Ok(vec![Delivery::to(caller, ServerMessage::Answer(payload))])
    }

    /// Addressed candidates go to their target; bare ones go to every
    /// connection except the sender.
    pub fn candidate(
        &mut self,
        registry: &ParticipantRegistry,
        sender: ConnectionId,
        payload: CandidatePayload,
    ) -> RelayResult<Vec<Delivery>> {
        let fanout = match &payload {
            CandidatePayload::Addressed { to, .. } => Fanout::To(registry.resolve(to)?),
            CandidatePayload::Bare(_) => Fanout::AllExcept(sender),
        };

        tracing::trace!(session = %sender, fanout = ?fanout, "Candidate routed");
        Ok(vec![Delivery {
            fanout,
            message: ServerMessage::IceCandidate(payload),
        }])
    }

    /// `end-call{from, to}` tells `to` only; the caller resets its own UI.
    pub fn end_call(
        &mut self,
        registry: &ParticipantRegistry,
        parties: CallParties,
    ) -> RelayResult<Vec<Delivery>> {
        self.finish(&parties.from, &parties.to);
        let target = registry.resolve(&parties.to)?;

        Ok(vec![Delivery::to(target, ServerMessage::EndCall(parties))])
    }

    /// `call-ended[from, to]` tells both sides.
    ///
    /// A side that is no longer registered is skipped; the call is only a
    /// routing failure when neither side can be reached.
    pub fn call_ended(
        &mut self,
        registry: &ParticipantRegistry,
        pair: CallerPair,
    ) -> RelayResult<Vec<Delivery>> {
        self.finish(&pair.0, &pair.1);

        let mut targets = Vec::with_capacity(2);
        let mut missing = None;
        for name in [&pair.0, &pair.1] {
            match registry.resolve(name) {
                Ok(conn) if !targets.contains(&conn) => targets.push(conn),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(user = %name, "call-ended for unknown participant");
                    missing.get_or_insert(e);
                }
            }
        }

        if targets.is_empty() {
            return Err(missing.unwrap_or(RelayError::ParticipantNotFound {
                name: pair.0.clone(),
            }));
        }

        Ok(targets
            .into_iter()
            .map(|conn| Delivery::to(conn, ServerMessage::CallEnded(pair.clone())))
            .collect())
    }

    /// `name` left the relay: end its calls and tell each remaining peer.
    pub fn participant_left(
        &mut self,
        registry: &ParticipantRegistry,
        name: &str,
    ) -> Vec<Delivery> {
        self.calls
            .end_all_for(name)
            .into_iter()
            .filter_map(|session| {
                let peer = if session.caller == name {
                    &session.callee
                } else {
                    &session.caller
                };
                let conn = registry.resolve(peer).ok()?;
                tracing::info!(user = %name, peer = %peer, "Call ended by disconnect");
                Some(Delivery::to(
                    conn,
                    ServerMessage::CallEnded(CallerPair(session.caller, session.callee)),
                ))
            })
            .collect()
    }

    fn finish(&mut self, a: &str, b: &str) -> Option<CallSession> {
        let ended = self.calls.end(a, b);
        if let Some(session) = &ended {
            tracing::info!(
                caller = %session.caller,
                callee = %session.callee,
                answered = session.phase == CallPhase::Answered,
                "Call ended"
            );
        }
        ended
    }
}

/// Sessions are keyed by name, so only the connection holding `claimed`
/// may open or answer one under it.
fn authorize(
    registry: &ParticipantRegistry,
    sender: ConnectionId,
    claimed: &str,
    event: &'static str,
) -> RelayResult<()> {
    match registry.name_of(sender) {
        None => Err(RelayError::NotJoined { event }),
        Some(actual) if actual != claimed => Err(RelayError::SenderMismatch {
            claimed: claimed.to_string(),
            actual: actual.to_string(),
        }),
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Fixture {
        registry: ParticipantRegistry,
        router: NegotiationRouter,
        alice: ConnectionId,
        bob: ConnectionId,
    }

    fn fixture() -> Fixture {
        let mut registry = ParticipantRegistry::default();
        let alice = ConnectionId::generate();
        let bob = ConnectionId::generate();
        registry.register("alice", alice).unwrap();
        registry.register("bob", bob).unwrap();
        Fixture {
            registry,
            router: NegotiationRouter::new(),
            alice,
            bob,
        }
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

    #[test]
    fn offer_goes_to_callee_only() {
        let mut f = fixture();
        let out = f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();

        assert_eq!(out, vec![Delivery::to(f.bob, ServerMessage::Offer(offer("alice", "bob")))]);
    }

    #[test]
    fn answer_goes_to_caller_only() {
        let mut f = fixture();
        f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();
        let out = f.router.answer(&f.registry, f.bob, answer("alice", "bob")).unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].fanout, Fanout::To(f.alice));
        assert_eq!(
            f.router.calls().get("alice", "bob").map(|s| s.phase),
            Some(CallPhase::Answered)
        );
    }

    #[test]
    fn unknown_target_is_a_routing_error() {
        let mut f = fixture();
        let err = f.router.offer(&f.registry, f.alice, offer("alice", "nobody")).unwrap_err();
        assert!(err.is_routing());
        assert!(f.router.calls().is_empty());

        // The failure leaves the router usable for an unrelated exchange.
        f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();
        f.router.answer(&f.registry, f.bob, answer("alice", "bob")).unwrap();
    }

    #[test]
    fn offer_must_come_from_its_caller() {
        let mut f = fixture();
        let stranger = ConnectionId::generate();

        let err = f.router.offer(&f.registry, stranger, offer("ghost", "bob")).unwrap_err();
        assert!(matches!(err, RelayError::NotJoined { event: "offer" }));

        let err = f.router.offer(&f.registry, f.bob, offer("alice", "bob")).unwrap_err();
        assert!(
            matches!(err, RelayError::SenderMismatch { ref claimed, ref actual } if claimed == "alice" && actual == "bob")
        );
        assert!(f.router.calls().is_empty());
    }

    #[test]
    fn answer_must_come_from_the_callee() {
        let mut f = fixture();
        f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();

        let err = f.router.answer(&f.registry, f.alice, answer("alice", "bob")).unwrap_err();
        assert!(matches!(err, RelayError::SenderMismatch { .. }));
        assert_eq!(f.router.calls().count(CallPhase::Offered), 1);
    }

    #[test]
    fn bare_candidate_skips_sender() {
        let mut f = fixture();
        let out = f
            .router
            .candidate(&f.registry, f.alice, CandidatePayload::Bare(json!({"candidate": "c"})))
            .unwrap();
        assert_eq!(out[0].fanout, Fanout::AllExcept(f.alice));
    }

    #[test]
    fn addressed_candidate_goes_to_target() {
        let mut f = fixture();
        let payload = CandidatePayload::Addressed {
            from: "bob".into(),
            to: "alice".into(),
            candidate: json!({"candidate": "c"}),
        };
        let out = f.router.candidate(&f.registry, f.bob, payload).unwrap();
        assert_eq!(out[0].fanout, Fanout::To(f.alice));
    }

    #[test]
    fn end_call_notifies_target_and_clears_session() {
        let mut f = fixture();
        f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();
        f.router.answer(&f.registry, f.bob, answer("alice", "bob")).unwrap();

        let out = f
            .router
            .end_call(
                &f.registry,
                CallParties {
                    from: "alice".into(),
                    to: "bob".into(),
                },
            )
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].fanout, Fanout::To(f.bob));
        assert!(f.router.calls().is_empty());
    }

    #[test]
    fn call_ended_notifies_both_sides() {
        let mut f = fixture();
        f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();
        f.router.answer(&f.registry, f.bob, answer("alice", "bob")).unwrap();

        let pair = CallerPair("alice".into(), "bob".into());
        let out = f.router.call_ended(&f.registry, pair.clone()).unwrap();
        let fanouts: Vec<Fanout> = out.iter().map(|d| d.fanout).collect();

        assert_eq!(fanouts, vec![Fanout::To(f.alice), Fanout::To(f.bob)]);
        assert!(out.iter().all(|d| d.message == ServerMessage::CallEnded(pair.clone())));
        assert!(f.router.calls().is_empty());
    }

    #[test]
    fn call_ended_with_nobody_reachable_fails() {
        let mut f = fixture();
        let err = f
            .router
            .call_ended(&f.registry, CallerPair("x".into(), "y".into()))
            .unwrap_err();
        assert!(matches!(err, RelayError::ParticipantNotFound { name } if name == "x"));
    }

    #[test]
    fn participant_left_tells_the_peer() {
        let mut f = fixture();
        f.router.offer(&f.registry, f.alice, offer("alice", "bob")).unwrap();
        f.registry.evict(f.alice);

        let out = f.router.participant_left(&f.registry, "alice");
        assert_eq!(
            out,
            vec![Delivery::to(
                f.bob,
                ServerMessage::CallEnded(CallerPair("alice".into(), "bob".into()))
            )]
        );
        assert!(f.router.calls().is_empty());
    }
}
