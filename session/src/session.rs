//! The per-user verification session state machine.

use std::sync::Arc;
use std::time::Duration;

use rolegate_types::{
    AckSink, ChannelId, DmChannel, GatewayError, GuildId, InboundMessage, RoleGateway, Timestamp,
    UserId, VerifyParams,
};
use tokio::sync::mpsc;

use crate::notice;
use crate::secret::SecretCode;
use crate::state::{ExpiryReason, GrantFailure, SessionOutcome, SessionState};

/// Typed events consumed by the session loop.
///
/// Processing is strictly in arrival order through one queue per session;
/// at most one transition is in flight at a time, so a timer expiry and an
/// in-flight inbound message can never both take effect.
enum SessionEvent {
    Inbound(InboundMessage),
    DeadlineElapsed,
}

/// One user's challenge/response lifecycle.
///
/// Owns its DM channel exclusively; the inbound subscription and deadline
/// timer are released when the session reaches a terminal state. Driven to
/// completion by [`run`].
///
/// [`run`]: VerificationSession::run
pub struct VerificationSession {
    id: u64,
    user: UserId,
    guild: GuildId,
    secret: SecretCode,
    params: VerifyParams,
    state: SessionState,
    attempts_remaining: u32,
    started_at: Timestamp,
    gateway: Arc<dyn RoleGateway>,
    channels: Arc<dyn DmChannel>,
}

impl VerificationSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        user: UserId,
        guild: GuildId,
        secret: SecretCode,
        params: VerifyParams,
        gateway: Arc<dyn RoleGateway>,
        channels: Arc<dyn DmChannel>,
    ) -> Self {
        let attempts_remaining = params.attempt_budget;
        Self {
            id,
            user,
            guild,
            secret,
            params,
            state: SessionState::Created,
            attempts_remaining,
            started_at: Timestamp::now(),
            gateway,
            channels,
        }
    }

    /// Drive the session to a terminal state.
    ///
    /// Opens the DM, sends the prompt, then collects candidate codes until
    /// a match, the deadline, or attempt exhaustion. The `ack` is only used
    /// for the deferred DM-failure follow-up; all other notices go through
    /// the DM channel itself.
    pub async fn run(mut self, ack: &mut dyn AckSink) -> SessionOutcome {
        let (channel, inbox) = match self.open_and_prompt().await {
            Ok(pair) => pair,
            Err(e) => {
                tracing::info!(
                    session = self.id,
                    user = %self.user,
                    error = %e,
                    "could not open DM, session aborted"
                );
                ack.follow_up(notice::CANNOT_OPEN_DM).await;
                self.state = SessionState::GrantFailed;
                return SessionOutcome::CannotOpenChannel(e.to_string());
            }
        };
        self.await_response(channel, inbox).await
    }

    /// `Created → Prompting`: open the DM and deliver the prompt.
    ///
    /// Failure here aborts session creation; it is the one send whose
    /// failure is fatal.
    async fn open_and_prompt(
        &mut self,
    ) -> Result<(ChannelId, mpsc::Receiver<InboundMessage>), rolegate_types::ChannelError> {
        self.state = SessionState::Prompting;
        let channel = self.channels.open(self.user).await?;
        self.channels
            .send(channel, &notice::prompt(self.params.response_window_secs))
            .await?;
        let inbox = self.channels.subscribe(channel, self.user).await;
        Ok((channel, inbox))
    }

    /// `Prompting → AwaitingResponse`: the collection loop.
    ///
    /// The deadline is measured from the moment the prompt was sent, and is
    /// hard — no extension on partial input. Whichever of {inbound event,
    /// deadline} is processed first makes the terminal transition; the
    /// loser is never observed because the loop has already returned.
    async fn await_response(
        &mut self,
        channel: ChannelId,
        mut inbox: mpsc::Receiver<InboundMessage>,
    ) -> SessionOutcome {
        self.state = SessionState::AwaitingResponse;
        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.params.response_window_secs);
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let mut accepted: u32 = 0;
        let mut inbox_open = true;

        loop {
            let event = if inbox_open {
                tokio::select! {
                    biased;
                    msg = inbox.recv() => match msg {
                        Some(m) => SessionEvent::Inbound(m),
                        None => {
                            // Subscription lost (platform shut down); keep
                            // waiting for the deadline only.
                            inbox_open = false;
                            continue;
                        }
                    },
                    () = &mut sleep => SessionEvent::DeadlineElapsed,
                }
            } else {
                (&mut sleep).await;
                SessionEvent::DeadlineElapsed
            };

            match event {
                SessionEvent::DeadlineElapsed => {
                    self.state = SessionState::Expired;
                    tracing::info!(
                        session = self.id,
                        user = %self.user,
                        elapsed_secs = self.started_at.elapsed_since(Timestamp::now()),
                        "session timed out"
                    );
                    self.notify(channel, notice::TIMED_OUT).await;
                    return SessionOutcome::Expired(ExpiryReason::Timeout);
                }
                SessionEvent::Inbound(msg) => {
                    if msg.author != self.user {
                        continue;
                    }
                    let candidate = msg.content.trim();
                    if candidate.is_empty() {
                        continue;
                    }
                    accepted += 1;

                    if self.secret.matches(candidate) {
                        return self.verify_and_grant(channel).await;
                    }

                    self.attempts_remaining = self.attempts_remaining.saturating_sub(1);
                    tracing::debug!(
                        session = self.id,
                        user = %self.user,
                        attempts_remaining = self.attempts_remaining,
                        "candidate code mismatch"
                    );

                    if self.attempts_remaining == 0 || accepted >= self.params.max_inbound {
                        self.state = SessionState::Expired;
                        self.notify(channel, notice::ATTEMPTS_EXHAUSTED).await;
                        return SessionOutcome::Expired(ExpiryReason::AttemptsExhausted);
                    }
                    self.notify(channel, notice::WRONG_CODE).await;
                }
            }
        }
    }

    /// `AwaitingResponse → Verifying → {Granted | GrantFailed}`.
    ///
    /// The grant call's own result is not trusted: the user's roles are
    /// re-read afterwards, and only a confirming re-read yields `Granted`.
    async fn verify_and_grant(&mut self, channel: ChannelId) -> SessionOutcome {
        self.state = SessionState::Verifying;

        match self.gateway.is_pending(self.user).await {
            Ok(true) => {
                self.state = SessionState::GrantFailed;
                tracing::info!(
                    session = self.id,
                    user = %self.user,
                    "code matched but user is pending screening"
                );
                self.notify(channel, notice::PENDING_SCREENING).await;
                return SessionOutcome::GrantFailed(GrantFailure::PendingScreening);
            }
            Ok(false) => {}
            Err(e) => return self.grant_failed(channel, e).await,
        }

        if let Err(e) = self.gateway.grant_role(self.user).await {
            return self.grant_failed(channel, e).await;
        }

        match self.gateway.has_role(self.user).await {
            Ok(true) => {
                self.state = SessionState::Granted;
                tracing::info!(
                    session = self.id,
                    user = %self.user,
                    elapsed_secs = self.started_at.elapsed_since(Timestamp::now()),
                    "role granted and confirmed"
                );
                self.notify(channel, notice::GRANTED).await;
                SessionOutcome::Granted
            }
            Ok(false) => {
                self.state = SessionState::GrantFailed;
                tracing::warn!(
                    session = self.id,
                    user = %self.user,
                    "grant reported success but re-read denies the role"
                );
                self.notify(channel, notice::GRANT_NOT_EFFECTIVE).await;
                SessionOutcome::GrantFailed(GrantFailure::GrantNotEffective)
            }
            Err(e) => self.grant_failed(channel, e).await,
        }
    }

    async fn grant_failed(&mut self, channel: ChannelId, err: GatewayError) -> SessionOutcome {
        self.state = SessionState::GrantFailed;
        let diagnostic = err.to_string();
        tracing::warn!(
            session = self.id,
            user = %self.user,
            error = %diagnostic,
            "grant failed"
        );
        self.notify(channel, &notice::grant_error(&diagnostic)).await;
        SessionOutcome::GrantFailed(GrantFailure::Gateway(diagnostic))
    }

    /// Best-effort notice: delivery failure is logged and swallowed
    /// (the DM may have been closed mid-session).
    async fn notify(&self, channel: ChannelId, text: &str) {
        if let Err(e) = self.channels.send(channel, text).await {
            tracing::debug!(
                session = self.id,
                user = %self.user,
                error = %e,
                "failed to deliver notice"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ExpiryReason, GrantFailure};
    use rolegate_nullables::{AckLog, NullAckSink, NullDmChannel, NullRoleGateway};
    use std::sync::Mutex;
    use tokio::task::JoinHandle;

    fn user() -> UserId {
        UserId::new(11)
    }

    fn guild() -> GuildId {
        GuildId::new(22)
    }

    struct Fixture {
        gateway: Arc<NullRoleGateway>,
        channels: Arc<NullDmChannel>,
    }

    fn fixture() -> Fixture {
        Fixture {
            gateway: Arc::new(NullRoleGateway::new()),
            channels: Arc::new(NullDmChannel::new()),
        }
    }

    fn make_session(fx: &Fixture) -> VerificationSession {
        let gateway = Arc::clone(&fx.gateway) as Arc<dyn RoleGateway>;
        let channels = Arc::clone(&fx.channels) as Arc<dyn DmChannel>;
        VerificationSession::new(
            1,
            user(),
            guild(),
            SecretCode::new("Code123"),
            VerifyParams::default(),
            gateway,
            channels,
        )
    }

    /// Spawn a session and yield until it has sent the prompt and is
    /// awaiting input.
    async fn spawn_session(
        fx: &Fixture,
    ) -> (JoinHandle<SessionOutcome>, Arc<Mutex<AckLog>>) {
        let session = make_session(fx);
        let (mut ack, log) = NullAckSink::new();
        let handle = tokio::spawn(async move { session.run(&mut ack).await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        (handle, log)
    }

    fn dm(fx: &Fixture) -> ChannelId {
        fx.channels.channel_for(user()).expect("DM should be open")
    }

    #[tokio::test]
    async fn correct_code_grants_and_confirms() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;

        fx.channels.push_inbound(dm(&fx), user(), " CODE123 ");

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Granted);
        assert_eq!(fx.gateway.grant_calls(), 1);
        assert!(fx.channels.sent_contains(notice::GRANTED));
    }

    #[tokio::test]
    async fn three_mismatches_exhaust_attempts_without_a_fourth_prompt() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;
        let chan = dm(&fx);

        fx.channels.push_inbound(chan, user(), "wrong-1");
        fx.channels.push_inbound(chan, user(), "wrong-2");
        fx.channels.push_inbound(chan, user(), "wrong-3");

        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::Expired(ExpiryReason::AttemptsExhausted)
        );
        assert_eq!(fx.gateway.grant_calls(), 0);

        // prompt + 2 try-again + 1 exhausted notice, nothing more
        let sent = fx.channels.sent_log();
        assert_eq!(sent.len(), 4);
        assert_eq!(
            sent.iter().filter(|t| t.contains(notice::WRONG_CODE)).count(),
            2
        );
        assert!(sent[3].contains(notice::ATTEMPTS_EXHAUSTED));
    }

    #[tokio::test]
    async fn empty_messages_consume_neither_budget_nor_cap() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;
        let chan = dm(&fx);

        fx.channels.push_inbound(chan, user(), "   ");
        fx.channels.push_inbound(chan, user(), "nope");
        fx.channels.push_inbound(chan, user(), "code123");

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Granted);

        let sent = fx.channels.sent_log();
        assert_eq!(
            sent.iter().filter(|t| t.contains(notice::WRONG_CODE)).count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn no_response_times_out_even_with_attempts_remaining() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Expired(ExpiryReason::Timeout));
        assert!(fx.channels.sent_contains(notice::TIMED_OUT));
        assert_eq!(fx.gateway.grant_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn simultaneous_match_and_expiry_resolve_to_exactly_one_outcome() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;

        // Both a matching message and the elapsed deadline are pending when
        // the session polls next; the inbound event must win and the expiry
        // must produce no side effect.
        fx.channels.push_inbound(dm(&fx), user(), "Code123");
        tokio::time::advance(Duration::from_secs(181)).await;

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Granted);
        assert!(fx.channels.sent_contains(notice::GRANTED));
        assert!(!fx.channels.sent_contains(notice::TIMED_OUT));
    }

    #[tokio::test]
    async fn pending_screening_blocks_the_grant() {
        let fx = fixture();
        fx.gateway.set_pending(user());
        let (handle, _log) = spawn_session(&fx).await;

        fx.channels.push_inbound(dm(&fx), user(), "code123");

        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::GrantFailed(GrantFailure::PendingScreening)
        );
        assert_eq!(fx.gateway.grant_calls(), 0);
        assert!(fx.channels.sent_contains(notice::PENDING_SCREENING));
    }

    #[tokio::test]
    async fn reported_success_contradicted_by_reread_is_not_success() {
        let fx = fixture();
        fx.gateway.make_grants_ineffective();
        let (handle, _log) = spawn_session(&fx).await;

        fx.channels.push_inbound(dm(&fx), user(), "code123");

        let outcome = handle.await.unwrap();
        assert_eq!(
            outcome,
            SessionOutcome::GrantFailed(GrantFailure::GrantNotEffective)
        );
        assert!(fx.channels.sent_contains(notice::GRANT_NOT_EFFECTIVE));
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_diagnostic_to_user() {
        let fx = fixture();
        fx.gateway.fail_grants("rate limited");
        let (handle, _log) = spawn_session(&fx).await;

        fx.channels.push_inbound(dm(&fx), user(), "code123");

        let outcome = handle.await.unwrap();
        match outcome {
            SessionOutcome::GrantFailed(GrantFailure::Gateway(diag)) => {
                assert!(diag.contains("rate limited"));
            }
            other => panic!("expected gateway failure, got {other:?}"),
        }
        assert!(fx.channels.sent_contains("rate limited"));
    }

    #[tokio::test]
    async fn dm_open_failure_aborts_via_deferred_follow_up() {
        let fx = fixture();
        fx.channels.fail_opens("recipient blocks DMs");
        let session = make_session(&fx);
        let (mut ack, log) = NullAckSink::new();

        let outcome = session.run(&mut ack).await;
        assert!(matches!(outcome, SessionOutcome::CannotOpenChannel(_)));
        assert_eq!(log.lock().unwrap().follow_ups, vec![notice::CANNOT_OPEN_DM]);
    }

    #[tokio::test]
    async fn prompt_send_failure_aborts_session_creation() {
        let fx = fixture();
        fx.channels.fail_sends("DM closed");
        let session = make_session(&fx);
        let (mut ack, _log) = NullAckSink::new();

        let outcome = session.run(&mut ack).await;
        assert!(matches!(outcome, SessionOutcome::CannotOpenChannel(_)));
    }

    #[tokio::test]
    async fn notice_delivery_failure_is_swallowed() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;
        let chan = dm(&fx);

        // Prompt went through; every later notice fails to deliver.
        fx.channels.fail_sends("DM closed mid-session");
        fx.channels.push_inbound(chan, user(), "wrong");
        fx.channels.push_inbound(chan, user(), "code123");

        let outcome = handle.await.unwrap();
        assert_eq!(outcome, SessionOutcome::Granted);
    }

    #[tokio::test]
    async fn subscription_is_released_on_terminal_state() {
        let fx = fixture();
        let (handle, _log) = spawn_session(&fx).await;
        assert_eq!(fx.channels.subscription_count(), 1);

        fx.channels.push_inbound(dm(&fx), user(), "code123");
        handle.await.unwrap();

        assert_eq!(fx.channels.subscription_count(), 0);
    }

    #[tokio::test]
    async fn messages_from_other_users_are_not_routed() {
        let fx = fixture();
        let (_handle, _log) = spawn_session(&fx).await;

        let delivered = fx.channels.push_inbound(dm(&fx), UserId::new(99), "Code123");
        assert!(!delivered, "subscription is author-scoped");
    }
}
