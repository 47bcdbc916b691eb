//! Session registry and trigger routing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rolegate_types::{AckSink, DmChannel, GrantCheck, GuildId, RoleGateway, UserId, VerifyParams};
use tokio::sync::Mutex;

use crate::error::SessionError;
use crate::notice;
use crate::secret::SecretCode;
use crate::session::VerificationSession;
use crate::state::SessionState;

/// Registry key: one live session per `(user, guild)` pair.
pub type SessionKey = (UserId, GuildId);

/// Registry entry for a live session. Removal is keyed by the session id,
/// not just the key, so a newer session that reused the key is never
/// removed by a stale terminator.
struct LiveSession {
    id: u64,
}

/// How a trigger invocation resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A session was created and is being driven asynchronously; the
    /// originator got a short acknowledgment, not the final result.
    Started,
    /// The user already holds the role; no session, no grant call.
    AlreadyPrivileged,
    /// A live session already exists for this user; it was not altered.
    AlreadyInProgress,
    /// A guard rejected the trigger before any session was created.
    Rejected(String),
}

/// Tracks at most one live session per user and routes trigger events to
/// session creation.
///
/// The registry is the only state shared between sessions; it is locked
/// only for the check-then-insert and check-then-remove sequences, never
/// across a suspension point.
pub struct SessionManager {
    gateway: Arc<dyn RoleGateway>,
    channels: Arc<dyn DmChannel>,
    secret: SecretCode,
    params: VerifyParams,
    registry: Mutex<HashMap<SessionKey, LiveSession>>,
    next_id: AtomicU64,
}

impl SessionManager {
    pub fn new(
        gateway: Arc<dyn RoleGateway>,
        channels: Arc<dyn DmChannel>,
        secret: SecretCode,
        params: VerifyParams,
    ) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            channels,
            secret,
            params,
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// Handle a trigger event for `(user, guild)`.
    ///
    /// Evaluates the privilege and permission guards synchronously, then
    /// creates and asynchronously drives a new session. Returns immediately;
    /// the final verification outcome is delivered over the DM channel. All
    /// replies to the originator go through `ack`.
    pub async fn trigger(
        self: &Arc<Self>,
        user: UserId,
        guild: GuildId,
        mut ack: Box<dyn AckSink>,
    ) -> TriggerOutcome {
        let key = (user, guild);

        // Fast exclusivity check before any gateway round-trip.
        if self.registry.lock().await.contains_key(&key) {
            ack.reply(notice::ALREADY_IN_PROGRESS).await;
            return TriggerOutcome::AlreadyInProgress;
        }

        // Guard: user already holds the role — idempotent no-op, no prompt.
        match self.gateway.has_role(user).await {
            Ok(true) => {
                tracing::info!(user = %user, state = ?SessionState::AlreadyPrivileged,
                    "trigger for already-privileged user");
                ack.reply(notice::ALREADY_PRIVILEGED).await;
                return TriggerOutcome::AlreadyPrivileged;
            }
            Ok(false) => {}
            Err(e) => return Self::reject(ack, e.into()).await,
        }

        // Guard: the bot must be able to confer the role at all.
        match self.gateway.can_grant().await {
            Ok(GrantCheck::Allowed) => {}
            Ok(GrantCheck::MissingPermission) => {
                return Self::reject(ack, SessionError::MissingPermission).await;
            }
            Ok(GrantCheck::RoleOrderTooHigh) => {
                return Self::reject(ack, SessionError::RoleOrderTooHigh).await;
            }
            Err(e) => return Self::reject(ack, e.into()).await,
        }

        // Check-then-insert under one lock: a concurrent trigger for the
        // same user that also passed the guards loses here.
        let id = {
            let mut registry = self.registry.lock().await;
            if registry.contains_key(&key) {
                drop(registry);
                ack.reply(notice::ALREADY_IN_PROGRESS).await;
                return TriggerOutcome::AlreadyInProgress;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            registry.insert(key, LiveSession { id });
            id
        };

        ack.reply(notice::CHECK_DMS).await;

        let session = VerificationSession::new(
            id,
            user,
            guild,
            self.secret.clone(),
            self.params.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.channels),
        );

        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = session.run(ack.as_mut()).await;
            tracing::info!(user = %user, session = id, outcome = ?outcome, "session terminated");
            manager.on_session_terminated(key, id).await;
        });

        TriggerOutcome::Started
    }

    /// Remove a terminated session from the registry.
    ///
    /// Called exactly once per session from whichever transition reached a
    /// terminal state, and safe to call even if the entry was already
    /// replaced: removal checks the session id.
    pub async fn on_session_terminated(&self, key: SessionKey, session_id: u64) {
        let mut registry = self.registry.lock().await;
        match registry.get(&key) {
            Some(live) if live.id == session_id => {
                registry.remove(&key);
            }
            Some(live) => {
                tracing::debug!(
                    session = session_id,
                    current = live.id,
                    "registry entry already replaced, leaving it"
                );
            }
            None => {}
        }
    }

    /// Whether a live session exists for `(user, guild)`.
    pub async fn is_live(&self, user: UserId, guild: GuildId) -> bool {
        self.registry.lock().await.contains_key(&(user, guild))
    }

    /// Number of live sessions.
    pub async fn live_sessions(&self) -> usize {
        self.registry.lock().await.len()
    }

    async fn reject(mut ack: Box<dyn AckSink>, err: SessionError) -> TriggerOutcome {
        tracing::info!(error = %err, state = ?SessionState::Blocked, "trigger rejected");
        ack.reply(&notice::trigger_rejected(&err.to_string())).await;
        TriggerOutcome::Rejected(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rolegate_nullables::{AckLog, NullAckSink, NullDmChannel, NullRoleGateway};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    fn user() -> UserId {
        UserId::new(11)
    }

    fn guild() -> GuildId {
        GuildId::new(22)
    }

    struct Fixture {
        gateway: Arc<NullRoleGateway>,
        channels: Arc<NullDmChannel>,
        manager: Arc<SessionManager>,
    }

    fn fixture() -> Fixture {
        let gateway = Arc::new(NullRoleGateway::new());
        let channels = Arc::new(NullDmChannel::new());
        let manager = SessionManager::new(
            Arc::clone(&gateway) as Arc<dyn RoleGateway>,
            Arc::clone(&channels) as Arc<dyn DmChannel>,
            SecretCode::new("Code123"),
            VerifyParams::default(),
        );
        Fixture {
            gateway,
            channels,
            manager,
        }
    }

    fn ack() -> (Box<dyn AckSink>, Arc<StdMutex<AckLog>>) {
        let (sink, log) = NullAckSink::new();
        (Box::new(sink), log)
    }

    /// Let the spawned session task reach its prompt / collection loop.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    async fn wait_until_idle(fx: &Fixture) {
        while fx.manager.live_sessions().await > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn already_privileged_trigger_is_a_no_op() {
        let fx = fixture();
        fx.gateway.give_role(user());
        let (sink, log) = ack();

        let outcome = fx.manager.trigger(user(), guild(), sink).await;

        assert_eq!(outcome, TriggerOutcome::AlreadyPrivileged);
        assert_eq!(log.lock().unwrap().replies, vec![notice::ALREADY_PRIVILEGED]);
        assert_eq!(fx.gateway.grant_calls(), 0);
        assert_eq!(fx.manager.live_sessions().await, 0);
    }

    #[tokio::test]
    async fn missing_permission_rejects_before_any_session() {
        let fx = fixture();
        fx.gateway.deny_grant(GrantCheck::MissingPermission);
        let (sink, log) = ack();

        let outcome = fx.manager.trigger(user(), guild(), sink).await;

        assert!(matches!(outcome, TriggerOutcome::Rejected(_)));
        assert_eq!(log.lock().unwrap().replies.len(), 1);
        assert_eq!(fx.manager.live_sessions().await, 0);
    }

    #[tokio::test]
    async fn role_order_rejection_names_the_cause() {
        let fx = fixture();
        fx.gateway.deny_grant(GrantCheck::RoleOrderTooHigh);
        let (sink, _log) = ack();

        match fx.manager.trigger(user(), guild(), sink).await {
            TriggerOutcome::Rejected(reason) => {
                assert!(reason.contains("role"), "unexpected reason: {reason}");
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn gateway_read_failure_rejects_the_trigger() {
        let fx = fixture();
        fx.gateway.fail_role_reads("shard offline");
        let (sink, _log) = ack();

        let outcome = fx.manager.trigger(user(), guild(), sink).await;

        assert!(matches!(outcome, TriggerOutcome::Rejected(_)));
        assert_eq!(fx.manager.live_sessions().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_while_live_is_rejected_without_touching_the_first() {
        let fx = fixture();

        let (sink, first_log) = ack();
        assert_eq!(
            fx.manager.trigger(user(), guild(), sink).await,
            TriggerOutcome::Started
        );
        assert_eq!(first_log.lock().unwrap().replies, vec![notice::CHECK_DMS]);
        settle().await;

        let (sink, second_log) = ack();
        assert_eq!(
            fx.manager.trigger(user(), guild(), sink).await,
            TriggerOutcome::AlreadyInProgress
        );
        assert_eq!(
            second_log.lock().unwrap().replies,
            vec![notice::ALREADY_IN_PROGRESS]
        );
        assert_eq!(fx.manager.live_sessions().await, 1);

        // The first session is unaffected and still completes.
        let chan = fx.channels.channel_for(user()).unwrap();
        fx.channels.push_inbound(chan, user(), "code123");
        wait_until_idle(&fx).await;
        assert_eq!(fx.gateway.grant_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_session_makes_way_for_a_retrigger() {
        let fx = fixture();

        let (sink, _log) = ack();
        fx.manager.trigger(user(), guild(), sink).await;
        settle().await;

        let chan = fx.channels.channel_for(user()).unwrap();
        fx.channels.push_inbound(chan, user(), "code123");
        wait_until_idle(&fx).await;

        // The grant stuck, so the retrigger resolves as already privileged.
        let (sink, log) = ack();
        assert_eq!(
            fx.manager.trigger(user(), guild(), sink).await,
            TriggerOutcome::AlreadyPrivileged
        );
        assert_eq!(log.lock().unwrap().replies, vec![notice::ALREADY_PRIVILEGED]);
        assert_eq!(fx.gateway.grant_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_session_leaves_no_stale_registry_entry() {
        let fx = fixture();

        let (sink, _log) = ack();
        fx.manager.trigger(user(), guild(), sink).await;
        settle().await;

        // No input; the deadline fires under the auto-advancing clock.
        wait_until_idle(&fx).await;
        assert!(fx.channels.sent_contains(notice::TIMED_OUT));

        let (sink, _log) = ack();
        assert_eq!(
            fx.manager.trigger(user(), guild(), sink).await,
            TriggerOutcome::Started
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_terminator_does_not_evict_a_newer_session() {
        let fx = fixture();
        let key = (user(), guild());

        let (sink, _log) = ack();
        fx.manager.trigger(user(), guild(), sink).await;
        settle().await;

        // Session ids start at 1; a terminator carrying a different id must
        // leave the live entry alone.
        fx.manager.on_session_terminated(key, 999).await;
        assert!(fx.manager.is_live(user(), guild()).await);

        fx.manager.on_session_terminated(key, 1).await;
        assert!(!fx.manager.is_live(user(), guild()).await);

        // Repeated removal is harmless.
        fx.manager.on_session_terminated(key, 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn dm_open_failure_is_reported_through_the_follow_up() {
        let fx = fixture();
        fx.channels.fail_opens("recipient blocks DMs");

        let (sink, log) = ack();
        assert_eq!(
            fx.manager.trigger(user(), guild(), sink).await,
            TriggerOutcome::Started
        );
        wait_until_idle(&fx).await;

        let log = log.lock().unwrap();
        assert_eq!(log.replies, vec![notice::CHECK_DMS]);
        assert_eq!(log.follow_ups, vec![notice::CANNOT_OPEN_DM]);
    }

    #[tokio::test(start_paused = true)]
    async fn sessions_for_different_users_run_concurrently() {
        let fx = fixture();
        let other = UserId::new(33);

        let (sink, _log) = ack();
        fx.manager.trigger(user(), guild(), sink).await;
        let (sink, _log) = ack();
        fx.manager.trigger(other, guild(), sink).await;
        settle().await;

        assert_eq!(fx.manager.live_sessions().await, 2);

        fx.channels
            .push_inbound(fx.channels.channel_for(user()).unwrap(), user(), "code123");
        fx.channels
            .push_inbound(fx.channels.channel_for(other).unwrap(), other, "code123");
        wait_until_idle(&fx).await;

        assert_eq!(fx.gateway.grant_calls(), 2);
    }
}
