//! Session channel state machine.
//!
//! Tracks the lifecycle of the duplex connection to the relay, gates inbound
//! payloads on the connection being open, enforces one `self` announcement
//! per connection and schedules reconnects. Uses the action pattern: methods
//! take time as input and return actions for the driver to execute.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ start ┌────────────┐ opened ┌──────┐  close   ┌─────────┐
//! │ Init │──────>│ Connecting │───────>│ Open │─────────>│ Closing │
//! └──────┘       └────────────┘        └──────┘          └─────────┘
//!                   ^      │              │                   │
//!          back-off │      │ closed       │ closed /          │ closed
//!           elapsed │      ↓              │ identity timeout  ↓
//!                ┌──────┐<────────────────┘              ┌────────┐
//!                │ Lost │                                │ Closed │
//!                └──────┘──── attempts exhausted ───>  ┌────────┐
//!                                                      │ Failed │
//!                                                      └────────┘
//! ```
//!
//! Teardown moves any state to `Closed`. Nothing is accepted afterwards.

use std::{
    ops::{Add, Sub},
    time::{Duration, Instant},
};

use hushlink_proto::{Inbound, InboundMessage};

use crate::error::ChannelError;

/// First reconnect delay.
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on a single reconnect delay.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Consecutive failed attempts before the channel gives up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

/// Time an open connection may wait for its `self` announcement.
pub const DEFAULT_IDENTITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Actions returned by the channel state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelAction {
    /// Open a transport to the session address
    Connect,

    /// Close the current transport
    Disconnect {
        /// Reason for closing
        reason: String,
    },

    /// Channel gave up; no further reconnects
    Failed(ChannelError),
}

/// Channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not started
    Init,
    /// Transport being established
    Connecting,
    /// Transport up, payloads flowing
    Open,
    /// Local close requested, waiting for the transport to go down
    Closing,
    /// Transport dropped, waiting for the back-off delay
    Lost,
    /// Reconnect attempts exhausted
    Failed,
    /// Closed locally or torn down
    Closed,
}

/// Reconnect back-off policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Growth factor per consecutive failure
    pub multiplier: u32,
    /// Cap on any single delay
    pub max_delay: Duration,
    /// Consecutive failed attempts allowed; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Unbounded retry with a constant delay.
    pub fn fixed(delay: Duration) -> Self {
        Self { initial_delay: delay, multiplier: 1, max_delay: delay, max_attempts: None }
    }

    /// Delay before the retry following `failures` consecutive failures.
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(failures);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_attempts.is_some_and(|max| failures >= max)
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: DEFAULT_INITIAL_DELAY,
            multiplier: 2,
            max_delay: DEFAULT_MAX_DELAY,
            max_attempts: Some(DEFAULT_MAX_ATTEMPTS),
        }
    }
}

/// Channel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Back-off between reconnect attempts
    pub reconnect: ReconnectPolicy,
    /// How long an open connection may go without `self`; `None` waits forever
    pub identity_timeout: Option<Duration>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            identity_timeout: Some(DEFAULT_IDENTITY_TIMEOUT),
        }
    }
}

/// Session channel state machine
///
/// Pure state machine: no I/O, no Environment storage. Generic over `Instant`
/// so the simulation harness can drive it with virtual time.
#[derive(Debug, Clone)]
pub struct SessionChannel<I = Instant>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    state: ChannelState,
    config: ChannelConfig,
    /// Consecutive failed attempts since the last usable connection
    failures: u32,
    /// When the next reconnect fires (`Lost` only)
    retry_at: Option<I>,
    /// When the current connection opened (`Open` only)
    opened_at: Option<I>,
    /// Whether this connection already delivered `self`
    identity_received: bool,
    /// Number of connections that reached `Open`
    connections: u64,
}

impl<I> SessionChannel<I>
where
    I: Copy + Ord + Sub<Output = Duration> + Add<Duration, Output = I>,
{
    /// Create a channel in [`ChannelState::Init`].
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            state: ChannelState::Init,
            config,
            failures: 0,
            retry_at: None,
            opened_at: None,
            identity_received: false,
            connections: 0,
        }
    }

    /// Current state
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Configuration in use
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Consecutive failed attempts since the last usable connection.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// When the next reconnect fires. `None` unless `Lost`.
    pub fn retry_at(&self) -> Option<I> {
        self.retry_at
    }

    /// Whether the current connection has delivered its `self` announcement.
    pub fn identity_received(&self) -> bool {
        self.identity_received
    }

    /// Number of connections that reached `Open` so far.
    pub fn connections(&self) -> u64 {
        self.connections
    }

    /// Whether payloads may be sent right now.
    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Open
    }

    /// Begin the first connection.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` if not in `Init`
    pub fn start(&mut self) -> Result<Vec<ChannelAction>, ChannelError> {
        if self.state != ChannelState::Init {
            return Err(self.invalid("start"));
        }

        self.state = ChannelState::Connecting;
        tracing::debug!("channel connecting");

        Ok(vec![ChannelAction::Connect])
    }

    /// Transport reported the connection as established.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` if not `Connecting`
    pub fn transport_opened(&mut self, now: I) -> Result<(), ChannelError> {
        if self.state != ChannelState::Connecting {
            return Err(self.invalid("transport_opened"));
        }

        self.state = ChannelState::Open;
        self.opened_at = Some(now);
        self.identity_received = false;
        self.connections += 1;
        tracing::debug!(connection = self.connections, "channel open");

        Ok(())
    }

    /// Validate one inbound text payload.
    ///
    /// Only an open channel accepts payloads. The first `self` announcement
    /// of a connection is accepted and resets the failure counter; any later
    /// one on the same connection is rejected. Rejected payloads do not
    /// change channel state.
    ///
    /// # Errors
    ///
    /// - `ChannelError::InvalidState` if not `Open`
    /// - `ChannelError::Protocol` if the payload does not parse
    /// - `ChannelError::DuplicateIdentity` for a repeated `self`
    pub fn receive(&mut self, text: &str) -> Result<Inbound, ChannelError> {
        if self.state != ChannelState::Open {
            return Err(self.invalid("receive"));
        }

        let inbound = Inbound::parse(text)?;

        if let Inbound::Message(InboundMessage::SelfIdentity(_)) = &inbound {
            if self.identity_received {
                return Err(ChannelError::DuplicateIdentity);
            }
            self.identity_received = true;
            self.failures = 0;
        }

        Ok(inbound)
    }

    /// Transport reported the connection as gone (or failed to connect).
    ///
    /// Stale reports in states without a live transport are ignored.
    pub fn transport_closed(&mut self, now: I, reason: &str) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Open | ChannelState::Connecting => {
                tracing::info!(%reason, state = ?self.state, "channel transport closed");
                self.schedule_retry(now)
            },
            ChannelState::Closing => {
                self.state = ChannelState::Closed;
                Vec::new()
            },
            ChannelState::Init
            | ChannelState::Lost
            | ChannelState::Failed
            | ChannelState::Closed => Vec::new(),
        }
    }

    /// Process timers: reconnect back-off and the identity timeout.
    pub fn tick(&mut self, now: I) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Lost => {
                let Some(retry_at) = self.retry_at else {
                    return Vec::new();
                };
                if now < retry_at {
                    return Vec::new();
                }

                self.failures = self.failures.saturating_add(1);
                self.retry_at = None;
                self.state = ChannelState::Connecting;
                tracing::debug!(attempt = self.failures, "channel reconnecting");

                vec![ChannelAction::Connect]
            },
            ChannelState::Open => {
                let Some(elapsed) = self.identity_overdue(now) else {
                    return Vec::new();
                };

                let error = ChannelError::IdentityTimeout { elapsed };
                tracing::warn!(?elapsed, "no self announcement, dropping connection");

                let mut actions = vec![ChannelAction::Disconnect { reason: error.to_string() }];
                actions.extend(self.schedule_retry(now));
                actions
            },
            ChannelState::Init
            | ChannelState::Connecting
            | ChannelState::Closing
            | ChannelState::Failed
            | ChannelState::Closed => Vec::new(),
        }
    }

    /// Close the channel on request. No reconnect follows.
    pub fn close(&mut self) -> Vec<ChannelAction> {
        match self.state {
            ChannelState::Open | ChannelState::Connecting => {
                self.state = ChannelState::Closing;
                self.opened_at = None;
                vec![ChannelAction::Disconnect { reason: "closed by client".to_string() }]
            },
            ChannelState::Init | ChannelState::Lost => {
                self.state = ChannelState::Closed;
                self.retry_at = None;
                Vec::new()
            },
            ChannelState::Closing | ChannelState::Failed | ChannelState::Closed => Vec::new(),
        }
    }

    /// Invalidate the channel. Every later call is rejected or ignored.
    pub fn teardown(&mut self) -> Vec<ChannelAction> {
        let actions = match self.state {
            ChannelState::Open | ChannelState::Connecting => {
                vec![ChannelAction::Disconnect { reason: "session teardown".to_string() }]
            },
            ChannelState::Init
            | ChannelState::Closing
            | ChannelState::Lost
            | ChannelState::Failed
            | ChannelState::Closed => Vec::new(),
        };

        self.state = ChannelState::Closed;
        self.retry_at = None;
        self.opened_at = None;
        self.identity_received = false;

        actions
    }

    fn identity_overdue(&self, now: I) -> Option<Duration> {
        if self.identity_received {
            return None;
        }
        let timeout = self.config.identity_timeout?;
        let elapsed = now - self.opened_at?;

        (elapsed >= timeout).then_some(elapsed)
    }

    fn schedule_retry(&mut self, now: I) -> Vec<ChannelAction> {
        self.opened_at = None;
        self.identity_received = false;

        if self.config.reconnect.exhausted(self.failures) {
            self.state = ChannelState::Failed;
            self.retry_at = None;
            tracing::warn!(attempts = self.failures, "reconnect attempts exhausted");
            return vec![ChannelAction::Failed(ChannelError::Lost { attempts: self.failures })];
        }

        let delay = self.config.reconnect.delay(self.failures);
        self.retry_at = Some(now + delay);
        self.state = ChannelState::Lost;
        tracing::debug!(?delay, failures = self.failures, "reconnect scheduled");

        Vec::new()
    }

    fn invalid(&self, operation: &str) -> ChannelError {
        ChannelError::InvalidState { state: self.state, operation: operation.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Durations stand in for instants: monotonic, ordered and addable.
    type TestChannel = SessionChannel<Duration>;

    const SELF: &str = r#"{"type":"self","name":"Otter","avatar":"o.png"}"#;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn open_channel(config: ChannelConfig) -> TestChannel {
        let mut channel = TestChannel::new(config);
        channel.start().unwrap();
        channel.transport_opened(secs(0)).unwrap();
        channel
    }

    #[test]
    fn channel_lifecycle() {
        let mut channel = TestChannel::new(ChannelConfig::default());
        assert_eq!(channel.state(), ChannelState::Init);

        let actions = channel.start().unwrap();
        assert_eq!(actions, vec![ChannelAction::Connect]);
        assert_eq!(channel.state(), ChannelState::Connecting);

        channel.transport_opened(secs(0)).unwrap();
        assert_eq!(channel.state(), ChannelState::Open);
        assert!(!channel.identity_received());

        let inbound = channel.receive(SELF).unwrap();
        assert!(matches!(inbound, Inbound::Message(InboundMessage::SelfIdentity(_))));
        assert!(channel.identity_received());

        let actions = channel.close();
        assert!(matches!(actions[..], [ChannelAction::Disconnect { .. }]));
        assert_eq!(channel.state(), ChannelState::Closing);

        assert!(channel.transport_closed(secs(1), "normal").is_empty());
        assert_eq!(channel.state(), ChannelState::Closed);
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut channel = TestChannel::new(ChannelConfig::default());
        channel.start().unwrap();

        assert!(matches!(channel.start(), Err(ChannelError::InvalidState { .. })));
    }

    #[test]
    fn receive_before_open_is_rejected() {
        let mut channel = TestChannel::new(ChannelConfig::default());
        channel.start().unwrap();

        let result = channel.receive(SELF);

        assert!(matches!(
            result,
            Err(ChannelError::InvalidState { state: ChannelState::Connecting, .. })
        ));
    }

    #[test]
    fn malformed_payload_leaves_state_unchanged() {
        let mut channel = open_channel(ChannelConfig::default());

        let result = channel.receive("{not json");

        assert!(matches!(result, Err(ChannelError::Protocol(_))));
        assert_eq!(channel.state(), ChannelState::Open);
        assert!(!channel.identity_received());

        channel.receive(SELF).unwrap();
        assert!(channel.identity_received());
    }

    #[test]
    fn second_self_on_same_connection_is_rejected() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.receive(SELF).unwrap();

        assert_eq!(channel.receive(SELF), Err(ChannelError::DuplicateIdentity));
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[test]
    fn reconnect_after_fixed_delay() {
        let config = ChannelConfig {
            reconnect: ReconnectPolicy::fixed(secs(1)),
            ..ChannelConfig::default()
        };
        let mut channel = open_channel(config);
        channel.receive(SELF).unwrap();

        let actions = channel.transport_closed(secs(5), "network");
        assert!(actions.is_empty());
        assert_eq!(channel.state(), ChannelState::Lost);
        assert_eq!(channel.retry_at(), Some(secs(6)));

        assert!(channel.tick(secs(5) + Duration::from_millis(999)).is_empty());
        assert_eq!(channel.state(), ChannelState::Lost);

        let actions = channel.tick(secs(6));
        assert_eq!(actions, vec![ChannelAction::Connect]);
        assert_eq!(channel.state(), ChannelState::Connecting);

        // The next connection needs its own self announcement.
        channel.transport_opened(secs(6)).unwrap();
        assert!(!channel.identity_received());
        channel.receive(SELF).unwrap();
        assert_eq!(channel.connections(), 2);
    }

    #[test]
    fn payloads_during_reconnect_gap_are_rejected() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.receive(SELF).unwrap();
        channel.transport_closed(secs(1), "network");

        assert!(matches!(channel.receive(SELF), Err(ChannelError::InvalidState { .. })));
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();

        let delays: Vec<u64> = (0..8).map(|n| policy.delay(n).as_secs()).collect();

        assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30, 30]);
        assert_eq!(policy.delay(u32::MAX), secs(30));
    }

    #[test]
    fn consecutive_failures_grow_the_delay() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.receive(SELF).unwrap();

        channel.transport_closed(secs(0), "network");
        assert_eq!(channel.retry_at(), Some(secs(1)));

        channel.tick(secs(1));
        channel.transport_closed(secs(1), "refused");
        assert_eq!(channel.failures(), 1);
        assert_eq!(channel.retry_at(), Some(secs(3)));

        channel.tick(secs(3));
        channel.transport_closed(secs(3), "refused");
        assert_eq!(channel.retry_at(), Some(secs(7)));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.receive(SELF).unwrap();

        let mut now = secs(0);
        let mut actions = channel.transport_closed(now, "network");

        while channel.state() == ChannelState::Lost {
            now = channel.retry_at().unwrap();
            assert_eq!(channel.tick(now), vec![ChannelAction::Connect]);
            actions = channel.transport_closed(now, "refused");
        }

        assert_eq!(channel.state(), ChannelState::Failed);
        assert_eq!(actions, vec![ChannelAction::Failed(ChannelError::Lost {
            attempts: DEFAULT_MAX_ATTEMPTS
        })]);
        assert!(channel.tick(now + secs(60)).is_empty());
    }

    #[test]
    fn fixed_policy_retries_forever() {
        let config = ChannelConfig {
            reconnect: ReconnectPolicy::fixed(secs(1)),
            ..ChannelConfig::default()
        };
        let mut channel = open_channel(config);
        let mut now = secs(0);

        for _ in 0..100 {
            channel.transport_closed(now, "refused");
            assert_eq!(channel.state(), ChannelState::Lost);
            now += secs(1);
            assert_eq!(channel.tick(now), vec![ChannelAction::Connect]);
        }
    }

    #[test]
    fn self_resets_failure_counter() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.transport_closed(secs(0), "refused");
        channel.tick(secs(1));
        channel.transport_closed(secs(1), "refused");
        channel.tick(secs(3));
        assert_eq!(channel.failures(), 2);

        channel.transport_opened(secs(3)).unwrap();
        assert_eq!(channel.failures(), 2, "open alone is not a usable connection");

        channel.receive(SELF).unwrap();
        assert_eq!(channel.failures(), 0);
    }

    #[test]
    fn identity_timeout_drops_connection() {
        let mut channel = open_channel(ChannelConfig::default());

        assert!(channel.tick(secs(29)).is_empty());

        let actions = channel.tick(secs(30));
        assert!(matches!(&actions[..], [ChannelAction::Disconnect { reason }] if reason.contains("self")));
        assert_eq!(channel.state(), ChannelState::Lost);
        assert_eq!(channel.retry_at(), Some(secs(31)));

        // The transport's own close report arrives afterwards and is ignored.
        assert!(channel.transport_closed(secs(30), "closed").is_empty());
        assert_eq!(channel.state(), ChannelState::Lost);
    }

    #[test]
    fn identity_timeout_disabled_stalls() {
        let config = ChannelConfig { identity_timeout: None, ..ChannelConfig::default() };
        let mut channel = open_channel(config);

        assert!(channel.tick(secs(3600)).is_empty());
        assert_eq!(channel.state(), ChannelState::Open);
    }

    #[test]
    fn close_while_lost_cancels_reconnect() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.transport_closed(secs(0), "network");

        assert!(channel.close().is_empty());
        assert_eq!(channel.state(), ChannelState::Closed);
        assert!(channel.tick(secs(10)).is_empty());
    }

    #[test]
    fn teardown_invalidates_channel() {
        let mut channel = open_channel(ChannelConfig::default());
        channel.receive(SELF).unwrap();

        let actions = channel.teardown();
        assert!(matches!(actions[..], [ChannelAction::Disconnect { .. }]));
        assert_eq!(channel.state(), ChannelState::Closed);

        assert!(matches!(channel.receive(SELF), Err(ChannelError::InvalidState { .. })));
        assert!(channel.transport_closed(secs(1), "closed").is_empty());
        assert!(channel.tick(secs(100)).is_empty());
        assert!(channel.start().is_err());
    }
}
