//! DTMF validation lifecycle (§4.6) — a small per-call state machine
//! driving the caller through a PIN challenge before the orchestrator is
//! enabled.
//!
//! Pure transition functions + tests in the teacher's style: state in,
//! event in, state out, no I/O.

use chrono::{DateTime, Utc};

use va_domain::config::DtmfConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtmfState {
    AwaitingPromptPlay,
    CollectingDigits,
    Validated,
    Failed,
}

#[derive(Debug, Clone)]
pub enum DtmfEvent {
    Connected,
    PromptPlayStarted,
    DigitReceived(char),
    CollectTimerExpired,
}

/// Raised alongside a transition so the Turn Controller / Call Event
/// Processor can react (start greeting, play a retry prompt, disconnect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtmfOutcome {
    None,
    Validated,
    FailedRetry { attempt: u32 },
    FailedTerminal,
}

/// Per-call DTMF validation state. Lives inside the owning session's
/// `context.validation` — never shared across sessions (§4.6 contract).
#[derive(Debug, Clone)]
pub struct DtmfLifecycle {
    config: DtmfConfig,
    state: DtmfState,
    digit_buffer: String,
    attempts: u32,
    collecting_since: Option<DateTime<Utc>>,
}

impl DtmfLifecycle {
    pub fn new(config: DtmfConfig) -> Self {
        Self {
            config,
            state: DtmfState::AwaitingPromptPlay,
            digit_buffer: String::new(),
            attempts: 0,
            collecting_since: None,
        }
    }

    pub fn state(&self) -> DtmfState {
        self.state
    }

    pub fn digit_buffer(&self) -> &str {
        &self.digit_buffer
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Apply one event, returning the outcome to raise (if any). `now` is
    /// passed in rather than read from the clock so the collect-timeout
    /// check is deterministic under test.
    pub fn apply(&mut self, event: DtmfEvent, now: DateTime<Utc>) -> DtmfOutcome {
        match (self.state, event) {
            (DtmfState::AwaitingPromptPlay, DtmfEvent::PromptPlayStarted) => {
                self.state = DtmfState::CollectingDigits;
                self.collecting_since = Some(now);
                DtmfOutcome::None
            }
            (DtmfState::CollectingDigits, DtmfEvent::DigitReceived(digit)) => {
                self.digit_buffer.push(digit);
                self.evaluate_buffer()
            }
            (DtmfState::CollectingDigits, DtmfEvent::CollectTimerExpired) => self.fail(),
            (state, DtmfEvent::Connected) if state == DtmfState::AwaitingPromptPlay => {
                DtmfOutcome::None
            }
            // Any other (state, event) pair is a no-op: stray digits after
            // validation/failure, a duplicate prompt-started signal, etc.
            _ => DtmfOutcome::None,
        }
    }

    fn evaluate_buffer(&mut self) -> DtmfOutcome {
        if self.digit_buffer == self.config.expected_sequence {
            self.state = DtmfState::Validated;
            return DtmfOutcome::Validated;
        }
        if self.digit_buffer.len() > self.config.max_digits
            || !self
                .config
                .expected_sequence
                .starts_with(self.digit_buffer.as_str())
        {
            return self.fail();
        }
        DtmfOutcome::None
    }

    fn fail(&mut self) -> DtmfOutcome {
        self.attempts += 1;
        self.digit_buffer.clear();
        if self.attempts >= self.config.max_attempts {
            self.state = DtmfState::Failed;
            DtmfOutcome::FailedTerminal
        } else {
            self.state = DtmfState::AwaitingPromptPlay;
            DtmfOutcome::FailedRetry { attempt: self.attempts }
        }
    }

    /// Whether the collect timer has expired relative to `now`, for
    /// callers driving this off a periodic tick rather than a per-call
    /// timer task.
    pub fn collect_timer_expired(&self, now: DateTime<Utc>) -> bool {
        match self.collecting_since {
            Some(since) => {
                now.signed_duration_since(since).num_seconds()
                    >= self.config.collect_timeout_sec as i64
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> DtmfConfig {
        DtmfConfig {
            expected_sequence: "1234".into(),
            max_digits: 8,
            collect_timeout_sec: 20,
            max_attempts: 3,
        }
    }

    #[test]
    fn prompt_play_moves_to_collecting() {
        let mut lc = DtmfLifecycle::new(config());
        let outcome = lc.apply(DtmfEvent::PromptPlayStarted, Utc::now());
        assert_eq!(lc.state(), DtmfState::CollectingDigits);
        assert_eq!(outcome, DtmfOutcome::None);
    }

    #[test]
    fn correct_sequence_validates() {
        let mut lc = DtmfLifecycle::new(config());
        let now = Utc::now();
        lc.apply(DtmfEvent::PromptPlayStarted, now);
        for d in "123".chars() {
            assert_eq!(lc.apply(DtmfEvent::DigitReceived(d), now), DtmfOutcome::None);
        }
        let outcome = lc.apply(DtmfEvent::DigitReceived('4'), now);
        assert_eq!(outcome, DtmfOutcome::Validated);
        assert_eq!(lc.state(), DtmfState::Validated);
    }

    #[test]
    fn wrong_digit_fails_fast_and_retries() {
        let mut lc = DtmfLifecycle::new(config());
        let now = Utc::now();
        lc.apply(DtmfEvent::PromptPlayStarted, now);
        lc.apply(DtmfEvent::DigitReceived('9'), now);
        let outcome = lc.apply(DtmfEvent::DigitReceived('9'), now);
        assert_eq!(outcome, DtmfOutcome::FailedRetry { attempt: 1 });
        assert_eq!(lc.state(), DtmfState::AwaitingPromptPlay);
        assert!(lc.digit_buffer().is_empty());
    }

    #[test]
    fn exhausting_attempts_is_terminal() {
        let mut lc = DtmfLifecycle::new(config());
        let now = Utc::now();
        for _ in 0..3 {
            lc.apply(DtmfEvent::PromptPlayStarted, now);
            let outcome = lc.apply(DtmfEvent::DigitReceived('9'), now);
            if lc.attempts() < 3 {
                assert_eq!(outcome, DtmfOutcome::FailedRetry { attempt: lc.attempts() });
            } else {
                assert_eq!(outcome, DtmfOutcome::FailedTerminal);
            }
        }
        assert_eq!(lc.state(), DtmfState::Failed);
    }

    #[test]
    fn collect_timer_expiry_counts_as_a_failed_attempt() {
        let mut lc = DtmfLifecycle::new(config());
        let t0 = Utc::now();
        lc.apply(DtmfEvent::PromptPlayStarted, t0);
        let outcome = lc.apply(DtmfEvent::CollectTimerExpired, t0 + chrono::Duration::seconds(21));
        assert_eq!(outcome, DtmfOutcome::FailedRetry { attempt: 1 });
    }

    #[test]
    fn collect_timer_expired_helper_respects_configured_timeout() {
        let mut lc = DtmfLifecycle::new(config());
        let t0 = Utc::now();
        lc.apply(DtmfEvent::PromptPlayStarted, t0);
        assert!(!lc.collect_timer_expired(t0 + chrono::Duration::seconds(5)));
        assert!(lc.collect_timer_expired(t0 + chrono::Duration::seconds(21)));
    }

    #[test]
    fn validation_state_is_per_instance_not_shared() {
        let mut a = DtmfLifecycle::new(config());
        let b = DtmfLifecycle::new(config());
        a.apply(DtmfEvent::PromptPlayStarted, Utc::now());
        a.apply(DtmfEvent::DigitReceived('1'), Utc::now());
        assert_eq!(a.digit_buffer(), "1");
        assert_eq!(b.digit_buffer(), "");
    }
}
