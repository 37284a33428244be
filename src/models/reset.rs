use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};

/// Minutes a 6-digit code stays valid after issuance.
pub const CODE_TTL_MINUTES: i64 = 30;
/// Minutes a minted reset token stays exchangeable.
pub const TOKEN_TTL_MINUTES: i64 = 15;
/// Consecutive failed verifications before the active code is dead.
pub const MAX_VERIFY_ATTEMPTS: i32 = 5;
/// Issuances allowed per email inside one rolling window.
pub const MAX_REQUESTS_PER_WINDOW: i32 = 5;
pub const REQUEST_WINDOW_MINUTES: i64 = 60;

const MINUTE_MILLIS: i64 = 60_000;

/// Pending password-reset state, one document per email.
///
/// Lifecycle: created on forgot-password, code replaced on resend,
/// promoted to a token on successful verification, consumed on password
/// change. A record whose code and token have both expired is inert and
/// simply overwritten by the next request.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PendingReset {
    pub email: String,
    pub code: String,            // 6-digit code
    pub code_created_at: DateTime,
    pub failed_attempts: i32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_created_at: Option<DateTime>,
    pub consumed: bool,

    // issuance throttle bookkeeping
    pub request_count: i32,
    pub window_started_at: DateTime,
}

impl PendingReset {
    pub fn new(email: impl Into<String>, code: impl Into<String>, now: DateTime) -> Self {
        Self {
            email: email.into(),
            code: code.into(),
            code_created_at: now,
            failed_attempts: 0,
            reset_token: None,
            token_created_at: None,
            consumed: false,
            request_count: 1,
            window_started_at: now,
        }
    }

    /// Replace the active code, invalidating any prior code, token, and
    /// attempt history. Throttle counters carry over within the window.
    pub fn reissue(&mut self, code: impl Into<String>, now: DateTime) {
        if self.window_elapsed(now) {
            self.request_count = 1;
            self.window_started_at = now;
        } else {
            self.request_count += 1;
        }
        self.code = code.into();
        self.code_created_at = now;
        self.failed_attempts = 0;
        self.reset_token = None;
        self.token_created_at = None;
        self.consumed = false;
    }

    fn window_elapsed(&self, now: DateTime) -> bool {
        now.timestamp_millis() - self.window_started_at.timestamp_millis()
            >= REQUEST_WINDOW_MINUTES * MINUTE_MILLIS
    }

    /// Whether another code may be issued for this email right now.
    pub fn issuance_allowed(&self, now: DateTime) -> bool {
        self.window_elapsed(now) || self.request_count < MAX_REQUESTS_PER_WINDOW
    }

    pub fn code_expired(&self, now: DateTime) -> bool {
        now.timestamp_millis() - self.code_created_at.timestamp_millis()
            > CODE_TTL_MINUTES * MINUTE_MILLIS
    }

    pub fn locked_out(&self) -> bool {
        self.failed_attempts >= MAX_VERIFY_ATTEMPTS
    }

    /// A code is verifiable only while it has not been promoted to a
    /// token, consumed, locked, or aged out.
    pub fn code_active(&self, now: DateTime) -> bool {
        !self.consumed && self.reset_token.is_none() && !self.locked_out() && !self.code_expired(now)
    }

    pub fn promote(&mut self, token: impl Into<String>, now: DateTime) {
        self.reset_token = Some(token.into());
        self.token_created_at = Some(now);
        self.failed_attempts = 0;
    }

    pub fn token_expired(&self, now: DateTime) -> bool {
        match self.token_created_at {
            Some(created) => {
                now.timestamp_millis() - created.timestamp_millis()
                    > TOKEN_TTL_MINUTES * MINUTE_MILLIS
            }
            None => true,
        }
    }

    /// Whether the stored token may still be exchanged for a password change.
    pub fn token_active(&self, now: DateTime) -> bool {
        !self.consumed && self.reset_token.is_some() && !self.token_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(minutes: i64) -> DateTime {
        DateTime::from_millis(minutes * MINUTE_MILLIS)
    }

    #[test]
    fn fresh_code_is_active() {
        let record = PendingReset::new("user@example.com", "482913", at(0));
        assert!(record.code_active(at(0)));
        assert!(record.code_active(at(30)));
    }

    #[test]
    fn code_dies_after_thirty_minutes() {
        let record = PendingReset::new("user@example.com", "482913", at(0));
        assert!(!record.code_expired(at(30)));
        assert!(record.code_expired(at(31)));
        assert!(!record.code_active(at(31)));
    }

    #[test]
    fn reissue_replaces_code_and_resets_state() {
        let mut record = PendingReset::new("user@example.com", "111111", at(0));
        record.failed_attempts = 3;
        record.promote("old-token", at(1));

        record.reissue("222222", at(2));

        assert_eq!(record.code, "222222");
        assert_eq!(record.failed_attempts, 0);
        assert!(record.reset_token.is_none());
        assert!(!record.consumed);
        assert_eq!(record.request_count, 2);
    }

    #[test]
    fn promoted_code_is_no_longer_verifiable() {
        let mut record = PendingReset::new("user@example.com", "482913", at(0));
        record.promote("abc123", at(1));
        assert!(!record.code_active(at(1)));
        assert!(record.token_active(at(1)));
    }

    #[test]
    fn lockout_after_max_attempts() {
        let mut record = PendingReset::new("user@example.com", "482913", at(0));
        record.failed_attempts = MAX_VERIFY_ATTEMPTS - 1;
        assert!(record.code_active(at(1)));
        record.failed_attempts += 1;
        assert!(record.locked_out());
        assert!(!record.code_active(at(1)));
    }

    #[test]
    fn token_expires_after_fifteen_minutes() {
        let mut record = PendingReset::new("user@example.com", "482913", at(0));
        record.promote("abc123", at(5));
        assert!(record.token_active(at(20)));
        assert!(!record.token_active(at(21)));
    }

    #[test]
    fn consumed_token_is_dead() {
        let mut record = PendingReset::new("user@example.com", "482913", at(0));
        record.promote("abc123", at(1));
        record.consumed = true;
        assert!(!record.token_active(at(2)));
        assert!(!record.code_active(at(2)));
    }

    #[test]
    fn issuance_throttles_inside_window() {
        let mut record = PendingReset::new("user@example.com", "111111", at(0));
        for minute in 1..MAX_REQUESTS_PER_WINDOW as i64 {
            assert!(record.issuance_allowed(at(minute)));
            record.reissue("111111", at(minute));
        }
        assert_eq!(record.request_count, MAX_REQUESTS_PER_WINDOW);
        assert!(!record.issuance_allowed(at(10)));

        // window rolls over an hour after it opened
        assert!(record.issuance_allowed(at(60)));
        record.reissue("222222", at(60));
        assert_eq!(record.request_count, 1);
    }
}
