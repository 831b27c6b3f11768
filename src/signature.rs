//! Time-windowed access tokens.
//!
//! A caller proves it knows the shared access password by sending
//! `md5("<password>:<timestamp_ms>")` instead of the password itself. The
//! verifier recomputes candidates for the last 30 seconds at one-second steps,
//! so a token stays valid for at most the window and needs no server state.

use std::time::Duration;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);
const STEP_MS: i64 = 1000;

/// Deterministic token for `(secret, timestamp_ms)`.
pub fn sign(secret: &str, timestamp_ms: i64) -> String {
    format!("{:x}", md5::compute(format!("{secret}:{timestamp_ms}")))
}

/// Checks `signature` against [`DEFAULT_WINDOW`] ending at `now_ms`.
pub fn verify(signature: &str, secret: &str, now_ms: i64) -> bool {
    Verifier::default().verify(signature, secret, now_ms)
}

#[derive(Debug, Clone, Copy)]
pub struct Verifier {
    window: Duration,
}

impl Default for Verifier {
    fn default() -> Self {
        Self { window: DEFAULT_WINDOW }
    }
}

impl Verifier {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// True when `signature == sign(secret, t)` for some sampled `t` in
    /// `[now_ms - window, now_ms]`.
    ///
    /// Two lattices are sampled: `now_ms - k*1000`, which accepts a token
    /// signed exactly k seconds ago, and the same steps from `now_ms` rounded
    /// down to the whole second, which accepts tokens from signers that
    /// truncate their clock (see [`SignedRequest::now`]). Samples outside the
    /// window or outside the `i64` range are skipped.
    ///
    /// An empty secret means access control is disabled and every token passes.
    pub fn verify(&self, signature: &str, secret: &str, now_ms: i64) -> bool {
        if secret.is_empty() {
            return true;
        }
        let signature = signature.trim();
        if signature.is_empty() {
            return false;
        }

        let window_ms = i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX);
        let oldest = now_ms.saturating_sub(window_ms);
        let aligned = now_ms.checked_sub(now_ms.rem_euclid(STEP_MS));
        let matches = |t: Option<i64>| t.is_some_and(|t| sign(secret, t) == signature);

        (0..=window_ms / STEP_MS).any(|k| {
            let offset = k * STEP_MS;
            matches(now_ms.checked_sub(offset))
                || matches(
                    aligned
                        .filter(|a| *a != now_ms)
                        .and_then(|a| a.checked_sub(offset))
                        .filter(|t| *t >= oldest),
                )
        })
    }
}

/// A signature plus the timestamp it was computed for. Built fresh for each
/// outbound call and never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedRequest {
    pub signature: String,
    pub timestamp_ms: i64,
}

impl SignedRequest {
    pub fn new(secret: &str, timestamp_ms: i64) -> Self {
        Self {
            signature: sign(secret, timestamp_ms),
            timestamp_ms,
        }
    }

    /// Signs the current time, truncated to the whole second.
    pub fn now(secret: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self::new(secret, now.saturating_sub(now.rem_euclid(STEP_MS)))
    }
}
