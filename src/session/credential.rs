//! Credential acquisition with linear backoff

use super::{Credential, IdentityProvider};
use crate::config::RetryPolicy;

/// Ask the identity provider for a token, retrying while it has none.
///
/// `None` after the last attempt is an ordinary outcome: the identity
/// session may not have propagated yet after a very recent login.
pub async fn acquire_credential(
    provider: &dyn IdentityProvider,
    policy: RetryPolicy,
) -> Option<Credential> {
    for attempt in 1..=policy.max_attempts {
        match provider.fetch_token().await {
            Ok(Some(token)) => {
                tracing::debug!(attempt, "Credential acquired");
                return Some(token);
            }
            Ok(None) => tracing::debug!(attempt, "Identity provider has no token yet"),
            Err(e) => tracing::debug!(attempt, error = %e, "Token request failed"),
        }

        if let Some(delay) = policy.delay_after(attempt) {
            tokio::time::sleep(delay).await;
        }
    }

    tracing::warn!(
        attempts = policy.max_attempts,
        "No credential available after retries"
    );
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CREDENTIAL_RETRY;
    use crate::session::testing::MockIdentity;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts_with_linear_backoff() {
        let identity = MockIdentity::logged_in();
        let start = tokio::time::Instant::now();

        let result = acquire_credential(&identity, CREDENTIAL_RETRY).await;

        assert!(result.is_none());
        assert_eq!(identity.calls(), 5);
        // 150 + 300 + 450 + 600, no wait after the final attempt
        assert!(start.elapsed() >= Duration::from_millis(1500));
        assert!(start.elapsed() < Duration::from_millis(1500 + 750));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_available_token() {
        let identity = MockIdentity::logged_in()
            .queue_token(None)
            .queue_token(Some("jwt-abc"));
        let start = tokio::time::Instant::now();

        let result = acquire_credential(&identity, CREDENTIAL_RETRY).await;

        assert_eq!(result, Some(Credential::new("jwt-abc")));
        assert_eq!(identity.calls(), 2);
        assert_eq!(start.elapsed(), Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_token_does_not_sleep() {
        let identity = MockIdentity::logged_in().queue_token(Some("jwt"));
        let start = tokio::time::Instant::now();

        assert!(acquire_credential(&identity, CREDENTIAL_RETRY).await.is_some());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
