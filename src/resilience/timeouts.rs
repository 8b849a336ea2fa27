//! Deadlines for external calls.

use std::future::Future;
use std::time::Duration;

use crate::acme::AcquireError;

/// Run an acquisition under `limit`, mapping expiry to `AcquireError::Timeout`.
///
/// Applied by the orchestrator on top of whatever deadline the acquirer
/// enforces itself, so a misbehaving implementation cannot stall a pass.
pub async fn acquire_with_deadline<F>(limit: Duration, fut: F) -> Result<(), AcquireError>
where
    F: Future<Output = Result<(), AcquireError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AcquireError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deadline_expires() {
        let result = acquire_with_deadline(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(AcquireError::Timeout(Duration::from_millis(20))));
    }

    #[tokio::test]
    async fn test_inner_result_passes_through() {
        let err = AcquireError::RateLimited("slow down".to_string());
        let result = acquire_with_deadline(Duration::from_secs(1), async { Err(err.clone()) }).await;
        assert_eq!(result, Err(err));
    }
}
