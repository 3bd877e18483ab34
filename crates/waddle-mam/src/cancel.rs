//! Binding archive work to a caller-supplied cancellation signal.

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::MamError;

/// Run `fut` until it completes or `cancel` fires.
///
/// Cancellation wins ties so that an already cancelled caller never starts
/// new storage work.
pub async fn run_cancellable<T, E, F>(cancel: &CancellationToken, fut: F) -> Result<T, MamError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<MamError>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MamError::Cancelled),
        result = fut => result.map_err(Into::into),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_completes_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let value = run_cancellable(&cancel, async { Ok::<_, MamError>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = run_cancellable(&cancel, async { Ok::<_, MamError>(7) }).await;
        assert!(matches!(result, Err(MamError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_while_pending() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = run_cancellable(&cancel, async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, MamError>(())
        })
        .await;
        assert!(matches!(result, Err(MamError::Cancelled)));
    }
}
