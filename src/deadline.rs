use crate::error::{AppError, AppResult};
use std::future::Future;
use std::time::Duration;

/// Runs `fut` under a deadline, mapping an elapsed deadline to
/// `AppError::QueryTimeout` rather than letting an outbound query run
/// unbounded. Cancels `fut` in place — a timed-out query is dropped, not
/// awaited to completion, so nothing it would have produced is cached
/// or persisted.
pub async fn with_deadline<T>(deadline: Duration, fut: impl Future<Output = AppResult<T>>) -> AppResult<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::QueryTimeout),
    }
}

/// Same as `with_deadline`, for the batch engines that work in
/// `anyhow::Result` rather than `AppResult`.
pub async fn with_deadline_anyhow<T>(
    deadline: Duration,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> anyhow::Result<T> {
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("query exceeded its deadline")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completes_normally_within_the_deadline() {
        let result = with_deadline(Duration::from_millis(50), async { Ok::<_, AppError>(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn exceeding_the_deadline_yields_query_timeout() {
        let result = with_deadline(Duration::from_millis(5), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, AppError>(7)
        })
        .await;
        assert!(matches!(result, Err(AppError::QueryTimeout)));
    }
}
