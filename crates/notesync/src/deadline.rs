//! Upper bounds for calls that cross the process boundary.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{Error, Result};

/// Run `call`, failing with [`Error::Timeout`] if it takes longer than `limit`.
pub(crate) async fn within<T, E>(
    operation: &str,
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, E>>,
) -> Result<T>
where
    E: Into<Error>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => {
            warn!(operation, limit_ms = limit.as_millis(), "Operation timed out");
            Err(Error::timeout(operation))
        }
    }
}
