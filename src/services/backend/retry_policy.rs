use super::ClientError;

pub(super) fn should_retry_reqwest_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

/// Status-carrying failures worth another attempt on an idempotent call.
pub(super) fn should_retry_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::BAD_GATEWAY
        || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
}

/// One failed attempt, tagged with whether the retry loop may try again.
#[derive(Debug)]
pub(super) struct AttemptError {
    pub(super) error: ClientError,
    pub(super) retryable: bool,
}

impl AttemptError {
    pub(super) fn fatal(error: ClientError) -> Self {
        Self {
            error,
            retryable: false,
        }
    }

    pub(super) fn status(status: reqwest::StatusCode) -> Self {
        Self {
            error: ClientError::backend(format!("HTTP {}", status)),
            retryable: should_retry_status(status),
        }
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            retryable: should_retry_reqwest_error(&err),
            error: err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_on_gateway_statuses() {
        assert!(should_retry_status(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        assert!(should_retry_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(!should_retry_status(reqwest::StatusCode::NOT_FOUND));
        assert!(!should_retry_status(reqwest::StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_status_attempt_error() {
        let err = AttemptError::status(reqwest::StatusCode::BAD_GATEWAY);
        assert!(err.retryable);
        assert_eq!(err.error, ClientError::backend("HTTP 502 Bad Gateway"));

        let err = AttemptError::status(reqwest::StatusCode::NOT_FOUND);
        assert!(!err.retryable);
    }
}
