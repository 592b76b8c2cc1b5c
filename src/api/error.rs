use thiserror::Error;

/// Login failures as surfaced to the UI layer.
///
/// Nothing here is retried automatically; retry policy, if any, belongs to
/// the caller.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many login attempts - please wait before retrying")]
    RateLimited,

    #[error("Network error: {0}")]
    Unreachable(#[from] reqwest::Error),

    #[error("Gateway error: {0}")]
    Server(String),
}

/// Maximum length for response bodies echoed into error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl GatewayError {
    /// Truncate a response body to avoid carrying excessive data in errors
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        // Back off to a char boundary so the slice cannot panic
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        match status.as_u16() {
            401 => GatewayError::InvalidCredentials,
            429 => GatewayError::RateLimited,
            _ => GatewayError::Server(format!(
                "Status {}: {}",
                status,
                Self::truncate_body(body)
            )),
        }
    }
}
