use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Bad response for {url}: status {status}: {body}")]
    BadStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Duplicate request in manifest: {0}")]
    DuplicateRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Install failed: {0}")]
    InstallFailed(#[source] Box<Error>),

    #[error("Install already in progress")]
    InstallInProgress,
}

/// A specialized `Result` type for offline cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl Error {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(url: &str, status: u16, body: &str) -> Self {
        Error::BadStatus {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(Error::truncate_body("not found"), "not found");
    }

    #[test]
    fn test_truncate_body_long() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        let truncated = Error::truncate_body(&body);
        assert!(truncated.starts_with(&"x".repeat(MAX_ERROR_BODY_LENGTH)));
        assert!(truncated.ends_with("(truncated, 520 total bytes)"));
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        // 'ł' is two bytes, so byte 500 lands mid-character
        let body = format!("a{}", "ł".repeat(300));
        let truncated = Error::truncate_body(&body);
        assert!(truncated.contains("... (truncated"));
    }

    #[test]
    fn test_from_status_message() {
        let err = Error::from_status("http://localhost/audio/13.mp3", 404, "missing");
        assert_eq!(
            err.to_string(),
            "Bad response for http://localhost/audio/13.mp3: status 404: missing"
        );
    }
}
