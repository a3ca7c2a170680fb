/// Failure talking to the media server or a statistics backend
///
/// These are always transient from the engine's point of view: the next
/// poll cycle retries.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("refusing malformed user id {0:?}")]
    InvalidUserId(String),
}

impl RemoteError {
    pub(crate) fn transport(url: &str, source: reqwest::Error) -> Self {
        Self::Transport {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn decode(url: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            url: url.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the request never got an answer in time
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_timeout())
    }
}
