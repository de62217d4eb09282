use thiserror::Error;

/// Errors produced by the webblock protocol layer.
#[derive(Debug, Error)]
pub enum BlockerError {
    #[error("codec error: {0}")]
    Codec(String),

    #[error("invalid message: {0}")]
    InvalidMessage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("timeout")]
    Timeout,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for BlockerError {
    fn from(e: serde_json::Error) -> Self {
        BlockerError::Codec(e.to_string())
    }
}

pub type BlockerResult<T> = Result<T, BlockerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversions_pick_the_matching_variant() {
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(BlockerError::from(json_err), BlockerError::Codec(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = BlockerError::from(io_err);
        assert!(matches!(err, BlockerError::Io(_)));
        assert_eq!(err.to_string(), "io error: refused");

        assert_eq!(BlockerError::Timeout.to_string(), "timeout");
        assert_eq!(
            BlockerError::Config("port".into()).to_string(),
            "config error: port"
        );
    }
}
