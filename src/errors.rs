use crate::capability::ResponseMode;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResponseError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response was destroyed")]
    Destroyed,

    #[error("Request timed out")]
    Timeout,

    #[error("Platform stream reader error: {0}")]
    PlatformReader(String),

    #[error("Mode {mode} requires a {expected} transport")]
    ModeMismatch {
        mode: ResponseMode,
        expected: &'static str,
    },

    #[error("Invalid host facts: {0}")]
    InvalidHostFacts(String),
}

/// Returned by a body that has no native pipe. The streaming bridge catches this and falls back
/// to reading chunks manually; it never reaches the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Body cannot be piped")]
pub struct PipeUnsupported;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(ResponseError::Destroyed.to_string(), "Response was destroyed");
        assert_eq!(
            ResponseError::Transport("connection reset".into()).to_string(),
            "Transport error: connection reset"
        );
        let e = ResponseError::ModeMismatch {
            mode: ResponseMode::Streaming,
            expected: "fetch",
        };
        assert_eq!(e.to_string(), "Mode streaming requires a fetch transport");
    }
}
