pub type ReCanvasResult<T> = Result<T, ReCanvasError>;

#[derive(thiserror::Error, Debug)]
pub enum ReCanvasError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("argument error: {0}")]
    Argument(String),

    #[error("asset error: {0}")]
    Asset(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("host error: {0}")]
    Host(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReCanvasError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn argument(msg: impl Into<String>) -> Self {
        Self::Argument(msg.into())
    }

    pub fn asset(msg: impl Into<String>) -> Self {
        Self::Asset(msg.into())
    }

    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn host(msg: impl Into<String>) -> Self {
        Self::Host(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            ReCanvasError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            ReCanvasError::argument("x")
                .to_string()
                .contains("argument error:")
        );
        assert!(ReCanvasError::asset("x").to_string().contains("asset error:"));
        assert!(ReCanvasError::fetch("x").to_string().contains("fetch error:"));
        assert!(ReCanvasError::host("x").to_string().contains("host error:"));
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = ReCanvasError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
