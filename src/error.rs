pub type StepdocResult<T> = Result<T, StepdocError>;

#[derive(thiserror::Error, Debug)]
pub enum StepdocError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("geometry error: {0}")]
    Geometry(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StepdocError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn geometry(msg: impl Into<String>) -> Self {
        Self::Geometry(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            StepdocError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            StepdocError::geometry("x")
                .to_string()
                .contains("geometry error:")
        );
        assert!(
            StepdocError::render("x")
                .to_string()
                .contains("render error:")
        );
        assert!(
            StepdocError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = StepdocError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
