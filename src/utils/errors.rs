use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BundleServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bundler error: {message}")]
    Bundler {
        message: String,
        entry: Option<PathBuf>,
    },

    #[error("Write error for {}: {message}", path.display())]
    Write { message: String, path: PathBuf },

    #[error("{0}")]
    Other(String),
}

impl BundleServeError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a bundler error without an entry point
    pub fn bundler(message: impl Into<String>) -> Self {
        Self::Bundler {
            message: message.into(),
            entry: None,
        }
    }

    /// Create a bundler error tied to the entry point being bundled
    pub fn bundler_for(message: impl Into<String>, entry: PathBuf) -> Self {
        Self::Bundler {
            message: message.into(),
            entry: Some(entry),
        }
    }

    pub fn write(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Write {
            message: message.into(),
            path,
        }
    }

    /// Format error with the entry point, when one is known
    pub fn format_detailed(&self) -> String {
        match self {
            BundleServeError::Bundler {
                message,
                entry: Some(entry),
            } => format!("Bundler error: {}\n  entry: {}", message, entry.display()),
            _ => self.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, BundleServeError>;

/// Fail with a configuration error unless `condition` holds.
pub fn precondition(condition: bool, message: &str) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(BundleServeError::config(message))
    }
}

impl From<serde_json::Error> for BundleServeError {
    fn from(err: serde_json::Error) -> Self {
        BundleServeError::Other(format!("JSON error: {}", err))
    }
}
