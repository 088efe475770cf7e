use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, AnchorError>;

#[derive(Debug, thiserror::Error)]
pub enum AnchorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("malformed label record at line {line}: {reason}")]
    MalformedRecord { line: usize, reason: String },

    #[error("read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config: {0}")]
    Config(String),
}

impl AnchorError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        AnchorError::InvalidArgument(msg.into())
    }

    pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
        AnchorError::MalformedRecord { line, reason: reason.into() }
    }
}

/// `anyhow::ensure!`-style early return with an `InvalidArgument`.
macro_rules! ensure_arg {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::AnchorError::InvalidArgument(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_arg;
