//! Error handling for the kmerpath CLI

use kmerpath_core::CompactError;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for kmerpath CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Input/Output error: {message}")]
    Io { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Parsing error in {file} line {line}: {message}")]
    Parse { file: String, line: usize, message: String },

    #[error("Compaction error: {0}")]
    Compaction(#[from] CompactError),

    #[error("Validation error: {message}")]
    Validation { message: String },
}

impl CliError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io { message: message.into() }
    }

    pub fn file_not_found(path: PathBuf) -> Self {
        Self::FileNotFound { path }
    }

    pub fn parse<S: Into<String>, M: Into<String>>(file: S, line: usize, message: M) -> Self {
        Self::Parse {
            file: file.into(),
            line,
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into() }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<toml::de::Error> for CliError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(format!("TOML parsing error: {}", err))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::io(format!("JSON serialization error: {}", err))
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Error message, with its context chain, and hints on how to fix the input
pub fn format_error_with_suggestions(error: &anyhow::Error) -> String {
    let mut message = format!("{:#}", error);

    let Some(cli_error) = error.downcast_ref::<CliError>() else {
        return message;
    };
    match cli_error {
        CliError::FileNotFound { path } => {
            message.push_str(&format!(
                "\n\nSuggestions:\n\
                 • Check that the file path is correct: {}\n\
                 • Ensure you have read permissions for the file",
                path.display()
            ));
        }

        CliError::Parse { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Each line must hold: bases start end ref(0/1) weight\n\
                 • Fields are separated by tabs, lines starting with '#' are ignored",
            );
        }

        CliError::Compaction(err) if err.is_precondition() => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Sort observations by start position\n\
                 • Check that -k matches the length of the input k-mers\n\
                 • Raise --max-width if observation intervals are wider",
            );
        }

        CliError::Config { .. } => {
            message.push_str(
                "\n\nSuggestions:\n\
                 • Check your kmerpath.toml configuration file\n\
                 • Use 'kmerpath config' to print a sample configuration",
            );
        }

        _ => {}
    }

    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CliError::config("test message");
        assert!(matches!(err, CliError::Config { .. }));
        assert_eq!(err.to_string(), "Configuration error: test message");
    }

    #[test]
    fn test_error_suggestions() {
        let err = anyhow::Error::from(CliError::file_not_found(PathBuf::from("obs.tsv")));
        let formatted = format_error_with_suggestions(&err);
        assert!(formatted.contains("Suggestions:"));
        assert!(formatted.contains("Check that the file path is correct"));

        let err = anyhow::Error::from(CliError::from(CompactError::UnsortedInput { previous: 5, start: 2 }))
            .context("Failed to compact obs.tsv");
        let formatted = format_error_with_suggestions(&err);
        assert!(formatted.starts_with("Failed to compact obs.tsv: Compaction error"));
        assert!(formatted.contains("Sort observations"));

        let plain = anyhow::anyhow!("something else");
        assert_eq!(format_error_with_suggestions(&plain), "something else");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let cli_err: CliError = io_err.into();
        assert!(matches!(cli_err, CliError::Io { .. }));
    }
}
