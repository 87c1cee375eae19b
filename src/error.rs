use std::path::PathBuf;

use thiserror::Error;

/// A rule's match expression failed to compile.
#[derive(Debug, Error)]
#[error("invalid pattern `{pattern}`: {source}")]
pub struct PatternError {
    pub pattern: String,
    #[source]
    pub source: regex::Error,
}

/// A counter placeholder could not be resolved to a number.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormatError {
    #[error("placeholder body `{0}` is not a counter pattern")]
    Malformed(String),
    #[error("offset in placeholder `{0}` is not a valid integer")]
    BadOffset(String),
    #[error("counter value overflows in placeholder `{0}`")]
    Overflow(String),
    #[error("placeholder pads to {0} digits, more than the formatter supports")]
    TooWide(usize),
}

/// A whole pass over the title set failed.
#[derive(Debug, Error)]
#[error("chapter title pipeline failed: {0}")]
pub struct PipelineError(pub String);

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input directory `{}` not found", .0.display())]
    NotADirectory(PathBuf),
    #[error("no audio files found in `{}`", .0.display())]
    NoAudioFiles(PathBuf),
    #[error("failed to probe `{}`: {message}", .path.display())]
    Probe { path: PathBuf, message: String },
    #[error("invalid duration {duration} for `{}`", .path.display())]
    InvalidDuration { path: PathBuf, duration: f64 },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("{0} not found, please install ffmpeg")]
    MissingTool(&'static str),
    #[error("expected {expected} chapter titles, got {actual}")]
    TitleCount { expected: usize, actual: usize },
    #[error("ffmpeg exited with code {code}: {stderr}")]
    Ffmpeg { code: i32, stderr: String },
    #[error("conversion stopped by user")]
    Cancelled,
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RulesFileError {
    #[error("failed to read rules file `{}`: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse rules file `{}`: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize rules: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write rules file `{}`: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("rule `{0}` is missing the `=>` separator")]
    MissingSeparator(String),
}
