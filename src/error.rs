//! Error handling for Stemmix
//!
//! Engine operations surface typed errors; analysis entry points convert
//! failures into fallback values instead (see `analysis`).

use thiserror::Error;

/// Result type alias for Stemmix operations
pub type Result<T> = std::result::Result<T, StemError>;

/// Main error type for Stemmix operations
#[derive(Error, Debug)]
pub enum StemError {
    // Source Errors
    #[error("Source not found: {locator}")]
    SourceNotFound {
        locator: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Failed to fetch {locator}: {reason}")]
    FetchFailed { locator: String, reason: String },

    #[error("Unsupported source locator: {locator}")]
    UnsupportedLocator { locator: String },

    // Decode Errors
    #[error("Failed to decode audio: {reason}")]
    DecodeFailed {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio contains no samples")]
    EmptyAudio,

    // Engine Errors
    #[error("No tracks to export")]
    NoTracks,

    #[error("Track not found: {id}")]
    TrackNotFound { id: String },

    #[error("Audio device error: {reason}")]
    Device { reason: String },

    // Configuration Errors
    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    // Encoding Errors
    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    // I/O Errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization Errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StemError {
    /// Shorthand for a decode failure without an underlying cause
    pub(crate) fn decode(reason: impl Into<String>) -> Self {
        StemError::DecodeFailed {
            reason: reason.into(),
            source: None,
        }
    }

    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            StemError::SourceNotFound { .. } => "SOURCE_NOT_FOUND",
            StemError::FetchFailed { .. } => "FETCH_FAILED",
            StemError::UnsupportedLocator { .. } => "UNSUPPORTED_LOCATOR",
            StemError::DecodeFailed { .. } => "DECODE_FAILED",
            StemError::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            StemError::EmptyAudio => "EMPTY_AUDIO",
            StemError::NoTracks => "NO_TRACKS",
            StemError::TrackNotFound { .. } => "TRACK_NOT_FOUND",
            StemError::Device { .. } => "DEVICE_ERROR",
            StemError::InvalidConfig { .. } => "INVALID_CONFIG",
            StemError::Wav(_) => "WAV_ERROR",
            StemError::Io(_) => "IO_ERROR",
            StemError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// Check if this error is recoverable without restarting the engine
    ///
    /// Every engine failure can be cleared by `dispose()`, so only device
    /// failures are reported as non-recoverable here: they need a new device.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, StemError::Device { .. })
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StemError::SourceNotFound { .. } => vec![
                "Check the path or URL is correct",
                "Verify the file hasn't been moved or deleted",
            ],
            StemError::FetchFailed { .. } => vec![
                "Check the network connection",
                "Verify the server returned the audio file and not an error page",
            ],
            StemError::UnsupportedLocator { .. } => vec![
                "Use a local path, a file:// URL or an http(s):// URL",
                "Remote URLs need the `http` feature",
            ],
            StemError::DecodeFailed { .. } | StemError::UnsupportedFormat { .. } => vec![
                "Try converting the file to WAV first",
                "Supported formats: WAV, FLAC, MP3, OGG/Vorbis, AAC",
                "Only mono and stereo sources are supported",
            ],
            StemError::EmptyAudio => vec!["The source decoded to zero samples"],
            StemError::NoTracks => vec!["Add at least one track before exporting"],
            StemError::TrackNotFound { .. } => vec!["List the loaded tracks to find valid ids"],
            StemError::Device { .. } => vec![
                "Check an output device is connected",
                "Dispose the engine and create it again with a new device",
            ],
            StemError::InvalidConfig { .. } => vec!["Fix the configuration value and reload"],
            _ => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = StemError::SourceNotFound {
            locator: "drums.wav".to_string(),
            source: None,
        };
        assert_eq!(err.error_code(), "SOURCE_NOT_FOUND");
        assert_eq!(StemError::NoTracks.error_code(), "NO_TRACKS");
    }

    #[test]
    fn test_no_tracks_message() {
        assert_eq!(StemError::NoTracks.to_string(), "No tracks to export");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = StemError::decode("truncated header");
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_device_errors_are_not_recoverable() {
        let err = StemError::Device {
            reason: "no output device".to_string(),
        };
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: StemError = io.into();
        assert_eq!(err.error_code(), "IO_ERROR");
    }
}
