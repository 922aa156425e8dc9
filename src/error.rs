//! Error types for the gesture scroll pipeline.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// Camera could not be opened or stopped delivering frames
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),

    /// Hand geometry collapsed (zero finger length or zero-length tip vector)
    #[error("Degenerate hand geometry: {0}")]
    DegenerateHand(String),

    /// Optical flow could not be computed for this frame
    #[error("Optical flow infeasible: {0}")]
    FlowInfeasible(String),

    /// The OS refused scroll event posting (missing accessibility permission)
    #[error("Scroll sink denied: {0}")]
    ScrollSinkDenied(String),

    /// HUD WebSocket port is already bound
    #[error("HUD port {0} already in use")]
    HudPortInUse(u16),

    /// A HUD client misbehaved (malformed message, broken socket)
    #[error("HUD client error: {0}")]
    HudClient(String),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] Box<tungstenite::Error>),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or replay parsing failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<tungstenite::Error> for Error {
    fn from(err: tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
