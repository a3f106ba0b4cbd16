use thiserror::Error;

#[derive(Error, Debug)]
pub enum BguError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Tray error: {0}")]
    Tray(String),

    #[error("Signal handler error: {0}")]
    Signal(String),

    #[error("Mail error: {0}")]
    Mail(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Battery error: {0}")]
    Battery(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type BguResult<T> = Result<T, BguError>;
