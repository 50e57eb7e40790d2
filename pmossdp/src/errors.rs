use thiserror::Error;

/// Erreurs remontées par la découverte SSDP
#[derive(Error, Debug)]
pub enum SsdpError {
    /// Paramètre d'appel invalide (ex: MX < 1), détecté avant toute I/O
    #[error("ssdp: invalid argument: {0}")]
    InvalidArgument(String),

    /// Le transport HTTPU n'a pas pu démarrer (socket, bind, envoi)
    #[error("ssdp: transport failure: {0}")]
    Transport(#[from] std::io::Error),

    #[error("ssdp: malformed response: {0}")]
    MalformedResponse(String),

    #[error("ssdp: no Location header in response")]
    NoLocation,

    #[error("ssdp: invalid Location {0:?}: {1}")]
    InvalidLocation(String, String),

    #[error("ssdp: configuration error: {0}")]
    Config(String),
}

impl SsdpError {
    pub fn invalid_argument(message: &str) -> Self {
        SsdpError::InvalidArgument(message.to_string())
    }

    pub fn malformed_response(message: &str) -> Self {
        SsdpError::MalformedResponse(message.to_string())
    }

    pub fn invalid_location(location: &str, err: url::ParseError) -> Self {
        SsdpError::InvalidLocation(location.to_string(), err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SsdpError>;
