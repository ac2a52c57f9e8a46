use thiserror::Error;

/// Failures that abort a whole conversion.
///
/// Style, selector and image problems never show up here; they are logged and
/// absorbed where they happen.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("empty html")]
    EmptyInput,

    #[error("failed to write docx package: {0}")]
    Package(#[from] zip::result::ZipError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("unsupported image source: {0}")]
    Unsupported(String),

    #[error("invalid data uri: {0}")]
    DataUri(String),

    #[error("failed to read image {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("unknown image format")]
    UnknownFormat,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("invalid file id: {0}")]
    InvalidId(String),

    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("malformed token")]
    Malformed,

    #[error("token signature mismatch")]
    BadSignature,

    #[error("token expired")]
    Expired,

    #[error("signing key rejected")]
    InvalidKey,

    #[error("token payload encoding: {0}")]
    Encoding(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}
