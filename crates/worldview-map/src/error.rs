use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("sled {0}")]
    Sled(#[from] sled::Error),
    #[error("io {0}")]
    Io(#[from] std::io::Error),
    #[error("lz4 {0}")]
    Compression(#[from] lz4_flex::frame::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}
