use thiserror::Error;

#[derive(Debug, Error)]
pub enum TitanError {
    #[error("config error: {0}")]
    Config(String),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("rpc error: {0}")]
    Rpc(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("other: {0}")]
    Other(String),
}
