use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdScreenError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
