use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to write report: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
