use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("Invalid device index: {0}")]
    InvalidDeviceIndex(String),

    #[error("Invalid force component {axis}: {value}")]
    InvalidForce { axis: char, value: f64 },
}

pub type Result<T> = std::result::Result<T, Error>;
