use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("select an image for the resident")]
    MissingImage,

    #[error("pointer position ({x}, {y}) is not a finite point")]
    InvalidPointer { x: f64, y: f64 },

    #[error("no resident at index {0}")]
    NoSuchResident(usize),

    #[error("object {0} is not a house")]
    NotAHouse(usize),
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("storage: {0:#}")]
    Storage(#[from] anyhow::Error),

    #[error("malformed saved state: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("serialize state: {0}")]
    Serialize(#[source] serde_json::Error),
}
