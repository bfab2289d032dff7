use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Environment variable {0} is not set or empty")]
    MissingCredential(&'static str),

    #[error("Invalid cutoff date '{0}' (expected YYYY-MM-DD)")]
    InvalidCutoff(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The read endpoint answered a page request with a non-success status.
    #[error("Page request at offset {offset} was rejected with HTTP status {status}")]
    PageRejected { offset: u64, status: u16 },

    #[error("Request to the data API failed: {0}")]
    Transport(#[source] BoxError),

    #[error("Failed to decode response from the data API: {0}")]
    Decode(String),

    #[error("Failed to serialize request body: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to read operator input: {0}")]
    Prompt(#[from] std::io::Error),

    #[error("Mutation journal error: {0}")]
    Journal(String),
}
