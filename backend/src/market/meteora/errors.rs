use thiserror::Error;

#[derive(Error, Debug)]
pub enum MeteoraError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("invalid response from meteora: {0}")]
    InvalidResponse(String),
}

impl MeteoraError {
    /// Network failures, timeouts and non-success statuses are transient.
    /// A body we cannot decode will not improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            MeteoraError::Http(e) => !e.is_decode(),
            MeteoraError::Status { .. } => true,
            MeteoraError::InvalidResponse(_) => false,
        }
    }
}

/// A page could not be retrieved; the collection run it belongs to is void.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("page {page} failed after {attempts} attempt(s): {source}")]
    Exhausted {
        page: u32,
        attempts: u32,
        #[source]
        source: MeteoraError,
    },

    #[error("page {page} rejected: {source}")]
    Rejected {
        page: u32,
        #[source]
        source: MeteoraError,
    },
}

impl FetchError {
    pub fn page(&self) -> u32 {
        match self {
            FetchError::Exhausted { page, .. } | FetchError::Rejected { page, .. } => *page,
        }
    }
}
