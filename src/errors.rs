use thiserror::Error;

/// Failures raised by the model layer.
///
/// `Transient` covers conditions worth retrying (throttling, 5xx, network
/// faults); `Fatal` covers conditions where retrying the same request is
/// pointless (malformed request, auth). `Exhausted` is the aggregate raised
/// by the fallback controller once every model/attempt combination has been
/// spent, carrying the last underlying cause for diagnostics.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("transient provider failure: {0}")]
    Transient(String),

    #[error("fatal provider failure: {0}")]
    Fatal(String),

    #[error("all models exhausted after {attempts} attempts, last error: {last}")]
    Exhausted { attempts: usize, last: String },
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ProviderError::Transient(_))
    }
}

/// Construction-time failure of the remote tool catalog.
///
/// Distinct from call-time tool faults, which never raise and instead
/// surface as error-status tool results inside the conversation.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("tool catalog unavailable: {0}")]
    Unavailable(String),
}
