/// Boxed error type for the cache / redirector collaborator boundaries.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    IO(#[from] std::io::Error),
    #[error(transparent)]
    YAML(#[from] serde_yaml::Error),
    #[error("invalid rule definitions: {0}")]
    InvalidRuleDefinitions(String),
    #[error("filter kind was never set to allow or block")]
    FilterKindNotSet,
    #[error("invalid filter kind {0:?}, expected \"allow\" or \"block\"")]
    InvalidFilterKind(String),
    #[error("cache backend failed: {0}")]
    Cache(#[source] BoxError),
    #[error("failed to resolve redirect route {0:?}: {1}")]
    Redirect(String, #[source] BoxError),
}

pub type Result<T> = std::result::Result<T, Error>;
