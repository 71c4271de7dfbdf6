/// Errors reported by the binding manager and the binding table.
#[derive(Debug, thiserror::Error)]
pub enum BindingError {
    /// No free slot in a bounded pool or table.
    #[error("no memory: {0}")]
    NoMemory(&'static str),

    #[error("binding entry {0} not found")]
    NotFound(usize),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The service task owning the manager is gone.
    #[error("binding service stopped")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, BindingError>;
