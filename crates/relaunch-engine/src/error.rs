use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Validation(#[from] relaunch_core::errors::ValidationError),

    #[error(transparent)]
    Backend(#[from] relaunch_core::backend::BackendError),
}
