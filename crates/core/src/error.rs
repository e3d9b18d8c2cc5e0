use thiserror::Error;

use crate::model::{AttemptError, ContextError, DisplayOptionsErrors};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    DisplayOptions(#[from] DisplayOptionsErrors),
}
