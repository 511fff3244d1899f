use thiserror::Error;

use crate::identifier::Identifier;

#[derive(Error, Debug)]
pub enum TreeError {
    #[error("Operation on an invalid tree handle")]
    InvalidNode,

    #[error("Child index {index} out of range (node has {len} children)")]
    ChildIndexOutOfRange { index: usize, len: usize },

    #[error("Node of type '{0}' is not a child of this tree")]
    NotAChild(Identifier),

    #[error("Node of type '{0}' already has a parent")]
    AlreadyHasParent(Identifier),

    #[error("Adding node of type '{0}' would create a cycle")]
    WouldCreateCycle(Identifier),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Snapshot error: {message}")]
    Snapshot { message: String },
}

pub type TreeResult<T> = Result<T, TreeError>;
