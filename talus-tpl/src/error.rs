//! Runtime errors
//!
//! Compilation problems surface as [`Error::Syntax`]. Everything else is raised
//! while a program executes or while the environment fetches templates.

use thiserror::Error;

pub use talus_tpl_parser::SyntaxError;

/// Failures of the block context model
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockError {
    /// A block was opened before one of its ancestors
    #[error("cannot open block \"{0}\": its parent block has no row")]
    UnknownParentBlock(String),
    /// A field missing from the current row of a block
    #[error("block variable \"{field}\" is not defined in block \"{path}\"")]
    UndefinedBlockVariable { path: String, field: String },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error("the template \"{0}\" doesn't exist")]
    MissingTemplate(String),
    #[error("the required template \"{0}\" doesn't exist, rendering is interrupted")]
    RequiredTemplate(String),
    #[error("the filter \"{0}\" doesn't exist")]
    UnknownFilter(String),
    #[error(transparent)]
    Block(#[from] BlockError),
    #[error("the constant \"{0}\" is not defined")]
    UndefinedConstant(String),
    #[error("filter \"{name}\" failed: {message}")]
    Filter { name: String, message: String },
    #[error("cannot evaluate condition \"{condition}\": {message}")]
    Condition { condition: String, message: String },
    #[error("inclusions nested deeper than {0} levels")]
    IncludeDepth(usize),
    #[error("i/o error on \"{path}\": {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid compiled template: {0}")]
    Artifact(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
