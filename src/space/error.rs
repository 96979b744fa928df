use thiserror::Error;

use crate::graph::GraphError;
use crate::vertex::BBType;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FragmentSpaceError {
    #[error("library of {bb_type} building blocks is not initialized")]
    LibraryNotInitialized { bb_type: BBType },
    #[error("index {index} is out of range for the {bb_type} library of size {size}")]
    IndexOutOfRange {
        bb_type: BBType,
        index: usize,
        size: usize,
    },
    #[error("building blocks of undefined type have no library")]
    UndefinedBuildingBlockType,
    #[error(transparent)]
    Graph(#[from] GraphError),
}
