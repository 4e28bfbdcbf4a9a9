use std::{fmt, io};

//------------ GraphError ----------------------------------------------------

/// Possible errors returned by graph loading and evaluation.
#[derive(Debug)]
pub enum GraphError {
    /// The data violates a structural invariant of the graph format, or a
    /// record could not be decoded from its byte region. The data set
    /// must be considered corrupt; retrying will yield the same error.
    CorruptData,
    /// The allocator refused the memory needed to build the graph array.
    InsufficientMemory,
    /// The backing collection failed to produce the requested bytes, most
    /// notably an I/O error on a file backed collection.
    Collection(io::Error),
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GraphError::CorruptData => {
                write!(f, "Error: The graph data is corrupt.")
            }
            GraphError::InsufficientMemory => {
                write!(
                    f,
                    "Error: Insufficient memory to create the graph array."
                )
            }
            GraphError::Collection(err) => {
                write!(f, "Error: The backing collection failed: {}", err)
            }
        }
    }
}

impl std::error::Error for GraphError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GraphError::Collection(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for GraphError {
    fn from(err: io::Error) -> Self {
        GraphError::Collection(err)
    }
}
