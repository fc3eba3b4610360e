use std::io;

use qbase::{
    frame::ResetStreamError,
    sid::{Dir, StreamId},
};
use thiserror::Error;

/// Errors the application meets when using a stream.
///
/// Protocol violations by the peer are not among them, they are connection
/// errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StreamError {
    #[error("{0} does not exist")]
    NotFound(StreamId),
    #[error("{0} can't be written by this endpoint")]
    NotWritable(StreamId),
    #[error("{0} can't be read by this endpoint")]
    NotReadable(StreamId),
    #[error("EOS has been sent")]
    EosSent,
    #[error(transparent)]
    Reset(#[from] ResetStreamError),
    #[error("no more {0} streams can be opened")]
    StreamsExhausted(Dir),
}

impl From<StreamError> for io::Error {
    fn from(value: StreamError) -> Self {
        match value {
            error @ StreamError::Reset(..) => io::Error::new(io::ErrorKind::BrokenPipe, error),
            error @ StreamError::NotFound(..) => io::Error::new(io::ErrorKind::NotFound, error),
            error @ StreamError::StreamsExhausted(..) => {
                io::Error::new(io::ErrorKind::WouldBlock, error)
            }
            error @ (StreamError::EosSent
            | StreamError::NotWritable(..)
            | StreamError::NotReadable(..)) => io::Error::new(io::ErrorKind::Unsupported, error),
        }
    }
}
