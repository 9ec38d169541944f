use crud_client::{ClientError, TransportError};
use thiserror::Error;

use crate::table::FileHandle;

/// Broad class of a failure, independent of the layer that raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or out-of-range data on the bus or in the allocation table.
    Protocol,
    /// The connection failed; reconnecting may help.
    Transport,
    /// The store answered with the failure bit set.
    Store,
    /// The call was invalid; nothing was sent to the store.
    Logic,
}

#[derive(Debug, Error)]
pub enum FsError {
    #[error("file system not mounted")]
    NotMounted,

    #[error("bad file handle: {0}")]
    BadHandle(FileHandle),

    #[error("file handle not open: {0}")]
    HandleNotOpen(FileHandle),

    #[error("invalid path: {0:?}")]
    InvalidPath(String),

    #[error("path too long: {len} bytes (max {max})")]
    PathTooLong { len: usize, max: usize },

    #[error("file table full ({0} files)")]
    TableFull(usize),

    #[error("file too large: position {position} is beyond the maximum object size {max}")]
    FileTooLarge { position: u32, max: u32 },

    #[error("corrupt allocation table: {0}")]
    CorruptTable(String),

    #[error("client error: {0}")]
    Client(#[from] ClientError),
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotMounted
            | Self::BadHandle(_)
            | Self::HandleNotOpen(_)
            | Self::InvalidPath(_)
            | Self::PathTooLong { .. }
            | Self::TableFull(_)
            | Self::FileTooLarge { .. } => ErrorKind::Logic,
            Self::CorruptTable(_) => ErrorKind::Protocol,
            Self::Client(ClientError::Protocol(_)) => ErrorKind::Protocol,
            Self::Client(ClientError::Transport(_) | ClientError::Config(_)) => ErrorKind::Transport,
            Self::Client(ClientError::Store { .. }) => ErrorKind::Store,
        }
    }
}

impl From<TransportError> for FsError {
    fn from(err: TransportError) -> Self {
        Self::Client(err.into())
    }
}

pub type FsResult<T> = Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crud_protocol::{Oid, ProtocolError, RequestType};

    #[test]
    fn kinds() {
        assert_eq!(FsError::HandleNotOpen(FileHandle::new(1)).kind(), ErrorKind::Logic);
        assert_eq!(FsError::NotMounted.kind(), ErrorKind::Logic);
        assert_eq!(FsError::from(TransportError::Closed).kind(), ErrorKind::Transport);
        assert_eq!(
            FsError::from(ClientError::Store { request: RequestType::Read, oid: Oid::NONE }).kind(),
            ErrorKind::Store
        );
        assert_eq!(
            FsError::from(ClientError::from(ProtocolError::FlagsOutOfRange(9))).kind(),
            ErrorKind::Protocol
        );
    }
}
