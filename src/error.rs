/// A type alias for handling errors throughout meshprep
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An error that occurred while accessing or allocating memory
    #[error("memory error: {0}")]
    Memory(std::borrow::Cow<'static, str>),

    /// An error that occurred while decoding an encoded buffer
    #[error("decode error: {0}")]
    Decode(std::borrow::Cow<'static, str>),

    /// An unexpected I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[inline]
    pub(crate) fn memory(msg: &'static str) -> Self {
        Self::Memory(std::borrow::Cow::Borrowed(msg))
    }

    #[inline]
    pub(crate) fn memory_dynamic(msg: String) -> Self {
        Self::Memory(std::borrow::Cow::Owned(msg))
    }

    #[inline]
    pub(crate) fn decode(msg: &'static str) -> Self {
        Self::Decode(std::borrow::Cow::Borrowed(msg))
    }

    #[inline]
    pub(crate) fn decode_dynamic(msg: String) -> Self {
        Self::Decode(std::borrow::Cow::Owned(msg))
    }
}
