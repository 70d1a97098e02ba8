use derive_more::Display;

/// Error reported by the media engine.
///
/// Mirrors the `name`/`message` pair engines usually report their failures
/// with.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display(fmt = "{}: {}", name, message)]
pub struct Error {
    /// Name of the error, e.g. `NotAllowedError`.
    pub name: String,

    /// Human-readable description of the error.
    pub message: String,
}

impl Error {
    /// Name of the error reported when the engine cannot run at all in the
    /// current environment.
    pub const UNSUPPORTED: &'static str = "UnsupportedError";

    /// Creates a new [`Error`].
    #[inline]
    pub fn new<N, M>(name: N, message: M) -> Self
    where
        N: Into<String>,
        M: Into<String>,
    {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Creates a new [`Error`] indicating that the engine isn't supported.
    #[inline]
    pub fn unsupported<M: Into<String>>(message: M) -> Self {
        Self::new(Self::UNSUPPORTED, message)
    }

    /// Indicates whether this [`Error`] reports an unsupported engine.
    #[inline]
    #[must_use]
    pub fn is_unsupported(&self) -> bool {
        self.name == Self::UNSUPPORTED
    }
}
