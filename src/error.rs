use std::fmt;

#[derive(Debug)]
pub enum StackError {
    /// Argument has the wrong shape: unknown pixel format name, a source
    /// buffer too short for the rectangle it claims to cover, and so on.
    InvalidArgument(String),

    /// Argument is well-formed but outside its allowed domain.
    OutOfRange {
        argument: &'static str,
        reason: String,
    },

    /// A dynamic canvas was pushed to or encoded before any background
    /// was set.
    NoBackground,

    /// A dynamic canvas was encoded while its dirty rectangle is empty.
    EmptyDirtyRegion,

    BufferOverflow,

    AllocationFailed {
        bytes: usize,
    },

    WorkerUnavailable(String),

    /// The JPEG compressor rejected the input or failed mid-stream.
    Encode(anyhow::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StackErrorClass {
    Validation,
    Range,
    State,
    Resource,
    Encode,
}

impl StackError {
    pub fn class(&self) -> StackErrorClass {
        match self {
            Self::InvalidArgument(_) => StackErrorClass::Validation,
            Self::OutOfRange { .. } => StackErrorClass::Range,
            Self::NoBackground | Self::EmptyDirtyRegion => StackErrorClass::State,
            Self::BufferOverflow | Self::AllocationFailed { .. } | Self::WorkerUnavailable(_) => {
                StackErrorClass::Resource
            }
            Self::Encode(_) => StackErrorClass::Encode,
        }
    }

    /// Whether the call that produced this error left every piece of
    /// state untouched. Only resource and encode failures can surface
    /// after work has started.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self.class(),
            StackErrorClass::Validation | StackErrorClass::Range | StackErrorClass::State
        )
    }

    pub(crate) fn out_of_range(argument: &'static str, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            argument,
            reason: reason.into(),
        }
    }

    pub(crate) fn encode(message: impl fmt::Display) -> Self {
        Self::Encode(anyhow::anyhow!("{message}"))
    }
}

impl fmt::Display for StackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(message) => write!(f, "invalid argument: {message}"),
            Self::OutOfRange { argument, reason } => {
                write!(f, "argument `{argument}` out of range: {reason}")
            }
            Self::NoBackground => write!(
                f,
                "no background has been set, use set_background or set_solid_background first"
            ),
            Self::EmptyDirtyRegion => {
                write!(f, "nothing to encode: no region has been pushed since the last reset")
            }
            Self::BufferOverflow => write!(f, "pixel buffer size overflow"),
            Self::AllocationFailed { bytes } => {
                write!(f, "failed to allocate {bytes} bytes for pixel buffer")
            }
            Self::WorkerUnavailable(message) => write!(f, "encode worker pool unavailable: {message}"),
            Self::Encode(inner) => write!(f, "jpeg encode failed: {inner:#}"),
        }
    }
}

impl std::error::Error for StackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Encode(inner) => Some(inner.as_ref()),
            _ => None,
        }
    }
}

pub type StackResult<T> = Result<T, StackError>;
