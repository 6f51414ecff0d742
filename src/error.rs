//! Error type for the DMA engine's public API, with POSIX-style codes for
//! callers that need to cross an FFI/ioctl boundary (spec.md §7).

/// Errors surfaced either directly from `submit`/`configure`/`enable`/`disable`
/// or, for a transfer already in flight, via its completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DmaError {
    /// Malformed transfer, zero size, missing SG list, too many SG entries,
    /// direction mismatch, or an incomplete descriptor chain.
    #[error("invalid argument")]
    InvalidArgument,
    /// Null/unconfigured engine, or no channel matched this engine's index.
    #[error("permission denied")]
    PermissionDenied,
    /// Descriptor ring allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// Engine busy (not idle when the dispatcher tried to start a transfer).
    #[error("device or resource busy")]
    Busy,
    /// Task pool exhausted at submit time.
    #[error("resource temporarily unavailable")]
    WouldBlock,
    /// A state-change wait or an in-flight transfer exceeded its bound.
    #[error("timer expired")]
    Timeout,
    /// Hardware reported completion without the chain-complete bit set.
    #[error("I/O error")]
    Io,
    /// Transfer aborted by `disable`/`abort`.
    #[error("operation canceled")]
    Canceled,
}

impl DmaError {
    /// The POSIX-style negative errno this error corresponds to, for callers
    /// that bridge back into C/ioctl conventions (spec.md §7).
    pub const fn as_errno(self) -> i32 {
        match self {
            Self::InvalidArgument => -22, // EINVAL
            Self::PermissionDenied => -1, // EPERM
            Self::OutOfMemory => -12,     // ENOMEM
            Self::Busy => -16,            // EBUSY
            Self::WouldBlock => -11,      // EAGAIN
            Self::Timeout => -62,         // ETIME
            Self::Io => -5,               // EIO
            Self::Canceled => -125,       // ECANCELED
        }
    }
}

pub type DmaResult<T> = Result<T, DmaError>;
