use std::fmt::{self, Debug, Display, Formatter};
use std::io;

use derive_more::Display;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A set of errors that can occur while streaming a multipart body into its
/// part sinks.
///
/// Every variant belongs to one of two kinds, see [`Error::kind`].
#[derive(Display)]
#[non_exhaustive]
pub enum Error {
    /// The `Content-Type` is not `multipart/form-data`.
    #[display(fmt = "unsupported media type, expected multipart/form-data")]
    UnsupportedMediaType,

    /// Failed to convert the `Content-Type` to [`mime::Mime`] type.
    #[display(fmt = "unsupported media type, failed to decode Content-Type: {}", _0)]
    DecodeContentType(mime::FromStrError),

    /// No boundary found in `Content-Type` header.
    #[display(fmt = "unsupported media type, multipart boundary not found")]
    NoBoundary,

    /// A part head carries no `name` in its `Content-Disposition`.
    #[display(fmt = "missing form field name")]
    MissingFieldName,

    /// A file part carries no `filename` in its `Content-Disposition`.
    #[display(fmt = "missing filename for field '{}'", field_name)]
    MissingFileName { field_name: String },

    /// The uploaded file name has no extension.
    #[display(fmt = "missing extension in filename '{}' of field '{}'", file_name, field_name)]
    MissingExtension { field_name: String, file_name: String },

    /// The uploaded file extension is not allowed by the constraints.
    #[display(fmt = "extension not allowed: '{}' in field '{}'", extension, field_name)]
    ExtensionNotAllowed { field_name: String, extension: String },

    /// The part's content type is neither an allowed file type nor `text/plain`.
    #[display(fmt = "content type not allowed: '{}' in field '{}'", content_type, field_name)]
    ContentTypeNotAllowed { field_name: String, content_type: String },

    /// A part head grew beyond the maximum size without being terminated.
    #[display(fmt = "part headers exceeded the maximum size: {} bytes", limit)]
    HeadersTooLarge { limit: usize },

    /// The incoming field size exceeded the maximum limit.
    #[display(fmt = "field '{}' exceeded the maximum size limit: {} bytes", field_name, limit)]
    FieldSizeExceeded { limit: u64, field_name: String },

    /// The incoming stream size exceeded the maximum limit.
    #[display(fmt = "stream size exceeded the maximum limit: {} bytes", limit)]
    StreamSizeExceeded { limit: u64 },

    /// `process` was called before any boundary was set.
    #[display(fmt = "multipart boundary is not set")]
    BoundaryNotSet,

    /// A boundary was set a second time.
    #[display(fmt = "multipart boundary is already set")]
    BoundaryAlreadySet,

    /// The streamer already failed and refuses further input.
    #[display(fmt = "multipart stream was aborted by an earlier error")]
    StreamAborted,

    /// A sink received bytes after it was closed.
    #[display(fmt = "field '{}' is already closed", field_name)]
    SinkClosed { field_name: String },

    /// An I/O operation of a file sink failed.
    #[display(fmt = "i/o failure on field '{}': {}", field_name, cause)]
    SinkIo { field_name: String, cause: io::Error },

    /// No unused temporary file name could be found.
    #[display(fmt = "no free temporary file name after {} attempts", attempts)]
    TempNameExhausted { attempts: usize },

    /// The open sink could not be closed after an internal failure.
    #[display(fmt = "can't close field '{}' after failure: {}", field_name, cause)]
    CloseFailed { field_name: String, cause: Box<Error> },

    /// Reading from the source failed.
    #[display(fmt = "stream read failed: {}", _0)]
    StreamReadFailed(BoxError),
}

/// The two classes an [`Error`] falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input or a policy violation. The form is unrecoverable.
    Validation,
    /// An internal failure while streaming, usually I/O on a sink.
    State,
}

impl Error {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedMediaType
            | Error::DecodeContentType(_)
            | Error::NoBoundary
            | Error::MissingFieldName
            | Error::MissingFileName { .. }
            | Error::MissingExtension { .. }
            | Error::ExtensionNotAllowed { .. }
            | Error::ContentTypeNotAllowed { .. }
            | Error::HeadersTooLarge { .. }
            | Error::FieldSizeExceeded { .. }
            | Error::StreamSizeExceeded { .. } => ErrorKind::Validation,
            Error::BoundaryNotSet
            | Error::BoundaryAlreadySet
            | Error::StreamAborted
            | Error::SinkClosed { .. }
            | Error::SinkIo { .. }
            | Error::TempNameExhausted { .. }
            | Error::CloseFailed { .. }
            | Error::StreamReadFailed(_) => ErrorKind::State,
        }
    }

    /// Whether the input itself was rejected, as opposed to a failure while
    /// handling it.
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::DecodeContentType(err) => Some(err),
            Error::SinkIo { cause, .. } => Some(cause),
            Error::CloseFailed { cause, .. } => Some(&**cause),
            Error::StreamReadFailed(err) => Some(&**err),
            _ => None,
        }
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.to_string().eq(&other.to_string())
    }
}

impl Eq for Error {}
