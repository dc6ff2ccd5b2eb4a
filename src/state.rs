use crate::directory::Directory;
use crate::sink::PartSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    /// Looking for `--boundary` followed by CRLF (a part) or `--` (the end).
    ScanningBoundary,
    /// Feeding body bytes to the open part until the next delimiter.
    InBody,
    /// The closing boundary was seen, anything after it is epilogue.
    Complete,
    /// An error was returned, no more input is accepted.
    Failed,
}

/// The single part currently receiving body bytes.
pub(crate) struct CurrentPart<D: Directory> {
    pub(crate) name: String,
    pub(crate) sink: PartSink<D>,
    pub(crate) size_limit: u64,
    pub(crate) size_counter: u64,
}
