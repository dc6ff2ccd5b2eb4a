pub(crate) const DEFAULT_WHOLE_STREAM_SIZE_LIMIT: u64 = u64::MAX;
pub(crate) const DEFAULT_PER_FIELD_SIZE_LIMIT: u64 = u64::MAX;

/// Upper bound for a part's head block while it is still incomplete.
pub(crate) const MAX_HEAD_SIZE: usize = 16 * 1024;
pub(crate) const MAX_TEMP_NAME_ATTEMPTS: usize = 16;
pub(crate) const READ_CHUNK_SIZE: usize = 8 * 1024;

pub(crate) const BOUNDARY_EXT: &str = "--";
pub(crate) const CRLF: &str = "\r\n";
pub(crate) const CRLF_CRLF: &str = "\r\n\r\n";

pub(crate) const DEFAULT_CONTENT_TYPE: &str = "text/plain";
pub(crate) const CONTENT_DISPOSITION: &str = "content-disposition";
pub(crate) const CONTENT_TYPE: &str = "content-type";
pub(crate) const FIELD_NAME_KEY: &str = "name";
pub(crate) const FILE_NAME_KEY: &str = "filename";

/// Boundary markers derived once per `process` call.
pub(crate) struct Markers {
    /// `--boundary`, opens a part when followed by CRLF and ends the form when followed by `--`.
    pub(crate) dash_boundary: Vec<u8>,
    /// `\r\n--boundary`, terminates a part body.
    pub(crate) delimiter: Vec<u8>,
}

impl Markers {
    pub(crate) fn new(boundary: &str) -> Markers {
        let dash_boundary = format!("{}{}", BOUNDARY_EXT, boundary).into_bytes();
        let delimiter = format!("{}{}{}", CRLF, BOUNDARY_EXT, boundary).into_bytes();

        Markers {
            dash_boundary,
            delimiter,
        }
    }
}
