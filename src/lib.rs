//! A chunk-driven parser for `multipart/form-data` bodies that stores file
//! uploads under content-addressed names.
//!
//! Feed the body to a [`Streamer`] chunk by chunk as it comes off the wire.
//! Boundaries, head blocks and data may be split across chunks at any byte.
//! Text fields are buffered in memory; parts whose content type is listed in
//! the [`Constraints`] are streamed to a temporary file in the upload
//! [`Directory`] and renamed to `{md5-hex}.{extension}` once complete.
//!
//! # Examples
//!
//! ```
//! use multipart_streamer::{Constraints, MemoryDirectory, Streamer};
//!
//! # fn run() -> multipart_streamer::Result<()> {
//! let body = "--X-BOUNDARY\r\n\
//!     Content-Disposition: form-data; name=\"title\"\r\n\r\n\
//!     holiday\r\n\
//!     --X-BOUNDARY\r\n\
//!     Content-Disposition: form-data; name=\"photo\"; filename=\"beach.png\"\r\n\
//!     Content-Type: image/png\r\n\r\n\
//!     not really a png\r\n\
//!     --X-BOUNDARY--\r\n";
//!
//! let directory = MemoryDirectory::new();
//! let constraints = Constraints::new()
//!     .allowed_file_content_types(vec!["image/png"])
//!     .allowed_file_extensions(vec!["png"]);
//!
//! let mut streamer = Streamer::with_directory(directory.clone(), constraints);
//! streamer.set_content_type("multipart/form-data; boundary=X-BOUNDARY")?;
//!
//! for chunk in body.as_bytes().chunks(10) {
//!     streamer.process(chunk)?;
//! }
//!
//! let values = streamer.values()?;
//! assert_eq!(values["title"], "holiday");
//! assert!(values["photo"].ends_with(".png"));
//! assert_eq!(directory.get(&values["photo"]).unwrap(), b"not really a png");
//! # Ok(())
//! # }
//! # run().unwrap();
//! ```
//!
//! ## Optional features
//!
//! * `log`: emits diagnostics through the [`log`](https://docs.rs/log) crate.
//! * `serde`: [`Constraints`] and [`SizeLimit`] implement `Deserialize`.
//! * `tokio-io`: adds [`Streamer::process_async_read`].

#[macro_use]
mod macros;

pub use constraints::Constraints;
pub use directory::{Directory, DiskDirectory, MemoryDirectory, MemoryFile};
pub use error::{Error, ErrorKind};
pub use file_sink::FileSink;
pub use sink::{BufferSink, PartSink};
pub use size_limit::SizeLimit;
pub use streamer::Streamer;

mod constants;
mod constraints;
mod directory;
mod error;
mod file_sink;
mod head;
mod sink;
mod size_limit;
mod state;
mod streamer;

/// A Result type often returned from methods that can have `multipart-streamer` errors.
pub type Result<T> = std::result::Result<T, Error>;

/// Parses the `Content-Type` header to extract the boundary value.
///
/// # Examples
///
/// ```
/// let content_type = "multipart/form-data; boundary=ABCDEFG";
///
/// assert_eq!(multipart_streamer::parse_boundary(content_type), Ok("ABCDEFG".to_owned()));
/// ```
pub fn parse_boundary<T: AsRef<str>>(content_type: T) -> Result<String> {
    let m = content_type
        .as_ref()
        .parse::<mime::Mime>()
        .map_err(Error::DecodeContentType)?;

    if !(m.type_() == mime::MULTIPART && m.subtype() == mime::FORM_DATA) {
        return Err(Error::UnsupportedMediaType);
    }

    m.get_param(mime::BOUNDARY)
        .map(|name| name.as_str().to_owned())
        .filter(|name| !name.is_empty())
        .ok_or(Error::NoBoundary)
}
