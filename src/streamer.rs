use crate::constants::{self, Markers};
use crate::constraints::{Constraints, PartKind};
use crate::directory::{Directory, DiskDirectory};
use crate::file_sink::FileSink;
use crate::head::PartHead;
use crate::sink::{BufferSink, PartSink};
use crate::state::{CurrentPart, StreamingStage};
use crate::Error;
use bytes::{Buf, BytesMut};
use memchr::memmem;
use std::collections::HashMap;
use std::io::{self, Read};
use std::path::PathBuf;
#[cfg(feature = "tokio-io")]
use {futures_util::stream::StreamExt, tokio::io::AsyncRead, tokio_util::io::ReaderStream};

/// Incrementally parses a `multipart/form-data` body delivered in chunks of
/// any size.
///
/// Each part is routed to a [`PartSink`] as soon as its head block is
/// complete: text fields are buffered in memory, file uploads are streamed
/// into the [`Directory`] and stored as `{md5-hex}.{extension}`. Bytes that
/// could still turn out to be part of a boundary are carried over to the
/// next [`process`](Streamer::process) call, so chunk edges may fall anywhere.
///
/// # Examples
///
/// ```
/// use multipart_streamer::{Constraints, MemoryDirectory, Streamer};
///
/// # fn run() -> multipart_streamer::Result<()> {
/// let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"my_text_field\"\r\n\r\nabcd\r\n--X-BOUNDARY--\r\n";
///
/// let mut streamer = Streamer::with_directory(MemoryDirectory::new(), Constraints::new());
/// streamer.set_content_type("multipart/form-data; boundary=X-BOUNDARY")?;
///
/// for chunk in data.as_bytes().chunks(7) {
///     streamer.process(chunk)?;
/// }
///
/// let values = streamer.values()?;
/// assert_eq!(values["my_text_field"], "abcd");
/// # Ok(())
/// # }
/// # run().unwrap();
/// ```
pub struct Streamer<D: Directory = DiskDirectory> {
    boundary: Option<String>,
    carry: BytesMut,
    stage: StreamingStage,
    parts: HashMap<String, PartSink<D>>,
    current: Option<CurrentPart<D>>,
    constraints: Constraints,
    directory: D,
    stream_size_counter: u64,
}

impl Streamer<DiskDirectory> {
    /// Construct a new `Streamer` storing uploads under `upload_dir`.
    pub fn new<P: Into<PathBuf>>(upload_dir: P, constraints: Constraints) -> Streamer<DiskDirectory> {
        Streamer::with_directory(DiskDirectory::new(upload_dir), constraints)
    }
}

impl<D: Directory> Streamer<D> {
    /// Construct a new `Streamer` storing uploads in `directory`.
    pub fn with_directory(directory: D, constraints: Constraints) -> Streamer<D> {
        Streamer {
            boundary: None,
            carry: BytesMut::new(),
            stage: StreamingStage::ScanningBoundary,
            parts: HashMap::new(),
            current: None,
            constraints,
            directory,
            stream_size_counter: 0,
        }
    }

    /// Takes the boundary from a `multipart/form-data; boundary=...` header value.
    pub fn set_content_type<T: AsRef<str>>(&mut self, content_type: T) -> crate::Result<()> {
        if self.boundary.is_some() {
            return Err(Error::BoundaryAlreadySet);
        }

        let boundary = crate::parse_boundary(content_type)?;
        self.set_boundary(boundary)
    }

    /// Sets the boundary directly. It can be set only once.
    pub fn set_boundary<B: Into<String>>(&mut self, boundary: B) -> crate::Result<()> {
        if self.boundary.is_some() {
            return Err(Error::BoundaryAlreadySet);
        }

        let boundary = boundary.into();
        if boundary.is_empty() || boundary.contains(|c: char| c == '\r' || c == '\n') {
            return Err(Error::NoBoundary);
        }

        self.boundary = Some(boundary);
        Ok(())
    }

    /// The boundary in use, once set.
    pub fn boundary(&self) -> Option<&str> {
        self.boundary.as_deref()
    }

    /// Feeds the next chunk of the body.
    ///
    /// Chunks must arrive in order, each exactly once. After the closing
    /// boundary further input is ignored. Once an error is returned the
    /// streamer refuses more input with [`Error::StreamAborted`].
    pub fn process<B: AsRef<[u8]>>(&mut self, chunk: B) -> crate::Result<()> {
        let chunk = chunk.as_ref();
        let markers = self.markers()?;

        match self.stage {
            StreamingStage::Failed => return Err(Error::StreamAborted),
            StreamingStage::Complete => {
                trace!("ignoring {} bytes after the closing boundary", chunk.len());
                return Ok(());
            }
            StreamingStage::ScanningBoundary | StreamingStage::InBody => {}
        }

        self.stream_size_counter += chunk.len() as u64;
        let limit = self.constraints.size_limit.whole_stream;
        if self.stream_size_counter > limit {
            return Err(self.fail(Error::StreamSizeExceeded { limit }));
        }

        self.carry.extend_from_slice(chunk);

        let result = self.drive(&markers, false);
        result.map_err(|err| self.fail(err))
    }

    /// Reads `reader` to its end, feeding every read to [`process`](Streamer::process).
    pub fn process_reader<R: Read>(&mut self, mut reader: R) -> crate::Result<()> {
        let mut buf = vec![0; constants::READ_CHUNK_SIZE];

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(self.fail(Error::StreamReadFailed(err.into()))),
            };

            self.process(&buf[..n])?;
        }
    }

    /// Reads an [`AsyncRead`] source to its end, feeding every chunk to
    /// [`process`](Streamer::process).
    ///
    /// # Optional
    ///
    /// This requires the optional `tokio-io` feature to be enabled.
    #[cfg(feature = "tokio-io")]
    pub async fn process_async_read<R: AsyncRead + Unpin>(&mut self, reader: R) -> crate::Result<()> {
        let mut stream = ReaderStream::with_capacity(reader, constants::READ_CHUNK_SIZE);

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => return Err(self.fail(Error::StreamReadFailed(err.into()))),
            };

            self.process(chunk)?;
        }

        Ok(())
    }

    /// Flushes whatever the last `process` call carried over and closes the
    /// open part, if any.
    ///
    /// Calling this before the closing boundary arrived closes the form
    /// early, leaving truncated values; [`is_complete`](Streamer::is_complete)
    /// tells the two apart.
    pub fn finalize(&mut self) -> crate::Result<()> {
        if let StreamingStage::Complete | StreamingStage::Failed = self.stage {
            return Ok(());
        }

        if !self.carry.is_empty() {
            let markers = self.markers()?;
            if let Err(err) = self.drive(&markers, true) {
                return Err(self.fail(err));
            }
        }

        if !self.carry.is_empty() {
            warn!("discarding {} bytes of an unterminated part head", self.carry.len());
            self.carry.clear();
        }

        if self.stage != StreamingStage::Complete {
            warn!("multipart form finalized before its closing boundary");

            if let Err(err) = self.close_current() {
                return Err(self.fail(err));
            }
            self.stage = StreamingStage::ScanningBoundary;
        }

        Ok(())
    }

    /// Finalizes the form and returns each part's value: decoded text for
    /// fields, the stored file name for uploads.
    ///
    /// After a failure this still returns the parts closed before it.
    pub fn values(&mut self) -> crate::Result<HashMap<String, String>> {
        self.finalize()?;

        Ok(self
            .parts
            .iter()
            .filter_map(|(name, sink)| sink.value().map(|value| (name.clone(), value)))
            .collect())
    }

    /// Whether the closing boundary has been processed.
    pub fn is_complete(&self) -> bool {
        self.stage == StreamingStage::Complete
    }

    /// The part currently receiving body bytes.
    pub fn current_part_name(&self) -> Option<&str> {
        self.current.as_ref().map(|part| part.name.as_str())
    }

    /// A closed part by name.
    pub fn part(&self, name: &str) -> Option<&PartSink<D>> {
        self.parts.get(name)
    }

    /// All closed parts.
    pub fn parts(&self) -> impl Iterator<Item = (&str, &PartSink<D>)> {
        self.parts.iter().map(|(name, sink)| (name.as_str(), sink))
    }

    fn markers(&self) -> crate::Result<Markers> {
        self.boundary.as_deref().map(Markers::new).ok_or(Error::BoundaryNotSet)
    }

    fn drive(&mut self, markers: &Markers, eof: bool) -> crate::Result<()> {
        loop {
            let progressed = match self.stage {
                StreamingStage::ScanningBoundary => self.scan_boundary(markers)?,
                StreamingStage::InBody => self.read_body(markers, eof)?,
                StreamingStage::Complete | StreamingStage::Failed => {
                    self.carry.clear();
                    false
                }
            };

            if !progressed {
                return Ok(());
            }
        }
    }

    // Returns `false` when more input is needed.
    fn scan_boundary(&mut self, markers: &Markers) -> crate::Result<bool> {
        let dash_boundary = markers.dash_boundary.as_slice();
        let mut from = 0;

        let idx = loop {
            let idx = match memmem::find(&self.carry[from..], dash_boundary) {
                Some(rel) => from + rel,
                None => {
                    let keep = partial_suffix_len(&self.carry, dash_boundary);
                    let discard = self.carry.len() - keep;
                    self.carry.advance(discard);
                    return Ok(false);
                }
            };

            let after = idx + dash_boundary.len();
            match self.carry.get(after..after + 2) {
                None => {
                    self.carry.advance(idx);
                    return Ok(false);
                }
                Some(b"--") => {
                    debug!("closing boundary reached");
                    self.carry.clear();
                    self.stage = StreamingStage::Complete;
                    return Ok(true);
                }
                Some(b"\r\n") => break idx,
                Some(_) => from = idx + 1,
            }
        };

        self.carry.advance(idx);

        // The search starts at the CRLF ending the boundary line, so an empty
        // head block is found right there.
        let head_start = dash_boundary.len();
        let head_end = match memmem::find(&self.carry[head_start..], constants::CRLF_CRLF.as_bytes()) {
            Some(rel) => head_start + rel,
            None => {
                if self.carry.len() - head_start > constants::MAX_HEAD_SIZE {
                    return Err(Error::HeadersTooLarge {
                        limit: constants::MAX_HEAD_SIZE,
                    });
                }
                return Ok(false);
            }
        };

        if head_end - head_start > constants::MAX_HEAD_SIZE {
            return Err(Error::HeadersTooLarge {
                limit: constants::MAX_HEAD_SIZE,
            });
        }

        let block = self.carry.split_to(head_end + constants::CRLF_CRLF.len()).freeze();
        let head = if head_end > head_start {
            &block[head_start + constants::CRLF.len()..head_end]
        } else {
            &block[..0]
        };

        self.open_part(head)?;
        self.stage = StreamingStage::InBody;

        Ok(true)
    }

    // Returns `false` when more input is needed.
    fn read_body(&mut self, markers: &Markers, eof: bool) -> crate::Result<bool> {
        let delimiter = markers.delimiter.as_slice();
        let mut from = 0;

        loop {
            let idx = match memmem::find(&self.carry[from..], delimiter) {
                Some(rel) => from + rel,
                None => {
                    let withheld = partial_suffix_len(&self.carry, delimiter);
                    self.write_current(self.carry.len() - withheld)?;
                    if eof {
                        // A truncated input ending in a partial delimiter.
                        self.carry.clear();
                    }
                    return Ok(false);
                }
            };

            let after = idx + delimiter.len();
            match self.carry.get(after..after + 2) {
                None => {
                    self.write_current(idx)?;
                    if eof {
                        self.carry.clear();
                    }
                    return Ok(false);
                }
                Some(b"\r\n") => {
                    self.write_current(idx)?;
                    self.close_current()?;
                    // What remains starts with the next part's boundary line.
                    self.carry.advance(constants::CRLF.len());
                    self.stage = StreamingStage::ScanningBoundary;
                    return Ok(true);
                }
                Some(b"--") => {
                    self.write_current(idx)?;
                    self.close_current()?;
                    debug!("closing boundary reached");
                    self.carry.clear();
                    self.stage = StreamingStage::Complete;
                    return Ok(true);
                }
                Some(_) => from = idx + 1,
            }
        }
    }

    fn open_part(&mut self, head: &[u8]) -> crate::Result<()> {
        let head = PartHead::parse(head);
        let (name, kind) = self.constraints.classify(&head)?;

        let sink = match kind {
            PartKind::Text => PartSink::Buffer(BufferSink::new(name.clone())),
            PartKind::File { file_name, extension } => PartSink::File(FileSink::create(
                self.directory.clone(),
                name.clone(),
                file_name,
                extension,
            )?),
        };

        debug!(
            "opened {} part '{}'",
            if sink.is_file() { "file" } else { "text" },
            name
        );

        let size_limit = self.constraints.size_limit.extract_size_limit_for(&name);
        self.current = Some(CurrentPart {
            name,
            sink,
            size_limit,
            size_counter: 0,
        });

        Ok(())
    }

    // Moves the first `len` carried bytes into the open part.
    fn write_current(&mut self, len: usize) -> crate::Result<()> {
        if len == 0 {
            return Ok(());
        }

        let bytes = self.carry.split_to(len);

        if let Some(part) = self.current.as_mut() {
            part.size_counter += len as u64;
            if part.size_counter > part.size_limit {
                return Err(Error::FieldSizeExceeded {
                    limit: part.size_limit,
                    field_name: part.name.clone(),
                });
            }

            part.sink.write(&bytes)?;
        }

        Ok(())
    }

    fn close_current(&mut self) -> crate::Result<()> {
        if let Some(mut part) = self.current.take() {
            part.sink.close()?;
            trace!("closed part '{}' after {} bytes", part.name, part.size_counter);

            if self.parts.insert(part.name, part.sink).is_some() {
                debug!("repeated field name, the last occurrence wins");
            }
        }

        Ok(())
    }

    // Poisons the streamer and closes the open part on a best-effort basis.
    // The part in flight never yields a value.
    fn fail(&mut self, err: Error) -> Error {
        self.stage = StreamingStage::Failed;
        self.carry.clear();

        let mut part = match self.current.take() {
            Some(part) => part,
            None => return err,
        };

        match part.sink.close() {
            Ok(()) => {
                warn!("discarded part '{}' after error: {}", part.name, err);
                err
            }
            Err(close_err) if err.is_validation() => {
                warn!("can't close part '{}' after error {}: {}", part.name, err, close_err);
                err
            }
            Err(close_err) => {
                warn!("can't close part '{}' after error: {}", part.name, err);
                Error::CloseFailed {
                    field_name: part.name,
                    cause: Box::new(close_err),
                }
            }
        }
    }
}

/// Length of the longest suffix of `buf` that is a proper prefix of `marker`.
fn partial_suffix_len(buf: &[u8], marker: &[u8]) -> usize {
    (1..marker.len().min(buf.len() + 1))
        .rev()
        .find(|&len| buf.ends_with(&marker[..len]))
        .unwrap_or(0)
}
