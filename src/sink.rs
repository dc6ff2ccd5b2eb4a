use crate::directory::Directory;
use crate::file_sink::FileSink;
use bytes::BytesMut;
use encoding_rs::UTF_8;

/// Accumulates a text field in memory.
#[derive(Debug)]
pub struct BufferSink {
    field_name: String,
    buf: BytesMut,
    closed: bool,
}

impl BufferSink {
    /// Creates an empty buffer for the text field `field_name`.
    pub fn new<N: Into<String>>(field_name: N) -> BufferSink {
        BufferSink {
            field_name: field_name.into(),
            buf: BytesMut::new(),
            closed: false,
        }
    }

    /// Appends `bytes`. Fails once the buffer is closed.
    pub fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        if self.closed {
            return Err(crate::Error::SinkClosed {
                field_name: self.field_name.clone(),
            });
        }

        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Marks the buffer complete. Never fails.
    pub fn close(&mut self) -> crate::Result<()> {
        self.closed = true;
        Ok(())
    }

    /// The buffered bytes decoded as UTF-8, malformed sequences replaced.
    pub fn value(&self) -> String {
        let (text, _, _) = UTF_8.decode(&self.buf);
        text.into_owned()
    }

    /// The form field this text belongs to.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Whether [`close`](BufferSink::close) was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Where the body of one part goes.
pub enum PartSink<D: Directory> {
    /// A text field kept in memory.
    Buffer(BufferSink),
    /// A file upload written through the directory.
    File(FileSink<D>),
}

impl<D: Directory> PartSink<D> {
    /// Forwards `bytes` to the underlying sink.
    pub fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        match self {
            PartSink::Buffer(sink) => sink.write(bytes),
            PartSink::File(sink) => sink.write(bytes),
        }
    }

    /// Closes the underlying sink. Closing twice is a no-op.
    pub fn close(&mut self) -> crate::Result<()> {
        match self {
            PartSink::Buffer(sink) => sink.close(),
            PartSink::File(sink) => sink.close(),
        }
    }

    /// Decoded text for buffers, the stored file name for files.
    ///
    /// A file sink has no value until it is closed.
    pub fn value(&self) -> Option<String> {
        match self {
            PartSink::Buffer(sink) => Some(sink.value()),
            PartSink::File(sink) => sink.value().map(ToOwned::to_owned),
        }
    }

    /// The form field the part was sent under.
    pub fn field_name(&self) -> &str {
        match self {
            PartSink::Buffer(sink) => sink.field_name(),
            PartSink::File(sink) => sink.field_name(),
        }
    }

    /// Whether the part is complete.
    pub fn is_closed(&self) -> bool {
        match self {
            PartSink::Buffer(sink) => sink.is_closed(),
            PartSink::File(sink) => sink.is_closed(),
        }
    }

    /// Whether the part was stored as a file upload.
    pub fn is_file(&self) -> bool {
        matches!(self, PartSink::File(_))
    }
}
