use crate::constants;
use crate::directory::Directory;
use md5::{Digest, Md5};
use std::io::{self, Write};
use uuid::Uuid;

/// Streams an uploaded file into a temporary file and, on close, renames it
/// to `{md5-hex}.{extension}`.
///
/// Identical uploads end up under the same name, the later rename replacing
/// the earlier file.
pub struct FileSink<D: Directory> {
    directory: D,
    field_name: String,
    file_name: String,
    extension: String,
    temp_name: String,
    file: Option<D::File>,
    hasher: Option<Md5>,
    size: u64,
    final_name: Option<String>,
}

impl<D: Directory> FileSink<D> {
    /// Creates the temporary file for the part `field_name` whose client-side
    /// name is `file_name`.
    pub fn create<N, F, E>(directory: D, field_name: N, file_name: F, extension: E) -> crate::Result<FileSink<D>>
    where
        N: Into<String>,
        F: Into<String>,
        E: Into<String>,
    {
        let field_name = field_name.into();
        let extension = extension.into();

        let (temp_name, file) = create_temp_file(&directory, &field_name, &extension)?;
        debug!("field '{}' streams into temporary file '{}'", field_name, temp_name);

        Ok(FileSink {
            directory,
            field_name,
            file_name: file_name.into(),
            extension,
            temp_name,
            file: Some(file),
            hasher: Some(Md5::new()),
            size: 0,
            final_name: None,
        })
    }

    /// Appends `bytes` to the temporary file and the running digest.
    pub fn write(&mut self, bytes: &[u8]) -> crate::Result<()> {
        let (file, hasher) = match (self.file.as_mut(), self.hasher.as_mut()) {
            (Some(file), Some(hasher)) => (file, hasher),
            _ => {
                return Err(crate::Error::SinkClosed {
                    field_name: self.field_name.clone(),
                })
            }
        };

        if let Err(cause) = file.write_all(bytes) {
            return Err(crate::Error::SinkIo {
                field_name: self.field_name.clone(),
                cause,
            });
        }
        hasher.update(bytes);
        self.size += bytes.len() as u64;

        Ok(())
    }

    /// Flushes the file, finalizes the digest and moves the file to its
    /// content-addressed name. Closing twice is a no-op.
    ///
    /// If flushing or renaming fails the temporary file is removed and the
    /// sink stays closed without a value.
    pub fn close(&mut self) -> crate::Result<()> {
        let (mut file, hasher) = match (self.file.take(), self.hasher.take()) {
            (Some(file), Some(hasher)) => (file, hasher),
            _ => return Ok(()),
        };

        let flushed = file.flush();
        drop(file);

        let stored = flushed.and_then(|()| {
            let final_name = format!("{}.{}", hex::encode(hasher.finalize()), self.extension);
            self.directory
                .rename(&self.temp_name, &final_name)
                .map(|()| final_name)
        });

        match stored {
            Ok(final_name) => {
                debug!(
                    "field '{}' stored {} bytes as '{}'",
                    self.field_name, self.size, final_name
                );
                self.final_name = Some(final_name);
                Ok(())
            }
            Err(cause) => {
                if let Err(err) = self.directory.remove(&self.temp_name) {
                    warn!("can't remove temporary file '{}': {}", self.temp_name, err);
                }
                Err(self.io_error(cause))
            }
        }
    }

    /// The content-addressed file name, available once closed.
    pub fn value(&self) -> Option<&str> {
        self.final_name.as_deref()
    }

    /// The form field this file was uploaded under.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// The file name the client sent.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The extension taken from the client's file name, as sent.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// The name the file is written under until it is closed.
    pub fn temp_name(&self) -> &str {
        &self.temp_name
    }

    /// Bytes written so far.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Whether [`close`](FileSink::close) was called, successfully or not.
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn io_error(&self, cause: io::Error) -> crate::Error {
        crate::Error::SinkIo {
            field_name: self.field_name.clone(),
            cause,
        }
    }
}

// The existence check skips names already taken, `create_new` settles races
// with other writers sharing the directory.
fn create_temp_file<D: Directory>(directory: &D, field_name: &str, extension: &str) -> crate::Result<(String, D::File)> {
    let io_error = |cause: io::Error| crate::Error::SinkIo {
        field_name: field_name.to_owned(),
        cause,
    };

    for _ in 0..constants::MAX_TEMP_NAME_ATTEMPTS {
        let temp_name = format!("{}.{}", Uuid::new_v4(), extension);

        if directory.exists(&temp_name).map_err(io_error)? {
            trace!("temporary file name '{}' is taken", temp_name);
            continue;
        }

        match directory.create_new(&temp_name) {
            Ok(file) => return Ok((temp_name, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                trace!("temporary file name '{}' was taken concurrently", temp_name);
            }
            Err(err) => return Err(io_error(err)),
        }
    }

    Err(crate::Error::TempNameExhausted {
        attempts: constants::MAX_TEMP_NAME_ATTEMPTS,
    })
}
