use crate::constants;
use crate::head::PartHead;
use crate::size_limit::SizeLimit;
use std::collections::HashSet;

/// Represents the policy a [`Streamer`](crate::Streamer) applies to each part.
///
/// A part whose content type is one of the allowed file content types is
/// streamed to disk, a `text/plain` part (the default when a part carries no
/// `Content-Type`) is buffered in memory, anything else is rejected.
///
/// # Examples
///
/// ```
/// use multipart_streamer::{Constraints, SizeLimit};
///
/// let constraints = Constraints::new()
///     .allowed_file_content_types(vec!["image/png", "image/jpeg"])
///     .allowed_file_extensions(vec!["png", "jpg"])
///     .size_limit(SizeLimit::new().per_field(10 * 1024 * 1024).for_field("comment", 1024));
/// ```
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Constraints {
    #[cfg_attr(feature = "serde", serde(deserialize_with = "deserialize_lowercase"))]
    pub(crate) allowed_file_content_types: HashSet<String>,
    #[cfg_attr(feature = "serde", serde(deserialize_with = "deserialize_lowercase"))]
    pub(crate) allowed_file_extensions: HashSet<String>,
    pub(crate) size_limit: SizeLimit,
}

/// What a part turned out to be after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PartKind {
    Text,
    File { file_name: String, extension: String },
}

impl Constraints {
    /// Creates a set of rules accepting text fields only.
    pub fn new() -> Constraints {
        Constraints::default()
    }

    /// Content types routed to a file sink, e.g. `image/png`.
    pub fn allowed_file_content_types<N: Into<String>>(mut self, content_types: Vec<N>) -> Constraints {
        self.allowed_file_content_types = lowercase_all(content_types);
        self
    }

    /// Extensions an uploaded file may carry. Empty means any extension.
    pub fn allowed_file_extensions<N: Into<String>>(mut self, extensions: Vec<N>) -> Constraints {
        self.allowed_file_extensions = lowercase_all(extensions);
        self
    }

    /// Sets the size limits.
    pub fn size_limit(mut self, size_limit: SizeLimit) -> Constraints {
        self.size_limit = size_limit;
        self
    }

    /// Decides how the part described by `head` is stored, returning its
    /// field name alongside.
    pub(crate) fn classify(&self, head: &PartHead) -> crate::Result<(String, PartKind)> {
        let field_name = match head.field_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => return Err(crate::Error::MissingFieldName),
        };

        let content_type = head.content_type_or_default();
        let essence = essence_of(content_type);

        if self.allowed_file_content_types.contains(&essence) {
            let file_name = match head.file_name.as_deref() {
                Some(name) if !name.is_empty() => name.to_owned(),
                _ => return Err(crate::Error::MissingFileName { field_name }),
            };

            let extension = self.extract_extension(&field_name, &file_name)?;

            Ok((field_name, PartKind::File { file_name, extension }))
        } else if essence == constants::DEFAULT_CONTENT_TYPE {
            Ok((field_name, PartKind::Text))
        } else {
            Err(crate::Error::ContentTypeNotAllowed {
                field_name,
                content_type: content_type.to_owned(),
            })
        }
    }

    fn extract_extension(&self, field_name: &str, file_name: &str) -> crate::Result<String> {
        // Clients may send a full path; only the last component names the file.
        let base_name = file_name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(file_name);

        let extension = match base_name.rfind('.') {
            Some(idx) if idx + 1 < base_name.len() => &base_name[idx + 1..],
            _ => {
                return Err(crate::Error::MissingExtension {
                    field_name: field_name.to_owned(),
                    file_name: file_name.to_owned(),
                })
            }
        };

        let not_allowed = || crate::Error::ExtensionNotAllowed {
            field_name: field_name.to_owned(),
            extension: extension.to_owned(),
        };

        if !extension.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(not_allowed());
        }

        if !self.allowed_file_extensions.is_empty()
            && !self.allowed_file_extensions.contains(&extension.to_ascii_lowercase())
        {
            return Err(not_allowed());
        }

        Ok(extension.to_owned())
    }
}

// Allow-list entries are stored lowercased, lookups lowercase the other side.
fn lowercase_all<N: Into<String>>(entries: Vec<N>) -> HashSet<String> {
    entries
        .into_iter()
        .map(|entry| entry.into().to_ascii_lowercase())
        .collect()
}

#[cfg(feature = "serde")]
fn deserialize_lowercase<'de, D>(deserializer: D) -> Result<HashSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries: Vec<String> = serde::Deserialize::deserialize(deserializer)?;
    Ok(lowercase_all(entries))
}

fn essence_of(content_type: &str) -> String {
    match content_type.parse::<mime::Mime>() {
        Ok(m) => m.essence_str().to_ascii_lowercase(),
        Err(_) => content_type.trim().to_ascii_lowercase(),
    }
}
