use crate::constants;
use memchr::memmem;

/// The fields of a part head block the streamer cares about.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct PartHead {
    pub(crate) field_name: Option<String>,
    pub(crate) file_name: Option<String>,
    pub(crate) content_type: Option<String>,
}

impl PartHead {
    /// Parses the two leading lines of a head block, the part's
    /// `Content-Disposition` and optional `Content-Type`.
    pub(crate) fn parse(head: &[u8]) -> PartHead {
        let mut part_head = PartHead::default();

        for line in split_lines(head).take(2) {
            match header_name(line) {
                Some(name) if name.eq_ignore_ascii_case(constants::CONTENT_DISPOSITION.as_bytes()) => {
                    part_head.field_name = parse_content_disposition(line, constants::FIELD_NAME_KEY);
                    part_head.file_name = parse_content_disposition(line, constants::FILE_NAME_KEY);
                }
                Some(name) if name.eq_ignore_ascii_case(constants::CONTENT_TYPE.as_bytes()) => {
                    part_head.content_type = parse_content_type(line);
                }
                _ => {}
            }
        }

        part_head
    }

    pub(crate) fn content_type_or_default(&self) -> &str {
        self.content_type.as_deref().unwrap_or(constants::DEFAULT_CONTENT_TYPE)
    }
}

fn split_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(head);

    std::iter::from_fn(move || {
        let current = rest?;
        match memmem::find(current, constants::CRLF.as_bytes()) {
            Some(idx) => {
                rest = Some(&current[idx + constants::CRLF.len()..]);
                Some(&current[..idx])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn header_name(line: &[u8]) -> Option<&[u8]> {
    memchr::memchr(b':', line).map(|idx| line[..idx].trim_ascii())
}

/// Extracts the quoted value of `key` from a `Content-Disposition` line.
///
/// The key must start a parameter, so `name` never matches the tail of `filename`.
pub(crate) fn parse_content_disposition(line: &[u8], key: &str) -> Option<String> {
    let needle = format!("{}=\"", key);

    memmem::find_iter(line, needle.as_bytes())
        .find(|&idx| idx == 0 || matches!(line[idx - 1], b';' | b' ' | b'\t' | b':'))
        .and_then(|idx| {
            let tail = &line[idx + needle.len()..];
            memchr::memchr(b'"', tail).map(|end| String::from_utf8_lossy(&tail[..end]).into_owned())
        })
}

/// Returns the value of a `Content-Type` line, if any.
pub(crate) fn parse_content_type(line: &[u8]) -> Option<String> {
    let idx = memchr::memchr(b':', line)?;

    if !line[..idx].trim_ascii().eq_ignore_ascii_case(constants::CONTENT_TYPE.as_bytes()) {
        return None;
    }

    let value = line[idx + 1..].trim_ascii();
    if value.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(value).into_owned())
    }
}
