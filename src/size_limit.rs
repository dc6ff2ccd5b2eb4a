use crate::constants;
use std::collections::HashMap;

/// Byte budgets for a single form.
///
/// The whole-stream limit counts every byte handed to
/// [`Streamer::process`](crate::Streamer::process), boundaries and heads
/// included. Field limits count only body bytes delivered to a part's sink;
/// bytes held back because they might start a delimiter are counted once
/// they turn out to be content. Exceeding either aborts the stream.
///
/// Please refer [`Constraints`](crate::Constraints) for more info.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SizeLimit {
    pub(crate) whole_stream: u64,
    pub(crate) per_field: u64,
    pub(crate) field_map: HashMap<String, u64>,
}

impl SizeLimit {
    /// No limits: [`u64::MAX`] for the stream and for every field.
    pub fn new() -> SizeLimit {
        SizeLimit::default()
    }

    /// Caps the total number of bytes fed to the streamer.
    pub fn whole_stream(mut self, limit: u64) -> SizeLimit {
        self.whole_stream = limit;
        self
    }

    /// Caps the body of every field without a limit of its own.
    pub fn per_field(mut self, limit: u64) -> SizeLimit {
        self.per_field = limit;
        self
    }

    /// Caps the body of the field `field_name`, overriding `per_field`.
    ///
    /// Text fields are buffered in memory, so they usually deserve a tight one.
    /// Repeated fields with the same name are counted separately.
    pub fn for_field<N: Into<String>>(mut self, field_name: N, limit: u64) -> SizeLimit {
        self.field_map.insert(field_name.into(), limit);
        self
    }

    pub(crate) fn extract_size_limit_for(&self, field: &str) -> u64 {
        self.field_map.get(field).copied().unwrap_or(self.per_field)
    }
}

impl Default for SizeLimit {
    fn default() -> Self {
        SizeLimit {
            whole_stream: constants::DEFAULT_WHOLE_STREAM_SIZE_LIMIT,
            per_field: constants::DEFAULT_PER_FIELD_SIZE_LIMIT,
            field_map: HashMap::default(),
        }
    }
}
