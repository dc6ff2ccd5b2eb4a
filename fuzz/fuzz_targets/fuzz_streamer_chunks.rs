#![no_main]

use libfuzzer_sys::fuzz_target;
use multipart_streamer::{Constraints, MemoryDirectory, Streamer};

fn streamer() -> Streamer<MemoryDirectory> {
    let constraints = Constraints::new()
        .allowed_file_content_types(vec!["image/png", "application/octet-stream"])
        .allowed_file_extensions(vec!["png", "bin"]);

    let mut streamer = Streamer::with_directory(MemoryDirectory::new(), constraints);
    streamer.set_boundary("X-BOUNDARY").expect("boundary");
    streamer
}

// The first byte picks where the rest of the input is split in two. Both
// halves fed in sequence must give the same outcome as one single chunk.
fuzz_target!(|data: &[u8]| {
    let (split, body) = match data.split_first() {
        Some((&split, body)) => (split as usize % (body.len() + 1), body),
        None => return,
    };

    let mut whole = streamer();
    let expected = whole.process(body).and_then(|_| whole.values());

    let mut chunked = streamer();
    let result = chunked
        .process(&body[..split])
        .and_then(|_| chunked.process(&body[split..]))
        .and_then(|_| chunked.values());

    assert_eq!(result.is_ok(), expected.is_ok());
    if let (Ok(result), Ok(expected)) = (result, expected) {
        assert_eq!(result, expected);
    }
});
