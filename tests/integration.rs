use md5::{Digest, Md5};
use multipart_streamer::{Constraints, Error, ErrorKind, MemoryDirectory, SizeLimit, Streamer};
use std::collections::HashMap;
use std::fs;

const CONTENT_TYPE: &str = "multipart/form-data; boundary=X-BOUNDARY";

fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

fn image_constraints() -> Constraints {
    Constraints::new()
        .allowed_file_content_types(vec!["image/png", "application/octet-stream"])
        .allowed_file_extensions(vec!["png", "bin"])
}

fn memory_streamer(constraints: Constraints) -> (MemoryDirectory, Streamer<MemoryDirectory>) {
    let directory = MemoryDirectory::new();
    let mut streamer = Streamer::with_directory(directory.clone(), constraints);
    streamer.set_content_type(CONTENT_TYPE).unwrap();
    (directory, streamer)
}

fn file_part(name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
    let mut part = format!(
        "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
        name, file_name, content_type
    )
    .into_bytes();
    part.extend_from_slice(data);
    part.extend_from_slice(b"\r\n");
    part
}

fn text_part(name: &str, value: &str) -> Vec<u8> {
    format!(
        "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
        name, value
    )
    .into_bytes()
}

fn form(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut body = parts.concat();
    body.extend_from_slice(b"--X-BOUNDARY--\r\n");
    body
}

fn stream_chunks(constraints: Constraints, chunks: &[&[u8]]) -> (MemoryDirectory, HashMap<String, String>) {
    let (directory, mut streamer) = memory_streamer(constraints);
    for chunk in chunks {
        streamer.process(chunk).unwrap();
    }
    assert!(streamer.is_complete());
    let values = streamer.values().unwrap();
    (directory, values)
}

fn tricky_payload() -> Vec<u8> {
    // Body bytes that look like the start of a delimiter without being one.
    let mut data = b"\x89PNG\r\n\x1a\n\r\n--X-BOUNDAR\r\n--X\r".to_vec();
    data.extend((0..=255u8).cycle().take(300));
    data.extend_from_slice(b"\r\n-");
    data
}

fn mixed_form() -> Vec<u8> {
    form(&[
        text_part("title", "Hello world\nHello\r\nWorld\rAgain"),
        file_part("photo", "holiday.png", "image/png", &tricky_payload()),
        text_part("empty", ""),
        text_part("greeting", "你好"),
    ])
}

#[test]
fn test_multipart_basic() {
    let data = "--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"My Field\"\r\n\r\nabcd\r\n--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"File Field\"; filename=\"a-text-file.txt\"\r\nContent-Type: text/plain\r\n\r\nHello world\nHello\r\nWorld\rAgain\r\n--X-BOUNDARY--\r\n";

    let (directory, mut streamer) = memory_streamer(Constraints::new());
    for ch in data.chars() {
        streamer.process(ch.to_string()).unwrap();
    }

    let values = streamer.values().unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(values["My Field"], "abcd");
    assert_eq!(values["File Field"], "Hello world\nHello\r\nWorld\rAgain");
    assert!(directory.is_empty());
}

#[test]
fn test_multipart_empty() {
    let (_, mut streamer) = memory_streamer(Constraints::new());
    streamer.process("--X-BOUNDARY--\r\n").unwrap();

    assert!(streamer.is_complete());
    assert!(streamer.values().unwrap().is_empty());
}

#[test]
fn test_text_field_decoding() {
    let body = form(&[text_part("note", "hello")]);
    let (_, values) = stream_chunks(Constraints::new(), &[&body[..]]);
    assert_eq!(values["note"], "hello");
}

#[test]
fn test_file_round_trip_on_disk() {
    let upload_dir = tempfile::tempdir().unwrap();
    let payload = tricky_payload();
    let body = form(&[file_part("blob", "data.bin", "application/octet-stream", &payload)]);

    let mut streamer = Streamer::new(upload_dir.path(), image_constraints());
    streamer.set_content_type(CONTENT_TYPE).unwrap();
    streamer.process(&body).unwrap();

    let values = streamer.values().unwrap();
    let expected = format!("{}.bin", md5_hex(&payload));
    assert_eq!(values["blob"], expected);
    assert_eq!(fs::read(upload_dir.path().join(&expected)).unwrap(), payload);

    let entries: Vec<_> = fs::read_dir(upload_dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
}

#[test]
fn test_chunk_boundary_independence() {
    let body = mixed_form();
    let (_, expected) = stream_chunks(image_constraints(), &[&body[..]]);

    assert_eq!(expected["title"], "Hello world\nHello\r\nWorld\rAgain");
    assert_eq!(expected["photo"], format!("{}.png", md5_hex(&tricky_payload())));
    assert_eq!(expected["empty"], "");
    assert_eq!(expected["greeting"], "你好");

    for split in 0..=body.len() {
        let (head, tail) = body.split_at(split);
        let (directory, values) = stream_chunks(image_constraints(), &[head, tail]);
        assert_eq!(values, expected, "split at {}", split);
        assert_eq!(directory.get(&values["photo"]), Some(tricky_payload()), "split at {}", split);
    }
}

#[test]
fn test_chunk_boundary_independence_three_chunks() {
    let body = mixed_form();
    let (_, expected) = stream_chunks(image_constraints(), &[&body[..]]);

    for first in (0..body.len()).step_by(11) {
        for second in (first..=body.len()).step_by(7) {
            let chunks = [&body[..first], &body[first..second], &body[second..]];
            let (_, values) = stream_chunks(image_constraints(), &chunks);
            assert_eq!(values, expected, "split at {} and {}", first, second);
        }
    }
}

#[test]
fn test_one_byte_chunks() {
    let body = mixed_form();
    let (_, expected) = stream_chunks(image_constraints(), &[&body[..]]);

    let chunks: Vec<&[u8]> = body.chunks(1).collect();
    let (directory, values) = stream_chunks(image_constraints(), &chunks);
    assert_eq!(values, expected);
    assert_eq!(directory.len(), 1);
}

#[test]
fn test_boundary_split_inside_marker() {
    let body = form(&[text_part("a", "first"), text_part("b", "second")]);
    let (_, expected) = stream_chunks(Constraints::new(), &[&body[..]]);

    let marker = b"--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"b\"";
    let start = body.windows(marker.len()).position(|w| w == &marker[..]).unwrap();

    for split in start + 1..start + "--X-BOUNDARY".len() {
        let (head, tail) = body.split_at(split);
        let (_, values) = stream_chunks(Constraints::new(), &[head, tail]);
        assert_eq!(values, expected, "split at {}", split);
    }

    let closing = body.len() - "X-BOUNDARY--\r\n".len();
    let (_, values) = stream_chunks(Constraints::new(), &[&body[..closing], &body[closing..]]);
    assert_eq!(values, expected);
}

#[test]
fn test_head_split_across_chunks() {
    let (_, mut streamer) = memory_streamer(image_constraints());
    streamer.process("--X-BOUNDARY\r\nContent-Disposition: form-data; na").unwrap();
    assert_eq!(streamer.current_part_name(), None);

    streamer
        .process("me=\"photo\"; filename=\"a.png\"\r\nContent-Type: image/png\r")
        .unwrap();
    assert_eq!(streamer.current_part_name(), None);

    streamer.process("\n\r\n1234\r\n--X-BOUNDARY--\r\n").unwrap();
    assert_eq!(streamer.values().unwrap()["photo"], format!("{}.png", md5_hex(b"1234")));
}

#[test]
fn test_missing_name_rejection() {
    let (_, mut streamer) = memory_streamer(Constraints::new());
    let err = streamer
        .process("--X-BOUNDARY\r\nContent-Disposition: form-data; filename=\"a.txt\"\r\n\r\nabc\r\n--X-BOUNDARY--\r\n")
        .unwrap_err();

    assert_eq!(err, Error::MissingFieldName);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(streamer.process("--X-BOUNDARY--\r\n"), Err(Error::StreamAborted));
}

#[test]
fn test_extension_allow_list() {
    let constraints = || {
        Constraints::new()
            .allowed_file_content_types(vec!["image/png"])
            .allowed_file_extensions(vec!["png"])
    };

    let body = form(&[file_part("avatar", "a.txt", "image/png", b"data")]);
    let (directory, mut streamer) = memory_streamer(constraints());
    let err = streamer.process(&body).unwrap_err();
    assert!(matches!(err, Error::ExtensionNotAllowed { ref extension, .. } if extension == "txt"));
    assert!(directory.is_empty());

    let body = form(&[file_part("avatar", "a.png", "image/png", b"data")]);
    let (_, values) = stream_chunks(constraints(), &[&body[..]]);
    assert_eq!(values["avatar"], format!("{}.png", md5_hex(b"data")));
}

#[test]
fn test_disallowed_content_type() {
    let constraints = Constraints::new().allowed_file_content_types(vec!["image/png"]);
    let body = form(&[file_part("blob", "a.bin", "application/octet-stream", b"data")]);

    let (_, mut streamer) = memory_streamer(constraints);
    let err = streamer.process(&body).unwrap_err();
    assert!(matches!(err, Error::ContentTypeNotAllowed { ref content_type, .. } if content_type == "application/octet-stream"));
    assert!(err.is_validation());
}

#[test]
fn test_idempotent_hashing() {
    let upload_dir = tempfile::tempdir().unwrap();
    let body = form(&[file_part("blob", "one.bin", "application/octet-stream", b"same bytes")]);

    let mut names = Vec::new();
    for _ in 0..2 {
        let mut streamer = Streamer::new(upload_dir.path(), image_constraints());
        streamer.set_content_type(CONTENT_TYPE).unwrap();
        streamer.process(&body).unwrap();
        names.push(streamer.values().unwrap()["blob"].clone());
    }

    assert_eq!(names[0], names[1]);
    assert_eq!(names[0], format!("{}.bin", md5_hex(b"same bytes")));
    assert_eq!(fs::read_dir(upload_dir.path()).unwrap().count(), 1);
    assert_eq!(fs::read(upload_dir.path().join(&names[0])).unwrap(), b"same bytes");
}

#[test]
fn test_repeated_field_last_wins() {
    let body = form(&[text_part("tag", "first"), text_part("tag", "second")]);
    let (_, values) = stream_chunks(Constraints::new(), &[&body[..]]);
    assert_eq!(values.len(), 1);
    assert_eq!(values["tag"], "second");
}

#[test]
fn test_preamble_and_epilogue_are_ignored() {
    let mut body = b"This is the preamble.\r\n".to_vec();
    body.extend(form(&[text_part("a", "1")]));

    let (_, mut streamer) = memory_streamer(Constraints::new());
    streamer.process(&body).unwrap();
    streamer.process("This is the epilogue.").unwrap();

    assert!(streamer.is_complete());
    assert_eq!(streamer.values().unwrap()["a"], "1");
}

#[test]
fn test_values_before_closing_boundary() {
    let (_, mut streamer) = memory_streamer(Constraints::new());
    streamer
        .process("--X-BOUNDARY\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhalf")
        .unwrap();
    assert_eq!(streamer.current_part_name(), Some("a"));

    let values = streamer.values().unwrap();
    assert!(!streamer.is_complete());
    assert_eq!(values["a"], "half");
}

#[test]
fn test_size_limits() {
    let body = form(&[text_part("comment", "far too long")]);

    let constraints = Constraints::new().size_limit(SizeLimit::new().for_field("comment", 4));
    let (_, mut streamer) = memory_streamer(constraints);
    assert!(matches!(
        streamer.process(&body),
        Err(Error::FieldSizeExceeded { limit: 4, ref field_name }) if field_name == "comment"
    ));

    let constraints = Constraints::new().size_limit(SizeLimit::new().whole_stream(16));
    let (_, mut streamer) = memory_streamer(constraints);
    let mut result = Ok(());
    for chunk in body.chunks(8) {
        result = streamer.process(chunk);
        if result.is_err() {
            break;
        }
    }
    assert_eq!(result, Err(Error::StreamSizeExceeded { limit: 16 }));
}

#[test]
fn test_unsupported_media_type() {
    let mut streamer = Streamer::with_directory(MemoryDirectory::new(), Constraints::new());
    assert_eq!(
        streamer.set_content_type("application/json"),
        Err(Error::UnsupportedMediaType)
    );
    assert!(streamer.set_content_type("not a media type").is_err());
    assert_eq!(streamer.process("--X-BOUNDARY--\r\n"), Err(Error::BoundaryNotSet));

    streamer.set_content_type(CONTENT_TYPE).unwrap();
    streamer.process("--X-BOUNDARY--\r\n").unwrap();
}

#[test]
fn test_process_reader() {
    let body = mixed_form();
    let (_, expected) = stream_chunks(image_constraints(), &[&body[..]]);

    let (_, mut streamer) = memory_streamer(image_constraints());
    streamer.process_reader(std::io::Cursor::new(body)).unwrap();
    assert_eq!(streamer.values().unwrap(), expected);
}

#[test]
fn test_part_accessors() {
    let body = mixed_form();
    let (_, mut streamer) = memory_streamer(image_constraints());
    streamer.process(&body).unwrap();
    streamer.finalize().unwrap();

    let photo = streamer.part("photo").unwrap();
    assert!(photo.is_file());
    assert!(photo.is_closed());
    assert_eq!(photo.field_name(), "photo");
    assert_eq!(streamer.parts().count(), 4);
}

#[cfg(feature = "tokio-io")]
#[tokio::test]
async fn test_process_async_read() {
    let body = mixed_form();
    let (_, expected) = stream_chunks(image_constraints(), &[&body[..]]);

    let (_, mut streamer) = memory_streamer(image_constraints());
    streamer.process_async_read(&body[..]).await.unwrap();
    assert_eq!(streamer.values().unwrap(), expected);
}

#[cfg(feature = "serde")]
#[test]
fn test_constraints_from_json() {
    let constraints: Constraints = serde_json::from_str(
        r#"{
            "allowed_file_content_types": ["Image/PNG"],
            "allowed_file_extensions": ["PNG"],
            "size_limit": { "per_field": 1024 }
        }"#,
    )
    .unwrap();

    let body = form(&[file_part("avatar", "a.png", "image/png", b"data")]);
    let (_, values) = stream_chunks(constraints, &[&body[..]]);
    assert_eq!(values["avatar"], format!("{}.png", md5_hex(b"data")));
}
