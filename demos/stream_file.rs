use multipart_streamer::{Constraints, SizeLimit, Streamer};
use std::env;
use std::process;

// Streams a multipart body saved to disk into an upload directory.
//
// cargo run --example stream_file --features tokio-io -- <body-file> <boundary> <upload-dir>
#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() != 3 {
        eprintln!("usage: stream_file <body-file> <boundary> <upload-dir>");
        process::exit(2);
    }

    if let Err(err) = run(&args[0], &args[1], &args[2]).await {
        eprintln!("error: {}", err);
        process::exit(1);
    }
}

async fn run(body_file: &str, boundary: &str, upload_dir: &str) -> Result<(), Box<dyn std::error::Error>> {
    let constraints = Constraints::new()
        .allowed_file_content_types(vec!["image/png", "image/jpeg", "application/pdf"])
        .allowed_file_extensions(vec!["png", "jpg", "jpeg", "pdf"])
        .size_limit(SizeLimit::new().whole_stream(64 * 1024 * 1024).per_field(16 * 1024 * 1024));

    let mut streamer = Streamer::new(upload_dir, constraints);
    streamer.set_boundary(boundary)?;

    let file = tokio::fs::File::open(body_file).await?;
    streamer.process_async_read(file).await?;

    if !streamer.is_complete() {
        eprintln!("warning: the body has no closing boundary");
    }

    let mut values: Vec<_> = streamer.values()?.into_iter().collect();
    values.sort();
    for (name, value) in values {
        println!("{}: {}", name, value);
    }

    Ok(())
}
