//! Main application entry point (CLI binary).
//!
//! This is a thin wrapper around the `request_util` library that handles:
//! - Command-line argument parsing
//! - Logger initialization
//! - User-facing output formatting
//!
//! All core functionality is implemented in the library crate.

use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use request_util::config::Opt;
use request_util::initialization::init_logger_with;
use request_util::{request, ResponseBody, ResponseRecord};

fn print_head(record: &ResponseRecord) {
    for hop in &record.redirects {
        println!("{}", format!("{} {}", hop.status_code, hop.url).dimmed());
    }
    println!(
        "{} {}",
        record.status_code.to_string().bold(),
        record.status_message
    );
    for (name, value) in &record.raw_headers {
        println!("{}: {value}", name.cyan());
    }
    println!();
}

async fn write_body(record: ResponseRecord) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    match record.body {
        ResponseBody::Empty => {}
        ResponseBody::Stream(body) => {
            let mut chunks = Box::pin(body.into_stream());
            while let Some(chunk) = chunks.next().await {
                stdout.write_all(&chunk.context("Failed to read response body")?).await?;
            }
        }
        ResponseBody::Json(value) if record.text.is_none() => {
            stdout.write_all(serde_json::to_string_pretty(&value)?.as_bytes()).await?;
        }
        _ => {
            if let Some(buffer) = &record.buffer {
                stdout.write_all(buffer).await?;
            }
        }
    }
    stdout.flush().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    init_logger_with(opt.log_level.clone().into(), opt.log_format.clone())
        .context("Failed to initialize logger")?;

    let spec = match opt.to_spec() {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("request_util error: {e}");
            process::exit(2);
        }
    };
    let writes_elsewhere = opt.output.is_some() || opt.save.is_some();

    match request(spec).await {
        Ok(fetched) => {
            for record in fetched.into_records() {
                if opt.include {
                    print_head(&record);
                }
                if !writes_elsewhere {
                    write_body(record).await?;
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("request_util error: {e}");
            if let Some(record) = e.response() {
                if let Some(text) = &record.text {
                    eprintln!("{text}");
                }
            }
            process::exit(1);
        }
    }
}
