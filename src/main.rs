use std::io::{self, BufRead, Write};

use clap::Parser;
use mbus_decode::{init_logger, DecoderSession};

#[derive(Parser)]
#[command(name = "mbus-decode")]
#[command(about = "Decode M-Bus and wM-Bus meter telegrams into JSON readings")]
struct Cli {
    /// Decode a single request and exit, e.g.
    /// {"_":"decode","telegram":"<HEX>","key":"NOKEY"}
    #[arg(short, long)]
    request: Option<String>,
}

fn main() -> anyhow::Result<()> {
    init_logger();

    let cli = Cli::parse();
    let mut session = DecoderSession::new();

    if let Some(request) = cli.request {
        println!("{}", session.decode_line(&request));
        return Ok(());
    }

    // One request per line on stdin, one JSON reading per line on stdout.
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        writeln!(stdout, "{}", session.decode_line(&line))?;
    }
    Ok(())
}
