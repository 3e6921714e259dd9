//! mimir — ask the pipeline one question from the command line
//!
//! Builds the pipeline from the standard config/secrets locations and
//! streams the answer to stdout.

use std::io::{self, IsTerminal, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use futures_util::StreamExt;
use mimir::{ChatEvent, Config, Mimir, Query, Secrets};

/// Mimir CLI
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version)]
#[command(about = "Ask the retrieval-augmented chat pipeline a question")]
struct Args {
    /// Config file (default: ~/.mimir/config.toml, then /etc/mimir/config.toml)
    #[arg(short, long, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    /// Client identity used for admission control
    #[arg(long, default_value = "cli")]
    client: String,

    /// Print the whole answer at once instead of streaming it
    #[arg(long)]
    no_stream: bool,

    /// Question (or omit to read from stdin)
    question: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let question = read_question(&args.question)?;

    let config = Config::load(args.config.as_deref())?;
    let secrets = Secrets::load()?;
    let mimir = Mimir::from_config(&config, &secrets).await?;
    let query = Query::new(question);

    if args.no_stream {
        let answer = mimir.chat(&args.client, &query).await?;
        println!("{}", answer.content);
        return Ok(());
    }

    let mut events = mimir.chat_stream(&args.client, &query).await?;
    let mut stdout = io::stdout().lock();
    while let Some(event) = events.next().await {
        match event? {
            ChatEvent::Content(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            ChatEvent::Done => break,
        }
    }
    writeln!(stdout)?;
    Ok(())
}

fn read_question(words: &[String]) -> Result<String, Box<dyn std::error::Error>> {
    if !words.is_empty() {
        return Ok(words.join(" "));
    }
    if io::stdin().is_terminal() {
        return Err("no question given (pass it as arguments or on stdin)".into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf.trim().to_string())
}
