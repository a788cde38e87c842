//! Command-line wrapper around the overlap refinery.
//!
//! Reads chunk JSON (one document as `[chunk, ...]` or a batch as `[[chunk, ...], ...]`) from a
//! file or stdin, refines it, and writes the same shape back out. Settings come from the
//! environment (see `config`) and can be overridden per invocation.
use anyhow::{Context, Result, anyhow};
use chunk_refinery::{
    OverlapRefinery, Refinery, RefineryPipeline,
    config::{self, Config},
    logging,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};
use std::{
    fs,
    io::{self, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser)]
#[command(
    name = "chunk-refinery",
    about = "Attach neighbouring context to pre-chunked documents"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Refine chunk JSON and print the result.
    Refine {
        /// Input file; reads stdin when omitted.
        #[arg(long)]
        input: Option<PathBuf>,
        /// Output file; writes stdout when omitted.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
        /// Refine the documents of a batch in parallel.
        #[arg(long)]
        concurrent: bool,
        #[command(flatten)]
        refinery: RefineryArgs,
    },
    /// Print the configured refinery and whether it is available.
    Describe {
        #[command(flatten)]
        refinery: RefineryArgs,
    },
}

#[derive(Args)]
struct RefineryArgs {
    /// Context size override.
    #[arg(long, allow_negative_numbers = true)]
    context_size: Option<i64>,
    /// Overlap mode override (`prefix` or `suffix`).
    #[arg(long)]
    mode: Option<String>,
    /// Keep borrowed context out of the chunk text.
    #[arg(long)]
    no_merge: bool,
    /// Tokenizer override (`whitespace` or a tiktoken model/encoding name).
    #[arg(long)]
    tokenizer: Option<String>,
}

impl RefineryArgs {
    fn apply(&self, mut config: Config) -> Result<Config> {
        if let Some(context_size) = self.context_size {
            config.context_size = context_size;
        }
        if let Some(mode) = &self.mode {
            config.overlap_mode = mode
                .parse()
                .map_err(|()| anyhow!("unknown overlap mode '{mode}'"))?;
        }
        if self.no_merge {
            config.merge_context = false;
        }
        if let Some(tokenizer) = &self.tokenizer {
            config.tokenizer = tokenizer
                .parse()
                .map_err(|()| anyhow!("tokenizer name must not be blank"))?;
        }
        Ok(config)
    }

    fn build(&self) -> Result<OverlapRefinery> {
        let config = self.apply(config::load_config()?)?;
        OverlapRefinery::from_config(&config).context("failed to build overlap refinery")
    }
}

#[tokio::main]
async fn main() {
    logging::init_tracing();
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Refine {
            input,
            output,
            pretty,
            concurrent,
            refinery,
        } => {
            let pipeline = Arc::new(RefineryPipeline::new().add(refinery.build()?)?);
            let value = read_input(input.as_deref())?;
            let refined = pipeline.clone().refine_json(value, concurrent).await?;
            let snapshot = pipeline.metrics_snapshot();
            tracing::info!(
                documents = snapshot.documents_refined,
                chunks = snapshot.chunks_refined,
                concurrent,
                "Refined input"
            );
            write_json(output.as_deref(), &refined, pretty)
        }
        Command::Describe { refinery } => {
            let refinery = refinery.build()?;
            let description = json!({
                "refinery": refinery.descriptor().to_string(),
                "available": OverlapRefinery::is_available(),
                "mode": refinery.mode(),
                "merge_context": refinery.merge_context(),
            });
            write_json(None, &description, true)
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<Value> {
    let content = match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read chunks from {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read chunks from stdin")?;
            buffer
        }
    };
    serde_json::from_str(&content).context("input is not valid JSON")
}

fn write_json<T: Serialize>(path: Option<&Path>, value: &T, pretty: bool) -> Result<()> {
    let mut rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    rendered.push('\n');

    match path {
        Some(path) => fs::write(path, rendered)
            .with_context(|| format!("failed to write output to {}", path.display())),
        None => io::stdout()
            .write_all(rendered.as_bytes())
            .context("failed to write output to stdout"),
    }
}
