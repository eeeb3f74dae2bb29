//! Command-line front end: replay a recorded agent stream or follow a live run.

mod config;
mod render;

use std::path::PathBuf;

use agent_stream::prelude::*;
use agent_stream::{consume_byte_stream, init_observability, map_transport_failure};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::render::Renderer;

#[derive(Parser)]
#[command(name = "agent-stream", version, about = "Decode streamed agent runs")]
struct Cli {
    /// Print every delivered update as a JSON line instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Feed a recorded response body through the decoder
    Replay {
        /// File holding the raw body (SSE frames or JSON lines)
        path: PathBuf,
        /// Bytes per simulated network chunk
        #[arg(long, default_value_t = 4096)]
        chunk_size: usize,
    },
    /// Send a message to an agent endpoint and follow the run
    Send {
        message: String,
        /// Agent endpoint accepting run requests
        #[arg(long, env = "AGENT_STREAM_URL")]
        url: String,
        /// Continue an existing thread instead of starting a new one
        #[arg(long)]
        thread_id: Option<String>,
        /// Also print each decoded payload to stderr
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    config::init();
    init_observability();
    let cli = Cli::parse();
    let mut renderer = Renderer::new(cli.json);

    match cli.command {
        Command::Replay { path, chunk_size } => replay(&path, chunk_size, &mut renderer).await,
        Command::Send {
            message,
            url,
            thread_id,
            raw,
        } => send(message, url, thread_id, raw, &mut renderer).await,
    }
}

async fn replay(
    path: &std::path::Path,
    chunk_size: usize,
    renderer: &mut Renderer,
) -> Result<(), Box<dyn std::error::Error>> {
    if chunk_size == 0 {
        return Err("--chunk-size must be greater than 0".into());
    }
    let body = tokio::fs::read(path).await?;
    info!(path = %path.display(), bytes = body.len(), chunk_size, "replaying recorded stream");

    let chunks: Vec<Result<&[u8], std::convert::Infallible>> = body.chunks(chunk_size).map(Ok).collect();
    let state = consume_byte_stream(futures::stream::iter(chunks), |update, state| {
        renderer.update(update, state)
    })
    .await?;
    renderer.finish(&state);
    Ok(())
}

async fn send(
    message: String,
    url: String,
    thread_id: Option<String>,
    raw: bool,
    renderer: &mut Renderer,
) -> Result<(), Box<dyn std::error::Error>> {
    let client = AgentClient::from_config(ClientConfig::new(url))?;
    let thread = client.thread(match thread_id {
        Some(id) => ThreadConfig::resume(id),
        None => ThreadConfig::new(),
    });
    let mut stream = thread
        .run()
        .user_message(message)
        .emit_raw_events(raw)
        .start_stream()
        .await?;
    eprintln!("[thread] {}", stream.thread_id());

    let abort = stream.abort_handle();
    loop {
        let event = tokio::select! {
            event = stream.next_event() => event,
            _ = tokio::signal::ctrl_c(), if !abort.is_aborted() => {
                abort.abort();
                continue;
            }
        };
        let Some(event) = event else {
            break;
        };
        match event {
            StreamEvent::RunStarted { run_id, .. } => info!(run_id = %run_id, "run started"),
            StreamEvent::Payload { payload, .. } => eprintln!("[payload] {payload}"),
            StreamEvent::Update { update, state, .. } => renderer.update(&update, &state),
            StreamEvent::Completed { state, .. } => {
                renderer.finish(&state);
                break;
            }
            StreamEvent::Error { error, .. } => {
                if error.is_cancelled() {
                    eprintln!("\n[cancelled]");
                } else {
                    eprintln!("\n{}", map_transport_failure(&error.to_string()));
                }
                break;
            }
        }
    }

    match stream.finish().await {
        Ok(_) => Ok(()),
        Err(err) if err.is_cancelled() => Ok(()),
        Err(err) => Err(err.into()),
    }
}
