use std::convert::Infallible;
use std::path::PathBuf;

use bytes::Bytes;
use chatstream::api::{error_frame, ChatStreamSession};
use chatstream::config::{load_config, AppConfig};
use chatstream::observability::init_tracing;
use chatstream::observability::token_counter::{estimate_prompt_tokens, HeuristicTokenCounter};
use chatstream::protocol::openai_chat::ChatCompletionRequest;
use chatstream::stream::sse::{done_frame, openai_sse_frame};
use chatstream::stream::{StreamOutcome, TranscodeHandle};
use clap::Parser;
use http::{HeaderMap, HeaderValue};
use tokio::io::AsyncWriteExt;

#[derive(Parser, Debug)]
#[command(name = "chatstream")]
#[command(about = "Replay a captured chat-completion SSE trace through the stream transcoder")]
struct CliArgs {
    /// Captured upstream SSE body
    trace_path: PathBuf,

    /// Model name; overrides the model of `--request`
    #[arg(long)]
    model: Option<String>,

    /// Channel to apply; defaults to the first channel serving the model
    #[arg(long)]
    channel: Option<String>,

    /// YAML configuration file
    #[arg(long)]
    config: Option<String>,

    /// JSON chat-completion request the trace answers
    #[arg(long)]
    request: Option<PathBuf>,

    /// Send `X-Thinking-To-Content: true` with the request
    #[arg(long, default_value_t = false)]
    think: bool,

    /// Prompt tokens; estimated from `--request` when omitted
    #[arg(long)]
    prompt_tokens: Option<u64>,

    /// Size of the byte chunks the trace is fed in
    #[arg(long, default_value_t = 4096, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,
}

fn main() {
    let args = CliArgs::parse();

    let config = match args.config.as_deref() {
        Some(path) => load_config(path).unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }),
        None => AppConfig::default(),
    };

    init_tracing(&config.features.log_level);

    let mut runtime_builder = tokio::runtime::Builder::new_current_thread();
    runtime_builder.enable_io();
    runtime_builder.enable_time();
    let runtime = runtime_builder.build().unwrap_or_else(|e| {
        eprintln!("Failed to initialize Tokio runtime: {e}");
        std::process::exit(1);
    });

    let code = runtime.block_on(run(args, config));
    std::process::exit(code);
}

async fn run(args: CliArgs, config: AppConfig) -> i32 {
    let trace = match tokio::fs::read(&args.trace_path).await {
        Ok(bytes) => Bytes::from(bytes),
        Err(e) => {
            eprintln!("Failed to read {}: {e}", args.trace_path.display());
            return 1;
        }
    };

    let mut request = match args.request.as_deref() {
        Some(path) => match read_request(path).await {
            Ok(request) => request,
            Err(e) => {
                eprintln!("Failed to load request {}: {e}", path.display());
                return 1;
            }
        },
        None => ChatCompletionRequest::default(),
    };
    if let Some(model) = args.model.as_deref() {
        request.model = model.to_string();
    }
    if request.model.is_empty() {
        request.model = "unknown".to_string();
    }

    let channel = match args.channel.as_deref() {
        Some(name) => match config.channel(name) {
            Some(channel) => Some(channel),
            None => {
                eprintln!("Unknown channel '{name}'");
                return 1;
            }
        },
        None => config.channel_for_model(&request.model),
    };

    let mut headers = HeaderMap::new();
    if args.think {
        headers.insert("x-thinking-to-content", HeaderValue::from_static("true"));
    }

    let prompt_tokens = args
        .prompt_tokens
        .unwrap_or_else(|| estimate_prompt_tokens(&request, &HeuristicTokenCounter));
    let session = ChatStreamSession::prepare(&request, channel, &headers, prompt_tokens);
    if let Ok(upstream) = serde_json::to_string(&session.upstream_request) {
        tracing::debug!("upstream request: {upstream}");
    }

    let chunk_size = usize::try_from(args.chunk_size).unwrap_or(usize::MAX);
    let body_chunks: Vec<Result<Bytes, Infallible>> = (0..trace.len())
        .step_by(chunk_size)
        .map(|start| Ok(trace.slice(start..start.saturating_add(chunk_size).min(trace.len()))))
        .collect();
    let TranscodeHandle {
        mut chunks,
        outcome,
        task,
    } = session.spawn(
        futures_util::stream::iter(body_chunks),
        config.features.stream_queue_capacity,
    );

    let mut stdout = tokio::io::stdout();
    while let Some(chunk) = chunks.recv().await {
        if let Err(e) = stdout.write_all(&openai_sse_frame(&chunk)).await {
            eprintln!("Failed to write output: {e}");
            return 1;
        }
    }

    let outcome = match outcome.await {
        Ok(outcome) => outcome,
        Err(_) => {
            eprintln!("Transcode task ended without an outcome");
            return 1;
        }
    };
    if let Err(e) = task.await {
        tracing::debug!("transcode task join error: {e}");
    }

    let mut trailer = Vec::new();
    if let StreamOutcome::Failed { error, .. } = &outcome {
        trailer.extend_from_slice(&error_frame(error));
    }
    trailer.extend_from_slice(&done_frame());
    if let Err(e) = stdout.write_all(&trailer).await {
        eprintln!("Failed to write output: {e}");
        return 1;
    }
    if let Err(e) = stdout.flush().await {
        eprintln!("Failed to write output: {e}");
        return 1;
    }

    match serde_json::to_string(outcome.usage()) {
        Ok(usage) => eprintln!("usage: {usage}"),
        Err(e) => eprintln!("Failed to encode usage: {e}"),
    }
    i32::from(outcome.error().is_some())
}

async fn read_request(path: &std::path::Path) -> Result<ChatCompletionRequest, String> {
    let raw = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    serde_json::from_slice(&raw).map_err(|e| e.to_string())
}
