use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use serde_json::json;
use std::error::Error;
use std::fs;
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thinkloop_core::application::{
    ChannelSink, EventSink, FnTool, RunOptions, Task, TaskProfile, ToolError, ToolHandler,
    ToolRegistry,
};
use thinkloop_core::config::AppConfig;
use thinkloop_core::domain::{StreamEvent, ToolDefinition, UsageAccumulator};
use thinkloop_core::infrastructure::model::AnthropicClient;
use thinkloop_core::Engine;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

const DEFAULT_LOG_FILTER: &str = "info";

const DEFAULT_SYSTEM: &str = "You are a careful analyst. Think the problem through, use the \
available tools when they help, and answer precisely.";

#[derive(Parser, Debug)]
#[command(
    name = "thinkloop",
    version,
    about = "Run a reasoning task against a streaming model backend"
)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "deep_analysis")]
    profile: String,
    #[arg(long)]
    system: Option<String>,
    #[arg(long)]
    prompt_file: Option<PathBuf>,
    /// Attach an image (PNG, JPEG, GIF or WebP) to the prompt. Repeatable.
    #[arg(long = "image", value_name = "PATH")]
    images: Vec<PathBuf>,
    /// Expose a read-only `read_file` tool rooted at this directory.
    #[arg(long)]
    allow_read: Option<PathBuf>,
    #[arg(long)]
    max_turns: Option<usize>,
    /// Print only the final result as JSON instead of streaming text.
    #[arg(long)]
    json: bool,
    #[arg(long)]
    list_profiles: bool,
    #[arg(long)]
    quiet: bool,
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    if cli.list_profiles {
        for name in TaskProfile::preset_names() {
            println!("{name}");
        }
        return Ok(());
    }

    let config = AppConfig::load(cli.config.as_deref()).map_err(|err| err.user_message())?;
    info!(model = %config.backend.model, endpoint = %config.backend.endpoint, "Loaded configuration");
    if config.backend.api_key.is_none() {
        warn!("No API key configured; requests will likely be rejected");
    }

    let mut profile = config.profile(&cli.profile).map_err(|err| err.user_message())?;
    if let Some(max_turns) = cli.max_turns {
        profile = profile.with_max_turns(max_turns);
    }
    debug!(profile = %profile.name, max_output_tokens = profile.max_output_tokens(), "Resolved profile");

    let tools = match &cli.allow_read {
        Some(root) => read_tools(root)?,
        None => ToolRegistry::new(),
    };

    let prompt = load_prompt(&cli)?;
    let system = cli.system.clone().unwrap_or_else(|| DEFAULT_SYSTEM.to_string());
    let backend = Arc::new(AnthropicClient::from_config(&config.backend));
    let engine = Engine::from_config(backend, &config);

    let accumulator = UsageAccumulator::new();
    accumulator.add_input_estimate(system.chars().count() + prompt.chars().count());

    let mut task = Task::new(system, prompt);
    for path in &cli.images {
        let (media_type, data) = load_image(path)?;
        task = task.with_image(media_type, data);
    }

    let mut options = RunOptions::new(profile).with_accumulator(accumulator.clone());
    let printer = if cli.json {
        None
    } else {
        let (sink, receiver) = ChannelSink::channel(config.engine.event_buffer);
        let sink: Arc<dyn EventSink> = Arc::new(sink);
        options = options.with_sink(sink);
        Some(tokio::spawn(print_events(receiver)))
    };

    let outcome = engine.run(task, &tools, options).await;
    if let Some(printer) = printer {
        // The sink is dropped with the options, which closes the channel.
        if let Err(err) = printer.await {
            warn!(error = %err, "Event printer ended abnormally");
        }
    }

    let totals = accumulator.snapshot();
    if cli.json {
        let output = json!({
            "success": outcome.success,
            "answer": outcome.answer,
            "parsed": outcome.parsed,
            "thinking_length": outcome.thinking.chars().count(),
            "turns": outcome.turns,
            "tool_log": outcome.tool_log,
            "usage": outcome.usage,
            "totals": totals,
            "error": outcome.error,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!();
        if let Some(parsed) = &outcome.parsed {
            println!("{}", serde_json::to_string_pretty(parsed)?);
        }
        eprintln!(
            "[turns: {} | input: {} | output: {} | est. thinking: {}]",
            outcome.turns, outcome.usage.input_tokens, outcome.usage.output_tokens, totals.estimated_thinking
        );
    }

    match outcome.error {
        Some(error) if !outcome.success => Err(error.into()),
        _ => Ok(()),
    }
}

async fn print_events(mut receiver: tokio::sync::mpsc::Receiver<StreamEvent>) {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    while let Some(event) = receiver.recv().await {
        let name = event.name.as_str();
        if name.ends_with("_thinking_delta") {
            if let Some(text) = event.text() {
                let _ = write!(stderr, "{text}");
            }
        } else if name.ends_with("_thinking_complete") {
            let _ = writeln!(stderr);
        } else if name.ends_with("_response_delta") {
            if let Some(text) = event.text() {
                let _ = write!(stdout, "{text}");
                let _ = stdout.flush();
            }
        } else if name.ends_with("_tool_call") {
            let tool = event.payload.get("name").and_then(|v| v.as_str()).unwrap_or("?");
            let _ = writeln!(stderr, "\n> calling {tool}");
        } else if name.ends_with("_error") {
            let error = event.payload.get("error").and_then(|v| v.as_str()).unwrap_or("");
            let _ = writeln!(stderr, "\n! {error}");
        }
    }
}

fn read_tools(root: &Path) -> Result<ToolRegistry, Box<dyn Error>> {
    let root = Arc::new(root.canonicalize()?);
    info!(root = %root.display(), "Exposing read_file tool");
    let definition = ToolDefinition::new(
        "read_file",
        "Read a UTF-8 text file. `path` is relative to the working directory the user allowed.",
        json!({
            "type": "object",
            "properties": { "path": { "type": "string" } },
            "required": ["path"]
        }),
    );
    let handler = FnTool::new(definition, move |input: serde_json::Value| {
        let root = Arc::clone(&root);
        async move {
            let relative = input
                .get("path")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::invalid_input("read_file", "missing `path`"))?;
            let path = root
                .join(relative)
                .canonicalize()
                .map_err(|err| ToolError::execution("read_file", err.to_string()))?;
            if !path.starts_with(root.as_path()) {
                return Err(ToolError::invalid_input("read_file", "path escapes the allowed directory"));
            }
            fs::read_to_string(&path).map_err(|err| ToolError::execution("read_file", err.to_string()))
        }
    });
    let handler: Arc<dyn ToolHandler> = Arc::new(handler);
    Ok(ToolRegistry::from_handlers([handler])?)
}

fn init_tracing(quiet: bool) {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let filter = if quiet {
            EnvFilter::new("off")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
        };
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_level(true)
            .with_writer(io::stderr)
            .init();
    });
}

fn load_prompt(cli: &Cli) -> Result<String, Box<dyn Error>> {
    if let Some(path) = &cli.prompt_file {
        info!(path = %path.display(), "Loading prompt from file");
        return Ok(fs::read_to_string(path)?.trim().to_string());
    }

    if !cli.prompt.is_empty() {
        return Ok(cli.prompt.join(" ").trim().to_string());
    }

    if !io::stdin().is_terminal() {
        info!("Reading prompt from standard input");
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        return Ok(buffer.trim().to_string());
    }

    Err("prompt required via arguments, --prompt-file, or stdin".into())
}

fn load_image(path: &Path) -> Result<(&'static str, String), Box<dyn Error>> {
    let bytes = fs::read(path).map_err(|err| format!("image {}: {err}", path.display()))?;
    info!(path = %path.display(), bytes = bytes.len(), "Attaching image");
    Ok((media_type_for(path), STANDARD.encode(bytes)))
}

/// Media type from the file extension; anything unrecognised is sent as PNG.
fn media_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}
