//! Application constants
//!
//! Single source of truth for paths, limits and other defaults.

/// Default configuration file path
pub const CONFIG_PATH: &str = "config/thinkloop.toml";

/// Default environment file path
pub const ENV_PATH: &str = "config/.env";

pub const DEFAULT_PROVIDER_ID: &str = "anthropic";
pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";
pub const DEFAULT_API_VERSION: &str = "2023-06-01";
pub const DEFAULT_API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// Tool results longer than this many characters are truncated.
pub const TOOL_RESULT_CAP: usize = 50_000;

/// Characters of a tool result included in `tool_result` events.
pub const TOOL_PREVIEW_CHARS: usize = 500;

pub const DEFAULT_MAX_TURNS: usize = 8;
pub const DEFAULT_EVENT_BUFFER: usize = 256;

pub const DEFAULT_CONTEXT_LIMIT: usize = 1_000_000;
pub const DEFAULT_OUTER_MARGIN: usize = 20_000;
pub const DEFAULT_INNER_MARGIN: usize = 50_000;

/// Dense technical text; looser prose would tolerate 4.
pub const DEFAULT_CHARS_PER_TOKEN: usize = 3;

/// Context charge for one attached image: about 1,600 tokens at 3 chars per token.
pub const IMAGE_CONTEXT_CHARS: usize = 4_800;

pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated to fit context window ...]";

pub const FINALIZE_INSTRUCTION: &str = "You have reached the limit for tool use in this task. \
Do not call any more tools. Answer now using the information already gathered.";
