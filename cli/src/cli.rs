//! Command-line surface, parsed with clap. Env-var fallbacks mirror the
//! documented `CODEAGENT_*` variables.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "codeagent")]
#[command(author, version, about = "Unified wrapper for AI CLI backends (Codex, Claude, Gemini, Opencode)")]
#[command(after_help = r#"Examples:
  codeagent "Fix the bug in main.rs"
  codeagent "Implement feature X" /path/to/workdir
  codeagent --backend claude - <<'EOF'
  Multi-line task text
  EOF
  codeagent resume abc123 "Continue the refactor"
  codeagent --parallel < tasks.txt
  codeagent --cleanup
"#)]
pub struct Cli {
    /// Task to execute; `-` reads the task text from stdin
    #[arg(value_name = "TASK")]
    pub task: Option<String>,

    /// Working directory for the backend process
    #[arg(value_name = "WORKDIR")]
    pub workdir: Option<String>,

    /// Backend to use (codex, claude, gemini, opencode)
    #[arg(long, short = 'b', env = "CODEAGENT_BACKEND")]
    pub backend: Option<String>,

    /// Model passed through to the backend
    #[arg(long, short = 'm', env = "CODEAGENT_MODEL")]
    pub model: Option<String>,

    /// Agent preset name
    #[arg(long, short = 'a')]
    pub agent: Option<String>,

    /// File whose contents are prepended to the task
    #[arg(long, value_name = "PATH")]
    pub prompt_file: Option<String>,

    /// Reasoning effort for backends that support it
    #[arg(long, value_name = "LEVEL")]
    pub reasoning_effort: Option<String>,

    /// Per-task timeout in seconds
    #[arg(long, short = 't', value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Skip backend permission prompts
    #[arg(long, visible_alias = "yolo", env = "CODEAGENT_SKIP_PERMISSIONS")]
    pub skip_permissions: bool,

    /// Read a task list from stdin and run it as a dependency DAG
    #[arg(long)]
    pub parallel: bool,

    /// Upper bound on concurrently running tasks in parallel mode
    #[arg(long, value_name = "N")]
    pub max_parallel_workers: Option<usize>,

    /// Print every task's full message in parallel mode
    #[arg(long)]
    pub full_output: bool,

    /// Suppress progress output
    #[arg(long, short = 'q', env = "CODEAGENT_QUIET")]
    pub quiet: bool,

    /// Mirror backend stderr, prefixed with [BACKEND]
    #[arg(long, env = "CODEAGENT_BACKEND_OUTPUT")]
    pub backend_output: bool,

    /// Debug logging; implies --backend-output
    #[arg(long, short = 'd', env = "CODEAGENT_DEBUG")]
    pub debug: bool,

    /// Launch the backend with a reduced environment
    #[arg(long)]
    pub minimal_env: bool,

    /// Delete log files left behind by dead wrapper processes, then exit
    #[arg(long)]
    pub cleanup: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Continue a previous backend session
    Resume {
        /// Session id printed by the earlier run
        session_id: String,
        /// Task to continue with; `-` reads from stdin
        task: String,
        /// Working directory
        workdir: Option<String>,
    },
}

impl Cli {
    pub fn mirror_backend_stderr(&self) -> bool {
        self.backend_output || self.debug
    }
}
