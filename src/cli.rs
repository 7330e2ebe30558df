use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Srt,
}

#[derive(Parser)]
#[command(
    name = "ytldr",
    about = "Summarize YouTube videos from their captions",
    version = env!("GIT_DESCRIBE"),
)]
pub struct Cli {
    /// YouTube video URLs or video IDs (reads one per line from stdin if omitted)
    pub urls: Vec<String>,

    /// Caption language; must match exactly, there is no fallback [default: en]
    #[arg(short, long)]
    pub lang: Option<String>,

    /// Output format: text (default), json, srt
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Write output to file instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// LLM model for summarization (claude-*, gemini-*, or an OpenAI model)
    #[arg(long)]
    pub model: Option<String>,

    /// System prompt for the summarizer
    #[arg(long)]
    pub prompt: Option<String>,

    /// API key for the summarization provider (falls back to the provider's own env var)
    #[arg(long, env = "YTLDR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Skip summarization and return the transcript text
    #[arg(long)]
    pub transcript_only: bool,

    /// Also write a zip with a summary and transcript per video
    #[arg(long, value_name = "ZIP")]
    pub archive: Option<PathBuf>,

    /// Maximum number of videos processed at once
    #[arg(short, long, env = "TLDR_WORKERS")]
    pub jobs: Option<usize>,

    /// Run the HTTP API instead of processing URLs
    #[arg(long)]
    pub serve: bool,

    /// Address the HTTP API binds to
    #[arg(long, env = "TLDR_IP")]
    pub ip: Option<String>,

    /// Port the HTTP API listens on
    #[arg(long, env = "TLDR_PORT")]
    pub port: Option<u16>,

    /// Show per-video status on stderr
    #[arg(short, long)]
    pub verbose: bool,
}
