use std::io::{self, BufRead};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::ValueEnum;
use eyre::{Result, WrapErr, bail};
use log::{debug, info};

use ytldr::batch::{BatchRequest, Orchestrator};
use ytldr::config::{Config, DEFAULT_IP, DEFAULT_PORT};
use ytldr::server::AppState;
use ytldr::summarize::{LlmSummarizer, SummaryOptions};
use ytldr::youtube::YouTubeClient;

mod cli;

use cli::{Cli, OutputFormat};

fn setup_logging() -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join("ytldr.log");

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    env_logger::Builder::from_default_env()
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ytldr")
        .join("logs")
}

fn build_after_help() -> String {
    let key_lines = ["ANTHROPIC_API_KEY", "GEMINI_API_KEY", "OPENAI_API_KEY"]
        .iter()
        .map(|var| {
            if std::env::var(var).is_ok_and(|v| !v.trim().is_empty()) {
                format!("  \x1b[32m✅\x1b[0m {var}")
            } else {
                format!("  \x1b[31m❌\x1b[0m {var}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n");

    let config_path = ytldr::config::config_path();
    let config_state = if config_path.exists() { "" } else { " (not found)" };
    let log_path = log_dir().join("ytldr.log");

    format!(
        "\nSUMMARIZER KEYS:\n{key_lines}\n\nConfig: {}{config_state}\nLogs are written to: {}",
        config_path.display(),
        log_path.display()
    )
}

fn read_stdin_urls() -> Result<Vec<String>> {
    let stdin = io::stdin();
    Ok(stdin.lock().lines().collect::<Result<Vec<_>, _>>()?)
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging()?;

    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    // Load config file (non-fatal if missing/invalid)
    let config = Config::load().unwrap_or_default();

    let client = reqwest::Client::new();
    let max_concurrency = cli.jobs.unwrap_or_else(|| config.max_concurrency()).max(1);
    debug!("Max concurrency: {max_concurrency}");

    let orchestrator = Orchestrator::new(
        Arc::new(YouTubeClient::new(client.clone(), config.client_settings())),
        Arc::new(LlmSummarizer::new(client, config.summarize_timeout())),
        max_concurrency,
    );

    if cli.serve {
        let ip = cli.ip.clone().or_else(|| config.ip.clone()).unwrap_or_else(|| DEFAULT_IP.to_string());
        let port = cli.port.or(config.port).unwrap_or(DEFAULT_PORT);
        let addr: SocketAddr = format!("{ip}:{port}")
            .parse()
            .wrap_err_with(|| format!("invalid bind address {ip}:{port}"))?;
        eprintln!("Serving on http://{addr}");
        let state = AppState {
            orchestrator,
            batch_timeout: config.batch_timeout(),
        };
        return ytldr::server::serve(addr, state).await;
    }

    // Collect URLs: from args or stdin
    let urls = if cli.urls.is_empty() { read_stdin_urls()? } else { cli.urls.clone() };
    let urls: Vec<String> = urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

    if urls.is_empty() {
        bail!("no URL or video ID provided\n\nUsage: ytldr <URL>...\n       cat urls.txt | ytldr");
    }

    let request = BatchRequest {
        urls,
        language: cli.lang.clone().unwrap_or_else(|| config.language().to_string()),
        transcript_only: cli.transcript_only,
        summary: SummaryOptions {
            api_key: cli.api_key.clone(),
            model: cli.model.clone().or_else(|| config.default_model.clone()),
            system_prompt: cli.prompt.clone().or_else(|| config.system_prompt.clone()),
        },
    };

    let results = orchestrator.run(&request).await?;

    if cli.verbose {
        for result in &results {
            match result.error_kind() {
                None => eprintln!("ok      {}", result.url()),
                Some(kind) => eprintln!("failed  {} ({kind})", result.url()),
            }
        }
    }

    let format = cli
        .format
        .or_else(|| {
            config
                .default_format
                .as_deref()
                .and_then(|f| OutputFormat::from_str(f, true).ok())
        })
        .unwrap_or(OutputFormat::Text);

    let rendered = match format {
        OutputFormat::Text => ytldr::output::render_batch_text(&results),
        OutputFormat::Json => ytldr::output::render_json(&results)?,
        OutputFormat::Srt => ytldr::output::render_batch_srt(&results),
    };

    if let Some(ref path) = cli.output {
        std::fs::write(path, &rendered)?;
        if cli.verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        println!("{rendered}");
    }

    if let Some(ref path) = cli.archive {
        let entries = ytldr::archive::entries_from_results(&results);
        let bytes = ytldr::archive::build_archive(&entries)?;
        std::fs::write(path, bytes).wrap_err_with(|| format!("could not write archive {}", path.display()))?;
        if cli.verbose {
            eprintln!("Archive with {} videos written to: {}", entries.len(), path.display());
        }
    }

    if results.iter().all(|r| !r.is_success()) {
        bail!("all {} videos failed", results.len());
    }

    Ok(())
}
