use std::path::PathBuf;
use std::process::Command as Process;

use eyre::Result;
use log::{LevelFilter, debug, info};

mod cli;

use cli::{Cli, Command, OutputFormat};
use recipeclip::config::{APP_NAME, Config};

fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = log_dir();
    std::fs::create_dir_all(&log_dir)?;
    let log_file = log_dir.join(format!("{APP_NAME}.log"));

    let target = Box::new(std::fs::OpenOptions::new().create(true).append(true).open(&log_file)?);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(if verbose { LevelFilter::Debug } else { LevelFilter::Info });
    builder.parse_default_env();
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized: {}", log_file.display());
    Ok(())
}

fn log_dir() -> PathBuf {
    recipeclip::config::data_dir().join("logs")
}

fn tool_version(name: &str) -> Option<String> {
    Process::new(name)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| {
            String::from_utf8_lossy(&o.stdout)
                .trim()
                .lines()
                .next()
                .unwrap_or("")
                .to_string()
        })
}

fn build_after_help() -> String {
    let yt_dlp_line = match tool_version("yt-dlp") {
        Some(v) => format!("  \x1b[32m✅\x1b[0m yt-dlp     {v}"),
        None => "  \x1b[31m❌\x1b[0m yt-dlp     (not found; metadata and fallback captions unavailable)".to_string(),
    };
    let key_line = if std::env::var("GEMINI_API_KEYS").is_ok() || std::env::var("GEMINI_API_KEY").is_ok() {
        "  \x1b[32m✅\x1b[0m GEMINI_API_KEY(S) set".to_string()
    } else {
        "  \x1b[31m❌\x1b[0m GEMINI_API_KEY(S) not set (or configure api_keys in config.toml)".to_string()
    };

    let log_path = log_dir().join(format!("{APP_NAME}.log"));

    format!(
        "\nREQUIRED TOOLS:\n{yt_dlp_line}\n{key_line}\n\nConfig is read from: {}\nLogs are written to: {}",
        recipeclip::config::config_path().display(),
        log_path.display()
    )
}

async fn run_extract(
    config: &Config,
    url: &str,
    format: OutputFormat,
    output: Option<PathBuf>,
    verbose: bool,
) -> Result<()> {
    let extractor = recipeclip::pipeline::Extractor::from_config(config)?;
    if verbose {
        eprintln!("Extracting recipe from {url} with {} key(s)", extractor.key_count());
    }

    let recipe = extractor.extract(url).await?;

    let rendered = match format {
        OutputFormat::Text => recipeclip::output::render_text(&recipe),
        OutputFormat::Json => recipeclip::output::render_json(&recipe),
    };

    if let Some(ref path) = output {
        std::fs::write(path, &rendered)?;
        if verbose {
            eprintln!("Output written to: {}", path.display());
        }
    } else {
        println!("{rendered}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let after_help = build_after_help();
    let cmd = <Cli as clap::CommandFactory>::command().after_help(after_help);
    let matches = cmd.get_matches();
    let cli = <Cli as clap::FromArgMatches>::from_arg_matches(&matches)?;

    setup_logging(cli.verbose)?;

    let mut config = Config::load(cli.config.as_deref())?;
    debug!("Effective config: model={} keys={}", config.model, config.api_keys.len());

    match cli.command.unwrap_or(Command::Serve { host: None, port: None }) {
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if cli.verbose {
                eprintln!("Serving on http://{}:{}", config.host, config.port);
            }
            recipeclip::server::serve(&config).await
        }
        Command::Extract { url, format, output } => run_extract(&config, &url, format, output, cli.verbose).await,
    }
}
