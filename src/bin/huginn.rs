//! huginn - command-line front end for the orchestration engine
//!
//! Loads `config.toml` and `secrets.toml`, builds a gateway in-process and
//! runs one command against it.

use std::io::{self, IsTerminal, Read};
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use huginn::{
    Capability, Config, GenerationGateway, GenerationRequest, HuginnBuilder, Payload, Secrets,
};

/// Huginn CLI
#[derive(Parser)]
#[command(name = "huginn")]
#[command(version = huginn::version::PKG_VERSION)]
#[command(about = "Provider orchestration for text, image and video generation")]
struct Args {
    /// Config file (default: ~/.huginn/config.toml, then /etc/huginn/config.toml)
    #[arg(short, long, global = true, env = "HUGINN_CONFIG")]
    config: Option<PathBuf>,

    /// Secrets file (default: ~/.huginn/secrets.toml, then /etc/huginn/secrets.toml)
    #[arg(long, global = true, env = "HUGINN_SECRETS")]
    secrets: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List configured providers in trial order
    Providers,

    /// Run one generation request
    Generate {
        /// Prompt (or omit to read from stdin)
        prompt: Option<String>,
        /// What to generate
        #[arg(short, long, value_enum, default_value_t = Kind::Text)]
        kind: Kind,
        /// Provider option as key=value (repeatable); values parse as JSON when they can
        #[arg(short, long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
        /// Caller identity for rate limiting
        #[arg(long)]
        caller: Option<String>,
        /// Try this provider first
        #[arg(long)]
        prefer: Option<String>,
        /// Bypass the response cache
        #[arg(long)]
        no_cache: bool,
        /// Poll an async job until it finishes
        #[arg(short, long)]
        wait: bool,
    },

    /// Show rate-limit, cache and provider state
    Stats {
        /// Caller to report the remaining rate-limit budget for
        #[arg(long)]
        caller: Option<String>,
    },

    /// Print build version details
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Text,
    Image,
    Video,
}

impl From<Kind> for Capability {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Text => Capability::Text,
            Kind::Image => Capability::Image,
            Kind::Video => Capability::Video,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
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

    if let Command::Version = args.command {
        println!("huginn {}", huginn::version::version_string());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let secrets = match &args.secrets {
        Some(path) => Secrets::load_from(path)?,
        None => Secrets::load()?,
    };
    let gateway = HuginnBuilder::from_config(&config, &secrets)?.build()?;

    match args.command {
        Command::Providers => {
            let registry = gateway.registry();
            for capability in Capability::ALL {
                let chain = registry.providers_for(capability);
                if chain.is_empty() {
                    println!("{capability}: none");
                    continue;
                }
                println!("{capability}:");
                for provider in chain {
                    println!(
                        "  {} (priority {}, cost {})",
                        provider.name(),
                        provider.descriptor.priority,
                        provider.descriptor.cost
                    );
                }
            }
        }

        Command::Generate {
            prompt,
            kind,
            options,
            caller,
            prefer,
            no_cache,
            wait,
        } => {
            let prompt = resolve_text(prompt)?;
            let mut payload = Payload::new(prompt);
            for option in &options {
                let (key, value) = parse_option(option)?;
                payload = payload.option(key, value);
            }
            let mut request = GenerationRequest::new(kind.into(), payload).cacheable(!no_cache);
            if let Some(caller) = caller {
                request = request.caller(caller);
            }
            if let Some(provider) = prefer {
                request = request.prefer(provider);
            }

            let generation = gateway.generate(&request).await?;
            match generation.job().map(|job| job.id) {
                Some(job_id) if wait => {
                    eprintln!("{} accepted job {job_id}, polling", generation.provider);
                    let status = gateway.wait_for_job(job_id).await?;
                    println!("{}", serde_json::to_string_pretty(&status)?);
                }
                _ => {
                    let response = huginn::GenerateResponse::from(generation);
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
            }
        }

        Command::Stats { caller } => {
            let stats = gateway.stats(caller.as_deref()).await;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }

        // Printed before config loading.
        Command::Version => {}
    }

    Ok(())
}

/// Prompt from the argument, falling back to piped stdin.
fn resolve_text(arg: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if io::stdin().is_terminal() {
        return Err("generate: no prompt provided (pass it as an argument or via stdin)".into());
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return Err("generate: empty prompt on stdin".into());
    }
    Ok(trimmed.to_string())
}

/// Split `key=value`; the value is JSON when it parses, a string otherwise.
fn parse_option(raw: &str) -> Result<(String, serde_json::Value), Box<dyn std::error::Error>> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("option {raw:?} is not KEY=VALUE"))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
