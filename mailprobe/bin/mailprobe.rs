//! Command-line entry point for the mailprobe harness
//!
//! - `run`: full orchestrated verification
//! - `send`: inject messages only
//! - `health`: probe the health endpoints
//! - `provision`: issue one mailbox
//! - `domains`: check which recipient domains the ingestion port accepts

use std::{path::PathBuf, process::ExitCode, time::Duration};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use mailprobe::{Orchestrator, Scenario, render_health, render_text};
use mailprobe_api::ApiClient;
use mailprobe_common::{
    ContentType, HarnessConfig,
    config::IngestionRoute,
    logging, phase,
};
use mailprobe_health::HealthProber;
use mailprobe_smtp::Injector;

/// End-to-end verification harness for disposable-mailbox services
#[derive(Parser, Debug)]
#[command(name = "mailprobe")]
#[command(about = "Verify a disposable-mailbox service end to end", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (RON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Which ingestion listener receives injected mail
    #[arg(long, value_enum, global = true)]
    route: Option<Route>,

    /// Base URL of the issuance/retrieval API
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Origin of the push channel
    #[arg(long, global = true)]
    push_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Provision, inject, verify and report
    Run {
        /// Messages to inject
        #[arg(long, default_value = "1")]
        count: u32,

        #[arg(long)]
        subject: Option<String>,

        #[arg(long)]
        content: Option<String>,

        /// Send multipart/alternative with an HTML part
        #[arg(long)]
        html: bool,

        /// Subscribe to the push channel before injecting
        #[arg(long)]
        push: bool,

        /// Verification deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Polling interval in milliseconds
        #[arg(long)]
        interval: Option<u64>,

        /// Pause between messages in milliseconds
        #[arg(long)]
        delay: Option<u64>,

        #[arg(long)]
        skip_health: bool,

        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Inject messages into the ingestion port
    Send {
        /// Recipient address
        address: String,

        #[arg(long, default_value = mailprobe::scenario::DEFAULT_SUBJECT)]
        subject: String,

        #[arg(long, default_value = mailprobe::scenario::DEFAULT_BODY)]
        content: String,

        #[arg(long)]
        html: bool,

        /// Number of messages to send
        #[arg(long, default_value = "1")]
        multiple: u32,

        /// Pause between messages in milliseconds
        #[arg(long)]
        delay: Option<u64>,
    },
    /// Probe the health endpoints
    Health {
        #[arg(long, value_enum, default_value = "text")]
        format: Format,
    },
    /// Provision one mailbox and print it
    Provision,
    /// Check which recipient domains the ingestion port accepts
    Domains {
        /// Domains to try; the configured candidates when empty
        domains: Vec<String>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Route {
    Capture,
    Backend,
}

impl From<Route> for IngestionRoute {
    fn from(route: Route) -> Self {
        match route {
            Route::Capture => Self::Capture,
            Route::Backend => Self::Backend,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

const fn content_type(html: bool) -> ContentType {
    if html {
        ContentType::Html
    } else {
        ContentType::Plain
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    logging::init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Run {
            count,
            subject,
            content,
            html,
            push,
            timeout,
            interval,
            delay,
            skip_health,
            format,
        } => {
            let mut scenario = Scenario::from_config(&config)
                .with_count(count)
                .with_push(push)
                .with_health(!skip_health);

            if let Some(subject) = subject {
                scenario = scenario.with_subject(subject);
            }
            if let Some(content) = content {
                scenario = scenario.with_body(content, content_type(html));
            } else {
                scenario.content_type = content_type(html);
            }
            scenario = scenario.with_poll_timing(interval, timeout);
            if let Some(delay) = delay {
                scenario = scenario.with_delay(Duration::from_millis(delay));
            }

            cmd_run(config, &scenario, format).await
        }
        Commands::Send {
            address,
            subject,
            content,
            html,
            multiple,
            delay,
        } => {
            let mut injector = Injector::new(config.ingestion);
            if let Some(delay) = delay {
                injector = injector.with_delay(Duration::from_millis(delay));
            }
            Ok(cmd_send(&injector, &address, &subject, &content, multiple, content_type(html)).await)
        }
        Commands::Health { format } => cmd_health(&config, format).await,
        Commands::Provision => cmd_provision(&config).await,
        Commands::Domains { domains } => {
            let domains = if domains.is_empty() {
                config.ingestion.candidate_domains.clone()
            } else {
                domains
            };
            Ok(cmd_domains(&Injector::new(config.ingestion), &domains).await)
        }
    }
}

/// Loads the configuration file, then applies the global flags on top.
fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let (mut config, origin) = HarnessConfig::load(cli.config.as_deref())?;

    match &origin {
        Some(path) => tracing::debug!(path = %path.display(), "Loaded configuration"),
        None => tracing::debug!("Using built-in configuration defaults"),
    }

    if let Some(route) = cli.route {
        config.ingestion.route = route.into();
    }
    if let Some(url) = &cli.api_url {
        config.api.base_url.clone_from(url);
    }
    if let Some(url) = &cli.push_url {
        config.push.url.clone_from(url);
    }

    config.validate().context("Invalid command-line override")?;
    Ok(config)
}

async fn cmd_run(config: HarnessConfig, scenario: &Scenario, format: Format) -> anyhow::Result<ExitCode> {
    let orchestrator = Orchestrator::new(config)?;
    let result = orchestrator.run(scenario).await;

    match format {
        Format::Text => print!("{}", render_text(&result)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    Ok(ExitCode::from(result.verdict.exit_code()))
}

async fn cmd_send(
    injector: &Injector,
    address: &str,
    subject: &str,
    content: &str,
    count: u32,
    content_type: ContentType,
) -> ExitCode {
    phase!("Sending {count} message(s) to {address}");
    let report = injector
        .inject(address, subject, content, count, content_type)
        .await;

    for message in &report.delivered {
        println!("sent      {}", message.subject);
    }
    for failure in &report.failures {
        println!("failed    #{}: {}", failure.index, failure.error);
    }
    println!(
        "Sent {}/{} message(s) via {}",
        report.delivered_count(),
        report.attempted,
        injector.endpoint().addr()
    );

    if report.all_delivered() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn cmd_health(config: &HarnessConfig, format: Format) -> anyhow::Result<ExitCode> {
    let report = HealthProber::new(&config.api)?.check_health().await;

    match format {
        Format::Text => print!("{}", render_health(&report)),
        Format::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }

    Ok(if report.all_healthy() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

async fn cmd_provision(config: &HarnessConfig) -> anyhow::Result<ExitCode> {
    let api = ApiClient::new(&config.api)?;

    match api.provision().await {
        Ok(provisioned) => {
            let mailbox = &provisioned.mailbox;
            println!("id:        {}", mailbox.id);
            println!("address:   {}", mailbox.address);
            println!("token:     {}", mailbox.masked_token());
            println!(
                "id format: {}",
                if provisioned.id_format_ok {
                    "ok"
                } else {
                    "unexpected (not 24 hex characters)"
                }
            );
            if let Some(url) = &config.frontend_url {
                println!("frontend:  {}/mailbox/{}", url.trim_end_matches('/'), mailbox.id);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, "Provisioning failed");
            Ok(ExitCode::from(2))
        }
    }
}

async fn cmd_domains(injector: &Injector, domains: &[String]) -> ExitCode {
    phase!("Checking {} domain(s) via {}", domains.len(), injector.endpoint().addr());
    let checks = injector.check_domains(domains).await;

    for check in &checks {
        match &check.error {
            None => println!("{:<24} accepted ({})", check.domain, check.address),
            Some(error) => println!("{:<24} refused  {error}", check.domain),
        }
    }

    if checks.iter().all(|c| c.accepted) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
