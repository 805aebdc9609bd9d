#![warn(
    missing_debug_implementations,
    rust_2018_idioms,
    missing_docs,
    rustdoc::broken_intra_doc_links,
    rustdoc::missing_crate_level_docs
)]

//! Command-line front end for Broadcast Studio

use std::{
    io::{self, Write},
    path::PathBuf,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use broadcast_studio::{
    domain::{
        broadcast::{
            cancellation, estimate_send_time, DispatchJob, Dispatcher, DispatchOutcome, Draft,
            FailureKind, Message,
        },
        recipients::{
            DisposablePolicy, RecipientAddress, RecipientService, RecipientServiceImpl,
            RecipientSet, ValidationPolicy, DEFAULT_MAX_ADDRESSES,
        },
    },
    infrastructure::{
        email::smtp::{SmtpConfig, SmtpTransport},
        storage::file::{FileRecipientStore, RecipientFileConfig},
    },
};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command-line arguments / environment variables
#[derive(Debug, Parser)]
#[command(name = "broadcast", version, about = "Send one message to many recipients over SMTP")]
pub struct Args {
    /// The SMTP configuration
    #[clap(flatten)]
    pub smtp: SmtpConfig,

    /// Where the recipient list is kept
    #[clap(flatten)]
    pub recipients: RecipientFileConfig,

    /// What to do
    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage the stored recipient list
    Recipients {
        /// The list operation
        #[command(subcommand)]
        action: RecipientsCommand,
    },

    /// Check the SMTP credentials for placeholder values
    Check,

    /// Send a broadcast
    Send(SendArgs),
}

/// Recipient list operations
#[derive(Debug, Subcommand)]
pub enum RecipientsCommand {
    /// Print the stored recipients, numbered
    List,

    /// Add addresses separated by commas, semicolons or whitespace
    Add {
        /// Addresses to add
        #[arg(required = true)]
        text: Vec<String>,

        /// Count repeated entries individually in the report
        #[arg(long)]
        keep_duplicates: bool,

        /// Treatment of disposable domains: allow, warn or reject
        #[arg(long, default_value = "reject")]
        disposable: DisposablePolicy,

        /// Add the valid entries even if some are invalid
        #[arg(long)]
        allow_invalid: bool,

        /// Most entries accepted at once
        #[arg(long, default_value_t = DEFAULT_MAX_ADDRESSES)]
        max_addresses: usize,
    },

    /// Remove the recipient with the given number (as shown by `list`)
    Remove {
        /// The recipient number, starting at 1
        number: usize,
    },

    /// Remove every recipient
    Clear,

    /// Print per-domain statistics
    Stats,
}

/// Options for `send`
#[derive(Debug, clap::Args)]
pub struct SendArgs {
    /// The subject line
    #[arg(long, required_unless_present = "demo")]
    pub subject: Option<String>,

    /// The plain text body
    #[arg(long, conflicts_with = "body_file", required_unless_present_any = ["demo", "body_file"])]
    pub body: Option<String>,

    /// Read the plain text body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Send the built-in demo message
    #[arg(long, conflicts_with_all = ["subject", "body", "body_file"])]
    pub demo: bool,

    /// Attempts in flight (1 to 500)
    #[arg(long, env = "DEFAULT_CONCURRENCY")]
    pub concurrency: Option<String>,

    /// Send a single test message to this address instead of the stored list
    #[arg(long)]
    pub to: Option<String>,

    /// Send even if the credentials look like placeholders
    #[arg(long)]
    pub force: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    pub json: bool,
}

#[mutants::skip]
#[tokio::main]
async fn main() -> Result<ExitCode> {
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Failed to load environment: {}", e);

            return Err(e.into());
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let store = Arc::new(FileRecipientStore::from_config(&args.recipients));
    let recipients = RecipientServiceImpl::new(store);

    match args.command {
        Command::Recipients { action } => manage_recipients(&recipients, action).await,
        Command::Check => Ok(check(&args.smtp)),
        Command::Send(send_args) => send(&args.smtp, &recipients, send_args).await,
    }
}

#[mutants::skip]
async fn manage_recipients(
    recipients: &impl RecipientService,
    action: RecipientsCommand,
) -> Result<ExitCode> {
    match action {
        RecipientsCommand::List => {
            let list = recipients.list().await?;

            if list.is_empty() {
                println!("No recipients saved.");
            }

            for (index, address) in list.iter().enumerate() {
                println!("{:>4}. {}", index + 1, address);
            }
        }
        RecipientsCommand::Add {
            text,
            keep_duplicates,
            disposable,
            allow_invalid,
            max_addresses,
        } => {
            let policy = ValidationPolicy {
                deduplicate: !keep_duplicates,
                disposable,
                max_addresses,
            };

            let report = recipients
                .merge(&text.join("\n"), &policy, allow_invalid)
                .await?;

            println!(
                "Added {} new recipients ({} already saved). Total: {}",
                report.added, report.duplicates, report.total
            );

            if let Some(summary) = report.validation.invalid_summary() {
                println!("Skipped invalid addresses: {summary}");
            }

            if let Some(warning) = report.validation.disposable_warning() {
                println!("{warning}");
            }
        }
        RecipientsCommand::Remove { number } => {
            let Some(index) = number.checked_sub(1) else {
                bail!("Recipient numbers start at 1");
            };

            let removed = recipients.remove(index).await?;

            println!("Removed {removed}");
        }
        RecipientsCommand::Clear => {
            let count = recipients.clear().await?;

            println!("Removed all {count} recipients");
        }
        RecipientsCommand::Stats => {
            let list = recipients.list().await?;
            let stats = list.domain_statistics();

            println!("Recipients: {}", list.len());
            println!("Unique domains: {}", stats.unique_domains);

            for (domain, count) in stats.top_domains {
                println!("{:>6}  {}", count, domain);
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[mutants::skip]
fn check(smtp: &SmtpConfig) -> ExitCode {
    let warnings = smtp.validate_credentials();

    if warnings.is_empty() {
        println!(
            "Credentials for {} on {}:{} look usable.",
            smtp.username, smtp.server, smtp.port
        );

        return ExitCode::SUCCESS;
    }

    for warning in warnings {
        println!("{warning}");
    }

    ExitCode::FAILURE
}

#[mutants::skip]
async fn send(
    smtp: &SmtpConfig,
    recipients: &impl RecipientService,
    args: SendArgs,
) -> Result<ExitCode> {
    let body = match (&args.body, &args.body_file) {
        (Some(body), _) => body.clone(),
        (None, Some(path)) => tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => String::new(),
    };

    let demo = Message::default();

    let draft = if args.demo {
        Draft {
            subject: demo.subject().to_string(),
            body: demo.body_text().to_string(),
            concurrency: args.concurrency.clone(),
        }
    } else {
        Draft {
            subject: args.subject.clone().unwrap_or_default(),
            body,
            concurrency: args.concurrency.clone(),
        }
    };

    let composed = match draft.validate() {
        Ok(composed) => composed,
        Err(errors) => {
            for error in errors.0 {
                eprintln!("{error}");
            }

            return Ok(ExitCode::FAILURE);
        }
    };

    for warning in &composed.warnings {
        warn!("{}", warning);
    }

    let credential_warnings = smtp.validate_credentials();

    for warning in &credential_warnings {
        warn!("{}", warning);
    }

    if !credential_warnings.is_empty() && !args.force {
        bail!("Refusing to send with placeholder SMTP credentials. Fix them or pass --force.");
    }

    let targets = match &args.to {
        Some(to) => {
            let address = RecipientAddress::parse(to)
                .with_context(|| format!("invalid test address {to}"))?;

            RecipientSet::from_iter([address])
        }
        None => recipients.list().await?,
    };

    if targets.is_empty() {
        bail!("No recipients saved. Add some with `broadcast recipients add`.");
    }

    let message = if args.demo { demo } else { composed.message };

    info!(
        "Sending to {} recipients with concurrency {} (estimated {:.1}s)",
        targets.len(),
        composed.concurrency,
        estimate_send_time(targets.len(), composed.concurrency).as_secs_f64()
    );

    let transport = SmtpTransport::new(smtp).context("failed to set up the SMTP transport")?;
    let dispatcher = Dispatcher::new(Arc::new(transport));

    let (handle, token) = cancellation();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing attempts already in flight");
            handle.cancel();
        }
    });

    let mut progress = Progress::new(targets.len(), args.json, io::stdout(), io::stderr());

    let job = DispatchJob::new(targets, message)
        .with_concurrency(composed.concurrency)
        .with_cancellation(token);

    let outcome = dispatcher
        .run(job, |address| progress.delivered(address))
        .await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }

    if outcome.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// Prints one line per delivered recipient.
///
/// With JSON output the lines go to the diagnostic stream so the outcome is
/// the only thing on the output stream.
#[derive(Debug)]
struct Progress<O, E> {
    total: usize,
    delivered: usize,
    json: bool,
    out: O,
    diagnostics: E,
}

impl<O, E> Progress<O, E>
where
    O: Write,
    E: Write,
{
    fn new(total: usize, json: bool, out: O, diagnostics: E) -> Self {
        Self {
            total,
            delivered: 0,
            json,
            out,
            diagnostics,
        }
    }

    fn delivered(&mut self, address: &RecipientAddress) {
        self.delivered += 1;

        let target: &mut dyn Write = if self.json {
            &mut self.diagnostics
        } else {
            &mut self.out
        };

        let _ = writeln!(
            target,
            "[{}/{}] Delivered to {}",
            self.delivered, self.total, address
        );
    }
}

#[mutants::skip]
fn print_summary(outcome: &DispatchOutcome) {
    println!(
        "Delivered {} of {} ({} failed, {} not attempted)",
        outcome.succeeded,
        outcome.total,
        outcome.failed.len(),
        outcome.skipped.len()
    );

    for failure in &outcome.failed {
        println!("  {} [{}] {}", failure.address, failure.kind, failure.detail);
    }

    if outcome.count_of(FailureKind::AuthFailure) > 0 {
        if let Some(hint) = FailureKind::AuthFailure.remediation() {
            println!("{hint}");
        }
    }
}
