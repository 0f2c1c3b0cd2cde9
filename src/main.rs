use clap::Parser;
use escrow_workflow::application::engine::EscrowEngine;
use escrow_workflow::config::{DEFAULT_CURRENCY, DEFAULT_PORTAL_TOKEN_TTL_DAYS, EngineConfig};
use escrow_workflow::domain::money::CurrencyScale;
use escrow_workflow::infrastructure::clock::SystemClock;
use escrow_workflow::infrastructure::hmac::HmacSha256Verifier;
use escrow_workflow::infrastructure::in_memory::InMemoryStore;
use escrow_workflow::infrastructure::simulated_platform::SimulatedPaymentPlatform;
use escrow_workflow::interfaces::csv::milestone_writer::MilestoneWriter;
use escrow_workflow::interfaces::scenario::{Scenario, ScenarioRunner};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Replays an escrow workflow scenario and prints the resulting milestones.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Scenario JSON file
    input: PathBuf,

    /// Shared secret webhook bodies are signed with
    #[arg(long, env = "ESCROW_WEBHOOK_SECRET", default_value = "simulation-secret", hide_env_values = true)]
    webhook_secret: String,

    /// Decimal digits milestone amounts are rounded to
    #[arg(long, env = "ESCROW_CURRENCY_SCALE", default_value_t = 2)]
    currency_scale: u32,

    /// Currency used when neither the order nor the product names one
    #[arg(long, env = "ESCROW_DEFAULT_CURRENCY", default_value = DEFAULT_CURRENCY)]
    default_currency: String,

    /// Validity of client portal links, in days
    #[arg(long, env = "ESCROW_PORTAL_TOKEN_TTL_DAYS", default_value_t = DEFAULT_PORTAL_TOKEN_TTL_DAYS)]
    portal_token_ttl_days: i64,
}

impl Cli {
    fn config(&self) -> EngineConfig {
        EngineConfig {
            webhook_secret: self.webhook_secret.clone(),
            currency_scale: CurrencyScale::new(self.currency_scale),
            default_currency: self.default_currency.trim().to_ascii_uppercase(),
            portal_token_ttl: chrono::Duration::days(self.portal_token_ttl_days.max(1)),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let engine = EscrowEngine::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(SimulatedPaymentPlatform::new()),
        Arc::new(HmacSha256Verifier),
        Arc::new(SystemClock),
        cli.config(),
    );

    let file = File::open(&cli.input).into_diagnostic()?;
    let scenario = Scenario::from_reader(file).into_diagnostic()?;

    let mut runner = ScenarioRunner::new(&engine);
    runner.seed(&scenario.shops).await.into_diagnostic()?;

    for (index, step) in scenario.steps().enumerate() {
        let number = index + 1;
        match step {
            Ok(step) => {
                if let Err(e) = runner.apply(step).await {
                    eprintln!("Error processing step {number}: {e}");
                }
            }
            Err(e) => {
                eprintln!("Error reading step {number}: {e}");
            }
        }
    }

    let rows = runner.report().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = MilestoneWriter::new(stdout.lock());
    writer.write_rows(rows).into_diagnostic()?;

    Ok(())
}
