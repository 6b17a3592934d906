use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use server_api::{
    list_performances, performance_detail, require_api_key,
    upstream::{KopisClient, UpstreamConfig, DEFAULT_BASE_URL, DEFAULT_USER_AGENT},
    ApiContext,
};
use shared::{
    domain::{
        ListingQuery, PerformanceId, DEFAULT_END_DATE, DEFAULT_PAGE, DEFAULT_REGION,
        DEFAULT_ROWS, DEFAULT_START_DATE,
    },
    error::{ApiError, ErrorCode},
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Query the KOPIS performance API and print the proxy's JSON body.
#[derive(Parser, Debug)]
#[command(name = "kopis-tools")]
struct Cli {
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,
    #[arg(long, default_value_t = 10_000)]
    timeout_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    List {
        #[arg(long, env = "KOPIS_API_KEY")]
        api_key: Option<String>,
        #[arg(long, default_value = DEFAULT_START_DATE)]
        stdate: String,
        #[arg(long, default_value = DEFAULT_END_DATE)]
        eddate: String,
        #[arg(long, default_value = DEFAULT_PAGE)]
        cpage: String,
        #[arg(long, default_value = DEFAULT_ROWS)]
        rows: String,
        #[arg(long, default_value = DEFAULT_REGION)]
        sharea: String,
        #[arg(long)]
        genre: Option<String>,
    },
    Detail {
        id: String,
        #[arg(long, env = "KOPIS_API_KEY")]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let upstream = KopisClient::new(UpstreamConfig {
        base_url: cli.base_url,
        timeout: Duration::from_millis(cli.timeout_ms),
        user_agent: DEFAULT_USER_AGENT.into(),
    })?;
    let ctx = ApiContext { upstream };

    match run(&ctx, cli.command).await {
        Ok(body) => {
            println!("{body}");
            Ok(())
        }
        Err(err) => {
            eprintln!("{}", failure_body(&err));
            std::process::exit(1);
        }
    }
}

async fn run(ctx: &ApiContext, command: Command) -> Result<String, ApiError> {
    let base_url = ctx.upstream.base_url();
    match command {
        Command::List {
            api_key,
            stdate,
            eddate,
            cpage,
            rows,
            sharea,
            genre,
        } => {
            let query = ListingQuery {
                api_key: require_api_key(api_key)?,
                stdate,
                eddate,
                cpage,
                rows,
                sharea,
                genre,
            };
            debug!(
                %base_url,
                stdate = %query.stdate,
                eddate = %query.eddate,
                "listing performances"
            );
            let response = list_performances(ctx, query).await?;
            debug!(count = response.count, "listing finished");
            to_pretty_json(&response)
        }
        Command::Detail { id, api_key } => {
            let api_key = require_api_key(api_key)?;
            debug!(%base_url, %id, "fetching performance detail");
            let response = performance_detail(ctx, PerformanceId(id), &api_key).await?;
            to_pretty_json(&response)
        }
    }
}

fn to_pretty_json(value: &impl serde::Serialize) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|err| ApiError::new(ErrorCode::Internal, err.to_string()))
}

/// The error JSON written to stderr, falling back to the plain message.
fn failure_body(err: &ApiError) -> String {
    serde_json::to_string_pretty(err).unwrap_or_else(|_| err.to_string())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
