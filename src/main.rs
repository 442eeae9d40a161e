use clap::{Parser, Subcommand};
use colored::Colorize;

use liverun::{live, Config};

#[derive(Parser)]
#[command(name = "liverun")]
#[command(version)]
#[command(about = "Live terminal view of a remote test run", long_about = None)]
struct Cli {
    /// Enable debug logging (RUST_LOG still takes precedence)
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a test run published by a web reporter
    Watch {
        /// Reporter address, e.g. http://127.0.0.1:9204/?namespace=/testipytests
        #[arg(default_value = "http://127.0.0.1:9204")]
        url: String,

        /// Socket.IO namespace (overrides ?namespace= in the URL)
        #[arg(short, long)]
        namespace: Option<String>,

        /// Latency probe interval in milliseconds
        #[arg(long, default_value = "1000")]
        ping_interval_ms: u64,

        /// Window of the rolling latency average in milliseconds
        #[arg(long, default_value = "30000")]
        latency_window_ms: u64,

        /// Ended-test column shown as a link to the test log
        #[arg(long, default_value = "3")]
        log_link_column: usize,

        /// Upper bound of the reconnect backoff in milliseconds
        #[arg(long, default_value = "30000")]
        max_reconnect_delay_ms: u64,

        /// Give up on a connection attempt without a handshake after this many milliseconds
        #[arg(long, default_value = "10000")]
        connect_timeout_ms: u64,

        /// Answer prompts with their default value and don't wait on alerts
        #[arg(long, default_value = "false")]
        non_interactive: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match cli.command {
        Commands::Watch {
            url,
            namespace,
            ping_interval_ms,
            latency_window_ms,
            log_link_column,
            max_reconnect_delay_ms,
            connect_timeout_ms,
            non_interactive,
        } => {
            let config = Config {
                server_url: url,
                namespace,
                ping_interval_ms,
                latency_window_ms,
                log_link_column,
                max_reconnect_delay_ms,
                connect_timeout_ms,
                non_interactive,
            };
            let target = config.target()?;

            println!(
                "{} Watching test run at: {}",
                "▶".green().bold(),
                config.server_url
            );
            println!("  Namespace: {}", target.namespace.cyan());
            println!("  Socket: {}", target.socket_url.to_string().cyan());
            if non_interactive {
                println!("  Prompts: {}", "answered with defaults".yellow());
            }

            let dashboard = live::run_live(&config).await?;
            if dashboard.counters.get("failed") > 0 {
                println!(
                    "\n{} {} test(s) failed",
                    "✘".red().bold(),
                    dashboard.counters.get("failed")
                );
            }
        }
    }

    Ok(())
}
