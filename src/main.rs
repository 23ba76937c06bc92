//! View Cache
//!
//! Runs either a view cache client or the reference view authority.
//!
//! ```text
//! view-cache authority --bind 0.0.0.0:7700
//! view-cache client --authority-url http://controller:7700 --demo
//! ```

use clap::{Parser, Subcommand};
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use view_cache::{
    AuthorityRef, AuthorityServer, Config, Error, HttpAuthority, Result, ViewCache,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// View Cache - write-through replica of a shared network view
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file
    #[arg(long, global = true, env = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a view cache client
    Client {
        /// View authority base URL
        #[arg(long, env = "VIEW_AUTHORITY_URL")]
        authority_url: Option<String>,

        /// Endpoint listener bind address
        #[arg(long, env = "LISTEN_ADDR")]
        listen_addr: Option<SocketAddr>,

        /// Host advertised to the authority in the callable address
        #[arg(long, env = "ADVERTISE_HOST")]
        advertise_host: Option<String>,

        /// Timeout for each call to the authority
        #[arg(long, env = "CALL_TIMEOUT_MS")]
        call_timeout_ms: Option<u64>,

        /// Continuously write random entries
        #[arg(long)]
        demo: bool,
    },

    /// Run the reference view authority
    Authority {
        /// API bind address
        #[arg(long, env = "AUTHORITY_ADDR")]
        bind: Option<SocketAddr>,

        /// Timeout for each push to a client
        #[arg(long, env = "PUSH_TIMEOUT_MS")]
        push_timeout_ms: Option<u64>,

        /// Failed pushes in a row before a client is dropped
        #[arg(long, env = "MAX_PUSH_FAILURES")]
        max_push_failures: Option<u32>,
    },
}

/// Exit status on SIGINT, following the shell's 128 + signal convention
const SIGINT_EXIT_STATUS: i32 = 128 + 2;

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    // SIGINT exits at once, whatever is in flight
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(SIGINT_EXIT_STATUS);
        }
    });

    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    match args.command {
        Command::Client {
            authority_url,
            listen_addr,
            advertise_host,
            call_timeout_ms,
            demo,
        } => {
            let mut client = config.client;
            if let Some(url) = authority_url {
                client.authority.endpoint = url;
            }
            if let Some(addr) = listen_addr {
                client.cache.listener.bind_addr = addr;
            }
            if advertise_host.is_some() {
                client.cache.listener.advertise_host = advertise_host;
            }
            if let Some(timeout) = call_timeout_ms {
                client.cache.call_timeout_ms = timeout;
                client.authority.request_timeout_ms = timeout;
            }

            info!("Starting view cache client");
            info!("  Version: {}", view_cache::VERSION);
            info!("  Authority: {}", client.authority.endpoint);
            info!("  Listener: {}", client.cache.listener.bind_addr);

            let authority: AuthorityRef = Arc::new(HttpAuthority::new(client.authority)?);
            let cache = ViewCache::initialize(client.cache, authority).await?;
            cache.on_update(|view, source| debug!(%source, "View is now {}", view));

            if demo {
                run_demo(&cache).await
            } else {
                // Serve pushes until SIGINT
                std::future::pending::<()>().await;
                Ok(())
            }
        }

        Command::Authority {
            bind,
            push_timeout_ms,
            max_push_failures,
        } => {
            let mut server = config.authority;
            if let Some(addr) = bind {
                server.bind_addr = addr;
            }
            if let Some(timeout) = push_timeout_ms {
                server.notifier.push_timeout_ms = timeout;
            }
            if let Some(max) = max_push_failures {
                server.authority.max_push_failures = max;
            }

            info!("Starting view authority");
            info!("  Version: {}", view_cache::VERSION);
            info!("  API: {}", server.bind_addr);
            info!("  Max push failures: {}", server.authority.max_push_failures);

            AuthorityServer::new(server)?.run().await
        }
    }
}

// =============================================================================
// Demo Workload
// =============================================================================

async fn run_demo(cache: &ViewCache) -> Result<()> {
    info!("Running demo workload");

    loop {
        let entries = cache.read(|view| view.len());
        let (key, value, pause) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..=100u32),
                rng.gen_range(0..=100u32),
                rng.gen_range(0..=4u64),
            )
        };

        match cache.insert(key.to_string(), value).await {
            Ok(_) => debug!(key, value, entries, "Demo write"),
            Err(Error::WriteThrough { source }) => {
                warn!(key, value, error = %source, "Demo write not forwarded")
            }
            Err(e) => return Err(e),
        }

        tokio::time::sleep(Duration::from_secs(pause)).await;
    }
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=warn", "tower=warn", "axum=info"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
