use clap::{Parser, Subcommand};
use rwsplit::TopologyConfig;
use rwsplit_http::{serve_app, serve_store};
use rwsplit_replication::StoreNodeConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "rwsplit", about = "Read/write splitting application server and store node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run an application server: writes to the master, reads across replicas
    App {
        #[arg(long, env = "RWSPLIT_TOPOLOGY", default_value = "./topology.json")]
        topology: PathBuf,
        #[arg(long, env = "RWSPLIT_BIND_ADDR", default_value = "127.0.0.1:3000")]
        bind_addr: String,
    },
    /// Run an in-memory data store node over HTTP
    Store {
        #[arg(long, env = "RWSPLIT_DATA_DIR", default_value = "./data")]
        data_dir: PathBuf,
        /// Overrides bind_addr from node.json
        #[arg(long)]
        bind_addr: Option<String>,
        /// Timeout for forwarding writes to followers
        #[arg(long, default_value = "5000")]
        op_timeout_ms: u64,
    },
    /// Load and validate a topology, print it as JSON, and exit
    CheckConfig {
        #[arg(long, env = "RWSPLIT_TOPOLOGY", default_value = "./topology.json")]
        topology: PathBuf,
    },
}

fn load_topology(path: &std::path::Path) -> Result<TopologyConfig, Box<dyn std::error::Error>> {
    TopologyConfig::load_or_default(path).map_err(|e| {
        eprintln!("ERROR: {}", e);
        e.into()
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::App {
            topology,
            bind_addr,
        } => {
            let config = load_topology(&topology)?;
            serve_app(config, &bind_addr).await
        }
        Command::Store {
            data_dir,
            bind_addr,
            op_timeout_ms,
        } => {
            let mut config = StoreNodeConfig::load_or_default(&data_dir);
            if let Some(addr) = bind_addr {
                config.bind_addr = addr;
            }
            serve_store(config, Duration::from_millis(op_timeout_ms)).await
        }
        Command::CheckConfig { topology } => {
            let config = load_topology(&topology)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
    }
}
