use clap::{Parser, Subcommand};
use std::net::SocketAddr;

#[derive(Parser, Debug)]
#[command(name = "stemsplit")]
#[command(about = "Song stem separation service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP API together with in-process workers
    Server(ServerArgs),
    /// Run workers only (needs a queue shared across processes, i.e. Redis)
    Worker(WorkerArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the HTTP server to (overrides server.bind_addr)
    #[arg(long)]
    pub address: Option<SocketAddr>,

    /// In-process workers to start (overrides worker.concurrency; 0 = API only)
    #[arg(long)]
    pub workers: Option<usize>,
}

#[derive(clap::Args, Debug)]
pub struct WorkerArgs {
    /// Workers to start (overrides worker.concurrency)
    #[arg(long)]
    pub workers: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_server_overrides() {
        let cli = Cli::parse_from(["stemsplit", "server", "--address", "127.0.0.1:6000", "--workers", "0"]);
        match cli.command {
            Commands::Server(args) => {
                assert_eq!(args.address, Some("127.0.0.1:6000".parse().unwrap()));
                assert_eq!(args.workers, Some(0));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn parses_worker_defaults() {
        let cli = Cli::parse_from(["stemsplit", "worker"]);
        assert!(matches!(cli.command, Commands::Worker(WorkerArgs { workers: None })));
    }
}
