use clap::Parser;
use server::network::Server;
use shared::DEFAULT_TICK_RATE;

/// Parses command-line arguments, builds the session server and runs it
/// until it stops or the process receives Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Server IP address to bind to
        #[clap(short = 'H', long, default_value = "0.0.0.0")]
        host: String,
        /// Server port to listen on
        #[clap(short, long, default_value = "3000")]
        port: u16,
        /// Simulation tick rate (updates per second)
        #[clap(short, long, default_value_t = DEFAULT_TICK_RATE)]
        tick_rate: u32,
        /// Maximum number of concurrent connections
        #[clap(short, long, default_value = "256")]
        max_connections: usize,
    }

    env_logger::init();
    let args = Args::parse();

    let address = format!("{}:{}", args.host, args.port);
    let mut server = Server::new(&address, args.tick_rate, args.max_connections).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
