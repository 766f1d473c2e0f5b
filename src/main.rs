use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use torsocks::{TargetAddr, TorSocks5Config, TorSocks5Manager};

#[derive(Parser)]
#[command(name = "torsocks", about = "Talk to a Tor SOCKS proxy")]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Overrides the proxy address from the config.
    #[arg(short, long)]
    proxy: Option<SocketAddr>,

    /// Share a circuit with other non-isolated requests.
    #[arg(long)]
    no_isolation: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Open a tunnel, send a payload and print the response.
    Connect {
        host: String,
        port: u16,
        #[arg(long, default_value = "")]
        payload: String,
    },
    /// Resolve a hostname to an IP address through Tor.
    Resolve { hostname: String },
    /// Look up the hostname of an IP address through Tor.
    ReverseResolve { addr: IpAddr },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => TorSocks5Config::from_file(path)?,
        None => TorSocks5Config::default(),
    };
    if let Some(proxy) = args.proxy {
        config.proxy_addr = proxy;
    }

    let manager = TorSocks5Manager::new(config)?;
    let isolate = !args.no_isolation;

    match args.command {
        Cmd::Connect {
            host,
            port,
            payload,
        } => {
            let target = match host.parse::<IpAddr>() {
                Ok(ip) => TargetAddr::from((ip, port)),
                Err(_) => TargetAddr::domain(host, port),
            };
            let mut tunnel = manager.establish_tunnel(target, isolate).await?;
            let payload = payload.replace("\\r\\n", "\r\n");
            let response = tunnel.send(payload.as_bytes()).await?;
            println!("{}", String::from_utf8_lossy(&response));
            tunnel.release().await;
        }
        Cmd::Resolve { hostname } => {
            println!("{}", manager.resolve(&hostname, isolate).await?);
        }
        Cmd::ReverseResolve { addr } => {
            println!("{}", manager.reverse_resolve(addr, isolate).await?);
        }
    }

    Ok(())
}
