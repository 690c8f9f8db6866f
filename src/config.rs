//! Command line and environment configuration.
//!
//! ```bash
//! hello-ports --base-port 17571 --count 4
//! HELLO_PORTS_BASE_PORT=8000 HELLO_PORTS_HOST=127.0.0.1 hello-ports
//! ```

use crate::listener::ListenerConfig;
use clap::Parser;
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "hello-ports")]
#[command(about = "Answers every GET with Hello World on a range of consecutive ports")]
#[command(version)]
pub struct Config {
    /// Address every listener binds to
    #[arg(long, default_value = "0.0.0.0", env = "HELLO_PORTS_HOST")]
    pub host: IpAddr,

    /// Lowest port of the range (the historical deployments used 8000 and 17571)
    #[arg(short = 'p', long = "base-port", default_value = "8000", env = "HELLO_PORTS_BASE_PORT")]
    pub base_port: u16,

    /// Number of consecutive ports to listen on
    #[arg(short = 'n', long, default_value = "4", env = "HELLO_PORTS_COUNT")]
    pub count: u16,

    /// Connections handled at once per listener
    #[arg(long = "max-connections", default_value = "256", env = "HELLO_PORTS_MAX_CONNECTIONS")]
    pub max_connections: usize,

    /// Seconds an idle keep-alive connection stays open
    #[arg(long = "keep-alive-secs", default_value = "5", env = "HELLO_PORTS_KEEP_ALIVE_SECS")]
    pub keep_alive_secs: u64,
}

impl Config {
    pub fn from_args() -> Self {
        Config::parse()
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            host: self.host,
            base_port: self.base_port,
            count: self.count,
            max_connections: self.max_connections,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        }
    }
}
