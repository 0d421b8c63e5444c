//! # Configuration
//!
//! Command-line interface definition. Every option can also be set through
//! a `SAKAHAN_*` environment variable; `main` loads a `.env` file first.

use clap::{Args, Parser, Subcommand};
use sakahan_core::Role;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Minimum length of the token signing secret.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Parser)]
#[command(name = "sakahan")]
#[command(about = "Sakahan crowdsourced land-suitability mapping backend")]
#[command(version)]
pub struct Cli {
    /// Path to the redb database file
    #[arg(
        short = 'D',
        long,
        global = true,
        env = "SAKAHAN_DATABASE",
        default_value = "sakahan.redb"
    )]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the database and seed the suitability levels
    Init {
        /// Delete an existing database first
        #[arg(long)]
        force: bool,
    },

    /// Start the HTTP server
    Serve(ServeArgs),

    /// Show record counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Mint a development access token
    Token(TokenArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "SAKAHAN_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "SAKAHAN_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding attachment blobs
    #[arg(long, env = "SAKAHAN_MEDIA_DIR", default_value = "media")]
    pub media_dir: PathBuf,

    /// HS256 secret shared with the token service
    #[arg(long, env = "SAKAHAN_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Requests per second accepted across all clients
    #[arg(long, env = "SAKAHAN_RATE_LIMIT", default_value_t = 50)]
    pub rate_limit: u32,

    /// Allowed CORS origin (permissive when unset)
    #[arg(long, env = "SAKAHAN_CORS_ORIGIN")]
    pub cors_origin: Option<String>,
}

impl ServeArgs {
    /// The socket address to bind.
    pub fn bind_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("Invalid bind address {}:{}: {}", self.host, self.port, e))
    }
}

#[derive(Debug, Clone, Args)]
pub struct TokenArgs {
    /// HS256 secret shared with the token service
    #[arg(long, env = "SAKAHAN_JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// User id (`sub` claim)
    #[arg(long)]
    pub user: u64,

    #[arg(long)]
    pub email: String,

    #[arg(long, default_value = "")]
    pub first_name: String,

    #[arg(long, default_value = "")]
    pub last_name: String,

    /// contributor or administrator
    #[arg(long, default_value = "contributor")]
    pub role: Role,

    /// Lifetime of the token in hours
    #[arg(long, default_value_t = 24)]
    pub ttl_hours: u32,
}
