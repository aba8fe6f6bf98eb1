//! CLI arguments and server configuration defaults.

use clap::Parser;

/// Hard ceiling on a single upload request body (8 MiB).
pub const MAX_UPLOAD_SIZE: usize = 8 * 1024 * 1024;
pub const IMAGE_FIELD: &str = "imageFile";
pub const AUTH_PARAM: &str = "auth";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// CLI arguments and environment configuration for the server.
#[derive(Parser, Debug)]
#[command(name = "imgdrop", version, about = "Image upload server")]
pub struct Args {
    #[arg(
        long,
        env = "TOKEN",
        hide_env_values = true,
        help = "Shared secret expected in the `auth` request parameter"
    )]
    pub token: String,
    #[arg(
        short = 'b',
        long,
        env = "IMGDROP_BIND",
        default_value = "0.0.0.0",
        help = "Bind address"
    )]
    pub host: String,
    #[arg(
        short = 'p',
        long,
        env = "IMGDROP_PORT",
        default_value_t = DEFAULT_PORT,
        help = "HTTP port"
    )]
    pub port: u16,
    #[arg(
        short = 'u',
        long,
        env = "IMGDROP_UPLOAD_DIR",
        default_value = "uploaded",
        help = "Directory receiving uploaded images"
    )]
    pub upload_dir: String,
    #[arg(
        short = 's',
        long,
        env = "IMGDROP_STATIC_DIR",
        default_value = "static",
        help = "Directory served for every other GET path"
    )]
    pub static_dir: String,
    #[arg(
        short = 'd',
        long,
        env = "IMGDROP_DATABASE",
        default_value = "images.db",
        help = "SQLite database file holding image metadata"
    )]
    pub database: String,
    #[arg(
        long,
        env = "IMGDROP_DB_MAX_CONNECTIONS",
        default_value_t = DEFAULT_DB_MAX_CONNECTIONS,
        help = "Maximum pooled database connections"
    )]
    pub db_max_connections: u32,
    #[arg(long, env = "IMGDROP_LOG_JSON", help = "Emit logs as JSON")]
    pub log_json: bool,
}
