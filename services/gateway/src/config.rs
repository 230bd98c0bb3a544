//! Gateway configuration, read from flags or the environment

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Clone)]
#[command(name = "gateway", version, about = "Warpify API gateway", long_about = None)]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8787")]
    pub bind: SocketAddr,

    /// Shared secret used to verify HS256 bearer tokens
    #[arg(long, env = "API_SECRET", hide_env_values = true)]
    pub api_secret: String,

    /// Cloudflare API token
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    pub cloudflare_api_token: String,

    /// Cloudflare account that owns new zones and the KV namespace
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    pub cloudflare_account_id: Option<String>,

    /// Workers KV namespace for audit entries (in-memory when unset)
    #[arg(long, env = "CLOUDFLARE_KV_NAMESPACE_ID")]
    pub kv_namespace_id: Option<String>,

    /// Directory holding uploaded files
    #[arg(long, env = "STORAGE_DIR", default_value = "./data/storage")]
    pub storage_dir: PathBuf,

    /// Public base URL that uploaded files are served from
    #[arg(long, env = "STORAGE_PUBLIC_URL")]
    pub storage_public_url: Option<String>,

    /// Headless browser harness
    #[arg(long, env = "BROWSER_HARNESS_URL", default_value = "http://localhost:9377")]
    pub browser_harness_url: String,

    /// Email platform API base
    #[arg(
        long,
        env = "EMAIL_PLATFORM_URL",
        default_value = "https://server.smartlead.ai/api/v1"
    )]
    pub email_platform_url: String,

    /// Origin allowed by CORS
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from([
            "gateway",
            "--api-secret",
            "s3cret",
            "--cloudflare-api-token",
            "cf-token",
        ])
        .unwrap();

        assert_eq!(config.bind.port(), 8787);
        assert_eq!(config.cors_origin, "http://localhost:3000");
        assert_eq!(config.storage_dir, PathBuf::from("./data/storage"));
        assert!(config.kv_namespace_id.is_none());
    }
}
