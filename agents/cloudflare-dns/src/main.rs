//! Cloudflare DNS CLI
//!
//! Operator tool for inspecting the zones Warpify provisions.
//!
//! # Usage
//! ```bash
//! # Check the API token
//! cloudflare-dns verify-token
//!
//! # Show zone details and nameservers
//! cloudflare-dns zone --domain example.com
//!
//! # List DNS records
//! cloudflare-dns records --domain example.com
//!
//! # List and delete forwarding rules
//! cloudflare-dns redirects --domain example.com
//! cloudflare-dns delete-redirect --domain example.com --rule-id abc123
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use cloudflare_dns::{CloudflareClient, DnsProvider, Zone};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "cloudflare-dns")]
#[command(about = "Warpify Cloudflare DNS tool", long_about = None)]
#[command(version)]
struct Cli {
    /// Cloudflare API token
    #[arg(long, env = "CLOUDFLARE_API_TOKEN", hide_env_values = true)]
    api_token: String,

    /// Cloudflare account ID
    #[arg(long, env = "CLOUDFLARE_ACCOUNT_ID")]
    account_id: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the API token
    VerifyToken,

    /// Show a zone and its nameservers
    Zone {
        /// Domain name (e.g., example.com)
        #[arg(long)]
        domain: String,
    },

    /// List DNS records for a zone
    Records {
        /// Domain name
        #[arg(long)]
        domain: String,
    },

    /// List page rules (redirects) for a zone
    Redirects {
        /// Domain name
        #[arg(long)]
        domain: String,
    },

    /// Delete a page rule
    DeleteRedirect {
        /// Domain name
        #[arg(long)]
        domain: String,

        /// Page rule ID to delete
        #[arg(long)]
        rule_id: String,
    },
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cf = CloudflareClient::new(cli.api_token)?.with_account_id(cli.account_id);

    match cli.command {
        Commands::VerifyToken => {
            let status = cf.verify_token().await?;
            if status.is_active() {
                info!("Token {} is active", status.id);
            } else {
                warn!("Token {} is {}", status.id, status.status);
            }
        }

        Commands::Zone { domain } => {
            let zone = require_zone(&cf, &domain).await?;
            println!("ID:          {}", zone.id);
            println!("Name:        {}", zone.name);
            println!("Status:      {}", zone.status.as_deref().unwrap_or("unknown"));
            println!("Nameservers: {}", zone.name_servers.join(", "));
        }

        Commands::Records { domain } => {
            let zone = require_zone(&cf, &domain).await?;
            let records = cf.list_dns_records(&zone.id).await?;

            println!("\n{:<36} {:<6} {:<30} {:<40}", "ID", "TYPE", "NAME", "CONTENT");
            println!("{}", "-".repeat(112));

            for record in &records {
                println!(
                    "{:<36} {:<6} {:<30} {:<40}",
                    record.id,
                    record.record_type,
                    truncate(&record.name, 30),
                    truncate(&record.content, 40)
                );
            }

            info!("Listed {} records", records.len());
        }

        Commands::Redirects { domain } => {
            let zone = require_zone(&cf, &domain).await?;
            let rules = cf.list_page_rules(&zone.id).await?;

            println!("\n{:<34} {:<8} {:<30} {:<40}", "ID", "STATUS", "TARGET", "FORWARDS TO");
            println!("{}", "-".repeat(112));

            for rule in &rules {
                let forward = rule
                    .forwarding_url()
                    .map(|f| format!("{} ({})", f.url, f.status_code))
                    .unwrap_or_default();
                println!(
                    "{:<34} {:<8} {:<30} {:<40}",
                    rule.id,
                    rule.status,
                    truncate(rule.target_pattern().unwrap_or(""), 30),
                    truncate(&forward, 40)
                );
            }

            info!("Listed {} page rules", rules.len());
        }

        Commands::DeleteRedirect { domain, rule_id } => {
            let zone = require_zone(&cf, &domain).await?;
            warn!("Deleting page rule {} in {}", rule_id, zone.name);

            cf.delete_page_rule(&zone.id, &rule_id).await?;

            println!("Deleted page rule: {}", rule_id);
        }
    }

    Ok(())
}

async fn require_zone(cf: &CloudflareClient, domain: &str) -> Result<Zone> {
    cf.find_zone(domain)
        .await?
        .with_context(|| format!("Zone not found: {}", domain))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
