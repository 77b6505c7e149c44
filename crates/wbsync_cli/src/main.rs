//! wbsync CLI - pushes catalog data onto Wildberries product cards.

mod commands;
mod config;
mod progress;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::Term;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use wbsync::CardOperation;

use crate::commands::sync::SyncArgs;

#[derive(Parser)]
#[command(name = "wbsync")]
#[command(version)]
#[command(about = "Sync catalog data onto Wildberries product cards")]
#[command(
    long_about = "wbsync pages through the cards of a Wildberries seller account, joins them \
with the internal product catalog by vendor code, and pushes titles, brands, package \
dimensions, photos or brand-new cards back to the marketplace in rate-limited batches."
)]
#[command(after_long_help = r#"EXAMPLES
    Rewrite titles and descriptions for every card:
        $ wbsync rename

    Push brands, skipping two more on top of the configured list:
        $ wbsync brand --ban Nike --ban Adidas

    Fill missing package dimensions with explicit defaults:
        $ wbsync package --length 200 --width 150 --height 100

    See what the media sync would send without uploading:
        $ wbsync media --dry-run --limit 500

    Create cards for catalog items that are not on the marketplace yet:
        $ wbsync create --identity-code 7 --subject-id 3091

CONFIGURATION
    wbsync reads configuration from:
      1. ~/.config/wbsync/config.toml (or $XDG_CONFIG_HOME/wbsync/config.toml)
      2. ./wbsync.toml
      3. Environment variables (WBSYNC_ prefix, __ between section and key)
      4. .env file in current directory

ENVIRONMENT VARIABLES
    WBSYNC_MARKETPLACE__TOKEN   Wildberries content API token
    WB_API_KEY                  Fallback for the token
    WBSYNC_CATALOG__BASE_URL    Catalog service (default: http://localhost:8081)
    WBSYNC_SYNC__WORKERS        Discovery and processing workers (default: 5)
    WBSYNC_METRICS__LISTEN      Address for the Prometheus endpoint
    RUST_LOG                    Log filter (default: wbsync=info,wbsync_cli=info)
"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace card titles and descriptions with normalised catalog text
    Rename {
        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Replace card brands with catalog brands
    Brand {
        /// Additional brand never to push (repeatable)
        #[arg(short = 'b', long = "ban")]
        ban: Vec<String>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Fill in missing package dimensions
    Package {
        /// Default length in millimetres
        #[arg(long)]
        length: Option<i64>,
        /// Default width in millimetres
        #[arg(long)]
        width: Option<i64>,
        /// Default height in millimetres
        #[arg(long)]
        height: Option<i64>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Replace card photos with catalog media
    Media {
        /// Request censored media URLs
        #[arg(long)]
        censored: bool,
        /// Preferred image size in pixels
        #[arg(long)]
        image_size: Option<u32>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Create cards for catalog items missing from the marketplace
    Create {
        /// Supplier identity embedded in vendor codes
        #[arg(long)]
        identity_code: Option<i64>,
        /// Marketplace category for new cards
        #[arg(long)]
        subject_id: Option<i64>,

        #[command(flatten)]
        sync_opts: SyncArgs,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
    /// Generate man page(s)
    Man {
        /// Output directory for man pages (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Commands {
    /// Fold the subcommand's flags into `config` and name the operation.
    fn into_operation(self, config: &mut config::Config) -> Option<CardOperation> {
        match self {
            Commands::Rename { sync_opts } => {
                sync_opts.apply(config);
                Some(CardOperation::Rename)
            }
            Commands::Brand { ban, sync_opts } => {
                sync_opts.apply(config);
                config.brands.banned.extend(ban);
                Some(CardOperation::Brand)
            }
            Commands::Package {
                length,
                width,
                height,
                sync_opts,
            } => {
                sync_opts.apply(config);
                let package = &mut config.package;
                package.length = length.unwrap_or(package.length);
                package.width = width.unwrap_or(package.width);
                package.height = height.unwrap_or(package.height);
                Some(CardOperation::Package)
            }
            Commands::Media {
                censored,
                image_size,
                sync_opts,
            } => {
                sync_opts.apply(config);
                config.catalog.censored |= censored;
                if image_size.is_some() {
                    config.catalog.image_size = image_size;
                }
                Some(CardOperation::Media)
            }
            Commands::Create {
                identity_code,
                subject_id,
                sync_opts,
            } => {
                sync_opts.apply(config);
                config.sync.identity_code = identity_code.unwrap_or(config.sync.identity_code);
                config.sync.subject_id = subject_id.unwrap_or(config.sync.subject_id);
                Some(CardOperation::Create)
            }
            Commands::Completions { .. } | Commands::Man { .. } => None,
        }
    }
}

fn init_tracing(is_tty: bool) {
    // On a terminal the progress bars own stdout; only warnings are logged.
    let default_filter = if is_tty {
        "wbsync=warn,wbsync_cli=warn"
    } else {
        "wbsync=info,wbsync_cli=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing(Term::stdout().is_term());

    let cli = Cli::parse();

    match &cli.command {
        Commands::Completions { shell } => {
            return commands::meta::handle_completions(*shell);
        }
        Commands::Man { output } => {
            return commands::meta::handle_man(output.clone());
        }
        _ => {}
    }

    let mut config = config::Config::load()?;
    let Some(operation) = cli.command.into_operation(&mut config) else {
        return Ok(());
    };

    let root = CancellationToken::new();
    shutdown::setup_shutdown_handler(root.clone());

    commands::sync::handle_sync(operation, &config, root).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn operation_for(args: &[&str], config: &mut config::Config) -> Option<CardOperation> {
        Cli::try_parse_from(args).unwrap().command.into_operation(config)
    }

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn brand_flags_extend_banned_list() {
        let mut config = config::Config::default();
        config.brands.banned = vec!["Puma".to_string()];

        let op = operation_for(&["wbsync", "brand", "--ban", "Nike", "-b", "Adidas"], &mut config);
        assert_eq!(op, Some(CardOperation::Brand));
        assert_eq!(config.brands.banned, vec!["Puma", "Nike", "Adidas"]);
    }

    #[test]
    fn package_flags_override_only_given_dimensions() {
        let mut config = config::Config::default();
        config.package.height = 40;

        let op = operation_for(&["wbsync", "package", "--length", "200", "--width", "150"], &mut config);
        assert_eq!(op, Some(CardOperation::Package));
        assert_eq!(config.package.length, 200);
        assert_eq!(config.package.width, 150);
        assert_eq!(config.package.height, 40);
    }

    #[test]
    fn media_flags_set_catalog_options() {
        let mut config = config::Config::default();
        let op = operation_for(
            &["wbsync", "media", "--censored", "--image-size", "900", "-n"],
            &mut config,
        );
        assert_eq!(op, Some(CardOperation::Media));
        assert!(config.catalog.censored);
        assert_eq!(config.catalog.image_size, Some(900));
        assert!(config.sync.dry_run);
    }

    #[test]
    fn create_flags_set_identity() {
        let mut config = config::Config::default();
        let op = operation_for(
            &["wbsync", "create", "--identity-code", "7", "--subject-id", "3091", "-w", "2"],
            &mut config,
        );
        assert_eq!(op, Some(CardOperation::Create));
        assert_eq!(config.sync.identity_code, 7);
        assert_eq!(config.sync.subject_id, 3091);
        assert_eq!(config.sync.workers, 2);
    }

    #[test]
    fn rename_shares_sync_flags() {
        let mut config = config::Config::default();
        let op = operation_for(
            &["wbsync", "rename", "--limit", "50", "--catalog-url", "http://c.local"],
            &mut config,
        );
        assert_eq!(op, Some(CardOperation::Rename));
        assert_eq!(config.sync.limit, 50);
        assert_eq!(config.catalog.base_url, "http://c.local");
    }

    #[test]
    fn meta_commands_have_no_operation() {
        let mut config = config::Config::default();
        assert_eq!(operation_for(&["wbsync", "completions", "bash"], &mut config), None);
        assert_eq!(operation_for(&["wbsync", "man"], &mut config), None);
    }
}
