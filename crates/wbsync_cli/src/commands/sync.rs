use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;

use tabled::Tabled;
use tabled::settings::Style;
use tokio_util::sync::CancellationToken;
use wbsync::http::HttpTransport;
use wbsync::http::reqwest_transport::ReqwestTransport;
use wbsync::marketplace::LISTING_TIMEOUT;
use wbsync::sync::ProgressCallback;
use wbsync::{
    CardOperation, CatalogClient, MarketplaceClient, MeteredTransport, MetricsRegistry,
    SyncEngine, SyncError, SyncResult,
};

use crate::commands::metrics_server;
use crate::config::Config;
use crate::progress::ProgressReporter;

/// Flags shared by every sync subcommand. Each overrides its config value.
#[derive(Debug, Clone, Default, clap::Args)]
pub(crate) struct SyncArgs {
    /// Maximum number of cards to discover (default from config or 100000)
    #[arg(short = 'l', long)]
    limit: Option<usize>,

    /// Discovery and processing workers (default from config or 5)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Dry run - build and batch cards without uploading them
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Catalog service base URL
    #[arg(long)]
    catalog_url: Option<String>,

    /// Listing locale (ru, en, zh)
    #[arg(long)]
    locale: Option<String>,

    /// Serve Prometheus metrics on this address while syncing
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,
}

impl SyncArgs {
    pub(crate) fn apply(&self, config: &mut Config) {
        if let Some(limit) = self.limit {
            config.sync.limit = limit;
        }
        if let Some(workers) = self.workers {
            config.sync.workers = workers;
        }
        if self.dry_run {
            config.sync.dry_run = true;
        }
        if let Some(ref url) = self.catalog_url {
            config.catalog.base_url = url.clone();
        }
        if let Some(ref locale) = self.locale {
            config.marketplace.locale = Some(locale.clone());
        }
        if let Some(addr) = self.metrics_listen {
            config.metrics.listen = Some(addr);
        }
    }
}

fn metered(inner: ReqwestTransport, registry: &Arc<MetricsRegistry>) -> Arc<dyn HttpTransport> {
    Arc::new(MeteredTransport::new(Arc::new(inner), Arc::clone(registry)))
}

/// Wire the reqwest-backed clients and the engine from configuration.
pub(crate) fn build_engine(
    config: &Config,
    registry: Arc<MetricsRegistry>,
    progress: Arc<ProgressCallback>,
    cancel: CancellationToken,
) -> Result<SyncEngine, SyncError> {
    let token = config.token().ok_or_else(|| {
        SyncError::config(
            "no marketplace token: set marketplace.token, WBSYNC_MARKETPLACE__TOKEN or WB_API_KEY",
        )
    })?;

    let marketplace = MarketplaceClient::new_with_transport(
        &config.marketplace.base_url,
        &token,
        metered(ReqwestTransport::with_timeout(LISTING_TIMEOUT)?, &registry),
    );

    let catalog = CatalogClient::new_with_transport(
        &config.catalog.base_url,
        metered(
            ReqwestTransport::with_timeout(config.catalog_timeout())?,
            &registry,
        ),
    )?
    .with_timeout(config.catalog_timeout())
    .with_media_options(config.media_options());

    SyncEngine::builder()
        .marketplace(marketplace)
        .catalog(catalog)
        .options(config.sync_options())
        .metrics(registry)
        .progress(progress)
        .cancel(cancel)
        .build()
}

/// Run one card operation and report the outcome.
///
/// The updated count is printed even when the operation fails.
pub(crate) async fn handle_sync(
    operation: CardOperation,
    config: &Config,
    root: CancellationToken,
) -> Result<(), Box<dyn Error>> {
    let registry = MetricsRegistry::new();
    let reporter = Arc::new(ProgressReporter::new());

    let engine = build_engine(
        config,
        Arc::clone(&registry),
        reporter.as_callback(),
        root.child_token(),
    )?;

    let server_stop = root.child_token();
    let server = config.metrics.listen.map(|addr| {
        tokio::spawn(metrics_server::serve(
            addr,
            Arc::clone(&registry),
            server_stop.clone(),
        ))
    });

    let result = engine.run(operation).await;
    reporter.finish();

    server_stop.cancel();
    if let Some(handle) = server {
        match handle.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "Metrics endpoint failed"),
            Err(e) => tracing::warn!(error = %e, "Metrics endpoint task panicked"),
            Ok(Ok(())) => {}
        }
    }

    report(&result, reporter.is_interactive());

    match result.into_parts() {
        (_, Some(error)) => Err(error.into()),
        (_, None) => Ok(()),
    }
}

fn report(result: &SyncResult, interactive: bool) {
    println!("Updated: {}", result.updated);

    for error in &result.errors {
        if interactive {
            eprintln!("  ✗ {error}");
        } else {
            tracing::warn!(error = %error, "Upload batch failed");
        }
    }

    if interactive {
        println!("{}", summary_tables(result));
    }
}

#[derive(Debug, Tabled)]
struct CountRow {
    #[tabled(rename = "Items")]
    name: &'static str,
    #[tabled(rename = "Count")]
    value: u64,
}

#[derive(Debug, Tabled)]
struct ExclusionRow {
    #[tabled(rename = "Filter stage")]
    stage: &'static str,
    #[tabled(rename = "Excluded")]
    count: usize,
}

/// Counter table, followed by the exclusion ledger when anything was excluded.
fn summary_tables(result: &SyncResult) -> String {
    let metrics = result.metrics;
    let counts = [
        ("Dispatched", metrics.dispatched),
        ("Processed", metrics.processed),
        ("Updated", metrics.updated),
        ("Errored", metrics.errored),
    ]
    .into_iter()
    .map(|(name, value)| CountRow { name, value });

    let mut table = tabled::Table::new(counts);
    table.with(Style::rounded());
    let mut out = table.to_string();

    let exclusions: Vec<_> = result
        .ledger
        .counts_by_stage()
        .into_iter()
        .map(|(stage, count)| ExclusionRow {
            stage: stage.name(),
            count,
        })
        .collect();
    if !exclusions.is_empty() {
        let mut table = tabled::Table::new(exclusions);
        table.with(Style::rounded());
        out.push('\n');
        out.push_str(&table.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use wbsync::metrics::MetricsSnapshot;
    use wbsync::sync::{ExclusionLedger, FilterStage};

    fn silent() -> Arc<ProgressCallback> {
        let callback: ProgressCallback = Box::new(|_| {});
        Arc::new(callback)
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.marketplace.token = Some("test-token".to_string());
        config
    }

    #[test]
    fn flags_override_config() {
        let mut config = Config::default();
        config.sync.workers = 9;

        let args = SyncArgs {
            limit: Some(250),
            dry_run: true,
            catalog_url: Some("http://catalog.local".to_string()),
            locale: Some("en".to_string()),
            metrics_listen: Some("127.0.0.1:9184".parse().unwrap()),
            ..SyncArgs::default()
        };
        args.apply(&mut config);

        assert_eq!(config.sync.limit, 250);
        assert_eq!(config.sync.workers, 9);
        assert!(config.sync.dry_run);
        assert_eq!(config.catalog.base_url, "http://catalog.local");
        assert_eq!(config.marketplace.locale.as_deref(), Some("en"));
        assert!(config.metrics.listen.is_some());
    }

    #[test]
    fn unset_flags_keep_config() {
        let mut config = Config::default();
        config.sync.dry_run = true;
        SyncArgs::default().apply(&mut config);
        assert!(config.sync.dry_run);
        assert_eq!(config.sync.limit, wbsync::sync::DEFAULT_LIMIT);
    }

    #[test]
    fn build_engine_applies_options() {
        let mut config = configured();
        config.sync.workers = 3;
        config.brands.banned = vec!["Nike".to_string()];

        let engine = build_engine(
            &config,
            MetricsRegistry::new(),
            silent(),
            CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(engine.options().workers, 3);
        assert!(engine.options().is_banned_brand("NIKE"));
    }

    #[test]
    fn build_engine_rejects_bad_catalog_url() {
        let mut config = configured();
        config.catalog.base_url = "ftp://catalog".to_string();

        let err = build_engine(
            &config,
            MetricsRegistry::new(),
            silent(),
            CancellationToken::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, SyncError::Config { .. }));
    }

    #[test]
    fn build_engine_rejects_zero_workers() {
        let mut config = configured();
        config.sync.workers = 0;

        let result = build_engine(
            &config,
            MetricsRegistry::new(),
            silent(),
            CancellationToken::new(),
        );
        assert!(matches!(result, Err(SyncError::Config { .. })));
    }

    #[tokio::test]
    async fn unreachable_catalog_fails_the_command() {
        let mut config = configured();
        config.catalog.base_url = "http://127.0.0.1:1".to_string();

        let result = handle_sync(CardOperation::Rename, &config, CancellationToken::new()).await;
        assert!(result.is_err());
    }

    #[test]
    fn summary_lists_counts_and_exclusions() {
        let mut ledger = ExclusionLedger::new();
        ledger.record(3, FilterStage::Brands);
        ledger.record(4, FilterStage::Brands);
        ledger.record(5, FilterStage::Titles);

        let result = SyncResult {
            operation: Some(CardOperation::Brand),
            updated: 7,
            metrics: MetricsSnapshot {
                dispatched: 10,
                processed: 10,
                updated: 7,
                errored: 3,
            },
            ledger,
            ..SyncResult::default()
        };

        let text = summary_tables(&result);
        assert!(text.contains("Dispatched"));
        assert!(text.contains("Errored"));
        assert!(text.contains(FilterStage::Brands.name()));
        assert!(text.contains(FilterStage::Titles.name()));
        assert!(!text.contains(FilterStage::Barcodes.name()));
    }

    #[test]
    fn summary_omits_empty_ledger() {
        let text = summary_tables(&SyncResult::default());
        assert!(text.contains("Updated"));
        assert!(!text.contains("Filter stage"));
    }
}
