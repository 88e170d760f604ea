//! Application wiring: configuration → watcher → coordinator → sink.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorStats};
use crate::driver::ChromiumFactory;
use crate::error::Result;
use crate::report::ReportSink;
use crate::selectors::SelectorCatalog;
use crate::utils::logging;
use crate::watcher::FileWatcher;

/// Application main structure. Holds everything the run loop needs.
pub struct App {
    config: Arc<Config>,
    catalog: Arc<SelectorCatalog>,
    sink: Arc<ReportSink>,
}

impl App {
    /// Validate folders, load the selector catalog, and prepare the sink.
    pub fn initialize(config: Config) -> Result<Self> {
        config.ensure_directories_exist()?;
        logging::init_log_file(&config.logs_folder, &config.app_name)?;
        logging::log_startup(&config);

        let catalog = match &config.selector_catalog {
            Some(path) => {
                info!("📄 loading selector catalog from {}", path.display());
                SelectorCatalog::from_json_file(path)?
            }
            None => SelectorCatalog::default(),
        };

        let sink = ReportSink::new(&config);

        Ok(Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            sink: Arc::new(sink),
        })
    }

    /// Watch the shared folder and process arrivals until ctrl-c.
    pub async fn run(&self) -> Result<CoordinatorStats> {
        let (events, _watcher_guard) = FileWatcher::start(Arc::clone(&self.config))?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("⏹️ ctrl-c received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });

        let factory = Arc::new(ChromiumFactory::new(Arc::clone(&self.config)));
        let coordinator = Coordinator::new(
            Arc::clone(&self.config),
            Arc::clone(&self.catalog),
            factory,
            Arc::clone(&self.sink),
            shutdown_rx,
        );

        let stats = coordinator.run(events).await;
        logging::print_final_stats(&stats);
        Ok(stats)
    }
}
