//! Engine wiring
//!
//! [`Services`] builds every engine component from the configuration and
//! the three port implementations, sharing one credential service, one
//! taxonomy resolver and one replication log between them.

use std::sync::Arc;
use std::time::Duration;

use drivemirror_core::config::Config;
use drivemirror_core::ports::{IRemoteStorage, IStateRepository, ITokenProvider};

use crate::accounts::AccountService;
use crate::credentials::CredentialService;
use crate::download::DownloadResolver;
use crate::reconcile::Reconciler;
use crate::records::RecordService;
use crate::replication::{ReplicationEngine, ReplicationLog};
use crate::scheduler::TokenRefreshSweep;
use crate::taxonomy::TaxonomyResolver;
use crate::tokens::TokenLifecycleManager;
use crate::upload::UploadService;

/// All engine components, ready to be shared with request handlers
#[derive(Clone)]
pub struct Services {
    pub accounts: Arc<AccountService>,
    pub records: Arc<RecordService>,
    pub uploads: Arc<UploadService>,
    pub downloads: Arc<DownloadResolver>,
    pub reconciler: Arc<Reconciler>,
    pub replication: ReplicationEngine,
    pub credentials: Arc<CredentialService>,
    pub taxonomy: Arc<TaxonomyResolver>,
    sweep_interval: Duration,
}

impl Services {
    pub fn new(
        config: &Config,
        storage: Arc<dyn IRemoteStorage>,
        provider: Arc<dyn ITokenProvider>,
        repository: Arc<dyn IStateRepository>,
    ) -> Self {
        let replication_config = &config.replication;

        let tokens = Arc::new(TokenLifecycleManager::from_config(
            Arc::clone(&provider),
            &config.tokens,
        ));
        let credentials = Arc::new(CredentialService::new(tokens, Arc::clone(&repository)));
        let taxonomy = Arc::new(TaxonomyResolver::new(
            Arc::clone(&storage),
            replication_config.root_folder_name.clone(),
        ));

        let replication = ReplicationEngine::new(
            Arc::clone(&storage),
            Arc::clone(&repository),
            Arc::clone(&credentials),
            Arc::clone(&taxonomy),
            replication_config.make_public,
            ReplicationLog::new(replication_config.history_size),
        );

        let uploads = Arc::new(UploadService::new(
            Arc::clone(&storage),
            Arc::clone(&repository),
            Arc::clone(&credentials),
            Arc::clone(&taxonomy),
            replication.clone(),
            replication_config.make_public,
        ));

        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&storage),
            Arc::clone(&repository),
            Arc::clone(&credentials),
            Arc::clone(&taxonomy),
            replication_config.make_public,
        ));

        let downloads = Arc::new(DownloadResolver::new(
            Arc::clone(&storage),
            Arc::clone(&repository),
            Arc::clone(&credentials),
            config.storage.local_dir.clone(),
            replication_config.list_page_size,
        ));

        let records = Arc::new(RecordService::new(
            Arc::clone(&storage),
            Arc::clone(&repository),
            Arc::clone(&credentials),
        ));

        let accounts = Arc::new(AccountService::new(
            provider,
            repository,
            Arc::clone(&credentials),
        ));

        Self {
            accounts,
            records,
            uploads,
            downloads,
            reconciler,
            replication,
            credentials,
            taxonomy,
            sweep_interval: Duration::from_secs(
                u64::from(config.tokens.sweep_interval_minutes.max(1)) * 60,
            ),
        }
    }

    /// A refresh sweep over these services, not yet started
    pub fn token_refresh_sweep(&self) -> TokenRefreshSweep {
        TokenRefreshSweep::new(Arc::clone(&self.accounts), self.sweep_interval)
    }

    pub fn replication_log(&self) -> &ReplicationLog {
        self.replication.log()
    }

    /// Lets background replication jobs finish
    pub async fn shutdown(&self) {
        self.replication.shutdown().await;
    }
}
