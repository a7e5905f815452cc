//! Application state for DocSign API

use std::sync::Arc;

use anyhow::Result;
use docsign_core::{CertificateAppender, SignatureCompositor};
use upload_core::{FileRepository, FileValidator, StorageWriter};

use crate::config::Config;
use crate::notifier::{DisabledMailer, Mailer, Notifier, SmtpMailer};
use crate::repository::SqliteFileRepository;

pub struct AppState {
    pub config: Config,
    pub storage: StorageWriter,
    pub compositor: SignatureCompositor,
    pub certificates: CertificateAppender,
    pub notifier: Notifier,
}

impl AppState {
    /// Connect to the configured database and mail relay.
    pub async fn new(config: Config) -> Result<Self> {
        let repository = SqliteFileRepository::connect(&config.database_url).await?;
        let mailer: Arc<dyn Mailer> = match SmtpMailer::from_config(&config)? {
            Some(smtp) => Arc::new(smtp),
            None => {
                tracing::warn!("SMTP_HOST not set; signed documents will be stored but not emailed");
                Arc::new(DisabledMailer)
            }
        };
        Self::with_parts(config, Arc::new(repository), mailer).await
    }

    /// Build state around an existing repository and mailer.
    pub async fn with_parts(
        config: Config,
        repository: Arc<dyn FileRepository>,
        mailer: Arc<dyn Mailer>,
    ) -> Result<Self> {
        let storage = StorageWriter::new(
            &config.storage_dir,
            config.public_files_path.clone(),
            FileValidator::new(config.limits()),
            repository,
        )
        .await?;
        let notifier = Notifier::new(
            mailer,
            &config.smtp_from,
            config.default_recipients(),
            config.product_name.clone(),
        )?;

        tracing::info!(
            storage_dir = %config.storage_dir.display(),
            max_file_size = config.max_file_size,
            max_files = config.max_files,
            bounds = ?config.bounds_mode,
            "Application state ready"
        );

        Ok(Self {
            compositor: SignatureCompositor::new(config.compositor_options()),
            certificates: CertificateAppender::new(config.product_name.clone()),
            storage,
            notifier,
            config,
        })
    }
}
