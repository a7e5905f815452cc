//! Server configuration, read from the command line or environment

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use docsign_core::{BoundsMode, CompositorOptions};
use upload_core::{ValidationLimits, DEFAULT_MAX_FILES, DEFAULT_MAX_FILE_SIZE};

/// Multipart framing and form fields on top of the file payloads
const BODY_OVERHEAD: usize = 1024 * 1024;

#[derive(Parser, Debug, Clone)]
#[command(name = "docsign-api")]
#[command(about = "Upload, signing and delivery API for DocSign")]
pub struct Config {
    /// Host address to bind to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "3001")]
    pub port: u16,

    /// Directory stored files are written to
    #[arg(long, env = "STORAGE_DIR", default_value = "./uploads")]
    pub storage_dir: PathBuf,

    /// URL prefix recorded in stored file metadata
    #[arg(long, env = "PUBLIC_FILES_PATH", default_value = "/api/files")]
    pub public_files_path: String,

    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:docsign.db?mode=rwc")]
    pub database_url: String,

    #[arg(long, env = "MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    pub max_file_size: u64,

    #[arg(long, env = "MAX_FILES", default_value_t = DEFAULT_MAX_FILES)]
    pub max_files: usize,

    /// permissive, clamp or reject
    #[arg(long, env = "BOUNDS_MODE", default_value = "permissive")]
    pub bounds_mode: BoundsMode,

    /// Composition time allowed per page and signature
    #[arg(long, env = "COMPOSE_BUDGET_MS_PER_OP", default_value_t = 250)]
    pub compose_budget_ms_per_op: u64,

    /// SMTP relay; email delivery is disabled when unset
    #[arg(long, env = "SMTP_HOST")]
    pub smtp_host: Option<String>,

    #[arg(long, env = "SMTP_PORT", default_value_t = 587)]
    pub smtp_port: u16,

    #[arg(long, env = "SMTP_USER")]
    pub smtp_user: Option<String>,

    #[arg(long, env = "SMTP_PASS", hide_env_values = true)]
    pub smtp_pass: Option<String>,

    #[arg(long, env = "SMTP_FROM", default_value = "DocSign <noreply@localhost>")]
    pub smtp_from: String,

    /// Use STARTTLS
    #[arg(long, env = "SMTP_TLS", default_value_t = true, action = ArgAction::Set)]
    pub smtp_tls: bool,

    /// Recipient when a request names none
    #[arg(long, env = "DEFAULT_EMAIL", default_value = "user@example.com")]
    pub default_email: String,

    /// Comma separated; overrides DEFAULT_EMAIL
    #[arg(long, env = "RECIPIENT_EMAILS", value_delimiter = ',')]
    pub recipient_emails: Vec<String>,

    /// Name used in certificates, metadata and emails
    #[arg(long, env = "PRODUCT_NAME", default_value = "DocSign")]
    pub product_name: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    /// Fallback recipients for requests without an explicit list
    pub fn default_recipients(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .recipient_emails
            .iter()
            .map(|e| e.trim())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .collect();
        if configured.is_empty() {
            vec![self.default_email.clone()]
        } else {
            configured
        }
    }

    pub fn limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_file_size: self.max_file_size,
            max_files: self.max_files,
        }
    }

    pub fn compositor_options(&self) -> CompositorOptions {
        CompositorOptions {
            bounds: self.bounds_mode,
            budget_per_op: Duration::from_millis(self.compose_budget_ms_per_op),
            product_name: self.product_name.clone(),
            ..CompositorOptions::default()
        }
    }

    /// Largest request body accepted by multipart endpoints
    pub fn body_limit(&self) -> usize {
        usize::try_from(self.max_file_size)
            .unwrap_or(usize::MAX)
            .saturating_mul(self.max_files.max(1))
            .saturating_add(BODY_OVERHEAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["docsign-api"]);
        assert_eq!(config.port, 3001);
        assert_eq!(config.public_files_path, "/api/files");
        assert_eq!(config.limits(), ValidationLimits::default());
        assert_eq!(config.bounds_mode, BoundsMode::Permissive);
        assert!(config.smtp_tls);
    }

    #[test]
    fn test_recipient_emails_override_default() {
        let config = Config::parse_from([
            "docsign-api",
            "--recipient-emails",
            "a@example.com, b@example.com,",
        ]);
        assert_eq!(
            config.default_recipients(),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );

        let config = Config::parse_from(["docsign-api", "--default-email", "ops@example.com"]);
        assert_eq!(config.default_recipients(), vec!["ops@example.com".to_string()]);
    }

    #[test]
    fn test_bounds_mode_and_budget() {
        let config = Config::parse_from([
            "docsign-api",
            "--bounds-mode",
            "reject",
            "--compose-budget-ms-per-op",
            "100",
        ]);
        let options = config.compositor_options();
        assert_eq!(options.bounds, BoundsMode::Reject);
        assert_eq!(options.budget_per_op, Duration::from_millis(100));
        assert!(Config::try_parse_from(["docsign-api", "--bounds-mode", "loose"]).is_err());
    }

    #[test]
    fn test_smtp_tls_can_be_disabled() {
        let config = Config::parse_from(["docsign-api", "--smtp-tls", "false"]);
        assert!(!config.smtp_tls);
    }
}
