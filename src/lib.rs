//! Cabinet — clinic management core.
//!
//! Records patients, consultations and prescriptions, derives consultation
//! prices from their kind, assigns per-patient sequence numbers at first
//! save, and renders prescriptions as A4 PDF documents. The web, template
//! and session layers live elsewhere and consume this crate through its
//! validated entities and field-error sets.

pub mod config;
pub mod consultations;
pub mod db;
pub mod models;
pub mod patients;
pub mod prescription_pdf;
pub mod prescriptions;
pub mod pricing;
pub mod sequence;
pub mod validation;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for binaries embedding this crate. Honors RUST_LOG,
/// falling back to the crate default filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} v{}", config::APP_NAME, config::APP_VERSION);
}
