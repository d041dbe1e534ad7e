use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "Cabinet";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// City printed on rendered prescriptions, next to the date.
pub const PRACTICE_PLACE: &str = "Casablanca";

/// Default tracing filter when RUST_LOG is not set.
pub fn default_log_filter() -> String {
    format!("info,{}=debug", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory
/// ~/Cabinet/ on all platforms (user-visible)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Cabinet")
}

/// SQLite database file
pub fn database_path() -> PathBuf {
    app_data_dir().join("database").join("cabinet.db")
}

/// Directory holding the letterhead images for rendered documents
pub fn assets_dir() -> PathBuf {
    app_data_dir().join("assets")
}

pub fn header_image_path() -> PathBuf {
    assets_dir().join("header.png")
}

pub fn footer_image_path() -> PathBuf {
    assets_dir().join("footer.png")
}

/// Directory where generated PDFs are written
pub fn exports_dir() -> PathBuf {
    app_data_dir().join("exports")
}
