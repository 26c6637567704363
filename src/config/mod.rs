pub mod settings;

pub use settings::Config;

use std::sync::Arc;

use crate::error::Result;

/// Loads, validates and logs the process configuration.
///
/// Reads a `.env` file when present, then the environment. The returned
/// `Arc<Config>` is constructed once at startup and passed explicitly to the
/// components that need it.
pub fn load_config() -> Result<Arc<Config>> {
    dotenv::dotenv().ok();
    let config = Config::from_env()?;
    config.validate()?;
    config.log_summary();
    Ok(Arc::new(config))
}
