//! `easydict://` URL scheme dispatch onto the preference store, and the
//! scheme handler answering requests of the embedded web view.

pub mod action;
pub mod config;
pub mod error;
pub mod file_store;
pub mod memory_store;
pub mod scheme;
pub mod store;
pub mod url_scheme_handler;

pub use action::{is_write_action_key, ActionKey};
pub use error::{SchemeError, TaskError};
pub use scheme::{is_easydict_scheme, SchemeParser, SchemeRequest, SchemeResult};
pub use store::PreferenceStore;
pub use url_scheme_handler::UrlSchemeHandler;

pub fn init_logging(cfg: &dyn easydict_config::Config) {
    let rust_log_config = cfg.get(easydict_config::RUST_LOG).ok();
    let mut logger_builder = env_logger::builder();
    if let Some(rust_log) = rust_log_config {
        logger_builder.parse_filters(&rust_log);
    } else {
        logger_builder.filter_level(log::LevelFilter::Info);
    }
    // a second initialization (tests, embedding hosts) keeps the first logger
    if logger_builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
}
