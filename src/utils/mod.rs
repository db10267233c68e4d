pub mod logging;

pub use logging::{init_logging, default_log_file};
