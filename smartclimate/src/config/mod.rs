//! INI configuration file.
//!
//! Settings live in `config.ini` under the user's configuration directory
//! (e.g. `~/.config/smartclimate/config.ini` on Linux):
//!
//! ```text
//! [thermal]      state machine thresholds and timing
//! [probe]        calibration probe windows and acceptance
//! [offset]       offset learning
//! [preferences]  comfort level and optional explicit tolerances
//! [storage]      record backend and directory
//! [logging]      level and optional log directory
//! ```
//!
//! Durations are written in seconds (`*_secs`). Empty values mean "use the
//! default". A missing file yields the defaults; a malformed value is an
//! error naming the offending `section.key`.

mod file;
mod keys;

pub use file::{config_directory, config_file_path, ConfigError, ConfigFile, StorageBackend, StorageConfig};
pub use keys::ConfigKey;
