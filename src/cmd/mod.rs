//! CLI command implementations.
//!
//! | Module  | Commands handled |
//! |---------|------------------|
//! | `serve` | `Serve`          |
//! | `init`  | `Init`           |
//! | `call`  | `Call`           |
//! | `leads` | `Leads`          |

pub mod call;
pub mod init;
pub mod leads;
pub mod serve;

use std::path::Path;

use anyhow::{Context, Result};
use leadcall::config::AppConfig;

pub use call::cmd_call;
pub use init::cmd_init;
pub use leads::cmd_leads;
pub use serve::cmd_serve;

pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    AppConfig::load(path).context("Failed to load configuration")
}
