use anyhow::Result;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

use crate::cli::Cli;
use crate::git::AuthConfig;

pub const HOME_ENV: &str = "JAR_INDEXER_HOME";
pub const SSH_KEY_ENV: &str = "JAR_INDEXER_SSH_KEY";
const DEFAULT_DIR_NAME: &str = ".jar-indexer";

/// `--home`, then `$JAR_INDEXER_HOME`, then `~/.jar-indexer`.
pub fn resolve_storage_root(cli: &Cli) -> Result<PathBuf> {
    storage_root_from(cli.home.clone(), env::var_os(HOME_ENV), dirs::home_dir())
}

fn storage_root_from(flag: Option<PathBuf>, from_env: Option<OsString>, home: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(p) = flag {
        return Ok(p);
    }
    if let Some(p) = from_env.filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(p));
    }
    let home = home.ok_or_else(|| anyhow::anyhow!("Failed to resolve home directory; use --home or {HOME_ENV}"))?;
    Ok(home.join(DEFAULT_DIR_NAME))
}

/// `--ssh-key`, then `$JAR_INDEXER_SSH_KEY`. `None` leaves git's own
/// credential handling alone.
pub fn resolve_auth(cli: &Cli) -> Option<AuthConfig> {
    cli.ssh_key
        .clone()
        .or_else(|| env::var_os(SSH_KEY_ENV).filter(|v| !v.is_empty()).map(PathBuf::from))
        .map(|key| AuthConfig { ssh_key: Some(key) })
}
