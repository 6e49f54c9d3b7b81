mod helpers;
mod log;
mod session;
mod settings;
mod status;
mod user;
mod watch;

use std::sync::Arc;

use anyhow::{Result, bail};

use crate::config::Config;
use crate::http_gateway::HttpGateway;
use dietsync_core::{LoadReport, LocalCache, SyncEngine, SyncError};

pub(crate) use log::cmd_log;
pub(crate) use session::{cmd_login, cmd_logout};
pub(crate) use settings::{cmd_onboard, cmd_settings_set, cmd_settings_show};
pub(crate) use status::cmd_status;
pub(crate) use user::{cmd_user_add, cmd_user_list, cmd_user_revoke};
pub(crate) use watch::cmd_watch;

/// Build an engine for the saved profile and run the initial load.
///
/// Keys that could not be fetched are reported on stderr and served from the
/// local cache.
pub(super) async fn open_engine(config: &Config) -> Result<(Arc<SyncEngine>, LoadReport)> {
    let profile = config.require_profile()?;
    let engine_config = profile.engine_config();
    let gateway = HttpGateway::new(
        &profile.server_url,
        &profile.token,
        engine_config.request_timeout,
    )?;
    let cache = LocalCache::open(&config.cache_path)?;
    let engine = Arc::new(SyncEngine::open(
        &profile.user_id,
        Arc::new(gateway),
        cache,
        engine_config,
    ));

    let report = match engine.load().await {
        Ok(report) => report,
        Err(SyncError::Unauthorized) => {
            bail!("Server rejected the saved token. Run `dietsync login` again")
        }
        Err(e) => return Err(e.into()),
    };
    for (key, err) in &report.errors {
        eprintln!("Warning: could not fetch {key} ({err}); using last known value");
    }
    Ok((engine, report))
}
