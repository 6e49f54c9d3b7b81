use anyhow::{Result, bail};
use std::time::Duration;

use crate::config::{ClientProfile, Config};
use crate::http_gateway::HttpGateway;
use dietsync_core::LocalCache;
use dietsync_core::error::SyncError;

/// Pick the user id to save: the server's answer, which a user id given on
/// the command line must agree with.
fn resolve_user(claimed: Option<&str>, server_user: String) -> Result<String> {
    match claimed {
        Some(claimed) if claimed != server_user => {
            bail!("Token belongs to {server_user}, not {claimed}")
        }
        _ => Ok(server_user),
    }
}

/// Ask the server who the token belongs to, then save the profile under
/// that user id.
pub(crate) async fn cmd_login(
    config: &Config,
    mut profile: ClientProfile,
    claimed_user: Option<&str>,
) -> Result<()> {
    let gateway = HttpGateway::new(
        &profile.server_url,
        &profile.token,
        Duration::from_secs(profile.request_timeout_secs.max(1)),
    )?;

    let server_user = match gateway.whoami().await {
        Ok(user_id) => user_id,
        Err(SyncError::Unauthorized) => bail!("Server rejected the token"),
        Err(e) => bail!("Could not reach {}: {e}", profile.server_url),
    };
    profile.user_id = resolve_user(claimed_user, server_user)?;

    config.save_profile(&profile)?;
    println!("Logged in as {} on {}", profile.user_id, profile.server_url);
    Ok(())
}

/// Forget the saved profile and the signed-in user's cached values.
pub(crate) fn cmd_logout(config: &Config) -> Result<()> {
    let Some(profile) = config.load_profile()? else {
        eprintln!("Not logged in");
        return Ok(());
    };

    if config.cache_path.exists() {
        let cache = LocalCache::open(&config.cache_path)?;
        cache.clear_user(&profile.user_id)?;
    }
    config.remove_profile()?;
    println!("Logged out {}", profile.user_id);
    Ok(())
}
