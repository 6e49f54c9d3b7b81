use anyhow::Result;
use chrono::Local;

use crate::config::Config;

use super::open_engine;
use super::status::{print_summary, summarize};

/// Print the summary, then reprint it whenever the poller picks up a change.
/// Runs until Ctrl-C.
pub(crate) async fn cmd_watch(config: &Config) -> Result<()> {
    let (engine, report) = open_engine(config).await?;
    print_summary(&summarize(&report.bundle, &Local::now()));

    let mut updates = engine.subscribe();
    let mut poller = engine.spawn_poller();
    eprintln!(
        "\nWatching for changes every {}s (Ctrl-C to stop)",
        engine.config().poll_interval.as_secs()
    );

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let bundle = updates.borrow_and_update().clone();
                println!();
                print_summary(&summarize(&bundle, &Local::now()));
            }
            _ = &mut poller => {
                eprintln!("Stopped polling: the server no longer accepts this token");
                break;
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    engine.dispose();
    poller.abort();
    Ok(())
}
