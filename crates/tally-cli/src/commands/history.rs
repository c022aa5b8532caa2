//! History command - list recorded usage snapshots

use anyhow::{bail, Result};
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

use tally_core::{Database, RestBackend, SessionProbe, UsageHistory};

use super::Context;
use crate::output::print_output;

/// One row of history output
#[derive(Serialize, Tabled)]
struct HistoryRow {
    #[tabled(rename = "Recorded At")]
    recorded_at: String,
    #[tabled(rename = "Messages Left")]
    messages_left: u32,
    #[tabled(rename = "Message Limit")]
    message_limit: u32,
}

pub async fn run(ctx: &Context, user: Option<String>, limit: u32) -> Result<()> {
    // Explicit --user wins; otherwise resolve the signed-in identity
    let user_id = match user {
        Some(user) => user,
        None => {
            ctx.config.validate()?;
            let backend = Arc::new(RestBackend::new(&ctx.config)?);
            match backend.resolve().await {
                Ok(Some(identity)) => identity.id,
                _ => bail!("not signed in; pass --user to select an account"),
            }
        }
    };

    let db = Database::new().await?;
    let history = UsageHistory::new(db.pool.clone());
    let snapshots = history.recent(&user_id, limit).await?;

    let rows: Vec<HistoryRow> = snapshots
        .iter()
        .map(|snapshot| HistoryRow {
            recorded_at: snapshot.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            messages_left: snapshot.record.left,
            message_limit: snapshot.record.limit,
        })
        .collect();

    print_output(&rows, ctx.format)?;
    Ok(())
}
