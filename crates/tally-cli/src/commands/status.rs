//! Status command - one-shot usage read

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tabled::Tabled;

use tally_core::{ProfileReader, RestBackend, SessionProbe};

use super::Context;
use crate::output::{print_info, print_single};

/// One row of status output
#[derive(Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Email")]
    email: String,
    #[tabled(rename = "Plan")]
    plan: String,
    #[tabled(rename = "Messages Left")]
    messages_left: u32,
    #[tabled(rename = "Message Limit")]
    message_limit: u32,
}

/// Resolve the identity and read the quota record once.
pub async fn run(ctx: &Context) -> Result<()> {
    ctx.config.validate()?;
    let backend = Arc::new(RestBackend::new(&ctx.config)?);

    let identity = match backend.resolve().await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            print_info("Sign in to track usage", ctx.quiet);
            return Ok(());
        }
        Err(err) => {
            log::warn!("[cli:status] identity resolution failed: {}", err);
            print_info("Sign in to track usage", ctx.quiet);
            return Ok(());
        }
    };

    // Fail-soft like the sync core: a failed read shows as 0/0 unknown
    let record = backend.read_quota(&identity).await.ok();
    let plan = backend
        .read_plan(&identity)
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| "free".to_string());

    match record {
        Some(record) => {
            let row = StatusRow {
                email: identity.email,
                plan,
                messages_left: record.left,
                message_limit: record.limit,
            };
            print_single(&row, ctx.format)?;
        }
        None => {
            // Same failure display as the sync core: unknown usage and
            // no session render identically
            print_info("Sign in to track usage", ctx.quiet);
        }
    }

    Ok(())
}
