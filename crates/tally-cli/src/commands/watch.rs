//! Watch command - live usage synchronization
//!
//! Runs the sync core against the configured backend, prints every
//! usage-state change, and records observed values in the local
//! history database.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use tally_core::{Database, RestBackend, UsageHistory, UsageService, UsageState};

use super::Context;
use crate::output::print_info;

pub async fn run(ctx: &Context, duration_secs: Option<u64>) -> Result<()> {
    ctx.config.validate()?;
    let backend = Arc::new(RestBackend::new(&ctx.config)?);
    let service = UsageService::start(backend.clone(), backend.clone(), backend.clone());

    let db = Database::new().await?;
    let history = UsageHistory::new(db.pool.clone());

    print_info("Watching usage (ctrl-c to stop)...", ctx.quiet);

    let mut rx = service.subscribe();
    let deadline = duration_secs.map(Duration::from_secs);
    let started = tokio::time::Instant::now();
    let mut last_recorded: Option<UsageState> = None;

    loop {
        // Without a deadline the sleep branch is disabled and ctrl-c is
        // the only exit path
        let remaining = deadline
            .map(|deadline| deadline.saturating_sub(started.elapsed()))
            .unwrap_or(Duration::ZERO);
        if deadline.is_some() && remaining.is_zero() {
            break;
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = tokio::time::sleep(remaining), if deadline.is_some() => break,
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *rx.borrow_and_update();
                print_state(&service, state, ctx.quiet);

                // Record each distinct Known value for `tally history`
                if last_recorded != Some(state) {
                    last_recorded = Some(state);
                    if let (Some(record), Some(identity)) =
                        (state.record(), service.status().identity)
                    {
                        if let Err(err) = history.save(&identity.id, &record).await {
                            log::warn!("[cli:watch] failed to record snapshot: {}", err);
                        }
                    }
                }
            }
        }
    }

    service.stop().await;
    print_info("Stopped.", ctx.quiet);
    Ok(())
}

fn print_state(service: &UsageService, state: UsageState, quiet: bool) {
    let email = service.account().map(|account| account.email);
    print_info(&state_line(state, email.as_deref()), quiet);
}

/// One line per state replacement. Unknown and Unauthenticated render
/// the same sign-in prompt; a failed sync never shows an error.
fn state_line(state: UsageState, email: Option<&str>) -> String {
    match state {
        UsageState::Known { left, limit } => {
            format!("{}: {} / {}", email.unwrap_or(""), left, limit)
        }
        UsageState::Unauthenticated | UsageState::Unknown => "Sign in to track usage".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_states_share_the_sign_in_prompt() {
        assert_eq!(state_line(UsageState::Unknown, None), "Sign in to track usage");
        assert_eq!(
            state_line(UsageState::Unauthenticated, None),
            "Sign in to track usage"
        );
    }

    #[test]
    fn test_known_state_shows_account_and_counts() {
        assert_eq!(
            state_line(UsageState::Known { left: 4, limit: 20 }, Some("u1@example.com")),
            "u1@example.com: 4 / 20"
        );
    }
}
