//! Background weekly digest.
//!
//! Wakes up every `check_interval` and, when the last recorded search is at
//! least `search_interval` old, runs a search and emails the digest.

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::models::AppState;
use crate::pipeline;

/// What a single scheduler check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    NotDue,
    Searched,
    Mailed,
    Failed,
}

/// Run one scheduler check.
pub async fn tick(state: &AppState) -> Tick {
    if !state.store.needs_search(Utc::now()).await {
        return Tick::NotDue;
    }

    info!("Scheduled search is due");
    if state.mailer.is_none() {
        return match pipeline::run_search(state).await {
            Ok(summary) => {
                info!(count = summary.articles_found, "Scheduled search completed (email not configured)");
                Tick::Searched
            }
            Err(e) => {
                error!(error = %e, "Scheduled search failed");
                Tick::Failed
            }
        };
    }

    match pipeline::run_digest(state).await {
        Ok(summary) => {
            info!(
                count = summary.articles_count,
                sent = summary.email_sent,
                "Scheduled digest completed"
            );
            Tick::Mailed
        }
        Err(e) => {
            error!(error = %e, "Scheduled digest failed");
            Tick::Failed
        }
    }
}

/// Spawn the check loop. The first check runs immediately.
pub fn spawn(state: AppState) -> JoinHandle<()> {
    let period = state.config.schedule.check_interval;
    info!(every = ?period, "Scheduler started");

    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            tick(&state).await;
        }
    })
}
