use crate::config::Schedule;
use crate::web::{AppState, SchedulerStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Fires the pipeline over every registered connection on `schedule` until
/// `cancel` fires.
pub async fn run_scheduler(schedule: Schedule, app_state: Arc<AppState>, cancel: CancellationToken) {
    app_state
        .add_log("INFO", &format!("Starting backup scheduler: {}", schedule))
        .await;
    if app_state.registry.is_empty() {
        app_state
            .add_log("WARN", "No database connections configured. Runs will do nothing.")
            .await;
    }

    let mut last_run = None;
    loop {
        let next_run = schedule.next_after(Utc::now());
        app_state
            .update_scheduler(SchedulerStatus {
                running: true,
                next_run: Some(next_run),
                schedule: schedule.to_string(),
                connection_count: app_state.registry.len(),
                last_run,
            })
            .await;
        info!("Next backup run at {}", next_run);

        let wait = (next_run - Utc::now()).to_std().unwrap_or_default();
        select! {
            _ = sleep(wait) => {}
            _ = cancel.cancelled() => {
                app_state.add_log("INFO", "Scheduler shutdown requested during wait").await;
                break;
            }
        }

        app_state.add_log("INFO", "Executing scheduled backup run").await;
        let report = app_state.pipeline.run_all(app_state.registry.all(), &cancel).await;
        last_run = Some(Utc::now());
        app_state.record_run(&report).await;

        if report.cancelled || cancel.is_cancelled() {
            app_state.add_log("INFO", "Scheduler shutdown requested").await;
            break;
        }
    }

    app_state
        .update_scheduler(SchedulerStatus {
            running: false,
            next_run: None,
            schedule: schedule.to_string(),
            connection_count: app_state.registry.len(),
            last_run,
        })
        .await;
    app_state.add_log("INFO", "Scheduler stopped").await;
}
