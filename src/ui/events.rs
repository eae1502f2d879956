//! Background task event processing.

use crate::app::{App, AppEvent};
use crate::sync::resolve_last_sync;

/// Handle one background event, updating app state and the status bar.
pub(super) async fn handle_app_event(app: &mut App, event: AppEvent) {
    app.needs_redraw = true;
    match event {
        AppEvent::SyncStarted => {
            app.set_status("Syncing...");
        }
        AppEvent::SyncCompleted { outcome } => {
            app.sync_running = false;
            app.set_status(format!(
                "Synced: {} items, {} pushed",
                outcome.items_applied, outcome.pushed
            ));
            if outcome.dropped > 0 {
                tracing::warn!(dropped = outcome.dropped, "Push queue entries dropped during sync");
            }

            refresh_last_sync_label(app).await;

            if let Err(e) = app.reload_feeds().await {
                app.set_status(format!("Error: {}", e));
                return;
            }
            if let Err(e) = app.reload_articles().await {
                app.set_status(format!("Error: {}", e));
            }
        }
        AppEvent::SyncFailed { error } => {
            app.sync_running = false;
            tracing::error!(error = %error, "Sync failed");
            app.set_status(format!("Sync failed: {}", error));
        }
        AppEvent::TaskPanicked { task, error } => {
            app.sync_running = false;
            tracing::error!(task, error = %error, "Background task panicked");
            app.set_status(format!("Internal error in {}: {}", task, error));
        }
    }
}

/// Recompute the "last synced" label shown in the status bar.
async fn refresh_last_sync_label(app: &mut App) {
    let resolved = resolve_last_sync(&app.db, &app.sync_log_path).await;
    app.last_sync_label = resolved.time.map(|t| t.format("%H:%M").to_string());
}
