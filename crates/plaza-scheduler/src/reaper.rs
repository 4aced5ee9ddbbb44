use std::sync::Arc;

use chrono::Utc;
use plaza_sessions::SessionManager;
use tokio::sync::watch;
use tracing::{error, info};

const TICK_SECS: u64 = 60;

/// Closes sessions idle past the configured interval. Closed sessions are
/// never resumed; a new inbound message opens a fresh one.
pub struct SessionReaper {
    sessions: Arc<SessionManager>,
    idle_minutes: i64,
}

impl SessionReaper {
    pub fn new(sessions: Arc<SessionManager>, idle_minutes: i64) -> Self {
        Self {
            sessions,
            idle_minutes,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(idle_minutes = self.idle_minutes, "session reaper started");
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.sessions.reap_idle(self.idle_minutes, Utc::now()) {
                        error!(error = %e, "session reap failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("session reaper shutting down");
                        break;
                    }
                }
            }
        }
    }
}
