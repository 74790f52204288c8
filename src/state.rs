use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::calendar::CalendarSync;
use crate::services::clock::Clock;
use crate::services::locks::StaffDayLocks;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub calendar: Arc<dyn CalendarSync>,
    pub clock: Arc<dyn Clock>,
    pub booking_locks: StaffDayLocks,
}

impl AppState {
    pub fn new(
        conn: Connection,
        config: AppConfig,
        calendar: Arc<dyn CalendarSync>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config,
            calendar,
            clock,
            booking_locks: StaffDayLocks::default(),
        }
    }

    /// Locks the shared connection. A panic while holding it leaves SQLite in a
    /// consistent state, so poisoning is ignored.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}
