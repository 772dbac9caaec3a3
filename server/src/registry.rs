//! Process-wide table registry.
//!
//! Maps table ids to live tables. The registry lock is only held for map
//! lookups and edits, never across a table lock, so a busy table cannot stall
//! joins elsewhere.

use crate::config::ServerConfig;
use crate::error::ValidationError;
use crate::player::Outbox;
use crate::table::{Table, TableHandle};
use log::{debug, info};
use shared::PlayerInfo;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
pub struct SessionRegistry {
    tables: Mutex<HashMap<String, TableHandle>>,
    config: Arc<ServerConfig>,
}

impl SessionRegistry {
    pub fn new(config: Arc<ServerConfig>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    /// Seats a player at `table_id`, creating the table if it does not exist.
    ///
    /// Concurrent calls for the same unknown id end up at the same table. A
    /// table that closed between lookup and seating is dropped from the map
    /// and the join is retried against a fresh one.
    pub async fn join_or_create(
        &self,
        table_id: &str,
        info: PlayerInfo,
        outbox: Outbox,
    ) -> Result<TableHandle, ValidationError> {
        loop {
            let table = self.get_or_create(table_id).await;
            let mut guard = table.lock().await;

            match guard.seat(info.clone(), outbox.clone(), Instant::now()) {
                Ok(()) => {
                    drop(guard);
                    return Ok(table);
                }
                Err(ValidationError::TableClosed) => {
                    drop(guard);
                    debug!("Table {} closed during join, retrying", table_id);
                    self.forget(table_id, &table).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_or_create(&self, table_id: &str) -> TableHandle {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(table_id.to_string()).or_insert_with(|| {
            info!("Creating table {}", table_id);
            Table::new(table_id, Arc::clone(&self.config)).handle()
        });
        Arc::clone(table)
    }

    /// Removes the mapping for `table_id` only if it still points at `table`.
    async fn forget(&self, table_id: &str, table: &TableHandle) {
        let mut tables = self.tables.lock().await;
        if tables
            .get(table_id)
            .is_some_and(|current| Arc::ptr_eq(current, table))
        {
            tables.remove(table_id);
            info!("Deleted table {}", table_id);
        }
    }

    pub async fn get(&self, table_id: &str) -> Option<TableHandle> {
        self.tables.lock().await.get(table_id).cloned()
    }

    /// Unseats a player from a table handle the caller already holds. The
    /// remaining players get a fresh state; an emptied table is deleted.
    pub async fn leave(&self, table: &TableHandle, player_id: &str) -> bool {
        let (table_id, removed, closed) = {
            let mut guard = table.lock().await;
            let removed = guard.unseat(player_id).is_some();
            if removed && !guard.is_closed() {
                guard.broadcast_state();
            }
            (guard.id().to_string(), removed, guard.is_closed())
        };

        if closed {
            self.forget(&table_id, table).await;
        }
        removed
    }

    /// Unseats a player by table id. Unknown ids and players are a no-op.
    pub async fn remove(&self, table_id: &str, player_id: &str) -> bool {
        match self.get(table_id).await {
            Some(table) => self.leave(&table, player_id).await,
            None => false,
        }
    }

    /// Cancels a lobby on behalf of its creator and deletes it.
    pub async fn cancel(&self, table_id: &str, requester: &str) -> Result<(), ValidationError> {
        let table = self
            .get(table_id)
            .await
            .ok_or(ValidationError::TableClosed)?;

        table.lock().await.cancel(requester)?;
        self.forget(table_id, &table).await;
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.tables.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tables.lock().await.is_empty()
    }

    pub async fn table_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tables.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Closes every table and empties the registry.
    pub async fn shutdown(&self) {
        let tables: Vec<TableHandle> = self.tables.lock().await.drain().map(|(_, t)| t).collect();
        info!("Closing {} tables", tables.len());
        for table in tables {
            table.lock().await.close("server is shutting down");
        }
    }
}
