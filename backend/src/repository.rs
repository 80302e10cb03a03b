use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use diesel::sqlite::SqliteConnection;

use crate::db::DbPool;
use crate::models::{Action, Automation, Device};

/// The tables `id_by_name` may touch. The table name is interpolated into a
/// raw query, so anything outside this set must be rejected up front.
const ALLOWED_TABLES: [&str; 3] = ["devices", "actions", "automations"];

#[derive(Debug, Clone)]
pub enum CatalogError {
    NotFound(String),
    InvalidTable(String),
    Pool(String),
    Database(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotFound(msg) => write!(f, "{}", msg),
            CatalogError::InvalidTable(table) => write!(f, "invalid table: {}", table),
            CatalogError::Pool(e) => write!(f, "database connection error: {}", e),
            CatalogError::Database(e) => write!(f, "database error: {}", e),
        }
    }
}

impl std::error::Error for CatalogError {}

impl CatalogError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }
}

/// Read surface the automation engine consumes. The engine only ever updates
/// automations, and only to advance their bookkeeping timestamps.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn device(&self, id: i32) -> Result<Device, CatalogError>;
    async fn action(&self, id: i32) -> Result<Action, CatalogError>;
    async fn automations(&self) -> Result<Vec<Automation>, CatalogError>;
    async fn update_automation(&self, automation: &Automation) -> Result<(), CatalogError>;
    async fn id_by_name(&self, table: &str, name: &str) -> Result<i32, CatalogError>;
}

#[derive(QueryableByName)]
struct IdRow {
    #[diesel(sql_type = Integer)]
    id: i32,
}

pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>, CatalogError>
    {
        self.pool.get().map_err(|e| CatalogError::Pool(e.to_string()))
    }
}

#[async_trait]
impl Catalog for SqliteCatalog {
    async fn device(&self, id: i32) -> Result<Device, CatalogError> {
        use crate::schema::devices;

        let mut conn = self.conn()?;
        devices::table
            .find(id)
            .select(Device::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| CatalogError::Database(e.to_string()))?
            .ok_or_else(|| CatalogError::NotFound(format!("device {} not found", id)))
    }

    async fn action(&self, id: i32) -> Result<Action, CatalogError> {
        use crate::schema::actions;

        let mut conn = self.conn()?;
        actions::table
            .find(id)
            .select(Action::as_select())
            .first(&mut conn)
            .optional()
            .map_err(|e| CatalogError::Database(e.to_string()))?
            .ok_or_else(|| CatalogError::NotFound(format!("action {} not found", id)))
    }

    async fn automations(&self) -> Result<Vec<Automation>, CatalogError> {
        use crate::schema::automations;

        let mut conn = self.conn()?;
        automations::table
            .select(Automation::as_select())
            .load(&mut conn)
            .map_err(|e| CatalogError::Database(e.to_string()))
    }

    async fn update_automation(&self, automation: &Automation) -> Result<(), CatalogError> {
        use crate::schema::automations;

        let mut conn = self.conn()?;
        let updated = diesel::update(automations::table.find(automation.id))
            .set((
                automations::name.eq(&automation.name),
                automations::enabled.eq(automation.enabled),
                automations::definition.eq(&automation.definition),
                automations::last_check.eq(&automation.last_check),
                automations::last_triggers_run.eq(&automation.last_triggers_run),
                automations::last_action_run.eq(&automation.last_action_run),
            ))
            .execute(&mut conn)
            .map_err(|e| CatalogError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(CatalogError::NotFound(format!(
                "automation {} not found",
                automation.id
            )));
        }

        Ok(())
    }

    async fn id_by_name(&self, table: &str, name: &str) -> Result<i32, CatalogError> {
        if !ALLOWED_TABLES.contains(&table) {
            return Err(CatalogError::InvalidTable(table.to_string()));
        }

        let mut conn = self.conn()?;
        let row: Option<IdRow> =
            diesel::sql_query(format!("SELECT id FROM {} WHERE name = ?", table))
                .bind::<diesel::sql_types::Text, _>(name)
                .get_result(&mut conn)
                .optional()
                .map_err(|e| CatalogError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(row.id),
            None => Err(CatalogError::NotFound(format!(
                "'{}' not found in {}",
                name, table
            ))),
        }
    }
}
