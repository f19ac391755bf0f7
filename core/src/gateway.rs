use std::sync::{Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use crate::db::Database;
use crate::models::{EntryMatch, NewCustomEntry, NewRecipeEntry, PlanRow};

/// Remote persistence for planner rows.
///
/// Each call is one round trip. Implementations report failures as-is: no
/// retries, no reshaping of the rows beyond decoding them.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// All rows for `user_id`, ordered by row id ascending, with the recipe
    /// graph joined onto recipe-backed rows.
    async fn query_all_for_user(&self, user_id: &str) -> Result<Vec<PlanRow>>;

    /// Returns the id assigned to the new row.
    async fn insert_recipe_entry(&self, entry: &NewRecipeEntry) -> Result<i64>;

    /// Returns the id assigned to the new row.
    async fn insert_custom_entry(&self, entry: &NewCustomEntry) -> Result<i64>;

    /// Deletes every row matching the composite key; returns how many went.
    async fn delete_by_match(&self, criteria: &EntryMatch) -> Result<u64>;

    async fn delete_by_id(&self, user_id: &str, id: i64) -> Result<bool>;
}

/// Gateway over a local SQLite database holding the same schema as the
/// remote store.
pub struct SqliteGateway {
    db: Mutex<Database>,
}

impl SqliteGateway {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db
            .lock()
            .map_err(|_| anyhow!("Planner database lock poisoned"))
    }

    /// Run `f` against the underlying database, e.g. for catalog lookups.
    pub fn with_database<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.lock()?;
        f(&db)
    }
}

#[async_trait]
impl RemoteGateway for SqliteGateway {
    async fn query_all_for_user(&self, user_id: &str) -> Result<Vec<PlanRow>> {
        self.lock()?.plan_rows_for_user(user_id)
    }

    async fn insert_recipe_entry(&self, entry: &NewRecipeEntry) -> Result<i64> {
        self.lock()?.insert_recipe_entry(entry)
    }

    async fn insert_custom_entry(&self, entry: &NewCustomEntry) -> Result<i64> {
        self.lock()?.insert_custom_entry(entry)
    }

    async fn delete_by_match(&self, criteria: &EntryMatch) -> Result<u64> {
        let removed = self.lock()?.delete_entries_matching(criteria)?;
        Ok(removed as u64)
    }

    async fn delete_by_id(&self, user_id: &str, id: i64) -> Result<bool> {
        self.lock()?.delete_entry(user_id, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MatchTarget, NewCategory, NewRecipe};

    fn seeded() -> (SqliteGateway, i64) {
        let gateway = SqliteGateway::open_in_memory().unwrap();
        let recipe_id = gateway
            .with_database(|db| {
                let category = db.insert_category(&NewCategory {
                    name: "Lunch".to_string(),
                    slug: "lunch".to_string(),
                    image_url: None,
                })?;
                let recipe = db.insert_recipe(&NewRecipe {
                    title: "Caesar Salad".to_string(),
                    image_url: None,
                    category_id: category.id,
                    ingredients: vec![],
                    tags: vec![],
                })?;
                Ok(recipe.id)
            })
            .unwrap();
        (gateway, recipe_id)
    }

    #[tokio::test]
    async fn test_insert_query_delete_roundtrip() {
        let (gateway, recipe_id) = seeded();
        let first = gateway
            .insert_recipe_entry(&NewRecipeEntry {
                user_id: "u1".to_string(),
                recipe_id,
                date: "2024-03-04".to_string(),
            })
            .await
            .unwrap();
        let second = gateway
            .insert_custom_entry(&NewCustomEntry {
                user_id: "u1".to_string(),
                custom_title: "Eat out".to_string(),
                date: "2024-03-04".to_string(),
            })
            .await
            .unwrap();
        assert!(first < second);

        let rows = gateway.query_all_for_user("u1").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].recipe.as_ref().unwrap().title, "Caesar Salad");

        let removed = gateway
            .delete_by_match(&EntryMatch {
                user_id: "u1".to_string(),
                date: "2024-03-04".to_string(),
                target: MatchTarget::Recipe(recipe_id),
            })
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(gateway.delete_by_id("u1", second).await.unwrap());
        assert!(gateway.query_all_for_user("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_failure_is_reported() {
        let (gateway, _) = seeded();
        let err = gateway
            .insert_recipe_entry(&NewRecipeEntry {
                user_id: "u1".to_string(),
                recipe_id: 999,
                date: "2024-03-04".to_string(),
            })
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("999"));
    }
}
