mod category;
mod helpers;
mod plan;
mod recipe;

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::config::Config;
use crate::remote::RestGateway;
use mealplan_core::db::Database;
use mealplan_core::gateway::{RemoteGateway, SqliteGateway};
use mealplan_core::models::{Identity, Recipe};
use mealplan_core::store::{MealPlanStore, StoreConfig};

pub(crate) use category::{cmd_category_add, cmd_category_list};
pub(crate) use plan::{cmd_add, cmd_add_custom, cmd_remove, cmd_show};
pub(crate) use recipe::{cmd_recipe_create, cmd_recipe_list, cmd_recipe_show};

/// Where planner rows and the recipe catalog live for this invocation.
pub(crate) enum Backend {
    Local(Arc<SqliteGateway>),
    Remote(Arc<RestGateway>),
}

impl Backend {
    pub(crate) fn connect(config: &Config) -> Result<Self> {
        match &config.remote {
            Some(remote) => {
                tracing::debug!(url = %remote.url, "using remote planner store");
                Ok(Backend::Remote(Arc::new(RestGateway::new(remote)?)))
            }
            None => {
                let db = Database::open(&config.db_path)?;
                Ok(Backend::Local(Arc::new(SqliteGateway::new(db))))
            }
        }
    }

    fn gateway(&self) -> Arc<dyn RemoteGateway> {
        match self {
            Backend::Local(gateway) => Arc::clone(gateway) as Arc<dyn RemoteGateway>,
            Backend::Remote(gateway) => Arc::clone(gateway) as Arc<dyn RemoteGateway>,
        }
    }

    /// The identity to plan for: `MEALPLAN_USER`, or in local mode the
    /// database's own user.
    pub(crate) fn identity(&self, config: &Config) -> Result<Identity> {
        if let Some(user) = &config.user {
            return Ok(Identity::new(user.clone()));
        }
        match self {
            Backend::Local(gateway) => {
                let user_id = gateway.with_database(Database::get_or_create_local_user)?;
                Ok(Identity::new(user_id))
            }
            Backend::Remote(_) => bail!("Set MEALPLAN_USER to the user id to plan for"),
        }
    }

    /// Catalog edits only go to the local database.
    pub(crate) fn catalog(&self) -> Result<&SqliteGateway> {
        match self {
            Backend::Local(gateway) => Ok(gateway),
            Backend::Remote(_) => {
                bail!("Catalog changes are only supported against the local database")
            }
        }
    }

    /// Find a recipe by id, or (locally) by exact title.
    pub(crate) async fn resolve_recipe(&self, query: &str) -> Result<Option<Recipe>> {
        let id = query.trim().parse::<i64>().ok();
        match self {
            Backend::Local(gateway) => gateway.with_database(|db| match id {
                Some(id) => db.find_recipe(id),
                None => db.find_recipe_by_title(query.trim()),
            }),
            Backend::Remote(gateway) => {
                let id = id.with_context(|| {
                    format!("'{query}' is not a recipe id; remote lookups need the numeric id")
                })?;
                gateway.fetch_recipe(id).await
            }
        }
    }
}

/// Build a store for `identity` and load its plan.
pub(super) async fn open_store(
    backend: &Backend,
    identity: Identity,
    config: StoreConfig,
) -> Result<Arc<MealPlanStore>> {
    let store = MealPlanStore::new(backend.gateway(), config);
    store.reload(Some(identity)).await?;
    Ok(store)
}
