use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;

use mealplan_core::assemble::{assemble_recipe, decode_plan_rows};
use mealplan_core::gateway::RemoteGateway;
use mealplan_core::models::{
    EntryMatch, MatchTarget, NewCustomEntry, NewRecipeEntry, PlanRow, Recipe, RecipeRow,
};

use crate::config::RemoteConfig;

const PLANNER_TABLE: &str = "meal_planner";
const RECIPES_TABLE: &str = "recipes";

const RECIPE_GRAPH: &str =
    "categories(*),recipe_ingredients(*,ingredients(*)),recipe_tags(*,tags(*))";

/// PostgREST client for the hosted planner tables.
pub struct RestGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    access_token: String,
}

#[derive(Deserialize)]
struct InsertedRow {
    id: i64,
}

impl RestGateway {
    pub fn new(config: &RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!(
                "mealplan-cli/{} (meal planner)",
                env!("CARGO_PKG_VERSION")
            ))
            .timeout(std::time::Duration::from_secs(10))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            access_token: config
                .access_token
                .clone()
                .unwrap_or_else(|| config.api_key.clone()),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{table}", self.base_url)
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.access_token)
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let resp = self
            .authed(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach remote store ({what})"))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("Remote store rejected {what}: {status} {body}");
        }
        Ok(resp)
    }

    async fn insert_row<T: serde::Serialize + Sync>(&self, row: &T) -> Result<i64> {
        let resp = self
            .send(
                self.client
                    .post(self.table_url(PLANNER_TABLE))
                    .header("Prefer", "return=representation")
                    .json(row),
                "insert",
            )
            .await?;
        let inserted: Vec<InsertedRow> = resp
            .json()
            .await
            .context("Failed to parse insert response")?;
        inserted
            .first()
            .map(|r| r.id)
            .context("Remote store returned no row for the insert")
    }

    async fn delete_rows(&self, filters: &[(&str, String)]) -> Result<u64> {
        let resp = self
            .send(
                self.client
                    .delete(self.table_url(PLANNER_TABLE))
                    .header("Prefer", "return=representation")
                    .query(filters),
                "delete",
            )
            .await?;
        let removed: Vec<InsertedRow> = resp
            .json()
            .await
            .context("Failed to parse delete response")?;
        Ok(removed.len() as u64)
    }

    /// Look up one recipe with its category, ingredients and tags.
    pub async fn fetch_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        let resp = self
            .send(
                self.client.get(self.table_url(RECIPES_TABLE)).query(&[
                    ("select", format!("*,{RECIPE_GRAPH}")),
                    ("id", eq(recipe_id)),
                ]),
                "recipe lookup",
            )
            .await?;
        let rows: Vec<RecipeRow> = resp
            .json()
            .await
            .context("Failed to parse recipe response")?;
        Ok(rows.first().map(assemble_recipe))
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

fn planner_select() -> String {
    format!("*,recipes(*,{RECIPE_GRAPH})")
}

/// Parse a planner response body. The body must be a JSON array, but rows
/// inside it that fail to decode are skipped rather than failing the reload.
fn planner_rows_from_body(body: &str) -> Result<Vec<PlanRow>> {
    let values: Vec<Value> = serde_json::from_str(body).context("Failed to parse planner rows")?;
    Ok(decode_plan_rows(values))
}

/// Query-string filters for a composite-key delete.
fn match_filters(criteria: &EntryMatch) -> Vec<(&'static str, String)> {
    let mut filters = vec![
        ("user_id", eq(&criteria.user_id)),
        ("date", eq(&criteria.date)),
    ];
    match &criteria.target {
        MatchTarget::Recipe(id) => filters.push(("recipe_id", eq(id))),
        MatchTarget::CustomTitle(title) => filters.push(("custom_title", eq(title))),
    }
    filters
}

#[async_trait]
impl RemoteGateway for RestGateway {
    async fn query_all_for_user(&self, user_id: &str) -> Result<Vec<PlanRow>> {
        let resp = self
            .send(
                self.client.get(self.table_url(PLANNER_TABLE)).query(&[
                    ("select", planner_select()),
                    ("user_id", eq(user_id)),
                    ("order", "id.asc".to_string()),
                ]),
                "planner query",
            )
            .await?;
        let body = resp.text().await.context("Failed to read planner rows")?;
        planner_rows_from_body(&body)
    }

    async fn insert_recipe_entry(&self, entry: &NewRecipeEntry) -> Result<i64> {
        self.insert_row(entry).await
    }

    async fn insert_custom_entry(&self, entry: &NewCustomEntry) -> Result<i64> {
        self.insert_row(entry).await
    }

    async fn delete_by_match(&self, criteria: &EntryMatch) -> Result<u64> {
        self.delete_rows(&match_filters(criteria)).await
    }

    async fn delete_by_id(&self, user_id: &str, id: i64) -> Result<bool> {
        let removed = self
            .delete_rows(&[("id", eq(id)), ("user_id", eq(user_id))])
            .await?;
        Ok(removed > 0)
    }
}
