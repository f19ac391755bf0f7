use std::collections::HashSet;

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::warn;

use crate::models::{MealEntry, PlanRow, Recipe, RecipeIngredient, RecipeRow, TagRef};

/// Decode a planner response one row at a time.
///
/// A row that does not fit the `PlanRow` shape is logged and skipped so the
/// rest of the plan still loads.
pub fn decode_plan_rows(values: Vec<Value>) -> Vec<PlanRow> {
    let mut rows = Vec::with_capacity(values.len());
    for value in values {
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        match serde_json::from_value::<PlanRow>(value) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(row_id = %id, error = %e, "skipping undecodable planner row"),
        }
    }
    rows
}

/// Rebuild a denormalized `Recipe` from its joined row.
///
/// Absent ingredient or tag arrays are treated as empty, and a missing
/// category stays `None`. A link whose nested ingredient/tag is missing is
/// dropped with a warning. Tags are deduplicated by id, keeping the first
/// occurrence.
pub fn assemble_recipe(row: &RecipeRow) -> Recipe {
    if row.category.is_none() {
        warn!(recipe_id = row.id, "joined recipe has no category");
    }

    let mut ingredients = Vec::new();
    for (pos, link) in row.ingredient_links.as_deref().unwrap_or_default().iter().enumerate() {
        let Some(ingredient) = link.ingredient.clone() else {
            warn!(recipe_id = row.id, link = pos, "dropping ingredient link without an ingredient");
            continue;
        };
        ingredients.push(RecipeIngredient {
            ingredient,
            amount_in_grams: link.amount_in_grams,
            unit: link.unit.clone().unwrap_or_default(),
        });
    }

    let mut seen = HashSet::new();
    let mut tags: Vec<TagRef> = Vec::new();
    for (pos, link) in row.tag_links.as_deref().unwrap_or_default().iter().enumerate() {
        let Some(tag) = link.tag.as_ref() else {
            warn!(recipe_id = row.id, link = pos, "dropping tag link without a tag");
            continue;
        };
        if seen.insert(tag.id) {
            tags.push(tag.clone());
        }
    }

    Recipe {
        id: row.id,
        title: row.title.clone(),
        image_url: row.image_url.clone().filter(|u| !u.is_empty()),
        ingredients,
        category: row.category.clone(),
        tags,
    }
}

/// Map one planner row to the entry it represents.
///
/// Exactly one of `recipe_id` / `custom_title` must be set. Custom entries
/// take the row id as their display id; recipe entries take the recipe id.
pub fn assemble_entry(row: &PlanRow) -> Result<MealEntry> {
    match (row.recipe_id, row.custom_title.as_deref()) {
        (Some(_), Some(_)) => {
            bail!("Planner row {} has both recipe_id and custom_title", row.id)
        }
        (None, None) => bail!("Planner row {} has neither recipe_id nor custom_title", row.id),
        (None, Some(title)) => Ok(MealEntry::custom(row.id, title)),
        (Some(recipe_id), None) => {
            let recipe_row = row.recipe.as_ref().with_context(|| {
                format!("Planner row {} references recipe {recipe_id} missing from the join", row.id)
            })?;
            if recipe_row.id != recipe_id {
                bail!(
                    "Planner row {} references recipe {recipe_id} but joined recipe {}",
                    row.id,
                    recipe_row.id
                );
            }
            Ok(MealEntry::from_recipe(assemble_recipe(recipe_row)))
        }
    }
}
