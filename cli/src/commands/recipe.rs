use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealplan_core::models::NewRecipe;

use super::Backend;
use super::helpers::{category_name, not_found, parse_ingredient, print_recipe_table, tag_list};

pub(crate) fn cmd_recipe_create(
    backend: &Backend,
    title: &str,
    category_slug: &str,
    image_url: Option<String>,
    ingredients: &[String],
    tags: Vec<String>,
    json: bool,
) -> Result<()> {
    let ingredients = ingredients
        .iter()
        .map(|s| parse_ingredient(s))
        .collect::<Result<Vec<_>>>()?;

    let recipe = backend.catalog()?.with_database(|db| {
        let category = db.get_category_by_slug(category_slug)?.with_context(|| {
            format!("No category with slug '{category_slug}'. Add it with: mealplan category add")
        })?;
        db.insert_recipe(&NewRecipe {
            title: title.to_string(),
            image_url,
            category_id: category.id,
            ingredients,
            tags,
        })
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        let category = category_name(&recipe);
        println!("Created recipe: {title} (id: {id}, category: {category})");
        println!("Plan it with: mealplan add {id} --date <date>");
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(backend: &Backend, json: bool) -> Result<()> {
    let recipes = backend.catalog()?.with_database(|db| db.list_recipes())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
    } else if recipes.is_empty() {
        println!("No recipes yet. Create one with: mealplan recipe create");
    } else {
        print_recipe_table(&recipes);
    }
    Ok(())
}

pub(crate) async fn cmd_recipe_show(backend: &Backend, query: &str, json: bool) -> Result<()> {
    let Some(recipe) = backend.resolve_recipe(query).await? else {
        not_found(&format!("No recipe found for '{query}'"), json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
        return Ok(());
    }

    let title = &recipe.title;
    let id = recipe.id;
    let category = category_name(&recipe);
    println!("{title} (id: {id})");
    println!("Category: {category}");
    if let Some(url) = &recipe.image_url {
        println!("Image: {url}");
    }
    if !recipe.tags.is_empty() {
        println!("Tags: {}", tag_list(&recipe));
    }

    if recipe.ingredients.is_empty() {
        println!("\nNo ingredients.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Amount (g)")]
        grams: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let rows: Vec<IngredientRow> = recipe
        .ingredients
        .iter()
        .map(|i| IngredientRow {
            name: i.ingredient.name.clone(),
            grams: format!("{:.1}", i.amount_in_grams),
            unit: i.unit.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("\n{table}");
    Ok(())
}
