use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use mealplan_core::models::{MealEntry, NewRecipeIngredient, Recipe, validate_plan_date};

/// Resolve a date argument to a plan key (`YYYY-MM-DD`).
/// Accepts ISO dates and `today` / `yesterday` / `tomorrow`; defaults to today.
pub(crate) fn parse_date(date_str: Option<&str>) -> Result<String> {
    let today = Local::now().date_naive();
    let date: NaiveDate = match date_str {
        None | Some("today") => today,
        Some("yesterday") => today - chrono::Duration::days(1),
        Some("tomorrow") => today + chrono::Duration::days(1),
        Some(s) => return validate_plan_date(s),
    };
    Ok(date.format("%Y-%m-%d").to_string())
}

/// Parse `name:grams[:unit]` (e.g. `"Olive oil:15:ml"`). Unit defaults to `g`.
pub(crate) fn parse_ingredient(s: &str) -> Result<NewRecipeIngredient> {
    let parts: Vec<&str> = s.split(':').map(str::trim).collect();
    let (name, amount, unit) = match parts.as_slice() {
        [name, amount] => (*name, *amount, "g"),
        [name, amount, unit] => (*name, *amount, *unit),
        _ => bail!("Invalid ingredient '{s}'. Use 'name:grams' or 'name:grams:unit'"),
    };
    if name.is_empty() {
        bail!("Ingredient name must not be empty in '{s}'");
    }
    let amount_in_grams: f64 = amount
        .trim_end_matches('g')
        .parse()
        .with_context(|| format!("Invalid amount '{amount}' in '{s}'"))?;
    if !amount_in_grams.is_finite() || amount_in_grams <= 0.0 {
        bail!("Ingredient amount must be greater than 0 in '{s}'");
    }
    Ok(NewRecipeIngredient {
        name: name.to_string(),
        amount_in_grams,
        unit: if unit.is_empty() { "g" } else { unit }.to_string(),
    })
}

/// Convert a 1-based position from the `#` column to a list index.
pub(crate) fn parse_position(position: usize) -> Result<usize> {
    position
        .checked_sub(1)
        .context("Positions start at 1 (see the # column of `mealplan show`)")
}

pub(crate) fn print_plan_table(days: &[(String, Vec<MealEntry>)]) {
    #[derive(Tabled)]
    struct EntryRow {
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "#")]
        idx: usize,
        #[tabled(rename = "Meal")]
        title: String,
        #[tabled(rename = "Kind")]
        kind: &'static str,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "ID")]
        id: i64,
    }

    let rows: Vec<EntryRow> = days
        .iter()
        .flat_map(|(date, entries)| {
            entries.iter().enumerate().map(move |(i, entry)| EntryRow {
                date: date.clone(),
                idx: i + 1,
                title: truncate(entry.title(), 40),
                kind: if entry.is_custom() { "custom" } else { "recipe" },
                category: entry.recipe().map(category_name).unwrap_or_default(),
                id: entry.display_id(),
            })
        })
        .collect();

    if rows.is_empty() {
        println!("No meals planned.");
        return;
    }

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(1)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe_table(recipes: &[Recipe]) {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
        #[tabled(rename = "Tags")]
        tags: String,
    }

    let rows: Vec<RecipeRow> = recipes
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            title: truncate(&r.title, 40),
            category: category_name(r),
            ingredients: r.ingredients.len(),
            tags: truncate(&tag_list(r), 30),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

/// Category name for display, `-` when the recipe has none.
pub(crate) fn category_name(recipe: &Recipe) -> String {
    recipe
        .category
        .as_ref()
        .map_or_else(|| "-".to_string(), |c| c.name.clone())
}

pub(crate) fn tag_list(recipe: &Recipe) -> String {
    recipe
        .tags
        .iter()
        .map(|t| t.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

/// Report a missing record and exit with status 2.
pub(crate) fn not_found(message: &str, json: bool) -> ! {
    if json {
        println!("{}", json_error(message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
