use anyhow::Result;

use mealplan_core::models::{Identity, MealEntry, validate_custom_title};
use mealplan_core::store::{MealPlanStore, StoreConfig};

use super::helpers::{not_found, parse_date, parse_position, print_plan_table};
use super::{Backend, open_store};

pub(crate) async fn cmd_show(
    backend: &Backend,
    identity: Identity,
    config: StoreConfig,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let date = date.map(|d| parse_date(Some(d))).transpose()?;
    let store = open_store(backend, identity, config).await?;

    let days: Vec<(String, Vec<MealEntry>)> = match &date {
        Some(date) => vec![(date.clone(), store.meals_for(date))],
        None => store.planned_meals().into_iter().collect(),
    };

    if json {
        let plan: std::collections::BTreeMap<_, _> = days.into_iter().collect();
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        if let Some(identity) = store.identity() {
            println!("Meal plan for {identity}");
        }
        print_plan_table(&days);
    }
    Ok(())
}

pub(crate) async fn cmd_add(
    backend: &Backend,
    identity: Identity,
    config: StoreConfig,
    recipe_query: &str,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let Some(recipe) = backend.resolve_recipe(recipe_query).await? else {
        not_found(&format!("No recipe found for '{recipe_query}'"), json);
    };
    let title = recipe.title.clone();

    let store = open_store(backend, identity, config).await?;
    store.add_recipe(recipe, &date).await?;
    print_day(&store, &date, &format!("Planned {title} on {date}"), json)
}

pub(crate) async fn cmd_add_custom(
    backend: &Backend,
    identity: Identity,
    config: StoreConfig,
    title: &str,
    date: Option<&str>,
    json: bool,
) -> Result<()> {
    let date = parse_date(date)?;
    let title = validate_custom_title(title)?;

    let store = open_store(backend, identity, config).await?;
    store.add_custom(&title, &date).await?;
    print_day(&store, &date, &format!("Planned \"{title}\" on {date}"), json)
}

pub(crate) async fn cmd_remove(
    backend: &Backend,
    identity: Identity,
    config: StoreConfig,
    date: &str,
    position: usize,
    json: bool,
) -> Result<()> {
    let date = parse_date(Some(date))?;
    let index = parse_position(position)?;

    let store = open_store(backend, identity, config).await?;
    let Some(entry) = store.meals_for(&date).get(index).cloned() else {
        not_found(&format!("No meal #{position} on {date}"), json);
    };
    store.remove(&date, index)?.await?;
    let title = entry.title();
    print_day(&store, &date, &format!("Removed {title} from {date}"), json)
}

fn print_day(store: &MealPlanStore, date: &str, message: &str, json: bool) -> Result<()> {
    let entries = store.meals_for(date);
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "date": date, "meals": entries }))?
        );
    } else {
        println!("{message}");
        print_plan_table(&[(date.to_string(), entries)]);
    }
    Ok(())
}
