use anyhow::{Result, bail};
use tabled::{Table, Tabled, settings::Style};

use mealplan_core::models::{NewCategory, slugify};

use super::Backend;

pub(crate) fn cmd_category_add(
    backend: &Backend,
    name: &str,
    slug: Option<&str>,
    image_url: Option<String>,
    json: bool,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Category name must not be empty");
    }
    let slug = slugify(slug.unwrap_or(name));
    if slug.is_empty() {
        bail!("Category '{name}' has no usable characters for a slug; pass --slug");
    }

    let category = backend.catalog()?.with_database(|db| {
        db.insert_category(&NewCategory {
            name: name.to_string(),
            slug,
            image_url,
        })
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&category)?);
    } else {
        let id = category.id;
        let slug = &category.slug;
        println!("Added category: {name} (id: {id}, slug: {slug})");
    }
    Ok(())
}

pub(crate) fn cmd_category_list(backend: &Backend, json: bool) -> Result<()> {
    let categories = backend.catalog()?.with_database(|db| db.list_categories())?;
    if json {
        println!("{}", serde_json::to_string_pretty(&categories)?);
        return Ok(());
    }
    if categories.is_empty() {
        println!("No categories yet. Add one with: mealplan category add <name>");
        return Ok(());
    }

    #[derive(Tabled)]
    struct CategoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Slug")]
        slug: String,
    }

    let rows: Vec<CategoryRow> = categories
        .into_iter()
        .map(|c| CategoryRow {
            id: c.id,
            name: c.name,
            slug: c.slug,
        })
        .collect();
    println!("{}", Table::new(&rows).with(Style::rounded()));
    Ok(())
}
