use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::assemble::assemble_recipe;
use crate::models::{
    CategoryRef, EntryMatch, IngredientLinkRow, IngredientRef, MatchTarget, NewCategory,
    NewCustomEntry, NewRecipe, NewRecipeEntry, PlanRow, Recipe, RecipeRow, TagLinkRow, TagRef,
};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS categories (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    slug TEXT NOT NULL UNIQUE,
                    image_url TEXT
                );

                CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE
                );

                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE COLLATE NOCASE
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    title TEXT NOT NULL,
                    image_url TEXT,
                    category_id INTEGER NOT NULL REFERENCES categories(id),
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id),
                    amount_in_grams REAL NOT NULL,
                    unit TEXT NOT NULL DEFAULT 'g'
                );

                CREATE TABLE IF NOT EXISTS recipe_tags (
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id),
                    PRIMARY KEY (recipe_id, tag_id)
                );

                CREATE TABLE IF NOT EXISTS meal_planner (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id TEXT NOT NULL,
                    recipe_id INTEGER REFERENCES recipes(id) ON DELETE CASCADE,
                    custom_title TEXT,
                    date TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    CHECK ((recipe_id IS NULL) <> (custom_title IS NULL))
                );

                CREATE INDEX IF NOT EXISTS idx_meal_planner_user_date ON meal_planner(user_id, date);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);
                CREATE INDEX IF NOT EXISTS idx_recipes_title ON recipes(title);

                CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY NOT NULL,
                    value TEXT NOT NULL
                );

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn category_from_row(row: &rusqlite::Row) -> rusqlite::Result<CategoryRef> {
        Ok(CategoryRef {
            id: row.get(0)?,
            name: row.get(1)?,
            slug: row.get(2)?,
            image_url: row.get(3)?,
        })
    }

    // --- Categories ---

    pub fn insert_category(&self, category: &NewCategory) -> Result<CategoryRef> {
        if category.name.trim().is_empty() {
            bail!("Category name must not be empty");
        }
        if category.slug.trim().is_empty() {
            bail!("Category slug must not be empty");
        }
        self.conn
            .execute(
                "INSERT INTO categories (name, slug, image_url) VALUES (?1, ?2, ?3)",
                params![category.name.trim(), category.slug.trim(), category.image_url],
            )
            .with_context(|| format!("Failed to create category '{}'", category.slug))?;
        let id = self.conn.last_insert_rowid();
        self.get_category(id)
    }

    pub fn get_category(&self, id: i64) -> Result<CategoryRef> {
        self.conn
            .query_row(
                "SELECT id, name, slug, image_url FROM categories WHERE id = ?1",
                params![id],
                Self::category_from_row,
            )
            .context("Category not found")
    }

    pub fn get_category_by_slug(&self, slug: &str) -> Result<Option<CategoryRef>> {
        let category = self
            .conn
            .query_row(
                "SELECT id, name, slug, image_url FROM categories WHERE slug = ?1",
                params![slug],
                Self::category_from_row,
            )
            .optional()?;
        Ok(category)
    }

    pub fn list_categories(&self) -> Result<Vec<CategoryRef>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, slug, image_url FROM categories ORDER BY name")?;
        let categories = stmt
            .query_map([], Self::category_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(categories)
    }

    // --- Ingredients & tags ---

    pub fn get_or_create_ingredient(&self, name: &str) -> Result<IngredientRef> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Ingredient name must not be empty");
        }
        self.conn.execute(
            "INSERT OR IGNORE INTO ingredients (name) VALUES (?1)",
            params![name],
        )?;
        self.conn
            .query_row(
                "SELECT id, name FROM ingredients WHERE name = ?1",
                params![name],
                |row| {
                    Ok(IngredientRef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .context("Ingredient not found")
    }

    pub fn get_or_create_tag(&self, name: &str) -> Result<TagRef> {
        let name = name.trim();
        if name.is_empty() {
            bail!("Tag name must not be empty");
        }
        self.conn
            .execute("INSERT OR IGNORE INTO tags (name) VALUES (?1)", params![name])?;
        self.conn
            .query_row(
                "SELECT id, name FROM tags WHERE name = ?1",
                params![name],
                |row| {
                    Ok(TagRef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    })
                },
            )
            .context("Tag not found")
    }

    // --- Recipes ---

    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<Recipe> {
        if recipe.title.trim().is_empty() {
            bail!("Recipe title must not be empty");
        }
        if let Some(bad) = recipe.ingredients.iter().find(|i| i.amount_in_grams < 0.0) {
            bail!("Ingredient '{}' has a negative amount", bad.name);
        }

        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO recipes (title, image_url, category_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![recipe.title.trim(), recipe.image_url, recipe.category_id, now],
            )
            .with_context(|| format!("Failed to create recipe '{}'", recipe.title))?;
        let recipe_id = self.conn.last_insert_rowid();

        for item in &recipe.ingredients {
            let ingredient = self.get_or_create_ingredient(&item.name)?;
            self.conn.execute(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, amount_in_grams, unit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![recipe_id, ingredient.id, item.amount_in_grams, item.unit],
            )?;
        }
        for name in &recipe.tags {
            let tag = self.get_or_create_tag(name)?;
            self.conn.execute(
                "INSERT OR IGNORE INTO recipe_tags (recipe_id, tag_id) VALUES (?1, ?2)",
                params![recipe_id, tag.id],
            )?;
        }
        tx.commit()?;

        self.get_recipe(recipe_id)
    }

    /// Joined row for one recipe, shaped like the remote join.
    fn recipe_row(&self, recipe_id: i64) -> Result<Option<RecipeRow>> {
        let head = self
            .conn
            .query_row(
                "SELECT r.id, r.title, r.image_url, c.id, c.name, c.slug, c.image_url
                 FROM recipes r
                 LEFT JOIN categories c ON r.category_id = c.id
                 WHERE r.id = ?1",
                params![recipe_id],
                |row| {
                    let category = match row.get::<_, Option<i64>>(3)? {
                        Some(id) => Some(CategoryRef {
                            id,
                            name: row.get(4)?,
                            slug: row.get(5)?,
                            image_url: row.get(6)?,
                        }),
                        None => None,
                    };
                    Ok(RecipeRow {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        image_url: row.get(2)?,
                        category,
                        ingredient_links: None,
                        tag_links: None,
                    })
                },
            )
            .optional()?;
        let Some(mut recipe) = head else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT ri.amount_in_grams, ri.unit, i.id, i.name
             FROM recipe_ingredients ri
             JOIN ingredients i ON ri.ingredient_id = i.id
             WHERE ri.recipe_id = ?1
             ORDER BY ri.id",
        )?;
        let links = stmt
            .query_map(params![recipe_id], |row| {
                Ok(IngredientLinkRow {
                    amount_in_grams: row.get(0)?,
                    unit: row.get(1)?,
                    ingredient: Some(IngredientRef {
                        id: row.get(2)?,
                        name: row.get(3)?,
                    }),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        recipe.ingredient_links = Some(links);

        let mut stmt = self.conn.prepare(
            "SELECT t.id, t.name
             FROM recipe_tags rt
             JOIN tags t ON rt.tag_id = t.id
             WHERE rt.recipe_id = ?1
             ORDER BY rt.rowid",
        )?;
        let tags = stmt
            .query_map(params![recipe_id], |row| {
                Ok(TagLinkRow {
                    tag: Some(TagRef {
                        id: row.get(0)?,
                        name: row.get(1)?,
                    }),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        recipe.tag_links = Some(tags);

        Ok(Some(recipe))
    }

    pub fn get_recipe(&self, recipe_id: i64) -> Result<Recipe> {
        let row = self
            .recipe_row(recipe_id)?
            .with_context(|| format!("Recipe {recipe_id} not found"))?;
        Ok(assemble_recipe(&row))
    }

    pub fn find_recipe(&self, recipe_id: i64) -> Result<Option<Recipe>> {
        Ok(self.recipe_row(recipe_id)?.map(|row| assemble_recipe(&row)))
    }

    pub fn find_recipe_by_title(&self, title: &str) -> Result<Option<Recipe>> {
        let id: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM recipes WHERE title = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
                params![title.trim()],
                |row| row.get(0),
            )
            .optional()?;
        id.map(|id| self.get_recipe(id)).transpose()
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare("SELECT id FROM recipes ORDER BY title, id")?;
        let ids: Vec<i64> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids.into_iter().map(|id| self.get_recipe(id)).collect()
    }

    // --- Meal planner ---

    /// Every planner row for `user_id` in id order, with the recipe graph
    /// joined onto recipe-backed rows.
    pub fn plan_rows_for_user(&self, user_id: &str) -> Result<Vec<PlanRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, date, recipe_id, custom_title
             FROM meal_planner
             WHERE user_id = ?1
             ORDER BY id",
        )?;
        let mut rows = stmt
            .query_map(params![user_id], |row| {
                Ok(PlanRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    date: row.get(2)?,
                    recipe_id: row.get(3)?,
                    custom_title: row.get(4)?,
                    recipe: None,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut recipes: HashMap<i64, Option<RecipeRow>> = HashMap::new();
        for row in &mut rows {
            if let Some(recipe_id) = row.recipe_id {
                if !recipes.contains_key(&recipe_id) {
                    recipes.insert(recipe_id, self.recipe_row(recipe_id)?);
                }
                row.recipe = recipes.get(&recipe_id).cloned().flatten();
            }
        }
        Ok(rows)
    }

    pub fn insert_recipe_entry(&self, entry: &NewRecipeEntry) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO meal_planner (user_id, recipe_id, date, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.user_id, entry.recipe_id, entry.date, now],
            )
            .with_context(|| {
                format!(
                    "Failed to plan recipe {} on {}",
                    entry.recipe_id, entry.date
                )
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_custom_entry(&self, entry: &NewCustomEntry) -> Result<i64> {
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO meal_planner (user_id, custom_title, date, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![entry.user_id, entry.custom_title, entry.date, now],
            )
            .with_context(|| {
                format!(
                    "Failed to plan '{}' on {}",
                    entry.custom_title, entry.date
                )
            })?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Composite-key delete; removes every matching row.
    pub fn delete_entries_matching(&self, criteria: &EntryMatch) -> Result<usize> {
        let rows = match &criteria.target {
            MatchTarget::Recipe(recipe_id) => self.conn.execute(
                "DELETE FROM meal_planner WHERE user_id = ?1 AND date = ?2 AND recipe_id = ?3",
                params![criteria.user_id, criteria.date, recipe_id],
            )?,
            MatchTarget::CustomTitle(title) => self.conn.execute(
                "DELETE FROM meal_planner WHERE user_id = ?1 AND date = ?2 AND custom_title = ?3",
                params![criteria.user_id, criteria.date, title],
            )?,
        };
        Ok(rows)
    }

    pub fn delete_entry(&self, user_id: &str, id: i64) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM meal_planner WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(rows > 0)
    }

    // --- Settings ---

    /// Stable user id for planning against this database without a remote
    /// account.
    pub fn get_or_create_local_user(&self) -> Result<String> {
        let existing: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = 'local_user_id'",
                [],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES ('local_user_id', ?1)",
            params![id],
        )?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewRecipeIngredient;

    fn dinner(db: &Database) -> CategoryRef {
        db.insert_category(&NewCategory {
            name: "Dinner".to_string(),
            slug: "dinner".to_string(),
            image_url: None,
        })
        .unwrap()
    }

    fn sample_recipe(category_id: i64) -> NewRecipe {
        NewRecipe {
            title: "Lentil Soup".to_string(),
            image_url: Some("https://img.example/soup.jpg".to_string()),
            category_id,
            ingredients: vec![
                NewRecipeIngredient {
                    name: "Red lentils".to_string(),
                    amount_in_grams: 250.0,
                    unit: "g".to_string(),
                },
                NewRecipeIngredient {
                    name: "Stock".to_string(),
                    amount_in_grams: 1000.0,
                    unit: "ml".to_string(),
                },
            ],
            tags: vec!["vegan".to_string(), "soup".to_string()],
        }
    }

    fn recipe_entry(user: &str, recipe_id: i64, date: &str) -> NewRecipeEntry {
        NewRecipeEntry {
            user_id: user.to_string(),
            recipe_id,
            date: date.to_string(),
        }
    }

    fn custom_entry(user: &str, title: &str, date: &str) -> NewCustomEntry {
        NewCustomEntry {
            user_id: user.to_string(),
            custom_title: title.to_string(),
            date: date.to_string(),
        }
    }

    #[test]
    fn test_insert_and_list_categories() {
        let db = Database::open_in_memory().unwrap();
        dinner(&db);
        db.insert_category(&NewCategory {
            name: "Breakfast".to_string(),
            slug: "breakfast".to_string(),
            image_url: Some("https://img.example/b.png".to_string()),
        })
        .unwrap();
        let names: Vec<String> = db
            .list_categories()
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Breakfast", "Dinner"]);
        assert!(db.get_category_by_slug("dinner").unwrap().is_some());
        assert!(db.get_category_by_slug("lunch").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_category_slug_rejected() {
        let db = Database::open_in_memory().unwrap();
        dinner(&db);
        let err = db
            .insert_category(&NewCategory {
                name: "Supper".to_string(),
                slug: "dinner".to_string(),
                image_url: None,
            })
            .unwrap_err();
        assert!(err.to_string().contains("dinner"));
    }

    #[test]
    fn test_get_or_create_ingredient_is_case_insensitive() {
        let db = Database::open_in_memory().unwrap();
        let a = db.get_or_create_ingredient("Carrot").unwrap();
        let b = db.get_or_create_ingredient("carrot").unwrap();
        assert_eq!(a.id, b.id);
        assert!(db.get_or_create_ingredient("  ").is_err());
    }

    #[test]
    fn test_insert_recipe_builds_graph() {
        let db = Database::open_in_memory().unwrap();
        let category = dinner(&db);
        let recipe = db.insert_recipe(&sample_recipe(category.id)).unwrap();

        assert_eq!(recipe.title, "Lentil Soup");
        assert_eq!(recipe.category, Some(category));
        assert_eq!(recipe.ingredients.len(), 2);
        assert_eq!(recipe.ingredients[0].ingredient.name, "Red lentils");
        assert_eq!(recipe.ingredients[1].unit, "ml");
        let tags: Vec<&str> = recipe.tags.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(tags, vec!["vegan", "soup"]);
    }

    #[test]
    fn test_insert_recipe_unknown_category_rolls_back() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.insert_recipe(&sample_recipe(99)).is_err());
        assert!(db.list_recipes().unwrap().is_empty());
    }

    #[test]
    fn test_insert_recipe_validation() {
        let db = Database::open_in_memory().unwrap();
        let category = dinner(&db);
        let mut blank = sample_recipe(category.id);
        blank.title = "  ".to_string();
        assert!(db.insert_recipe(&blank).is_err());

        let mut negative = sample_recipe(category.id);
        negative.ingredients[0].amount_in_grams = -1.0;
        assert!(db.insert_recipe(&negative).is_err());
    }

    #[test]
    fn test_find_recipe_by_title() {
        let db = Database::open_in_memory().unwrap();
        let category = dinner(&db);
        let recipe = db.insert_recipe(&sample_recipe(category.id)).unwrap();
        let found = db.find_recipe_by_title("lentil soup").unwrap().unwrap();
        assert_eq!(found.id, recipe.id);
        assert!(db.find_recipe_by_title("Pancakes").unwrap().is_none());
        assert_eq!(db.find_recipe(recipe.id).unwrap().unwrap(), recipe);
        assert!(db.find_recipe(recipe.id + 100).unwrap().is_none());
        assert!(db.get_recipe(recipe.id + 100).is_err());
    }

    #[test]
    fn test_plan_rows_ordered_and_joined() {
        let db = Database::open_in_memory().unwrap();
        let category = dinner(&db);
        let recipe = db.insert_recipe(&sample_recipe(category.id)).unwrap();

        db.insert_recipe_entry(&recipe_entry("u1", recipe.id, "2024-01-01"))
            .unwrap();
        db.insert_custom_entry(&custom_entry("u1", "Leftovers", "2024-01-01"))
            .unwrap();
        db.insert_custom_entry(&custom_entry("u2", "Not mine", "2024-01-01"))
            .unwrap();

        let rows = db.plan_rows_for_user("u1").unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].id < rows[1].id);
        assert_eq!(rows[0].recipe_id, Some(recipe.id));
        let joined = rows[0].recipe.as_ref().unwrap();
        assert_eq!(joined.ingredient_links.as_ref().unwrap().len(), 2);
        assert_eq!(joined.category.as_ref().unwrap().slug, "dinner");
        assert_eq!(rows[1].custom_title.as_deref(), Some("Leftovers"));
        assert!(rows[1].recipe.is_none());
    }

    #[test]
    fn test_planner_check_constraint() {
        let db = Database::open_in_memory().unwrap();
        let neither = db.conn.execute(
            "INSERT INTO meal_planner (user_id, date, created_at) VALUES ('u1', '2024-01-01', 'now')",
            [],
        );
        assert!(neither.is_err());

        let category = dinner(&db);
        let recipe = db.insert_recipe(&sample_recipe(category.id)).unwrap();
        let both = db.conn.execute(
            "INSERT INTO meal_planner (user_id, recipe_id, custom_title, date, created_at)
             VALUES ('u1', ?1, 'x', '2024-01-01', 'now')",
            params![recipe.id],
        );
        assert!(both.is_err());
    }

    #[test]
    fn test_insert_recipe_entry_unknown_recipe() {
        let db = Database::open_in_memory().unwrap();
        assert!(
            db.insert_recipe_entry(&recipe_entry("u1", 404, "2024-01-01"))
                .is_err()
        );
    }

    #[test]
    fn test_delete_entries_matching_removes_all_duplicates() {
        let db = Database::open_in_memory().unwrap();
        db.insert_custom_entry(&custom_entry("u1", "Leftovers", "2024-01-01"))
            .unwrap();
        db.insert_custom_entry(&custom_entry("u1", "Leftovers", "2024-01-01"))
            .unwrap();
        db.insert_custom_entry(&custom_entry("u1", "Leftovers", "2024-01-02"))
            .unwrap();

        let removed = db
            .delete_entries_matching(&EntryMatch {
                user_id: "u1".to_string(),
                date: "2024-01-01".to_string(),
                target: MatchTarget::CustomTitle("Leftovers".to_string()),
            })
            .unwrap();
        assert_eq!(removed, 2);
        let left = db.plan_rows_for_user("u1").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].date, "2024-01-02");
    }

    #[test]
    fn test_delete_entry_by_id_scoped_to_user() {
        let db = Database::open_in_memory().unwrap();
        let id = db
            .insert_custom_entry(&custom_entry("u1", "Leftovers", "2024-01-01"))
            .unwrap();
        assert!(!db.delete_entry("u2", id).unwrap());
        assert!(db.delete_entry("u1", id).unwrap());
        assert!(!db.delete_entry("u1", id).unwrap());
    }

    #[test]
    fn test_local_user_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mealplan.db");
        let first = {
            let db = Database::open(&path).unwrap();
            db.get_or_create_local_user().unwrap()
        };
        let db = Database::open(&path).unwrap();
        assert_eq!(db.get_or_create_local_user().unwrap(), first);
    }
}
