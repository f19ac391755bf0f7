use std::collections::BTreeMap;
use std::fmt;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Identity ---

/// Authenticated user reference. Opaque to the store; only compared and
/// forwarded to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.user_id)
    }
}

// --- Recipe graph ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeIngredient {
    pub ingredient: IngredientRef,
    pub amount_in_grams: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub ingredients: Vec<RecipeIngredient>,
    /// `None` when the joined category row is missing.
    #[serde(default)]
    pub category: Option<CategoryRef>,
    pub tags: Vec<TagRef>,
}

#[derive(Debug, Clone)]
pub struct NewCategory {
    pub name: String,
    pub slug: String,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRecipeIngredient {
    pub name: String,
    pub amount_in_grams: f64,
    pub unit: String,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub title: String,
    pub image_url: Option<String>,
    pub category_id: i64,
    pub ingredients: Vec<NewRecipeIngredient>,
    pub tags: Vec<String>,
}

// --- Planner entries ---

/// One planned meal on a date. Recipe-backed entries carry the full recipe
/// graph; custom entries are freeform text.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MealEntry {
    Recipe {
        display_id: i64,
        recipe_id: i64,
        title: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
        recipe: Recipe,
    },
    Custom {
        display_id: i64,
        title: String,
    },
}

impl MealEntry {
    #[must_use]
    pub fn from_recipe(recipe: Recipe) -> Self {
        MealEntry::Recipe {
            display_id: recipe.id,
            recipe_id: recipe.id,
            title: recipe.title.clone(),
            image_url: recipe.image_url.clone(),
            recipe,
        }
    }

    #[must_use]
    pub fn custom(display_id: i64, title: impl Into<String>) -> Self {
        MealEntry::Custom {
            display_id,
            title: title.into(),
        }
    }

    #[must_use]
    pub fn display_id(&self) -> i64 {
        match self {
            MealEntry::Recipe { display_id, .. } | MealEntry::Custom { display_id, .. } => {
                *display_id
            }
        }
    }

    #[must_use]
    pub fn title(&self) -> &str {
        match self {
            MealEntry::Recipe { title, .. } | MealEntry::Custom { title, .. } => title,
        }
    }

    #[must_use]
    pub fn is_custom(&self) -> bool {
        matches!(self, MealEntry::Custom { .. })
    }

    #[must_use]
    pub fn recipe(&self) -> Option<&Recipe> {
        match self {
            MealEntry::Recipe { recipe, .. } => Some(recipe),
            MealEntry::Custom { .. } => None,
        }
    }
}

/// Date key (`YYYY-MM-DD`) to the ordered entries planned for that day.
pub type PlannedMeals = BTreeMap<String, Vec<MealEntry>>;

// --- Remote row schema ---
//
// Field names follow the nested shape of the remote join:
// `meal_planner` → `recipes` → (`categories`, `recipe_ingredients` →
// `ingredients`, `recipe_tags` → `tags`).

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRow {
    pub id: i64,
    pub user_id: String,
    pub date: String,
    #[serde(default)]
    pub recipe_id: Option<i64>,
    #[serde(default)]
    pub custom_title: Option<String>,
    #[serde(default, rename = "recipes")]
    pub recipe: Option<RecipeRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRow {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default, rename = "categories")]
    pub category: Option<CategoryRef>,
    #[serde(default, rename = "recipe_ingredients")]
    pub ingredient_links: Option<Vec<IngredientLinkRow>>,
    #[serde(default, rename = "recipe_tags")]
    pub tag_links: Option<Vec<TagLinkRow>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngredientLinkRow {
    #[serde(default, rename = "ingredients")]
    pub ingredient: Option<IngredientRef>,
    pub amount_in_grams: f64,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLinkRow {
    #[serde(default, rename = "tags")]
    pub tag: Option<TagRef>,
}

// --- Remote write payloads ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewRecipeEntry {
    pub user_id: String,
    pub recipe_id: i64,
    pub date: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewCustomEntry {
    pub user_id: String,
    pub custom_title: String,
    pub date: String,
}

/// Which column, besides user and date, a composite-key delete matches on.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchTarget {
    Recipe(i64),
    CustomTitle(String),
}

/// Composite-key delete criteria. Matches every row with these values, so
/// duplicates on the same date are all affected.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMatch {
    pub user_id: String,
    pub date: String,
    pub target: MatchTarget,
}

impl EntryMatch {
    #[must_use]
    pub fn for_entry(user_id: &str, date: &str, entry: &MealEntry) -> Self {
        let target = match entry {
            MealEntry::Recipe { recipe_id, .. } => MatchTarget::Recipe(*recipe_id),
            MealEntry::Custom { title, .. } => MatchTarget::CustomTitle(title.clone()),
        };
        Self {
            user_id: user_id.to_string(),
            date: date.to_string(),
            target,
        }
    }
}

// --- Validation helpers ---

pub fn validate_plan_date(date: &str) -> Result<String> {
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{date}'. Use YYYY-MM-DD"))?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

pub fn validate_custom_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        bail!("Meal title must not be empty");
    }
    Ok(trimmed.to_string())
}

/// Lowercase, dash-separated slug for a category name.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_recipe() -> Recipe {
        Recipe {
            id: 7,
            title: "Shakshuka".to_string(),
            image_url: Some("https://img.example/shakshuka.jpg".to_string()),
            ingredients: vec![],
            category: Some(CategoryRef {
                id: 1,
                name: "Breakfast".to_string(),
                slug: "breakfast".to_string(),
                image_url: None,
            }),
            tags: vec![],
        }
    }

    #[test]
    fn test_meal_entry_from_recipe() {
        let entry = MealEntry::from_recipe(sample_recipe());
        assert_eq!(entry.display_id(), 7);
        assert_eq!(entry.title(), "Shakshuka");
        assert!(!entry.is_custom());
        assert_eq!(entry.recipe().unwrap().id, 7);
    }

    #[test]
    fn test_meal_entry_custom() {
        let entry = MealEntry::custom(42, "Leftovers");
        assert_eq!(entry.display_id(), 42);
        assert_eq!(entry.title(), "Leftovers");
        assert!(entry.is_custom());
        assert!(entry.recipe().is_none());
    }

    #[test]
    fn test_meal_entry_serializes_with_kind_tag() {
        let json = serde_json::to_value(MealEntry::custom(3, "Pizza night")).unwrap();
        assert_eq!(json["kind"], "custom");
        assert_eq!(json["title"], "Pizza night");
        assert_eq!(json["display_id"], 3);
    }

    #[test]
    fn test_entry_match_for_entry() {
        let recipe_match =
            EntryMatch::for_entry("u1", "2024-01-01", &MealEntry::from_recipe(sample_recipe()));
        assert_eq!(recipe_match.target, MatchTarget::Recipe(7));

        let custom_match =
            EntryMatch::for_entry("u1", "2024-01-01", &MealEntry::custom(1, "Leftovers"));
        assert_eq!(
            custom_match.target,
            MatchTarget::CustomTitle("Leftovers".to_string())
        );
        assert_eq!(custom_match.user_id, "u1");
        assert_eq!(custom_match.date, "2024-01-01");
    }

    #[test]
    fn test_plan_row_deserializes_joined_shape() {
        let json = r#"{
            "id": 12,
            "user_id": "3f1c",
            "recipe_id": 7,
            "custom_title": null,
            "date": "2024-01-01",
            "recipes": {
                "id": 7,
                "title": "Shakshuka",
                "image_url": null,
                "category_id": 1,
                "categories": {"id": 1, "name": "Breakfast", "slug": "breakfast", "image_url": null},
                "recipe_ingredients": [
                    {"recipe_id": 7, "ingredient_id": 2, "amount_in_grams": 400, "unit": "g",
                     "ingredients": {"id": 2, "name": "Tomato"}}
                ],
                "recipe_tags": [{"recipe_id": 7, "tag_id": 5, "tags": {"id": 5, "name": "vegetarian"}}]
            }
        }"#;
        let row: PlanRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.id, 12);
        assert_eq!(row.recipe_id, Some(7));
        let recipe = row.recipe.unwrap();
        assert_eq!(recipe.category.unwrap().slug, "breakfast");
        let links = recipe.ingredient_links.unwrap();
        assert_eq!(links[0].ingredient.as_ref().unwrap().name, "Tomato");
        assert!((links[0].amount_in_grams - 400.0).abs() < f64::EPSILON);
        assert_eq!(recipe.tag_links.unwrap()[0].tag.as_ref().unwrap().name, "vegetarian");
    }

    #[test]
    fn test_plan_row_deserializes_custom_without_recipe() {
        let json = r#"{"id": 13, "user_id": "3f1c", "recipe_id": null,
                       "custom_title": "Leftovers", "date": "2024-01-01", "recipes": null}"#;
        let row: PlanRow = serde_json::from_str(json).unwrap();
        assert_eq!(row.custom_title.as_deref(), Some("Leftovers"));
        assert!(row.recipe.is_none());
    }

    #[test]
    fn test_validate_plan_date() {
        assert_eq!(validate_plan_date("2024-01-01").unwrap(), "2024-01-01");
        assert!(validate_plan_date("2024-13-01").is_err());
        assert!(validate_plan_date("01/01/2024").is_err());
        assert!(validate_plan_date("").is_err());
    }

    #[test]
    fn test_validate_custom_title() {
        assert_eq!(validate_custom_title("  Leftovers ").unwrap(), "Leftovers");
        assert!(validate_custom_title("   ").is_err());
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Breakfast"), "breakfast");
        assert_eq!(slugify("  Quick & Easy Dinners "), "quick-easy-dinners");
        assert_eq!(slugify("Soups!"), "soups");
    }
}
