mod commands;
mod config;
mod remote;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::commands::{
    Backend, cmd_add, cmd_add_custom, cmd_category_add, cmd_category_list, cmd_recipe_create,
    cmd_recipe_list, cmd_recipe_show, cmd_remove, cmd_show,
};
use crate::config::Config;
use mealplan_core::store::{DeleteMode, StoreConfig};

#[derive(Parser)]
#[command(
    name = "mealplan",
    version,
    about = "Plan recipes and freeform meals by date",
    long_about = "Plan recipes and freeform meals by date.\n\n\
        Uses a local SQLite database by default. Set MEALPLAN_REMOTE_URL and \
        MEALPLAN_REMOTE_KEY (plus MEALPLAN_USER) to plan against a hosted store."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Delete planned meals by (user, date, recipe/title) instead of row id
    #[arg(long, global = true)]
    legacy_delete: bool,
    /// Keep local changes even when the remote write fails
    #[arg(long, global = true)]
    no_rollback: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the meal plan (all dates, or one date)
    Show {
        /// Date to show (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan a recipe on a date
    Add {
        /// Recipe id, or exact title in local mode
        recipe: String,
        /// Date to plan for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Plan a freeform meal (e.g. "Leftovers") on a date
    AddCustom {
        /// Meal title
        title: String,
        /// Date to plan for (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a planned meal by its position on a date
    Remove {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Position in the # column of `mealplan show`
        position: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage recipe categories
    Category {
        #[command(subcommand)]
        command: CategoryCommands,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Create a recipe
    Create {
        /// Recipe title
        title: String,
        /// Category slug
        #[arg(short, long)]
        category: String,
        /// Image URL
        #[arg(long)]
        image_url: Option<String>,
        /// Ingredient as name:grams[:unit] (repeatable)
        #[arg(short, long = "ingredient")]
        ingredients: Vec<String>,
        /// Tag name (repeatable)
        #[arg(short, long = "tag")]
        tags: Vec<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List all recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients and tags
    Show {
        /// Recipe id, or exact title in local mode
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CategoryCommands {
    /// Add a category
    Add {
        /// Category name
        name: String,
        /// Slug (default: derived from the name)
        #[arg(long)]
        slug: Option<String>,
        /// Image URL
        #[arg(long)]
        image_url: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List categories
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    fn store_config(&self) -> StoreConfig {
        StoreConfig {
            delete_mode: if self.legacy_delete {
                DeleteMode::ByMatch
            } else {
                DeleteMode::ByRowId
            },
            rollback_on_failure: !self.no_rollback,
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let backend = Backend::connect(&config)?;
    let store_config = cli.store_config();

    match cli.command {
        Commands::Show { date, json } => {
            let identity = backend.identity(&config)?;
            cmd_show(&backend, identity, store_config, date.as_deref(), json).await
        }
        Commands::Add { recipe, date, json } => {
            let identity = backend.identity(&config)?;
            cmd_add(&backend, identity, store_config, &recipe, date.as_deref(), json).await
        }
        Commands::AddCustom { title, date, json } => {
            let identity = backend.identity(&config)?;
            cmd_add_custom(&backend, identity, store_config, &title, date.as_deref(), json).await
        }
        Commands::Remove {
            date,
            position,
            json,
        } => {
            let identity = backend.identity(&config)?;
            cmd_remove(&backend, identity, store_config, &date, position, json).await
        }
        Commands::Recipe { command } => match command {
            RecipeCommands::Create {
                title,
                category,
                image_url,
                ingredients,
                tags,
                json,
            } => cmd_recipe_create(
                &backend,
                &title,
                &category,
                image_url,
                &ingredients,
                tags,
                json,
            ),
            RecipeCommands::List { json } => cmd_recipe_list(&backend, json),
            RecipeCommands::Show { recipe, json } => cmd_recipe_show(&backend, &recipe, json).await,
        },
        Commands::Category { command } => match command {
            CategoryCommands::Add {
                name,
                slug,
                image_url,
                json,
            } => cmd_category_add(&backend, &name, slug.as_deref(), image_url, json),
            CategoryCommands::List { json } => cmd_category_list(&backend, json),
        },
    }
}
