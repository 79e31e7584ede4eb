use std::path::Path;

use anyhow::{Result, bail};

use crate::db::Database;
use crate::models::{
    BootstrapUser, LoadSummary, NewRecipe, Recipe, RecipeForm, SearchPage, ValidationError,
    parse_page,
};

/// Entry point for callers (CLI, HTTP API): normalises raw user input and
/// delegates to the store.
pub struct CatalogService {
    db: Database,
}

impl CatalogService {
    pub fn new(db_path: &Path) -> Result<Self> {
        let db = Database::open(db_path)?;
        Ok(Self { db })
    }

    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    // --- Dataset ---

    pub fn initialize(&mut self, dataset: &Path, admin: &BootstrapUser) -> Result<LoadSummary> {
        let name = admin.name.trim();
        if name.is_empty() || admin.password.is_empty() {
            bail!(ValidationError::IncompleteBootstrapUser);
        }
        let admin = BootstrapUser {
            name: name.to_string(),
            password: admin.password.clone(),
        };
        self.db.initialize(dataset, &admin)
    }

    // --- Recipes ---

    /// Search with raw request parameters. A missing query matches every
    /// recipe; the page goes through [`parse_page`].
    pub fn search(&self, query: Option<&str>, page: Option<&str>) -> Result<SearchPage> {
        self.db.search(query.unwrap_or_default(), parse_page(page))
    }

    pub fn read(&self, id: i64) -> Result<Option<Recipe>> {
        self.db.read(id)
    }

    pub fn create(&mut self, recipe: &NewRecipe) -> Result<i64> {
        validate_recipe(recipe)?;
        self.db.create(recipe)
    }

    pub fn create_from_form(&mut self, form: RecipeForm) -> Result<i64> {
        let recipe = form.into_new_recipe()?;
        self.db.create(&recipe)
    }

    pub fn update(&mut self, id: i64, recipe: &NewRecipe) -> Result<bool> {
        validate_recipe(recipe)?;
        self.db.update(id, recipe)
    }

    pub fn update_from_form(&mut self, id: i64, form: RecipeForm) -> Result<bool> {
        let recipe = form.into_new_recipe()?;
        self.db.update(id, &recipe)
    }

    pub fn delete(&mut self, id: i64) -> Result<bool> {
        self.db.delete(id)
    }

    // --- Users ---

    pub fn login(&self, name: &str, password: &str) -> Result<Option<i64>> {
        self.db.login(name.trim(), password)
    }

    pub fn register_user(&self, name: &str, password: &str) -> Result<i64> {
        let name = name.trim();
        if name.is_empty() {
            bail!(ValidationError::EmptyUserName);
        }
        if password.is_empty() {
            bail!(ValidationError::EmptyPassword);
        }
        self.db.register_user(name, password)
    }

    /// Current name of a user, `None` once the catalog was rebuilt without it.
    pub fn get_user_name(&self, id: i64) -> Result<Option<String>> {
        self.db.get_user_name(id)
    }
}

fn validate_recipe(recipe: &NewRecipe) -> Result<()> {
    if recipe.title.trim().is_empty() {
        bail!(ValidationError::EmptyTitle);
    }
    Ok(())
}
