use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info};

use crate::auth::{hash_password, verify_password};
use crate::models::{
    BootstrapUser, Ingredient, LoadSummary, NewIngredient, NewRecipe, NewStage, PAGE_SIZE, Recipe,
    RecipeSummary, SearchPage, Stage, num_pages,
};
use crate::seed::load_dataset;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS recipe (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT,
        img TEXT,
        description TEXT,
        duration TEXT
    );

    CREATE TABLE IF NOT EXISTS ingredient (
        recipe INTEGER NOT NULL REFERENCES recipe(id),
        rank INTEGER NOT NULL,
        name TEXT
    );

    CREATE TABLE IF NOT EXISTS stage (
        recipe INTEGER NOT NULL REFERENCES recipe(id),
        rank INTEGER NOT NULL,
        description TEXT
    );

    CREATE TABLE IF NOT EXISTS user (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        password TEXT
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_ingredient_recipe_rank ON ingredient(recipe, rank);
    CREATE UNIQUE INDEX IF NOT EXISTS idx_stage_recipe_rank ON stage(recipe, rank);
    CREATE INDEX IF NOT EXISTS idx_user_name ON user(name);
";

const DROP_TABLES: &str = "
    DROP TABLE IF EXISTS ingredient;
    DROP TABLE IF EXISTS stage;
    DROP TABLE IF EXISTS recipe;
    DROP TABLE IF EXISTS user;
";

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
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(SCHEMA)?;
            self.conn.execute_batch("PRAGMA user_version = 1;")?;
        }

        Ok(())
    }

    // --- Dataset loading ---

    /// Drop every table and rebuild the catalog from a dataset file.
    ///
    /// Recipes get their position in the file as id, starting at 0. The whole
    /// rebuild is one transaction, so a failure keeps the previous catalog.
    pub fn initialize(&mut self, dataset: &Path, admin: &BootstrapUser) -> Result<LoadSummary> {
        let recipes = load_dataset(dataset)?;
        self.initialize_with(&recipes, admin)
    }

    #[allow(clippy::cast_possible_wrap)]
    pub fn initialize_with(
        &mut self,
        recipes: &[NewRecipe],
        admin: &BootstrapUser,
    ) -> Result<LoadSummary> {
        let admin_password = hash_password(&admin.password)?;

        let tx = self.conn.transaction()?;
        tx.execute_batch(DROP_TABLES)?;
        tx.execute_batch(SCHEMA)?;

        let mut summary = LoadSummary::default();
        for (position, recipe) in recipes.iter().enumerate() {
            let id = position as i64;
            tx.execute(
                "INSERT INTO recipe (id, title, img, description, duration) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    recipe.title,
                    recipe.image,
                    recipe.description,
                    recipe.duration
                ],
            )?;
            summary.ingredients += insert_ingredients(&tx, id, &recipe.ingredients)?;
            summary.stages += insert_stages(&tx, id, &recipe.stages)?;
            summary.recipes += 1;
        }

        tx.execute(
            "INSERT INTO user (name, password) VALUES (?1, ?2)",
            params![admin.name, admin_password],
        )?;
        tx.commit().context("Failed to commit dataset load")?;

        info!(
            recipes = summary.recipes,
            ingredients = summary.ingredients,
            stages = summary.stages,
            "loaded recipe dataset"
        );
        Ok(summary)
    }

    // --- Recipes ---

    pub fn read(&self, id: i64) -> Result<Option<Recipe>> {
        let found = self
            .conn
            .query_row(
                "SELECT id, title, img, description, duration FROM recipe WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Recipe {
                        id: row.get(0)?,
                        title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                        image: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                        description: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                        duration: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                        ingredients: Vec::new(),
                        stages: Vec::new(),
                    })
                },
            )
            .optional()?;

        let Some(mut recipe) = found else {
            return Ok(None);
        };
        recipe.ingredients = self.get_ingredients(id)?;
        recipe.stages = self.get_stages(id)?;
        Ok(Some(recipe))
    }

    fn get_ingredients(&self, recipe_id: i64) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT rank, name FROM ingredient WHERE recipe = ?1 ORDER BY rank")?;
        let ingredients = stmt
            .query_map(params![recipe_id], |row| {
                Ok(Ingredient {
                    rank: row.get(0)?,
                    name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    fn get_stages(&self, recipe_id: i64) -> Result<Vec<Stage>> {
        let mut stmt = self
            .conn
            .prepare("SELECT rank, description FROM stage WHERE recipe = ?1 ORDER BY rank")?;
        let stages = stmt
            .query_map(params![recipe_id], |row| {
                Ok(Stage {
                    rank: row.get(0)?,
                    description: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stages)
    }

    pub fn create(&mut self, recipe: &NewRecipe) -> Result<i64> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO recipe (title, img, description, duration) VALUES (?1, ?2, ?3, ?4)",
            params![
                recipe.title,
                recipe.image,
                recipe.description,
                recipe.duration
            ],
        )?;
        let id = tx.last_insert_rowid();
        insert_ingredients(&tx, id, &recipe.ingredients)?;
        insert_stages(&tx, id, &recipe.stages)?;
        tx.commit()?;

        debug!(id, title = %recipe.title, "created recipe");
        Ok(id)
    }

    /// Replace a recipe's title, image, description and both child lists.
    /// Duration is left as it was. Returns `false` if no recipe has this id.
    pub fn update(&mut self, id: i64, recipe: &NewRecipe) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let rows = tx.execute(
            "UPDATE recipe SET title = ?1, img = ?2, description = ?3 WHERE id = ?4",
            params![recipe.title, recipe.image, recipe.description, id],
        )?;
        if rows == 0 {
            debug!(id, "update skipped, recipe not found");
            return Ok(false);
        }

        tx.execute("DELETE FROM ingredient WHERE recipe = ?1", params![id])?;
        insert_ingredients(&tx, id, &recipe.ingredients)?;
        tx.execute("DELETE FROM stage WHERE recipe = ?1", params![id])?;
        insert_stages(&tx, id, &recipe.stages)?;
        tx.commit()?;

        debug!(id, "updated recipe");
        Ok(true)
    }

    /// Delete a recipe with its ingredients and stages. Unknown ids are a
    /// no-op; the return value tells whether a recipe row went away.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        let tx = self.conn.transaction()?;
        let rows = tx.execute("DELETE FROM recipe WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM ingredient WHERE recipe = ?1", params![id])?;
        tx.execute("DELETE FROM stage WHERE recipe = ?1", params![id])?;
        tx.commit()?;

        debug!(id, deleted = rows > 0, "deleted recipe");
        Ok(rows > 0)
    }

    // --- Search ---

    /// Case-insensitive substring search on titles, 32 results per page in
    /// id order. Pages below 1 are treated as page 1.
    pub fn search(&self, query: &str, page: i64) -> Result<SearchPage> {
        let page = page.max(1);
        let pattern = like_pattern(query);

        let num_found: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM recipe WHERE title LIKE ?1 ESCAPE '\\'",
            params![pattern],
            |row| row.get(0),
        )?;

        let offset = (page - 1).saturating_mul(PAGE_SIZE);
        let mut stmt = self.conn.prepare(
            "SELECT id, title, img FROM recipe WHERE title LIKE ?1 ESCAPE '\\'
             ORDER BY id LIMIT ?2 OFFSET ?3",
        )?;
        let results = stmt
            .query_map(params![pattern, PAGE_SIZE, offset], |row| {
                Ok(RecipeSummary {
                    id: row.get(0)?,
                    title: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    image: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!(query, page, num_found, "searched recipes");
        Ok(SearchPage {
            results,
            num_found,
            query: query.to_string(),
            page,
            next_page: page.saturating_add(1),
            num_pages: num_pages(num_found),
        })
    }

    // --- Users ---

    /// Look up a user by name and password. Names are not unique, so every
    /// user with this name is tried in id order.
    pub fn login(&self, name: &str, password: &str) -> Result<Option<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, password FROM user WHERE name = ?1 ORDER BY id")?;
        let candidates = stmt
            .query_map(params![name], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        for (id, stored) in candidates {
            if verify_password(password, &stored)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    pub fn register_user(&self, name: &str, password: &str) -> Result<i64> {
        let hash = hash_password(password)?;
        self.conn.execute(
            "INSERT INTO user (name, password) VALUES (?1, ?2)",
            params![name, hash],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, name, "registered user");
        Ok(id)
    }

    pub fn get_user_name(&self, id: i64) -> Result<Option<String>> {
        let name = self
            .conn
            .query_row("SELECT name FROM user WHERE id = ?1", params![id], |row| {
                row.get::<_, Option<String>>(0)
            })
            .optional()?;
        Ok(name.map(Option::unwrap_or_default))
    }
}

#[allow(clippy::cast_possible_wrap)]
fn insert_ingredients(
    tx: &Transaction,
    recipe_id: i64,
    ingredients: &[NewIngredient],
) -> Result<usize> {
    let mut stmt =
        tx.prepare_cached("INSERT INTO ingredient (recipe, rank, name) VALUES (?1, ?2, ?3)")?;
    for (rank, ingredient) in ingredients.iter().enumerate() {
        stmt.execute(params![recipe_id, rank as i64, ingredient.name])?;
    }
    Ok(ingredients.len())
}

#[allow(clippy::cast_possible_wrap)]
fn insert_stages(tx: &Transaction, recipe_id: i64, stages: &[NewStage]) -> Result<usize> {
    let mut stmt =
        tx.prepare_cached("INSERT INTO stage (recipe, rank, description) VALUES (?1, ?2, ?3)")?;
    for (rank, stage) in stages.iter().enumerate() {
        stmt.execute(params![recipe_id, rank as i64, stage.description])?;
    }
    Ok(stages.len())
}

/// Build a `LIKE` pattern matching `query` literally anywhere in the value.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}
