use std::path::Path;

use anyhow::{Context, Result};

use crate::models::NewRecipe;

/// Read a recipe dataset: a JSON array of recipe records.
pub fn load_dataset(path: &Path) -> Result<Vec<NewRecipe>> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read dataset: {}", path.display()))?;
    parse_dataset(&data).with_context(|| format!("Invalid dataset: {}", path.display()))
}

pub fn parse_dataset(data: &str) -> Result<Vec<NewRecipe>> {
    let recipes: Vec<NewRecipe> = serde_json::from_str(data)?;
    Ok(recipes)
}
