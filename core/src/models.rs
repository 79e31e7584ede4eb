use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of results returned per search page.
pub const PAGE_SIZE: i64 = 32;

/// Input rejected before it reaches the store. Callers can downcast an
/// `anyhow::Error` to this to tell bad input from storage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Recipe title cannot be empty")]
    EmptyTitle,
    #[error("User name cannot be empty")]
    EmptyUserName,
    #[error("Password cannot be empty")]
    EmptyPassword,
    #[error("Bootstrap user needs a name and a password")]
    IncompleteBootstrapUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub id: i64,
    pub title: String,
    pub image: String,
    pub description: String,
    pub duration: String,
    pub ingredients: Vec<Ingredient>,
    pub stages: Vec<Stage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub rank: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub rank: i64,
    pub description: String,
}

/// Input for create and update, also the record shape of a seed dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRecipe {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "img")]
    pub image: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub ingredients: Vec<NewIngredient>,
    #[serde(default)]
    pub stages: Vec<NewStage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewIngredient {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStage {
    pub description: String,
}

/// Short projection of a recipe used in search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchPage {
    pub results: Vec<RecipeSummary>,
    pub num_found: i64,
    pub query: String,
    pub page: i64,
    pub next_page: i64,
    pub num_pages: i64,
}

/// Credentials of the single user inserted by a dataset load.
#[derive(Debug, Clone)]
pub struct BootstrapUser {
    pub name: String,
    pub password: String,
}

impl Default for BootstrapUser {
    fn default() -> Self {
        Self {
            name: "admin".to_string(),
            password: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub recipes: usize,
    pub ingredients: usize,
    pub stages: usize,
}

/// Free-text recipe form as typed by a person: list fields hold items
/// separated by dashes, e.g. `"- 200g flour - 3 eggs"`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeForm {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "img")]
    pub image: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub ingredients: String,
    #[serde(default)]
    pub stages: String,
}

impl RecipeForm {
    pub fn into_new_recipe(self) -> Result<NewRecipe> {
        let title = self.title.trim().to_string();
        if title.is_empty() {
            bail!(ValidationError::EmptyTitle);
        }
        Ok(NewRecipe {
            title,
            description: self.description.trim().to_string(),
            image: self.image.trim().to_string(),
            duration: self.duration.trim().to_string(),
            ingredients: split_dash_list(&self.ingredients)
                .into_iter()
                .map(|name| NewIngredient { name })
                .collect(),
            stages: split_dash_list(&self.stages)
                .into_iter()
                .map(|description| NewStage { description })
                .collect(),
        })
    }
}

/// Split `"- a - b"` into `["a", "b"]`. A dash only separates items when it
/// starts the text or follows whitespace, so "semi-skimmed milk" stays whole.
pub fn split_dash_list(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut prev_is_space = true;
    for c in text.trim().chars() {
        if c == '-' && prev_is_space {
            items.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
        prev_is_space = c.is_whitespace();
    }
    items.push(current);
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Coerce a raw page parameter to a page number. Missing, non-numeric,
/// zero and negative values all become page 1.
pub fn parse_page(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

/// `num_pages` as the catalog has always reported it: one more than the
/// number of full pages, so an exact multiple of the page size reports a
/// trailing empty page.
pub fn num_pages(num_found: i64) -> i64 {
    num_found / PAGE_SIZE + 1
}
