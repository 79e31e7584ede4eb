use anyhow::Result;
use std::path::Path;

use recipebox_core::models::BootstrapUser;
use recipebox_core::service::CatalogService;

pub(crate) fn cmd_init(
    svc: &mut CatalogService,
    dataset: &Path,
    admin: &BootstrapUser,
) -> Result<()> {
    let summary = svc.initialize(dataset, admin)?;
    let recipes = summary.recipes;
    let ingredients = summary.ingredients;
    let stages = summary.stages;
    println!("Loaded {recipes} recipes ({ingredients} ingredients, {stages} stages)");
    println!("Bootstrap user: {}", admin.name.trim());
    Ok(())
}
