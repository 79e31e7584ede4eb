use anyhow::{Context, Result};
use std::process;

use recipebox_core::models::RecipeForm;
use recipebox_core::service::CatalogService;

use super::helpers::{json_error, print_recipe};

fn exit_not_found(id: i64, json: bool) -> ! {
    let message = format!("Recipe {id} not found");
    if json {
        println!("{}", json_error(&message));
    } else {
        eprintln!("{message}");
    }
    process::exit(2);
}

pub(crate) fn cmd_show(svc: &CatalogService, id: i64, json: bool) -> Result<()> {
    let Some(recipe) = svc.read(id)? else {
        exit_not_found(id, json);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        print_recipe(&recipe);
    }
    Ok(())
}

pub(crate) fn cmd_create(svc: &mut CatalogService, form: RecipeForm, json: bool) -> Result<()> {
    let id = svc.create_from_form(form)?;
    let recipe = svc
        .read(id)?
        .with_context(|| format!("Recipe {id} vanished after create"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let title = &recipe.title;
        println!("Created recipe: {title} (id: {id})");
    }
    Ok(())
}

pub(crate) fn cmd_update(
    svc: &mut CatalogService,
    id: i64,
    form: RecipeForm,
    json: bool,
) -> Result<()> {
    if !svc.update_from_form(id, form)? {
        exit_not_found(id, json);
    }

    if json {
        let recipe = svc
            .read(id)?
            .with_context(|| format!("Recipe {id} vanished after update"))?;
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        println!("Updated recipe {id}");
    }
    Ok(())
}

pub(crate) fn cmd_delete(svc: &mut CatalogService, id: i64, json: bool) -> Result<()> {
    let deleted = svc.delete(id)?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "deleted": deleted }));
    } else if deleted {
        println!("Deleted recipe {id}");
    } else {
        println!("Recipe {id} did not exist, nothing deleted");
    }
    Ok(())
}
