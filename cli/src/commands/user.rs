use anyhow::Result;
use std::process;

use recipebox_core::service::CatalogService;

use super::helpers::json_error;

pub(crate) fn cmd_user_register(
    svc: &CatalogService,
    name: &str,
    password: &str,
    json: bool,
) -> Result<()> {
    let id = svc.register_user(name, password)?;
    if json {
        println!("{}", serde_json::json!({ "user_id": id, "name": name.trim() }));
    } else {
        let name = name.trim();
        println!("Registered user: {name} (id: {id})");
    }
    Ok(())
}

pub(crate) fn cmd_user_login(
    svc: &CatalogService,
    name: &str,
    password: &str,
    json: bool,
) -> Result<()> {
    match svc.login(name, password)? {
        Some(id) => {
            if json {
                println!("{}", serde_json::json!({ "user_id": id, "name": name.trim() }));
            } else {
                println!("Credentials valid for user id {id}");
            }
            Ok(())
        }
        None => {
            if json {
                println!("{}", json_error("Invalid name or password"));
            } else {
                eprintln!("Invalid name or password");
            }
            process::exit(2);
        }
    }
}
