use anyhow::Result;
use std::process;

use recipebox_core::service::CatalogService;

use super::helpers::print_search_table;

pub(crate) fn cmd_search(
    svc: &CatalogService,
    query: Option<&str>,
    page: Option<&str>,
    json: bool,
) -> Result<()> {
    let found = svc.search(query, page)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
        return Ok(());
    }

    if found.results.is_empty() {
        let query = &found.query;
        let page = found.page;
        eprintln!("No recipes found for '{query}' on page {page}");
        process::exit(2);
    }

    print_search_table(&found.results);
    let num_found = found.num_found;
    let page = found.page;
    let num_pages = found.num_pages;
    println!("{num_found} recipes found, page {page} of {num_pages}");
    Ok(())
}
