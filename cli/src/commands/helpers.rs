use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use recipebox_core::models::{Recipe, RecipeSummary};

pub(crate) fn print_search_table(results: &[RecipeSummary]) {
    #[derive(Tabled)]
    struct SearchRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Image")]
        image: String,
    }

    let rows: Vec<SearchRow> = results
        .iter()
        .map(|r| SearchRow {
            id: r.id,
            title: truncate(&r.title, 50),
            image: truncate(&r.image, 40),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(0)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_recipe(recipe: &Recipe) {
    let title = &recipe.title;
    let id = recipe.id;
    println!("=== {title} (id: {id}) ===");
    if !recipe.duration.is_empty() {
        let duration = &recipe.duration;
        println!("  Duration: {duration}");
    }
    if !recipe.image.is_empty() {
        let image = &recipe.image;
        println!("  Image: {image}");
    }
    if !recipe.description.is_empty() {
        let description = &recipe.description;
        println!("\n  {description}");
    }

    println!("\n  INGREDIENTS:");
    for ing in &recipe.ingredients {
        let name = &ing.name;
        println!("    - {name}");
    }

    println!("\n  STAGES:");
    for stage in &recipe.stages {
        let step = stage.rank + 1;
        let description = &stage.description;
        println!("    {step}. {description}");
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
