mod commands;
mod config;
mod server;
mod session;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_create, cmd_delete, cmd_init, cmd_search, cmd_show, cmd_update, cmd_user_login,
    cmd_user_register,
};
use crate::config::Config;
use recipebox_core::db::Database;
use recipebox_core::models::{BootstrapUser, RecipeForm};
use recipebox_core::service::CatalogService;

#[derive(Parser)]
#[command(
    name = "recipebox",
    version,
    about = "A small recipe catalog",
    long_about = "Browse, search and edit a recipe catalog from the terminal, or serve it as a JSON API."
)]
struct Cli {
    /// Path to the catalog database (default: per-user data directory)
    #[arg(long, global = true, value_name = "PATH")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the catalog from a JSON dataset (erases all existing data)
    Init {
        /// Path to the dataset (JSON array of recipes)
        dataset: PathBuf,
        /// Name of the bootstrap user
        #[arg(long, default_value = "admin")]
        admin_name: String,
        /// Password of the bootstrap user
        #[arg(long, default_value = "admin")]
        admin_password: String,
    },
    /// Search recipes by title
    Search {
        /// Text to look for in recipe titles (default: everything)
        query: Option<String>,
        /// Result page, 32 recipes per page
        #[arg(short, long)]
        page: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a recipe with its ingredients and stages
    Show {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a recipe
    Create {
        #[command(flatten)]
        form: RecipeArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a recipe's title, image, description, ingredients and stages
    Update {
        /// Recipe ID
        id: i64,
        #[command(flatten)]
        form: RecipeArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Start the JSON API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Hours a login session stays valid
        #[arg(long, default_value = "24")]
        session_ttl_hours: i64,
    },
}

#[derive(Args)]
struct RecipeArgs {
    /// Recipe title
    #[arg(long)]
    title: String,
    /// Short description
    #[arg(long, default_value = "")]
    description: String,
    /// Image URL or path
    #[arg(long, default_value = "")]
    image: String,
    /// Total duration, free text (e.g. "1h15")
    #[arg(long, default_value = "")]
    duration: String,
    /// Ingredients, dash separated (e.g. "- 200g flour - 3 eggs")
    #[arg(long, default_value = "")]
    ingredients: String,
    /// Stages, dash separated (e.g. "- mix - bake 20 min")
    #[arg(long, default_value = "")]
    stages: String,
}

impl From<RecipeArgs> for RecipeForm {
    fn from(args: RecipeArgs) -> Self {
        RecipeForm {
            title: args.title,
            description: args.description,
            image: args.image,
            duration: args.duration,
            ingredients: args.ingredients,
            stages: args.stages,
        }
    }
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a new user
    Register {
        name: String,
        password: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check a user's credentials
    Login {
        name: String,
        password: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recipebox=info,recipebox_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let mut svc = CatalogService::from_database(Database::open(&config.db_path)?);

    match cli.command {
        Commands::Init {
            dataset,
            admin_name,
            admin_password,
        } => cmd_init(
            &mut svc,
            &dataset,
            &BootstrapUser {
                name: admin_name,
                password: admin_password,
            },
        ),
        Commands::Search { query, page, json } => {
            cmd_search(&svc, query.as_deref(), page.as_deref(), json)
        }
        Commands::Show { id, json } => cmd_show(&svc, id, json),
        Commands::Create { form, json } => cmd_create(&mut svc, form.into(), json),
        Commands::Update { id, form, json } => cmd_update(&mut svc, id, form.into(), json),
        Commands::Delete { id, json } => cmd_delete(&mut svc, id, json),
        Commands::User { command } => match command {
            UserCommands::Register {
                name,
                password,
                json,
            } => cmd_user_register(&svc, &name, &password, json),
            UserCommands::Login {
                name,
                password,
                json,
            } => cmd_user_login(&svc, &name, &password, json),
        },
        Commands::Serve {
            port,
            bind,
            session_ttl_hours,
        } => {
            let ttl = chrono::Duration::hours(session_ttl_hours.clamp(1, 24 * 365));
            server::start_server(svc, port, &bind, ttl).await
        }
    }
}
