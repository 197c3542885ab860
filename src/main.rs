use std::path::PathBuf;

use anyhow::bail;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use gdc_models::config::DatabaseConfig;
use gdc_models::privileges::{self, PermissionSet};
use gdc_models::store::{Module, SqliteStore, Store, Target, migrations};

#[derive(Parser)]
#[command(name = "gdc-models")]
#[command(about = "Schema management for the data portal models", long_about = None)]
struct Cli {
    /// Database file (overrides the config file and GDC_MODELS_DATABASE)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and bring the schema to the latest revision
    Init,

    /// Schema migration commands
    Migrate {
        #[command(subcommand)]
        command: MigrateCommands,
    },

    /// List tables, per module
    Tables {
        /// Only this module (e.g. "batch", "studyrule")
        #[arg(long)]
        module: Option<Module>,
    },

    /// Print the GRANT statement for a module's tables
    Grant(PrivilegeArgs),

    /// Print the REVOKE statement for a module's tables
    Revoke(PrivilegeArgs),
}

#[derive(Subcommand)]
enum MigrateCommands {
    /// Apply revisions up to a target
    Upgrade {
        /// Revision id or "head"
        #[arg(long, default_value = "head")]
        to: Target,
    },

    /// Revert revisions down to a target
    Downgrade {
        /// Revision id or "base"
        #[arg(long)]
        to: Target,

        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },

    /// Show the revision the database is at
    Current,

    /// List every known revision
    History,
}

#[derive(clap::Args)]
struct PrivilegeArgs {
    #[arg(long)]
    module: Module,

    /// Database role receiving or losing the privileges
    #[arg(long)]
    role: String,

    /// "read" or "write"
    #[arg(long)]
    permission: PermissionSet,
}

fn load_config(cli: &Cli) -> anyhow::Result<DatabaseConfig> {
    let mut config = match &cli.config {
        Some(path) => DatabaseConfig::from_file(path)?.with_env()?,
        None => DatabaseConfig::from_env()?,
    };
    if let Some(path) = &cli.database {
        config.path = path.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_store(cli: &Cli) -> anyhow::Result<SqliteStore> {
    let config = load_config(cli)?;
    Ok(SqliteStore::open(&config)?)
}

fn run_init(cli: &Cli) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let store = SqliteStore::open(&config)?;
    let before = store.current_revision()?;
    store.initialize()?;

    match before {
        Some(revision) if revision == migrations::head() => {
            println!("Database already at {revision}: {}", config.path.display());
        }
        _ => {
            println!(
                "Initialized {} at revision {}",
                config.path.display(),
                migrations::head()
            );
        }
    }
    Ok(())
}

fn run_upgrade(store: &SqliteStore, to: &Target) -> anyhow::Result<()> {
    let applied = store.upgrade_to(to)?;
    if applied.is_empty() {
        println!("Already at {to}");
    }
    for revision in applied {
        println!("Upgraded to {revision}");
    }
    Ok(())
}

fn run_downgrade(store: &SqliteStore, to: &Target, yes: bool) -> anyhow::Result<()> {
    let Some(current) = store.current_revision()? else {
        bail!("Database has no schema revision; nothing to downgrade.");
    };

    if !yes {
        let confirmed = inquire::Confirm::new(&format!(
            "Downgrade from {current} to {to}? Dropped columns and tables lose their data."
        ))
        .with_default(false)
        .prompt()?;
        if !confirmed {
            bail!("Downgrade cancelled");
        }
    }

    let reverted = store.downgrade_to(to)?;
    for revision in reverted {
        println!("Reverted {revision}");
    }
    Ok(())
}

fn run_history(store: &SqliteStore) -> anyhow::Result<()> {
    let current = store.current_revision()?;
    for migration in store.history() {
        let marker = if current.as_deref() == Some(migration.revision) {
            " (current)"
        } else {
            ""
        };
        println!(
            "{} -> {}{marker}  {}",
            migration.down_revision.unwrap_or("<base>"),
            migration.revision,
            migration.description
        );
    }
    Ok(())
}

fn run_tables(store: &SqliteStore, module: Option<Module>) -> anyhow::Result<()> {
    let existing = store.table_names()?;
    let modules: Vec<Module> = match module {
        Some(module) => vec![module],
        None => Module::ALL.to_vec(),
    };

    for module in modules {
        println!("{module}:");
        for table in module.tables() {
            let state = if existing.iter().any(|t| t == table) {
                ""
            } else {
                " (missing)"
            };
            println!("  {table}{state}");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("gdc_models=info".parse()?))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Init => run_init(&cli)?,
        Commands::Migrate { command } => {
            let store = open_store(&cli)?;
            match command {
                MigrateCommands::Upgrade { to } => run_upgrade(&store, to)?,
                MigrateCommands::Downgrade { to, yes } => run_downgrade(&store, to, *yes)?,
                MigrateCommands::Current => match store.current_revision()? {
                    Some(revision) => println!("{revision}"),
                    None => println!("<base>"),
                },
                MigrateCommands::History => run_history(&store)?,
            }
        }
        Commands::Tables { module } => {
            let store = open_store(&cli)?;
            run_tables(&store, *module)?;
        }
        Commands::Grant(args) => {
            let stmt = privileges::grant_module(args.permission, &args.role, args.module)?;
            info!(module = %args.module, role = %args.role, "Rendered grant");
            println!("{stmt}");
        }
        Commands::Revoke(args) => {
            let stmt = privileges::revoke_module(args.permission, &args.role, args.module)?;
            info!(module = %args.module, role = %args.role, "Rendered revoke");
            println!("{stmt}");
        }
    }

    Ok(())
}
