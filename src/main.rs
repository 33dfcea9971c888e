//! eavdb CLI - operate an entity/attribute/value object store

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use eavdb::config::{self, EavConfig};
use eavdb::ui::{self, Icons};
use eavdb::{Direction, Entity, ObjectStore};
use serde_json::Value;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "eavdb")]
#[command(version)]
#[command(about = "Schema-less object store - typed objects on generic attribute tables")]
#[command(long_about = r#"
eavdb stores objects of declared types as rows of generic attribute tables
and queries them through generated per-type views.

Example usage:
  eavdb init
  eavdb set Person name=Ann age=30
  eavdb query Person --filter age__gte=18 --order name
  eavdb get 1
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config and create the database
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Create or extend the core tables
    Migrate,

    /// Rebuild per-type views (only stale ones unless --force)
    Views {
        /// Only this type
        #[arg(short = 't', long = "type")]
        type_name: Option<String>,

        #[arg(long)]
        force: bool,
    },

    /// Show one object
    Get {
        id: u64,

        /// Allowed types
        #[arg(short = 't', long = "type")]
        types: Vec<String>,

        /// Read pending preview values
        #[arg(long)]
        preview: bool,
    },

    /// Create or update an object from key=value pairs
    Set {
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Field assignments; values are parsed as JSON when possible
        #[arg(value_name = "KEY=VALUE")]
        fields: Vec<String>,

        /// Update this object instead of creating one
        #[arg(long)]
        id: Option<u64>,

        #[arg(long)]
        parent: Option<u64>,

        #[arg(long)]
        creator: Option<u64>,

        /// Write preview rows instead of committed values
        #[arg(long)]
        preview: bool,
    },

    /// Soft-delete an object and its descendants
    Delete { id: u64 },

    /// Query objects of one type
    Query {
        #[arg(value_name = "TYPE")]
        type_name: String,

        /// Conditions such as age__gte=18, name__in=Ann,Bob, or the words "or" / "and"
        #[arg(short, long)]
        filter: Vec<String>,

        /// Order by field, optionally field:desc
        #[arg(short, long)]
        order: Vec<String>,

        #[arg(short, long)]
        limit: Option<u64>,

        /// Query the preview relations
        #[arg(long)]
        preview: bool,

        /// Print the SQL instead of running it
        #[arg(long)]
        sql: bool,
    },

    /// Link two objects
    Link {
        origin: u64,
        target: u64,

        /// Only origin -> target
        #[arg(long)]
        directed: bool,
    },

    /// Remove a link between two objects
    Unlink {
        origin: u64,
        target: u64,

        #[arg(long)]
        directed: bool,
    },

    /// Show statistics about the store
    Stats,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(&cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Init { force } => {
            let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
            let starter = EavConfig {
                database: Some(".eavdb/eavdb.db".to_string()),
                ..EavConfig::default()
            };
            config::write_config(&config_path, &starter, *force)?;
            let store = open_store(cli)?;
            ui::success(&format!("Wrote {}", config_path.display()));
            ui::info("Objects", &store.stats()?.objects.to_string());
        }

        Commands::Migrate => {
            let store = open_store(cli)?;
            let applied = store.migrate()?;
            ui::success(&format!("Schema up to date ({} statements applied)", applied));
        }

        Commands::Views { type_name, force } => {
            let store = open_store(cli)?;
            let rebuilt = match type_name {
                Some(name) if *force => {
                    store.rebuild_views(name)?;
                    1
                }
                Some(name) => usize::from(store.build_if_expired(name)?),
                None => store.rebuild_all_views(*force)?,
            };
            if rebuilt == 0 {
                ui::warn("All views are up to date (use --force to rebuild)");
            } else {
                ui::success(&format!("Rebuilt views for {} type(s)", rebuilt));
            }
            ui::section("Views");
            let catalog = store.view_catalog();
            for (name, entry) in catalog.entries() {
                ui::summary_row(name, &format!("{} build(s), last at {}", entry.builds, entry.built_at));
            }
        }

        Commands::Get { id, types, preview } => {
            let store = open_store(cli)?;
            let allowed: Vec<&str> = types.iter().map(String::as_str).collect();
            let record = if *preview {
                let entity = store.from_id(*id, &allowed)?;
                store.populate_preview(&entity.type_name, *id)?
            } else {
                let entity = store.from_id(*id, &allowed)?;
                let mut record = entity.to_record();
                record.insert("type".to_string(), Value::from(entity.type_name.clone()));
                record
            };
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                ui::header(&format!("Object {}", id));
                ui::record(&record);
            }
        }

        Commands::Set {
            type_name,
            fields,
            id,
            parent,
            creator,
            preview,
        } => {
            let mut store = open_store(cli)?;
            if *preview {
                store.set_preview(true);
            }
            let mut entity = match id {
                Some(id) => store.from_id(*id, &[type_name.as_str()])?,
                None => Entity::new(type_name.clone()),
            };
            if parent.is_some() {
                entity.parent_id = *parent;
            }
            if creator.is_some() {
                entity.creator_id = *creator;
            }
            for assignment in fields {
                let (key, raw) = assignment
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("expected KEY=VALUE, got {:?}", assignment))?;
                entity.set(key, parse_value(raw));
            }
            let id = store.update(&mut entity)?;
            if cli.json {
                println!("{}", serde_json::json!({ "id": id }));
            } else {
                ui::success(&format!("{} {} {} saved", Icons::OBJECT, type_name, id));
            }
        }

        Commands::Delete { id } => {
            let store = open_store(cli)?;
            let deleted = store.delete(*id)?;
            if cli.json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                let ids: Vec<String> = deleted.iter().map(u64::to_string).collect();
                ui::success(&format!("{} Deleted {}", Icons::DEL, ids.join(", ")));
            }
        }

        Commands::Query {
            type_name,
            filter,
            order,
            limit,
            preview,
            sql,
        } => {
            let store = open_store(cli)?;
            let mut query = store.select(type_name)?;
            query.preview(*preview);
            for expression in filter {
                let (expression, args) = parse_filter(expression);
                query.apply(expression, args)?;
            }
            for entry in order {
                let (field, direction) = match entry.split_once(':') {
                    Some((field, direction)) => (field, Direction::parse(direction)),
                    None => (entry.as_str(), Direction::Asc),
                };
                query.order_by(field, direction)?;
            }
            if let Some(limit) = limit {
                query.limit(*limit);
            }

            if *sql {
                println!("{}", query.to_sql()?);
                return Ok(());
            }

            let results = query.results()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&results.assoc_rows())?);
            } else {
                ui::header(&format!("{} {} result(s)", Icons::SEARCH, results.len()));
                if !results.is_empty() {
                    println!("{}", ui::results_table(results));
                }
            }
        }

        Commands::Link {
            origin,
            target,
            directed,
        } => {
            let store = open_store(cli)?;
            if *directed {
                store.link_directed(*origin, *target)?;
            } else {
                store.link(*origin, *target)?;
            }
            ui::success(&format!("{} Linked {} and {}", Icons::LINK, origin, target));
        }

        Commands::Unlink {
            origin,
            target,
            directed,
        } => {
            let store = open_store(cli)?;
            if *directed {
                store.unlink_directed(*origin, *target)?;
            } else {
                store.unlink(*origin, *target)?;
            }
            ui::success(&format!("Unlinked {} and {}", origin, target));
        }

        Commands::Stats => {
            let store = open_store(cli)?;
            let stats = store.stats()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                ui::header(&format!("{} Store statistics", Icons::STATS));
                println!(
                    "{}",
                    ui::stats_table(&[
                        ("Types", stats.types.to_string()),
                        ("Objects", stats.objects.to_string()),
                        ("Deleted objects", stats.deleted.to_string()),
                        ("Current attributes", stats.attributes.to_string()),
                        ("Archived attributes", stats.archived.to_string()),
                        ("Preview attributes", stats.previews.to_string()),
                        ("Caches", stats.caches.to_string()),
                        ("Links", stats.links.to_string()),
                    ])
                );
            }
        }
    }
    Ok(())
}

/// Load the config, open the database it names and bring the schema up to date
fn open_store(cli: &Cli) -> anyhow::Result<ObjectStore> {
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let config = config::load_config(Some(&config_path))?.unwrap_or_default();
    let base = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let db_path = cli.database.clone().unwrap_or_else(|| config.database_path(base));
    config::ensure_db_dir(&db_path)?;

    let registry = config.registry(config::modified_millis(&config_path))?;
    let store = ObjectStore::open(&db_path, registry, config.store_options(base))?;
    store.migrate()?;
    tracing::debug!("Opened {}", db_path.display());
    Ok(store)
}

/// JSON when it parses, plain text otherwise
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Split `field__op=a,b` into the expression and its arguments. Only `in`
/// and `between` take comma separated lists.
fn parse_filter(filter: &str) -> (&str, Vec<Value>) {
    let Some((expression, raw)) = filter.split_once('=') else {
        return (filter, Vec::new());
    };
    let operator = expression.split_once("__").map(|(_, op)| op.to_ascii_lowercase());
    let args = match operator.as_deref() {
        Some("in") if raw.is_empty() => Vec::new(),
        Some("in") | Some("between") => raw.split(',').map(parse_value).collect(),
        _ => vec![parse_value(raw)],
    };
    (expression, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_filter() {
        assert_eq!(parse_filter("age__gte=18"), ("age__gte", vec![json!(18)]));
        assert_eq!(parse_filter("name=Ann, Bob"), ("name", vec![json!("Ann, Bob")]));
        assert_eq!(parse_filter("id__in=1,2"), ("id__in", vec![json!(1), json!(2)]));
        assert_eq!(parse_filter("id__in="), ("id__in", vec![]));
        assert_eq!(parse_filter("or"), ("or", vec![]));
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("30"), json!(30));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("Ann"), json!("Ann"));
    }
}
