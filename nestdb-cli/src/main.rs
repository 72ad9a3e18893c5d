use clap::{Parser, Subcommand, ValueEnum};
use nestdb::{data_from_json, data_to_json, DocumentSnapshot, Registry, Settings, Value, Q};
use std::path::PathBuf;
use std::process;

/// nestdb CLI: read and write a nestdb store from the command line
#[derive(Parser)]
#[command(name = "nestdb", version, about)]
struct Cli {
    /// Settings file (YAML); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the store files
    #[arg(long)]
    store_dir: Option<String>,

    /// Store name (default: "default")
    #[arg(long, default_value = "")]
    store: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Get a single document
    Get {
        /// Document path (e.g. users/alice)
        path: String,
    },

    /// Create or replace a document
    Set {
        /// Document path
        path: String,
        /// Document body as a JSON object
        data: String,
    },

    /// Overwrite top-level fields of an existing document
    Update {
        /// Document path
        path: String,
        /// Fields to overwrite as a JSON object
        data: String,
    },

    /// Delete a document (sub-collections are kept)
    Delete {
        /// Document path
        path: String,
    },

    /// Add a document with a generated id
    Add {
        /// Collection path
        collection: String,
        /// Document body as a JSON object
        data: String,
    },

    /// Query a collection
    List {
        /// Collection path
        collection: String,
        /// Filters (e.g. --where age__gte=18 --where name__istartswith='"a"')
        #[arg(long = "where", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        /// Order clauses (e.g. --order-by age:desc)
        #[arg(long = "order-by")]
        order_by: Vec<String>,
        /// Keep the first N results
        #[arg(long, conflicts_with = "limit_to_last")]
        limit: Option<usize>,
        /// Keep the last N results
        #[arg(long)]
        limit_to_last: Option<usize>,
    },

    /// Dump the decoded tree below a path
    Raw {
        /// Collection or document path (default: whole store)
        #[arg(default_value = "")]
        path: String,
    },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// A filter operand: JSON when it parses, otherwise the raw string.
fn parse_operand(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Ok(Value::from_json(json)?),
        Err(_) => Ok(Value::from(raw)),
    }
}

fn parse_data(raw: &str) -> Result<nestdb::Data, Box<dyn std::error::Error>> {
    let json: serde_json::Value = serde_json::from_str(raw)?;
    Ok(data_from_json(json)?)
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn load_settings(cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &cli.store_dir {
        settings.store_dir = dir.clone();
    }
    Ok(settings)
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let registry = Registry::new(load_settings(&cli)?);
    registry.initialize()?;
    let shared = registry.get_instance(&cli.store)?;
    let store = shared.lock();
    log::debug!("using store '{}'", store.name());

    match cli.command {
        Command::Get { path } => {
            let snapshot = store.doc(&path)?.get()?;
            if !snapshot.exists() {
                return Err(format!("Document {} does not exist", snapshot.path()).into());
            }
            print_output(&snapshot_json(&snapshot), &cli.format)?;
        }
        Command::Set { path, data } => {
            let doc = store.doc(&path)?;
            doc.set(&parse_data(&data)?)?;
            store.save()?;
            print_output(&serde_json::json!({ "ok": true, "path": doc.path() }), &cli.format)?;
        }
        Command::Update { path, data } => {
            let doc = store.doc(&path)?;
            doc.update(&parse_data(&data)?)?;
            store.save()?;
            print_output(&serde_json::json!({ "ok": true, "path": doc.path() }), &cli.format)?;
        }
        Command::Delete { path } => {
            let doc = store.doc(&path)?;
            doc.delete()?;
            store.save()?;
            print_output(&serde_json::json!({ "ok": true, "deleted": doc.path() }), &cli.format)?;
        }
        Command::Add { collection, data } => {
            let doc = store.collection(&collection)?.add(&parse_data(&data)?)?;
            store.save()?;
            print_output(
                &serde_json::json!({ "id": doc.id(), "path": doc.path() }),
                &cli.format,
            )?;
        }
        Command::List {
            collection,
            filters,
            order_by,
            limit,
            limit_to_last,
        } => {
            let mut query = store.collection(&collection)?.query();
            for (expr, raw) in &filters {
                query = query.filter(Q::new(expr.as_str(), parse_operand(raw)?));
            }
            for clause in &order_by {
                query = match clause.split_once(':') {
                    Some((field, "desc")) => query.order_by_desc(field)?,
                    Some((field, "asc")) => query.order_by(field)?,
                    Some((_, other)) => {
                        return Err(format!("Unknown order direction '{other}'").into())
                    }
                    None => query.order_by(clause.as_str())?,
                };
            }
            if let Some(n) = limit {
                query = query.limit(n)?;
            }
            if let Some(n) = limit_to_last {
                query = query.limit_to_last(n)?;
            }
            let docs: Vec<serde_json::Value> = query.get()?.iter().map(snapshot_json).collect();
            print_output(&serde_json::Value::Array(docs), &cli.format)?;
        }
        Command::Raw { path } => {
            print_output(&store.raw_data(&path)?, &cli.format)?;
        }
    }
    Ok(())
}

fn snapshot_json(snapshot: &DocumentSnapshot) -> serde_json::Value {
    serde_json::json!({
        "id": snapshot.id(),
        "path": snapshot.path(),
        "data": snapshot.data().map(data_to_json),
    })
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
