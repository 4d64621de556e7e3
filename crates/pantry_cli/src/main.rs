//! Pantry command-line entry point.
//!
//! # Responsibility
//! - Drive `pantry_core` against a local SQLite database.
//! - Keep output line-oriented and deterministic for scripting.
//!
//! Reads `PANTRY_CONFIG` (path to a JSON config) when set.

use pantry_core::db::open_db;
use pantry_core::{
    empty_pantry_recipes, init_logging_from_config, recipe_prompt, Credential, LogicalEntry,
    MutationCoordinator, PantryConfig, SqliteStore,
};
use std::error::Error;

const CONFIG_ENV: &str = "PANTRY_CONFIG";
const DEFAULT_OWNER: &str = "local";
const LOCAL_TOKEN: &str = "local-session";

fn print_usage(program: &str) {
    eprintln!(
        "Usage:\n  {program} <db-path> list\n  {program} <db-path> add <name> <qty> [unit]\n  {program} <db-path> remove <name> <qty>\n  {program} <db-path> recipes-prompt\n  {program} ping\n\nSet {CONFIG_ENV} to a JSON file to choose the owner id, timeout and log directory."
    );
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Ping,
    List,
    Add {
        name: String,
        quantity: f64,
        unit: Option<String>,
    },
    Remove {
        name: String,
        quantity: f64,
    },
    RecipesPrompt,
}

#[derive(Debug, Clone, PartialEq)]
struct CliOptions {
    db_path: Option<String>,
    command: Command,
}

fn parse_options(mut args: impl Iterator<Item = String>) -> Result<CliOptions, ()> {
    let first = args.next().ok_or(())?;
    if first == "ping" {
        return match args.next() {
            None => Ok(CliOptions {
                db_path: None,
                command: Command::Ping,
            }),
            Some(_) => Err(()),
        };
    }
    if first.starts_with('-') {
        return Err(());
    }

    let verb = args.next().ok_or(())?;
    let rest: Vec<String> = args.collect();
    let command = match (verb.as_str(), rest.as_slice()) {
        ("ping", []) => Command::Ping,
        ("list", []) => Command::List,
        ("recipes-prompt", []) => Command::RecipesPrompt,
        ("add", [name, quantity]) => Command::Add {
            name: name.clone(),
            quantity: parse_quantity(quantity)?,
            unit: None,
        },
        ("add", [name, quantity, unit]) => Command::Add {
            name: name.clone(),
            quantity: parse_quantity(quantity)?,
            unit: Some(unit.clone()),
        },
        ("remove", [name, quantity]) => Command::Remove {
            name: name.clone(),
            quantity: parse_quantity(quantity)?,
        },
        _ => return Err(()),
    };

    Ok(CliOptions {
        db_path: Some(first),
        command,
    })
}

fn parse_quantity(raw: &str) -> Result<f64, ()> {
    let quantity: f64 = raw.trim().parse().map_err(|_| ())?;
    if quantity.is_finite() {
        Ok(quantity)
    } else {
        Err(())
    }
}

fn load_config() -> Result<PantryConfig, Box<dyn Error>> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => Ok(PantryConfig::load(path)?),
        None => Ok(PantryConfig::for_owner(DEFAULT_OWNER)),
    }
}

fn format_entry(entry: &LogicalEntry) -> String {
    match &entry.unit {
        Some(unit) => format!("{}\t{} {}", entry.display_name, entry.total_quantity, unit),
        None => format!("{}\t{}", entry.display_name, entry.total_quantity),
    }
}

async fn run(db_path: &str, command: Command, config: &PantryConfig) -> Result<(), Box<dyn Error>> {
    let store = SqliteStore::new(open_db(db_path)?);
    let coordinator = MutationCoordinator::from_config(store, config);
    if let Some(credential) = Credential::new(LOCAL_TOKEN) {
        coordinator.sign_in(credential);
    }
    coordinator.refresh().await?;

    match command {
        Command::Ping => println!("pantry_core ping={}", pantry_core::ping()),
        Command::List => {
            for entry in coordinator.entries() {
                println!("{}", format_entry(&entry));
            }
        }
        Command::Add {
            name,
            quantity,
            unit,
        } => {
            let outcome = coordinator.add(&name, quantity, unit.as_deref()).await?;
            if let Some(entry) = outcome.entry {
                println!("{}", format_entry(&entry));
            }
        }
        Command::Remove { name, quantity } => {
            let outcome = coordinator.remove(&name, quantity).await?;
            match outcome.entry {
                Some(entry) => println!("{}", format_entry(&entry)),
                None => println!("{name}\tremoved"),
            }
        }
        Command::RecipesPrompt => match recipe_prompt(&coordinator.display_names()) {
            Some(prompt) => println!("{prompt}"),
            None => {
                for recipe in empty_pantry_recipes() {
                    println!("{}", recipe.title);
                }
            }
        },
    }
    Ok(())
}

fn main() {
    let result = (|| -> Result<(), Box<dyn Error>> {
        let mut args = std::env::args();
        let program = args.next().unwrap_or_else(|| "pantry_cli".to_owned());

        let options = match parse_options(args) {
            Ok(options) => options,
            Err(()) => {
                print_usage(&program);
                std::process::exit(2);
            }
        };

        let Some(db_path) = options.db_path else {
            println!("pantry_core ping={}", pantry_core::ping());
            println!("pantry_core version={}", pantry_core::core_version());
            return Ok(());
        };

        let config = load_config()?;
        init_logging_from_config(&config)?;
        log::info!("event=cli_start module=cli status=ok");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        runtime.block_on(run(&db_path, options.command, &config))
    })();

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::{format_entry, parse_options, CliOptions, Command};
    use pantry_core::{ItemKey, LogicalEntry, RecordId};

    fn parse(args: &[&str]) -> Result<CliOptions, ()> {
        parse_options(args.iter().map(|arg| (*arg).to_owned()))
    }

    #[test]
    fn parses_add_with_optional_unit() {
        assert_eq!(
            parse(&["pantry.db", "add", "Egg", "2"]).unwrap().command,
            Command::Add {
                name: "Egg".to_owned(),
                quantity: 2.0,
                unit: None,
            }
        );
        assert_eq!(
            parse(&["pantry.db", "add", "Flour", "0.5", "kg"])
                .unwrap()
                .command,
            Command::Add {
                name: "Flour".to_owned(),
                quantity: 0.5,
                unit: Some("kg".to_owned()),
            }
        );
    }

    #[test]
    fn bare_ping_needs_no_database() {
        let options = parse(&["ping"]).unwrap();
        assert_eq!(options.db_path, None);
        assert_eq!(options.command, Command::Ping);
    }

    #[test]
    fn rejects_malformed_invocations() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["pantry.db"]).is_err());
        assert!(parse(&["pantry.db", "remove", "Egg"]).is_err());
        assert!(parse(&["pantry.db", "remove", "Egg", "lots"]).is_err());
        assert!(parse(&["pantry.db", "add", "Egg", "NaN"]).is_err());
        assert!(parse(&["pantry.db", "list", "extra"]).is_err());
        assert!(parse(&["--verbose", "list"]).is_err());
        assert!(parse(&["ping", "extra"]).is_err());
    }

    #[test]
    fn formats_entries_with_and_without_unit() {
        let mut entry = LogicalEntry {
            key: ItemKey::parse("egg").unwrap(),
            display_name: "Egg".to_owned(),
            total_quantity: 5.0,
            unit: None,
            member_ids: vec![RecordId::from(1)],
        };
        assert_eq!(format_entry(&entry), "Egg\t5");
        entry.unit = Some("pcs".to_owned());
        assert_eq!(format_entry(&entry), "Egg\t5 pcs");
    }
}
