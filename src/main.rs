//! Production planner
//!
//! Computes steady-state production plans from a catalog stored in SQLite.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use tracing_subscriber::EnvFilter;

use production_planner::config::{parse_override, parse_target};
use production_planner::report::{self, PlanSummary};
use production_planner::{
    Facility, Item, ItemAmount, ItemId, PlanFile, Recipe, RecipeId, SolveOptions, Target, db,
    import, solve,
};

#[derive(Parser)]
#[command(name = "planner")]
#[command(about = "Steady-state production planner")]
struct Cli {
    /// Path to the SQLite database
    #[arg(short, long, default_value = "planner.db", global = true)]
    database: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize empty database with schema
    Init,

    /// Import items, facilities and recipes from a directory of JSON files
    Import {
        /// Directory to scan for *.json files
        dir: PathBuf,

        /// Clear existing catalog before importing
        #[arg(long)]
        clear: bool,
    },

    /// Load a small sample catalog
    LoadSample,

    /// Solve a production plan
    Solve(SolveArgs),

    /// List all items in the database
    ListItems,

    /// List all recipes in the database
    ListRecipes,

    /// Show details for a specific recipe
    Recipe {
        /// Recipe ID
        id: String,
    },
}

#[derive(Args)]
struct SolveArgs {
    /// TOML plan with targets, overrides and raw materials
    #[arg(short, long)]
    plan: Option<PathBuf>,

    /// Target as ITEM=RATE in items per minute
    #[arg(short, long = "target", value_parser = parse_target)]
    targets: Vec<Target>,

    /// Force a recipe as ITEM=RECIPE
    #[arg(short, long = "override", value_parser = parse_override)]
    overrides: Vec<(ItemId, RecipeId)>,

    /// Treat an item as raw even if a recipe makes it
    #[arg(short, long)]
    raw: Vec<String>,

    /// Show the production trees and loops
    #[arg(short, long)]
    verbose: bool,

    /// Print the full result as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let conn = Connection::open(&cli.database)?;
    db::init_schema(&conn)?;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::Import { dir, clear } => {
            if clear {
                println!("Clearing existing catalog...");
                db::clear_catalog(&conn)?;
            }

            let stats = import::import_directory(&conn, &dir)?;
            println!("{}", stats);
        }

        Commands::LoadSample => {
            load_sample_data(&conn)?;
            println!("Sample data loaded successfully!");
        }

        Commands::Solve(args) => run_solve(&conn, args)?,

        Commands::ListItems => {
            let items = db::list_items(&conn)?;
            if items.is_empty() {
                println!("No items in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<24} {:<30} {:>5}", "Item", "Name", "Tier");
                println!("{}", "-".repeat(61));
                for item in items {
                    println!("{:<24} {:<30} {:>5}", item.id, item.display_name(), item.tier);
                }
            }
        }

        Commands::ListRecipes => {
            let recipes = db::list_recipes(&conn)?;
            if recipes.is_empty() {
                println!("No recipes in database. Run 'import' or 'load-sample' first.");
            } else {
                println!("{:<24} {:<20} {:>10}", "Recipe", "Facility", "Duration");
                println!("{}", "-".repeat(56));
                for (id, facility, duration) in recipes {
                    println!("{:<24} {:<20} {:>9.2}s", id, facility, duration);
                }
            }
        }

        Commands::Recipe { id } => {
            let id = RecipeId::new(id);
            match db::get_recipe(&conn, &id)? {
                Some(recipe) => {
                    println!("Recipe: {}", recipe.id);
                    println!("  Facility: {}", recipe.facility);
                    println!("  Duration: {}s", recipe.duration);
                    if !recipe.inputs.is_empty() {
                        println!("  Inputs:");
                        for input in &recipe.inputs {
                            println!(
                                "    {} x{} ({:.3}/min)",
                                input.item,
                                input.amount,
                                recipe.input_rate(&input.item)
                            );
                        }
                    }
                    if !recipe.outputs.is_empty() {
                        println!("  Outputs:");
                        for output in &recipe.outputs {
                            println!(
                                "    {} x{} ({:.3}/min)",
                                output.item,
                                output.amount,
                                recipe.output_rate(&output.item)
                            );
                        }
                    }
                }
                None => println!("Recipe '{}' not found", id),
            }
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_solve(conn: &Connection, args: SolveArgs) -> Result<()> {
    let (mut targets, mut options) = match &args.plan {
        Some(path) => {
            let plan = PlanFile::load(path)?;
            let options = plan.options();
            (plan.targets, options)
        }
        None => (Vec::new(), SolveOptions::default()),
    };
    targets.extend(args.targets);
    for (item, recipe) in args.overrides {
        options = options.with_override(item, recipe);
    }
    for item in args.raw {
        options = options.with_raw(item);
    }
    if targets.is_empty() {
        bail!("no targets given, use --target ITEM=RATE or --plan FILE");
    }

    let catalog = db::load_catalog(conn)?;
    let result = solve(&targets, &catalog, &options)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    if args.verbose {
        println!("Production trees:\n");
        for tree in &result.trees {
            println!("{}", report::format_production_tree(tree, 0));
        }
        for cycle in &result.detected_cycles {
            println!("{}", report::format_cycle(cycle));
        }
    }

    println!("{}", PlanSummary::new(&result, &catalog));
    Ok(())
}

/// Load a sample catalog: a smelting chain, a shared intermediate and a seed loop
fn load_sample_data(conn: &Connection) -> Result<()> {
    db::clear_catalog(conn)?;

    let items = [
        ("iron-ore", "Iron Ore", 0),
        ("water", "Water", 0),
        ("iron-plate", "Iron Plate", 1),
        ("seed", "Seed", 1),
        ("sapling", "Sapling", 1),
        ("gear", "Gear", 2),
        ("pipe", "Pipe", 2),
        ("engine", "Engine", 3),
    ];
    for (id, name, tier) in items {
        db::upsert_item(
            conn,
            &Item {
                id: id.into(),
                name: Some(name.to_string()),
                tier,
            },
        )?;
    }

    let facilities = [
        ("furnace", "Stone Furnace", 90.0),
        ("assembler", "Assembler", 75.0),
        ("greenhouse", "Greenhouse", 20.0),
    ];
    for (id, name, power) in facilities {
        db::upsert_facility(
            conn,
            &Facility {
                id: id.into(),
                name: Some(name.to_string()),
                power,
            },
        )?;
    }

    let recipes = [
        // Linear chain: ore -> plate -> gear
        sample_recipe(
            "smelt-iron",
            "furnace",
            3.2,
            &[("iron-ore", 1.0)],
            &[("iron-plate", 1.0)],
        ),
        sample_recipe(
            "make-gear",
            "assembler",
            0.5,
            &[("iron-plate", 2.0)],
            &[("gear", 1.0)],
        ),
        // Plates are shared between gears and pipes
        sample_recipe(
            "make-pipe",
            "assembler",
            0.5,
            &[("iron-plate", 1.0)],
            &[("pipe", 1.0)],
        ),
        sample_recipe(
            "make-engine",
            "assembler",
            10.0,
            &[("gear", 1.0), ("pipe", 2.0)],
            &[("engine", 1.0)],
        ),
        // Seeds grow saplings that grow more seeds
        sample_recipe(
            "grow-seeds",
            "greenhouse",
            30.0,
            &[("sapling", 1.0), ("water", 10.0)],
            &[("seed", 3.0)],
        ),
        sample_recipe(
            "plant-sapling",
            "greenhouse",
            5.0,
            &[("seed", 1.0)],
            &[("sapling", 1.0)],
        ),
    ];
    for recipe in &recipes {
        db::upsert_recipe(conn, recipe)?;
    }

    println!(
        "Loaded {} items, {} facilities, {} recipes",
        items.len(),
        facilities.len(),
        recipes.len()
    );
    Ok(())
}

fn sample_recipe(
    id: &str,
    facility: &str,
    duration: f64,
    inputs: &[(&str, f64)],
    outputs: &[(&str, f64)],
) -> Recipe {
    Recipe {
        id: id.into(),
        inputs: inputs.iter().map(|&(i, a)| ItemAmount::new(i, a)).collect(),
        outputs: outputs.iter().map(|&(i, a)| ItemAmount::new(i, a)).collect(),
        duration,
        facility: facility.into(),
    }
}
