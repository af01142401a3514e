use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;

use catalog_grouping::{
    count_entities, editing, insert_entities, load_entities_csv, logging, search, setup_database,
    AggregationQuery, AppConfig, EntitySearch, GroupingEngine,
};

const USAGE: &str = "Usage:
  catalog-grouping import <csv>
  catalog-grouping group [--category ID] [--force]
  catalog-grouping invalidate <category_id>
  catalog-grouping aggregations [category_id]
  catalog-grouping entities [query]";

fn main() -> Result<()> {
    logging::init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = AppConfig::load()?;

    let conn = Connection::open(&config.database_path)
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    setup_database(&conn)?;

    match args.first().map(String::as_str) {
        Some("import") => {
            let Some(csv_path) = args.get(1) else {
                bail!("missing CSV path\n{}", USAGE);
            };
            run_import(&conn, Path::new(csv_path))
        }
        Some("group") => run_group(&conn, &config, &args[1..]),
        Some("invalidate") => {
            let Some(category_id) = args.get(1) else {
                bail!("missing category id\n{}", USAGE);
            };
            run_invalidate(&conn, &config, category_id)
        }
        Some("aggregations") => run_list(&conn, args.get(1).cloned()),
        Some("entities") => run_search(&conn, args.get(1).cloned()),
        _ => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

fn run_import(conn: &Connection, csv_path: &Path) -> Result<()> {
    println!("🗄️  Entity Import - CSV → SQLite");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    println!("\n📂 Loading CSV...");
    let entities = load_entities_csv(csv_path)?;
    println!("✓ Loaded {} entities from CSV", entities.len());

    println!("\n💾 Inserting entities...");
    insert_entities(conn, &entities)?;

    let count = count_entities(conn)?;
    println!("✓ Database contains {} entities", count);

    Ok(())
}

fn run_group(conn: &Connection, config: &AppConfig, flags: &[String]) -> Result<()> {
    let engine = GroupingEngine::new(config);
    let mut options = engine.options();

    let mut flags = flags.iter();
    while let Some(flag) = flags.next() {
        match flag.as_str() {
            "--category" => {
                let Some(category_id) = flags.next() else {
                    bail!("--category needs a value\n{}", USAGE);
                };
                options = options.for_category(category_id.as_str());
            }
            "--force" => options = options.force_regenerate(true),
            other => bail!("unknown flag {}\n{}", other, USAGE),
        }
    }

    println!("🧩 Grouping entities...");
    let run = engine.group(conn, &options)?;

    for group in &run.groups {
        println!(
            "{} aggregation {:>5}  [{}] {} ({} members)",
            if group.reused { "♻️ " } else { "✨" },
            group.aggregation_id,
            group.category_id,
            group.grouping_key,
            group.member_ids.len()
        );
    }

    for failure in &run.failures {
        println!("❌ [{}] {}: {}", failure.category_id, failure.grouping_key, failure.error);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ {} groups ({} reused), {} failures",
        run.groups.len(),
        run.groups.iter().filter(|g| g.reused).count(),
        run.failures.len()
    );

    Ok(())
}

fn run_invalidate(conn: &Connection, config: &AppConfig, category_id: &str) -> Result<()> {
    let engine = GroupingEngine::new(config);

    if engine.invalidate_significance(conn, category_id)? {
        println!("✓ Significant characteristics of {} cleared", category_id);
    } else {
        println!("⚠️  Category {} has not been analyzed yet", category_id);
    }

    Ok(())
}

fn run_list(conn: &Connection, category_id: Option<String>) -> Result<()> {
    let query = AggregationQuery {
        category_id,
        ..Default::default()
    };
    let aggregations = editing::list_aggregations(conn, &query)?;

    println!("📋 {} aggregations", aggregations.len());
    for aggregation in aggregations {
        println!(
            "{:>5}  {:<6} {}  {}  ({} members{})",
            aggregation.id,
            aggregation.status.as_str(),
            if aggregation.is_saved { "💾" } else { "  " },
            aggregation.name.as_deref().unwrap_or("-"),
            aggregation.items.len(),
            aggregation
                .rating
                .map(|r| format!(", rated {:.2}", r))
                .unwrap_or_default()
        );
    }

    Ok(())
}

fn run_search(conn: &Connection, query: Option<String>) -> Result<()> {
    let search = EntitySearch {
        query,
        ..Default::default()
    };
    let page = search::search_entities(conn, &search)?;

    println!("🔎 {} matching entities (showing {})", page.total, page.items.len());
    for entity in page.items {
        println!(
            "{:>5}  {:<12} {}  [{}]",
            entity.id,
            entity.external_id,
            entity.name,
            entity.category_name.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
