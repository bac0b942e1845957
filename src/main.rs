use anyhow::{anyhow, Context, Result};
use clap::Parser;
use itertools::Itertools;
use sqlite_decoder::{Cell, Database};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

mod cli;

use cli::{Args, MetaCommand};

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    run(args)
}

pub fn run(args: Args) -> Result<()> {
    if args.command.needs_target() && args.target.is_none() {
        return Err(anyhow!("{} needs an argument", args.command));
    }

    let db = Database::open(&args.file)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    info!("Running {} on {}", args.command, args.file.display());

    match args.command {
        MetaCommand::DbInfo => {
            let info = db.info()?;
            println!("database page size: {}", info.page_size());
            println!("number of pages: {}", info.page_count());
            println!("number of tables: {}", info.num_tables());
        }
        MetaCommand::Tables => {
            let tables = db.tables()?;
            println!("{}", tables.iter().map(|table| &table.name).join(" "));
        }
        MetaCommand::Schema => {
            for entry in db.schema()? {
                match &entry.sql {
                    Some(sql) => println!("{};", sql),
                    None => println!("-- {} {} (no sql)", entry.kind, entry.name),
                }
            }
        }
        MetaCommand::Page => {
            let target = args.target.unwrap_or_default();
            let number: u32 = target
                .parse()
                .with_context(|| format!("Invalid page number '{}'", target))?;
            print_page(&db, number)?;
        }
        MetaCommand::Scan => {
            let table = args.target.unwrap_or_default();
            let rows = db
                .scan(&table)
                .with_context(|| format!("Failed to scan table '{}'", table))?;
            for row in rows {
                println!("{}", row);
            }
        }
    }
    Ok(())
}

fn print_page(db: &Database, number: u32) -> Result<()> {
    let page = db.page(number)?;
    let btree = page
        .btree()
        .with_context(|| format!("Page {} is not a b-tree page", number))?;
    let header = btree.header();

    println!("page: {}", number);
    println!("type: {}", header.page_type);
    println!("cells: {}", header.cell_count);
    println!("content area: {}", header.content_area_start);
    if let Some(rightmost) = header.rightmost_pointer {
        println!("right-most child: {}", rightmost);
    }

    for (index, cell) in btree.cells().enumerate() {
        match cell {
            Ok(Cell::TableInterior {
                left_child_page,
                key,
            }) => println!("[{}] child {} key {}", index, left_child_page, key),
            Ok(cell) => {
                let prefix = match (cell.row_id(), cell.left_child_page()) {
                    (Some(row_id), _) => format!("row {}", row_id),
                    (None, Some(child)) => format!("child {}", child),
                    (None, None) => "key".to_string(),
                };
                match cell.record() {
                    Ok(record) => println!(
                        "[{}] {}: {}{}",
                        index,
                        prefix,
                        record.values().iter().join("|"),
                        if record.is_truncated() { " (truncated)" } else { "" }
                    ),
                    Err(err) => println!("[{}] {}: error: {}", index, prefix, err),
                }
            }
            Err(err) => println!("[{}] error: {}", index, err),
        }
    }
    Ok(())
}
