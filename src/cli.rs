use clap::Parser;
use std::{fmt::Display, path::PathBuf};

/// Dot-commands understood by the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaCommand {
    DbInfo,
    Tables,
    Schema,
    Page,
    Scan,
}

impl MetaCommand {
    /// Whether the command needs the extra `target` argument
    pub fn needs_target(self) -> bool {
        matches!(self, MetaCommand::Page | MetaCommand::Scan)
    }
}

impl std::str::FromStr for MetaCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ".dbinfo" => Ok(MetaCommand::DbInfo),
            ".tables" => Ok(MetaCommand::Tables),
            ".schema" => Ok(MetaCommand::Schema),
            ".page" => Ok(MetaCommand::Page),
            ".scan" => Ok(MetaCommand::Scan),
            _ => Err(format!("Unknown command: {}", s)),
        }
    }
}

impl Display for MetaCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetaCommand::DbInfo => write!(f, ".dbinfo"),
            MetaCommand::Tables => write!(f, ".tables"),
            MetaCommand::Schema => write!(f, ".schema"),
            MetaCommand::Page => write!(f, ".page"),
            MetaCommand::Scan => write!(f, ".scan"),
        }
    }
}

/// Read-only inspector for SQLite database files
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Path to the database file
    pub file: PathBuf,

    /// One of .dbinfo, .tables, .schema, .page, .scan
    pub command: MetaCommand,

    /// Page number for .page, table name for .scan
    pub target: Option<String>,

    /// Log decoding steps at debug level
    #[arg(short, long)]
    pub verbose: bool,
}
