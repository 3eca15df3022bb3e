//! CLI command definitions and argument parsing

use chrono::NaiveDate;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;

use crate::models::RecordType;

#[derive(Parser)]
#[command(name = "desksync")]
#[command(about = "ServiceDesk ETL: reference-data sync and ticket extraction")]
#[command(version)]
pub struct Cli {
    /// Enable verbose debug logging (default: info level)
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize database schema and indexes
    Init,
    /// Synchronize reference data from the remote platform
    Sync {
        /// Record type to synchronize (all types when omitted)
        #[arg(value_enum)]
        record_type: Option<RecordTypeArg>,
        /// Force a full pull instead of incremental
        #[arg(long)]
        full: bool,
    },
    /// Backfill reference records referenced by tickets but missing locally
    ResolveMissing {
        /// Record type to resolve (all types when omitted)
        #[arg(value_enum)]
        record_type: Option<RecordTypeArg>,
    },
    /// Extract tickets closed in a date range
    Tickets {
        /// Start date (YYYY-MM-DD); defaults to two days before the end date
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date (YYYY-MM-DD); defaults to today
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Full ETL: reference sync, then tickets plus reference closure
    Run {
        /// Start date for tickets (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// End date for tickets (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Force a full reference sync instead of incremental
        #[arg(long)]
        full_refs: bool,
    },
    /// Show recent execution summaries
    History {
        /// Maximum number of executions to show
        #[arg(short, long, default_value = "10")]
        limit: i64,
    },
    /// Show current configuration
    Config,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum RecordTypeArg {
    Users,
    Companies,
    Departments,
}

impl From<RecordTypeArg> for RecordType {
    fn from(arg: RecordTypeArg) -> Self {
        match arg {
            RecordTypeArg::Users => Self::User,
            RecordTypeArg::Companies => Self::Company,
            RecordTypeArg::Departments => Self::Department,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_sync_with_type_and_full() {
        let cli = Cli::parse_from(["desksync", "sync", "companies", "--full"]);
        match cli.command {
            Commands::Sync { record_type, full } => {
                assert!(matches!(record_type, Some(RecordTypeArg::Companies)));
                assert!(full);
            }
            _ => panic!("expected sync command"),
        }
    }

    #[test]
    fn parses_tickets_date_range() {
        let cli = Cli::parse_from(["desksync", "tickets", "--start", "2024-03-01", "--end", "2024-03-05"]);
        match cli.command {
            Commands::Tickets { start, end } => {
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 1));
                assert_eq!(end, NaiveDate::from_ymd_opt(2024, 3, 5));
            }
            _ => panic!("expected tickets command"),
        }
    }
}
