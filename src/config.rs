//! Command-line arguments and the analysis settings derived from them.

use crate::cluster::ClusterAlgorithm;
use crate::records::SyntheticSource;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;

/// Cluster accounts that share creation dates and look-alike handles.
#[derive(Debug, Clone, Parser)]
#[command(name = "bot-communities", version)]
pub struct Args {
    /// Tweet table (CSV, optionally gzip-compressed)
    #[arg(long, env = "BOT_COMMUNITIES_INPUT", required_unless_present = "synthetic")]
    pub input: Option<PathBuf>,

    /// Generate a synthetic tweet table instead of reading one
    #[arg(long, conflicts_with = "input")]
    pub synthetic: bool,

    /// Organic accounts in the synthetic table
    #[arg(long, default_value_t = 140)]
    pub organic: usize,

    /// Planted account farms in the synthetic table
    #[arg(long, default_value_t = 3)]
    pub farms: usize,

    /// Accounts per planted farm
    #[arg(long, default_value_t = 8)]
    pub farm_size: usize,

    /// Seed for the synthetic table
    #[arg(long, default_value_t = 7)]
    pub seed: u64,

    /// Keep creation dates shared by more than this many accounts
    #[arg(long, default_value_t = 4)]
    pub min_accounts: usize,

    /// Only accounts created on or after this date (YYYY-MM-DD)
    #[arg(long)]
    pub created_after: Option<NaiveDate>,

    /// Only accounts created on or before this date (YYYY-MM-DD)
    #[arg(long)]
    pub created_before: Option<NaiveDate>,

    /// Only tweets whose text contains this phrase (case-insensitive)
    #[arg(long)]
    pub message: Option<String>,

    /// Community detection routine
    #[arg(long, value_enum, default_value_t = ClusterAlgorithm::ModularityGreedy)]
    pub algorithm: ClusterAlgorithm,

    /// Drop the mirrored copy of mutually-nearest handle pairs
    #[arg(long)]
    pub dedup_edges: bool,

    /// Directory for graphs and tables
    #[arg(long, default_value = "out")]
    pub out_dir: PathBuf,

    /// Only write tables, skip graph files
    #[arg(long)]
    pub no_render: bool,

    /// Rasterise graphs with Graphviz
    #[arg(long)]
    pub png: bool,

    /// Open rendered images
    #[arg(long, requires = "png")]
    pub open: bool,

    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn synthetic_source(&self) -> SyntheticSource {
        SyntheticSource {
            organic: self.organic,
            farms: self.farms,
            farm_size: self.farm_size,
            seed: self.seed,
            ..SyntheticSource::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub min_accounts: usize,
    pub created_after: Option<NaiveDate>,
    pub created_before: Option<NaiveDate>,
    pub message: Option<String>,
    pub algorithm: ClusterAlgorithm,
    pub dedup_edges: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            min_accounts: 4,
            created_after: None,
            created_before: None,
            message: None,
            algorithm: ClusterAlgorithm::ModularityGreedy,
            dedup_edges: false,
        }
    }
}

impl From<&Args> for AnalysisConfig {
    fn from(args: &Args) -> Self {
        AnalysisConfig {
            min_accounts: args.min_accounts,
            created_after: args.created_after,
            created_before: args.created_before,
            message: args.message.clone(),
            algorithm: args.algorithm,
            dedup_edges: args.dedup_edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn defaults_match_library_defaults() {
        let args = Args::try_parse_from(["bot-communities", "--input", "tweets.csv.gz"]).unwrap();
        assert_eq!(AnalysisConfig::from(&args), AnalysisConfig::default());
        assert_eq!(args.input.as_deref(), Some(std::path::Path::new("tweets.csv.gz")));
    }

    #[test]
    fn parses_dates_and_algorithm() {
        let args = Args::try_parse_from([
            "bot-communities",
            "--synthetic",
            "--created-after",
            "2021-08-01",
            "--algorithm",
            "edge-betweenness",
            "--min-accounts",
            "2",
        ])
        .unwrap();
        let config = AnalysisConfig::from(&args);
        assert_eq!(config.algorithm, ClusterAlgorithm::EdgeBetweenness);
        assert_eq!(config.created_after, NaiveDate::from_ymd_opt(2021, 8, 1));
        assert_eq!(config.min_accounts, 2);
    }

    #[test]
    fn needs_an_input_or_synthetic() {
        assert!(Args::try_parse_from(["bot-communities"]).is_err());
    }
}
