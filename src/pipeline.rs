//! The analysis as a chain of pure stages.

use crate::aggregate::{
    self, AccountDate, CreationDateGroup, Quantile, count_by_date, count_quantiles,
    filter_by_date_range, filter_by_min_count, filter_by_text, group_by_date,
};
use crate::cluster::{ClusterAssignment, cluster};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::neighbors::NearestNeighborGraph;
use crate::records::TweetRecord;
use crate::render::{GraphSink, GraphTables, TableRow, write_csv};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// Every intermediate table of one run.
#[derive(Debug, Clone)]
pub struct Report {
    pub pairs: Vec<AccountDate>,
    pub date_counts: BTreeMap<NaiveDate, usize>,
    pub quantiles: Vec<Quantile>,
    pub coincident: Vec<AccountDate>,
    pub date_groups: Vec<CreationDateGroup>,
    pub neighbors: NearestNeighborGraph,
    pub assignment: ClusterAssignment,
}

#[derive(Debug, Serialize)]
struct DateCountRow {
    date: NaiveDate,
    accounts: usize,
}

impl TableRow for DateCountRow {
    const HEADER: &'static [&'static str] = &["date", "accounts"];
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    pub fn neighbor_tables(&self) -> GraphTables {
        GraphTables::neighbors(&self.neighbors, Some(&self.assignment))
    }

    pub fn date_tables(&self) -> GraphTables {
        GraphTables::creation_dates(&self.date_groups, Some(&self.assignment))
    }

    /// Writes date counts, neighbor edges and cluster assignments as CSV.
    pub fn write_tables(&self, dir: &Path) -> Result<()> {
        let counts: Vec<DateCountRow> = self
            .date_counts
            .iter()
            .map(|(&date, &accounts)| DateCountRow { date, accounts })
            .collect();
        write_csv(&dir.join("date_counts.csv"), &counts)?;
        write_csv(&dir.join("quantiles.csv"), &self.quantiles)?;
        write_csv(&dir.join("coincident_accounts.csv"), &self.coincident)?;
        write_csv(&dir.join("neighbor_edges.csv"), self.neighbors.edges())?;
        write_csv(&dir.join("clusters.csv"), &self.assignment.rows())
    }

    /// Sends both graphs to `sink`, skipping them when there is nothing to draw.
    pub fn render(&self, sink: &dyn GraphSink) -> Result<()> {
        if self.is_empty() {
            warn!("no accounts survived filtering, skipping render");
            return Ok(());
        }
        sink.emit("neighbors", &self.neighbor_tables())?;
        sink.emit("creation_dates", &self.date_tables())
    }
}

pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        Pipeline { config }
    }

    pub fn run(&self, records: &[TweetRecord]) -> Report {
        let selected;
        let records = match &self.config.message {
            Some(needle) => {
                selected = filter_by_text(records, needle);
                info!(kept = selected.len(), total = records.len(), "filtered by message");
                &selected[..]
            }
            None => records,
        };

        let pairs = filter_by_date_range(
            &aggregate::aggregate(records),
            self.config.created_after,
            self.config.created_before,
        );
        let date_counts = count_by_date(&pairs);
        let quantiles = count_quantiles(&date_counts);
        let coincident = filter_by_min_count(&pairs, &date_counts, self.config.min_accounts);
        let date_groups = group_by_date(&coincident);
        info!(
            accounts = pairs.len(),
            dates = date_counts.len(),
            coincident = coincident.len(),
            shared_dates = date_groups.len(),
            "aggregated creation dates"
        );

        let mut neighbors = NearestNeighborGraph::build(aggregate::handles(&coincident));
        if self.config.dedup_edges {
            neighbors = neighbors.deduplicated();
        }
        info!(
            handles = neighbors.nodes().len(),
            edges = neighbors.edges().len(),
            "built nearest-neighbor graph"
        );
        let assignment = cluster(&neighbors, self.config.algorithm);

        Report {
            pairs,
            date_counts,
            quantiles,
            coincident,
            date_groups,
            neighbors,
            assignment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterAlgorithm;
    use crate::records::parse_timestamp;

    fn table() -> Vec<TweetRecord> {
        let mut records = vec![
            TweetRecord::new("organic_one", parse_timestamp("2020-01-05").unwrap()),
            TweetRecord::new("organic_two", parse_timestamp("2021-08-01").unwrap()),
        ];
        for i in 0..5 {
            records.push(
                TweetRecord::new(format!("newsbot{i}"), parse_timestamp("2021-08-02 04:00:00").unwrap())
                    .with_text("Share this now"),
            );
        }
        records
    }

    #[test]
    fn keeps_only_crowded_dates() {
        let report = Pipeline::new(AnalysisConfig::default()).run(&table());
        assert_eq!(report.pairs.len(), 7);
        assert_eq!(report.coincident.len(), 5);
        assert_eq!(report.date_groups.len(), 1);
        assert_eq!(report.neighbors.nodes().len(), 5);
        assert_eq!(report.assignment.len(), 5);
    }

    #[test]
    fn duplicated_edges_follow_config() {
        let raw = Pipeline::new(AnalysisConfig::default()).run(&table());
        let dedup = Pipeline::new(AnalysisConfig {
            dedup_edges: true,
            ..AnalysisConfig::default()
        })
        .run(&table());
        assert!(dedup.neighbors.edges().len() < raw.neighbors.edges().len());
        assert_eq!(dedup.neighbors.edges(), &raw.neighbors.unique_edges()[..]);
    }

    #[test]
    fn message_and_date_filters_apply_before_counting() {
        let config = AnalysisConfig {
            message: Some("share THIS".to_string()),
            min_accounts: 0,
            created_before: Some(NaiveDate::from_ymd_opt(2021, 8, 1).unwrap()),
            algorithm: ClusterAlgorithm::EdgeBetweenness,
            ..AnalysisConfig::default()
        };
        let report = Pipeline::new(config).run(&table());
        assert!(report.pairs.is_empty());
        assert!(report.is_empty());
    }

    #[test]
    fn empty_input_flows_through() {
        let report = Pipeline::new(AnalysisConfig::default()).run(&[]);
        assert!(report.pairs.is_empty());
        assert!(report.date_counts.is_empty());
        assert!(report.neighbors.edges().is_empty());
        assert!(report.assignment.is_empty());
        assert!(report.neighbor_tables().is_empty());
    }
}
