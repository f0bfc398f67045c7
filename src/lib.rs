//! Clusters social-media accounts that look coordinated: accounts sharing an
//! unusually crowded creation date, linked to their lexically nearest
//! handles and partitioned by community detection.

pub mod aggregate;
pub mod cluster;
pub mod config;
pub mod distance;
pub mod error;
pub mod neighbors;
pub mod pipeline;
pub mod records;
pub mod render;

pub use cluster::{ClusterAlgorithm, ClusterAssignment};
pub use config::{AnalysisConfig, Args};
pub use error::{Error, Result};
pub use neighbors::{DistanceEdge, NearestNeighborGraph};
pub use pipeline::{Pipeline, Report};
pub use records::{CsvSource, RecordSource, SyntheticSource, TweetRecord};
