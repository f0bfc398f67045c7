//! Node/edge tables and the sinks that draw or dump them.

use crate::aggregate::{AccountDate, CreationDateGroup, Quantile};
use crate::cluster::{ClusterAssignment, ClusterRow};
use crate::error::{Error, Result};
use crate::neighbors::{DistanceEdge, NearestNeighborGraph};
use petgraph::dot::{Config, Dot};
use petgraph::graph::DiGraph;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

const PALETTE: [&str; 10] = [
    "#1f77b4", "#ff7f0e", "#2ca02c", "#d62728", "#9467bd", "#8c564b", "#e377c2", "#7f7f7f",
    "#bcbd22", "#17becf",
];
const DATE_COLOR: &str = "#d3d3d3";

pub fn group_color(group: usize) -> &'static str {
    PALETTE[group % PALETTE.len()]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRow {
    pub id: String,
    pub label: Option<String>,
    pub shape: Option<String>,
    pub color: Option<String>,
    pub group: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeRow {
    pub from: String,
    pub to: String,
    pub weight: Option<u32>,
}

/// A row type written by [`write_csv`]. `HEADER` lists the serialized
/// field names in declaration order.
pub trait TableRow: Serialize {
    const HEADER: &'static [&'static str];
}

impl TableRow for NodeRow {
    const HEADER: &'static [&'static str] = &["id", "label", "shape", "color", "group"];
}

impl TableRow for EdgeRow {
    const HEADER: &'static [&'static str] = &["from", "to", "weight"];
}

impl TableRow for AccountDate {
    const HEADER: &'static [&'static str] = &["creation_date", "handle"];
}

impl TableRow for Quantile {
    const HEADER: &'static [&'static str] = &["percent", "value"];
}

impl TableRow for DistanceEdge {
    const HEADER: &'static [&'static str] = &["from", "to", "distance"];
}

impl TableRow for ClusterRow {
    const HEADER: &'static [&'static str] = &["handle", "group"];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphTables {
    pub nodes: Vec<NodeRow>,
    pub edges: Vec<EdgeRow>,
}

fn account_row(handle: &str, assignment: Option<&ClusterAssignment>) -> NodeRow {
    let group = assignment.and_then(|a| a.group_of(handle));
    NodeRow {
        id: handle.to_string(),
        label: Some(handle.to_string()),
        shape: Some("dot".to_string()),
        color: group.map(|g| group_color(g).to_string()),
        group,
    }
}

impl GraphTables {
    /// Handles colored by cluster, edges weighted by edit distance.
    pub fn neighbors(graph: &NearestNeighborGraph, assignment: Option<&ClusterAssignment>) -> Self {
        GraphTables {
            nodes: graph
                .nodes()
                .iter()
                .map(|h| account_row(h, assignment))
                .collect(),
            edges: graph
                .edges()
                .iter()
                .map(|e| EdgeRow {
                    from: e.from.clone(),
                    to: e.to.clone(),
                    weight: Some(e.distance),
                })
                .collect(),
        }
    }

    /// Creation dates as boxes linked to the accounts created on them.
    pub fn creation_dates(
        groups: &[CreationDateGroup],
        assignment: Option<&ClusterAssignment>,
    ) -> Self {
        let mut tables = GraphTables::default();
        let mut seen = HashSet::new();
        for group in groups {
            let date_id = format!("date:{}", group.date);
            tables.nodes.push(NodeRow {
                id: date_id.clone(),
                label: Some(group.date.to_string()),
                shape: Some("box".to_string()),
                color: Some(DATE_COLOR.to_string()),
                group: None,
            });
            for handle in &group.handles {
                if seen.insert(handle.as_str()) {
                    tables.nodes.push(account_row(handle, assignment));
                }
                tables.edges.push(EdgeRow {
                    from: handle.clone(),
                    to: date_id.clone(),
                    weight: None,
                });
            }
        }
        tables
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Graphviz source for the tables.
    pub fn to_dot(&self) -> String {
        let mut graph: DiGraph<NodeRow, EdgeRow> = DiGraph::new();
        let mut node_indices = HashMap::new();
        for node in &self.nodes {
            node_indices
                .entry(node.id.clone())
                .or_insert_with(|| graph.add_node(node.clone()));
        }
        for edge in &self.edges {
            if let (Some(&a), Some(&b)) = (node_indices.get(&edge.from), node_indices.get(&edge.to)) {
                graph.add_edge(a, b, edge.clone());
            }
        }

        format!(
            "{:?}",
            Dot::with_attr_getters(
                &graph,
                &[Config::EdgeNoLabel, Config::NodeNoLabel],
                &|_, edge| match edge.weight().weight {
                    Some(w) => format!("label=\"{}\"", w),
                    None => String::new(),
                },
                &|_, (_, node)| {
                    let label = node.label.as_deref().unwrap_or(&node.id);
                    let shape = match node.shape.as_deref() {
                        Some("box") => "box",
                        _ => "ellipse",
                    };
                    let color = node.color.as_deref().unwrap_or("#ffffff");
                    format!(
                        "label=\"{}\", shape={}, style=filled, fillcolor=\"{}\"",
                        escape(label),
                        shape,
                        color
                    )
                },
            )
        )
    }
}

fn escape(label: &str) -> String {
    label.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Destination for rendered graphs.
pub trait GraphSink {
    fn emit(&self, name: &str, tables: &GraphTables) -> Result<()>;
}

/// Writes `.dot` files, optionally rasterised through Graphviz.
#[derive(Debug, Clone)]
pub struct DotSink {
    pub out_dir: PathBuf,
    pub png: bool,
    pub open: bool,
}

impl GraphSink for DotSink {
    fn emit(&self, name: &str, tables: &GraphTables) -> Result<()> {
        if tables.is_empty() {
            warn!(name, "nothing to render");
            return Ok(());
        }
        fs::create_dir_all(&self.out_dir).map_err(|e| Error::io(&self.out_dir, e))?;
        let dot_file = self.out_dir.join(format!("{name}.dot"));
        fs::write(&dot_file, tables.to_dot()).map_err(|e| Error::io(&dot_file, e))?;
        info!(path = %dot_file.display(), nodes = tables.nodes.len(), "wrote graph");

        if self.png {
            let image = dot_file.with_extension("png");
            render_png(&dot_file, &image)?;
            if self.open {
                open_file(&image)?;
            }
        }
        Ok(())
    }
}

/// Dumps the node and edge tables as CSV.
#[derive(Debug, Clone)]
pub struct CsvSink {
    pub out_dir: PathBuf,
}

impl GraphSink for CsvSink {
    fn emit(&self, name: &str, tables: &GraphTables) -> Result<()> {
        if tables.is_empty() {
            return Ok(());
        }
        write_csv(&self.out_dir.join(format!("{name}_nodes.csv")), &tables.nodes)?;
        write_csv(&self.out_dir.join(format!("{name}_edges.csv")), &tables.edges)
    }
}

/// Writes `rows` under `T::HEADER`. An empty slice still gets its header.
pub fn write_csv<T: TableRow>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(T::HEADER)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|e| Error::io(path, e))?;
    debug!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(())
}

pub fn render_png(dot_file: &Path, image: &Path) -> Result<()> {
    let status = Command::new("dot")
        .arg("-Tpng")
        .arg(dot_file)
        .arg("-o")
        .arg(image)
        .status()
        .map_err(|e| Error::Render(format!("cannot run graphviz `dot`: {e}")))?;
    if !status.success() {
        return Err(Error::Render(format!("`dot` exited with {status}")));
    }
    info!(path = %image.display(), "rendered graph");
    Ok(())
}

fn open_file(path: &Path) -> Result<()> {
    let opener = if cfg!(target_os = "windows") {
        "start"
    } else if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    Command::new(opener)
        .arg(path)
        .status()
        .map_err(|e| Error::Render(format!("cannot open {}: {e}", path.display())))?;
    Ok(())
}
