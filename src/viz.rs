//! Graphviz export of a computation graph.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use crate::engine::{Value, ValueId};
use crate::error::Error;

type NodeId = ValueId;
type Edge = (NodeId, NodeId);

/// Layout direction of the rendered graph.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RankDir {
    #[default]
    LeftRight,
    TopBottom,
}

impl RankDir {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankDir::LeftRight => "LR",
            RankDir::TopBottom => "TB",
        }
    }
}

impl FromStr for RankDir {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LR" => Ok(RankDir::LeftRight),
            "TB" => Ok(RankDir::TopBottom),
            other => Err(Error::InvalidRankDir(other.to_string())),
        }
    }
}

impl std::fmt::Display for RankDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nodes reachable from `root` (root first) and the deduplicated
/// `(operand, consumer)` edges between them.
pub fn trace(root: &Value) -> (Vec<Value>, Vec<Edge>) {
    let nodes = root.topological_order();
    let mut seen = HashSet::new();
    let mut edges = vec![];
    for node in &nodes {
        for child in node.op_args() {
            let edge = (child.id(), node.id());
            if seen.insert(edge) {
                edges.push(edge);
            }
        }
    }

    (nodes, edges)
}

pub fn render_dot(root: &Value, rankdir: RankDir) -> String {
    let (nodes, edges) = trace(root);

    let mut nodes_str = String::new();
    let mut edges_str = String::new();
    for node in &nodes {
        let id_str = format!("{:08}", node.id());
        let label = node.label().map(|l| escape_record(&l)).unwrap_or_default();
        nodes_str += &format!(
            "    \"{}\" [label=\"{{ {} | data {:.04} | grad {:.04} }}\" shape=record]\n",
            id_str,
            label,
            node.data(),
            node.grad(),
        );
        if let Some(op) = node.op() {
            nodes_str += &format!("    \"{}{}\" [label=\"{}\"]\n", id_str, op, op);
            edges_str += &format!("    \"{}{}\" -> \"{}\"\n", id_str, op, id_str);
        }
    }

    let ops = nodes
        .iter()
        .filter_map(|n| n.op().map(|op| (n.id(), op)))
        .collect::<HashMap<_, _>>();
    for (n1, n2) in edges {
        if let Some(op) = ops.get(&n2) {
            edges_str += &format!("    \"{:08}\" -> \"{:08}{}\"\n", n1, n2, op);
        }
    }

    format!(
        "strict digraph {{\n    graph [rankdir={}]\n\n{}{}}}\n",
        rankdir, nodes_str, edges_str
    )
}

fn escape_record(label: &str) -> String {
    label
        .chars()
        .flat_map(|c| match c {
            '"' | '{' | '}' | '|' | '<' | '>' | '\\' => vec!['\\', c],
            _ => vec![c],
        })
        .collect()
}
