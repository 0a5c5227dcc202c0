//! Tree skeleton text format.
//!
//! One tab-delimited line per node, in pre-order, root first:
//!
//! ```text
//! id  parent  Terminal     depth  class;count,class;count,...
//! id  parent  NonTerminal  depth  splitValue  featureName  class;count,...
//! ```
//!
//! The root has id 1 and parent 0. A node is the left child of its parent
//! unless the parent already has a left child. Floats use Rust's shortest
//! round-trip formatting, so a reloaded tree predicts bit-for-bit the same.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;

use jyrest_data::Schema;
use tracing::{debug, instrument};

use crate::error::ForestError;
use crate::node::{FeatureIndex, Node};
use crate::tree::DecisionTree;

const TERMINAL: &str = "Terminal";
const NON_TERMINAL: &str = "NonTerminal";
const RESERVED: [char; 5] = ['\t', '\n', '\r', ';', ','];

fn check_name(name: &str) -> Result<(), ForestError> {
    if name.is_empty() || name.contains(RESERVED) {
        return Err(ForestError::UnencodableName {
            name: name.to_string(),
        });
    }
    Ok(())
}

fn write_counts(out: &mut String, schema: &Schema, class_weights: &[f64]) {
    for (c, w) in class_weights.iter().enumerate() {
        if c > 0 {
            out.push(',');
        }
        // Writing to a String cannot fail.
        let _ = write!(out, "{};{w}", schema.class_name(c));
    }
}

/// Render `tree` as a skeleton.
///
/// # Errors
///
/// Returns [`ForestError::UnencodableName`] when a feature or class name is
/// empty or contains a tab, newline, `;` or `,`.
pub fn write_tree(tree: &DecisionTree) -> Result<String, ForestError> {
    let schema = tree.schema();
    for name in schema.class_names() {
        check_name(name)?;
    }

    let mut out = String::new();
    let mut next_id = 1usize;
    let mut stack: Vec<(&Node, usize)> = vec![(tree.root(), 0)];
    while let Some((node, parent)) = stack.pop() {
        let id = next_id;
        next_id += 1;
        match node {
            Node::Leaf {
                class_weights,
                depth,
            } => {
                let _ = write!(out, "{id}\t{parent}\t{TERMINAL}\t{depth}\t");
                write_counts(&mut out, schema, class_weights);
            }
            Node::Internal {
                feature,
                threshold,
                depth,
                class_weights,
                left,
                right,
            } => {
                let name = &schema.feature_names()[feature.index()];
                check_name(name)?;
                let _ = write!(
                    out,
                    "{id}\t{parent}\t{NON_TERMINAL}\t{depth}\t{threshold}\t{name}\t"
                );
                write_counts(&mut out, schema, class_weights);
                stack.push((right, id));
                stack.push((left, id));
            }
        }
        out.push('\n');
    }
    Ok(out)
}

/// One parsed skeleton line.
struct Record {
    id: usize,
    line: usize,
    kind: RecordKind,
    depth: usize,
    class_weights: Vec<f64>,
}

enum RecordKind {
    Terminal,
    NonTerminal {
        feature: FeatureIndex,
        threshold: f64,
        left: Option<usize>,
        right: Option<usize>,
    },
}

fn skeleton_error(line: usize, reason: impl Into<String>) -> ForestError {
    ForestError::Skeleton {
        line,
        reason: reason.into(),
    }
}

fn parse_field<T: std::str::FromStr>(field: &str, what: &str, line: usize) -> Result<T, ForestError> {
    field
        .parse()
        .map_err(|_| skeleton_error(line, format!("invalid {what} \"{field}\"")))
}

fn parse_counts(field: &str, schema: &Schema, line: usize) -> Result<Vec<f64>, ForestError> {
    let mut class_weights = vec![0.0; schema.n_classes()];
    for entry in field.split(',').filter(|e| !e.is_empty()) {
        let (class, count) = entry
            .split_once(';')
            .ok_or_else(|| skeleton_error(line, format!("malformed class count \"{entry}\"")))?;
        let c = schema
            .class_index(class)
            .ok_or_else(|| skeleton_error(line, format!("unknown class \"{class}\"")))?;
        let count: f64 = parse_field(count, "class count", line)?;
        if !count.is_finite() || count < 0.0 {
            return Err(skeleton_error(line, format!("invalid class count {count}")));
        }
        class_weights[c] = count;
    }
    Ok(class_weights)
}

/// Rebuild a tree from a skeleton, resolving names against `schema`.
///
/// # Errors
///
/// Returns [`ForestError::Skeleton`] for malformed lines, unknown feature or
/// class names, children listed before their parent, a node with more than
/// two children, or a split missing a child.
pub fn read_tree(text: &str, schema: Arc<Schema>, seed: u64) -> Result<DecisionTree, ForestError> {
    let mut records: Vec<Record> = Vec::new();
    let mut position: BTreeMap<usize, usize> = BTreeMap::new();

    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let raw = raw.trim_end_matches('\r');
        if raw.is_empty() {
            continue;
        }
        let fields: Vec<&str> = raw.split('\t').collect();
        if fields.len() < 5 {
            return Err(skeleton_error(line, "expected at least 5 tab-separated fields"));
        }
        let id: usize = parse_field(fields[0], "node id", line)?;
        let parent: usize = parse_field(fields[1], "parent id", line)?;
        let depth: usize = parse_field(fields[3], "depth", line)?;

        let (kind, counts) = match (fields[2], fields.len()) {
            (TERMINAL, 5) => (RecordKind::Terminal, fields[4]),
            (NON_TERMINAL, 7) => {
                let threshold: f64 = parse_field(fields[4], "split value", line)?;
                let feature = schema.feature_index(fields[5]).ok_or_else(|| {
                    skeleton_error(line, format!("unknown feature \"{}\"", fields[5]))
                })?;
                (
                    RecordKind::NonTerminal {
                        feature: FeatureIndex::new(feature),
                        threshold,
                        left: None,
                        right: None,
                    },
                    fields[6],
                )
            }
            (TERMINAL | NON_TERMINAL, n) => {
                return Err(skeleton_error(line, format!("wrong field count {n} for {}", fields[2])));
            }
            (other, _) => return Err(skeleton_error(line, format!("unknown node type \"{other}\""))),
        };
        let class_weights = parse_counts(counts, &schema, line)?;

        if records.is_empty() {
            if parent != 0 {
                return Err(skeleton_error(line, "the first node must be the root (parent 0)"));
            }
        } else {
            let &p = position.get(&parent).ok_or_else(|| {
                skeleton_error(line, format!("parent {parent} not seen before node {id}"))
            })?;
            match &mut records[p].kind {
                RecordKind::NonTerminal { left, right, .. } => {
                    if left.is_none() {
                        *left = Some(id);
                    } else if right.is_none() {
                        *right = Some(id);
                    } else {
                        return Err(skeleton_error(line, format!("node {parent} already has two children")));
                    }
                }
                RecordKind::Terminal => {
                    return Err(skeleton_error(line, format!("terminal node {parent} cannot have children")));
                }
            }
        }
        if position.insert(id, records.len()).is_some() {
            return Err(skeleton_error(line, format!("duplicate node id {id}")));
        }
        records.push(Record {
            id,
            line,
            kind,
            depth,
            class_weights,
        });
    }

    if records.is_empty() {
        return Err(skeleton_error(1, "empty skeleton"));
    }

    // Children always follow their parent, so assembling back to front sees them first.
    let mut built: BTreeMap<usize, Node> = BTreeMap::new();
    while let Some(record) = records.pop() {
        let node = match record.kind {
            RecordKind::Terminal => Node::Leaf {
                class_weights: record.class_weights,
                depth: record.depth,
            },
            RecordKind::NonTerminal {
                feature,
                threshold,
                left,
                right,
            } => {
                let (Some(left), Some(right)) = (left, right) else {
                    return Err(skeleton_error(
                        record.line,
                        format!("node {} is missing a child", record.id),
                    ));
                };
                let (Some(left), Some(right)) = (built.remove(&left), built.remove(&right)) else {
                    unreachable!("children are recorded after their parent");
                };
                Node::Internal {
                    feature,
                    threshold,
                    depth: record.depth,
                    class_weights: record.class_weights,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
        };
        built.insert(record.id, node);
    }

    let Some((_, root)) = built.pop_first() else {
        unreachable!("a non-empty skeleton yields a root");
    };
    Ok(DecisionTree::from_root(root, schema, seed))
}

/// Write `tree` to `path`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ForestError::UnencodableName`] | see [`write_tree`] |
/// | [`ForestError::WriteFile`] | file write failed |
#[instrument(skip(tree), fields(path = %path.display()))]
pub fn save_tree(tree: &DecisionTree, path: &Path) -> Result<(), ForestError> {
    let text = write_tree(tree)?;
    std::fs::write(path, text).map_err(|source| ForestError::WriteFile {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(n_nodes = tree.n_nodes(), "tree saved");
    Ok(())
}

/// Read a tree from `path`.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ForestError::ReadFile`] | file read failed |
/// | [`ForestError::SkeletonFile`] | see [`read_tree`] |
#[instrument(skip(schema), fields(path = %path.display()))]
pub fn load_tree(path: &Path, schema: Arc<Schema>, seed: u64) -> Result<DecisionTree, ForestError> {
    let text = std::fs::read_to_string(path).map_err(|source| ForestError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    let tree = read_tree(&text, schema, seed).map_err(|e| match e {
        ForestError::Skeleton { line, reason } => ForestError::SkeletonFile {
            path: path.to_path_buf(),
            line,
            reason,
        },
        other => other,
    })?;
    debug!(n_nodes = tree.n_nodes(), "tree loaded");
    Ok(tree)
}
