//! Tree building for the nested backend
//!
//! The payload is already a tree, so building is a direct mapping. Page
//! counts are taken from the backend as-is rather than recomputed.

use serde::{Deserialize, Serialize};

use super::StructureSource;
use crate::error::MirrorResult;
use crate::models::{NestedSourceNode, NodeKind, TreeNode};

/// Snapshot of the nested backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NestedStructure {
    pub nodes: Vec<NestedSourceNode>,
}

impl NestedStructure {
    pub fn new(nodes: Vec<NestedSourceNode>) -> Self {
        Self { nodes }
    }
}

impl StructureSource for NestedStructure {
    fn build(&self) -> MirrorResult<Vec<TreeNode>> {
        Ok(map_forest(&self.nodes))
    }
}

/// Source node being mapped, with the children converted so far
struct Frame<'a> {
    source: &'a NestedSourceNode,
    next: usize,
    children: Vec<TreeNode>,
}

impl<'a> Frame<'a> {
    fn new(source: &'a NestedSourceNode) -> Self {
        Self {
            source,
            next: 0,
            children: Vec::with_capacity(source.children.len()),
        }
    }

    fn finish(self) -> TreeNode {
        let source = self.source;
        let kind = if source.node_type.is_container() {
            NodeKind::Folder
        } else {
            NodeKind::Note
        };

        TreeNode {
            id: source.id.clone(),
            name: source.name.clone(),
            kind,
            children: self.children,
            note_count: source.page_count,
            metadata: source.metadata.clone(),
        }
    }
}

/// Map each root with a post-order walk over a heap stack
fn map_forest(roots: &[NestedSourceNode]) -> Vec<TreeNode> {
    let mut out = Vec::with_capacity(roots.len());

    for root in roots {
        let mut stack = vec![Frame::new(root)];
        while let Some(top) = stack.last_mut() {
            let source = top.source;
            if let Some(child) = source.children.get(top.next) {
                top.next += 1;
                stack.push(Frame::new(child));
            } else if let Some(done) = stack.pop() {
                let node = done.finish();
                match stack.last_mut() {
                    Some(parent) => parent.children.push(node),
                    None => out.push(node),
                }
            }
        }
    }

    out
}
