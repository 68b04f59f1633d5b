//! Tree building for the flat backend
//!
//! Folders and notes arrive as two parallel lists linked by `parent_id`.
//! The builder indexes both lists by parent once, then walks down from the
//! root. Records whose parent does not exist are never reached and so are
//! left out of the tree.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::json;

use super::StructureSource;
use crate::error::{MirrorError, MirrorResult};
use crate::models::{FlatFolder, FlatNote, NodeKind, TreeNode};

/// Snapshot of the flat backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlatStructure {
    #[serde(default)]
    pub folders: Vec<FlatFolder>,
    #[serde(default)]
    pub notes: Vec<FlatNote>,
}

impl FlatStructure {
    pub fn new(folders: Vec<FlatFolder>, notes: Vec<FlatNote>) -> Self {
        Self { folders, notes }
    }
}

impl StructureSource for FlatStructure {
    fn build(&self) -> MirrorResult<Vec<TreeNode>> {
        FlatBuilder::new(self).build()
    }
}

/// Parent key used for root-level records
const ROOT: &str = "";

fn parent_key(parent_id: &Option<String>) -> &str {
    parent_id.as_deref().unwrap_or(ROOT)
}

/// Index over a `FlatStructure` borrowed for the duration of one build
struct FlatBuilder<'a> {
    source: &'a FlatStructure,
    /// parent id -> positions in `source.folders`, in source order
    folders_by_parent: HashMap<&'a str, Vec<usize>>,
    /// parent id -> positions in `source.notes`, in source order
    notes_by_parent: HashMap<&'a str, Vec<usize>>,
}

impl<'a> FlatBuilder<'a> {
    fn new(source: &'a FlatStructure) -> Self {
        let mut folders_by_parent: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, folder) in source.folders.iter().enumerate() {
            folders_by_parent
                .entry(parent_key(&folder.parent_id))
                .or_default()
                .push(idx);
        }

        let mut notes_by_parent: HashMap<&str, Vec<usize>> = HashMap::new();
        for (idx, note) in source.notes.iter().enumerate() {
            notes_by_parent
                .entry(parent_key(&note.parent_id))
                .or_default()
                .push(idx);
        }

        Self {
            source,
            folders_by_parent,
            notes_by_parent,
        }
    }

    fn build(&self) -> MirrorResult<Vec<TreeNode>> {
        self.check_parent_chains()?;
        self.descend()
    }

    /// Walk every folder's parent chain looking for a loop.
    ///
    /// Cycles that never connect to the root are invisible to the top-down
    /// walk, so they have to be found here.
    fn check_parent_chains(&self) -> MirrorResult<()> {
        let parent_of: HashMap<&str, &str> = self
            .source
            .folders
            .iter()
            .map(|f| (f.id.as_str(), parent_key(&f.parent_id)))
            .collect();

        let mut cleared: HashSet<&str> = HashSet::new();

        for folder in &self.source.folders {
            let mut chain: Vec<&str> = Vec::new();
            let mut seen: HashSet<&str> = HashSet::new();
            let mut current = folder.id.as_str();

            loop {
                if current == ROOT || cleared.contains(current) {
                    break;
                }
                if !seen.insert(current) {
                    chain.push(current);
                    return Err(MirrorError::StructuralCycle {
                        id: current.to_string(),
                        path: chain.iter().map(|s| s.to_string()).collect(),
                    });
                }
                chain.push(current);
                match parent_of.get(current) {
                    Some(&parent) => current = parent,
                    // orphan chain, ends at a missing folder
                    None => break,
                }
            }

            cleared.extend(chain);
        }

        Ok(())
    }

    /// Post-order walk from the root over an explicit stack of frames.
    ///
    /// The stack doubles as the ancestor path; `on_path` holds the same ids
    /// for constant-time cycle checks. A frame is closed once all of its
    /// child folders are, at which point its notes are appended and its
    /// count is folded into the parent.
    fn descend(&self) -> MirrorResult<Vec<TreeNode>> {
        let source = self.source;
        let mut stack = vec![Frame::new(None, ROOT)];
        let mut on_path: HashSet<&'a str> = HashSet::new();

        while let Some(top) = stack.last_mut() {
            let siblings = self
                .folders_by_parent
                .get(top.key)
                .map(Vec::as_slice)
                .unwrap_or_default();

            if let Some(&idx) = siblings.get(top.next) {
                top.next += 1;
                let id = source.folders[idx].id.as_str();
                if id == ROOT {
                    continue;
                }
                if on_path.contains(id) {
                    let mut path: Vec<String> =
                        stack.iter().skip(1).map(|f| f.key.to_string()).collect();
                    path.push(id.to_string());
                    return Err(MirrorError::StructuralCycle {
                        id: id.to_string(),
                        path,
                    });
                }
                on_path.insert(id);
                stack.push(Frame::new(Some(idx), id));
                continue;
            }

            let Some(mut done) = stack.pop() else {
                break;
            };
            self.push_notes(&mut done);

            let Some(idx) = done.folder else {
                return Ok(done.children);
            };
            let folder = &source.folders[idx];
            on_path.remove(folder.id.as_str());
            let node = TreeNode {
                id: folder.id.clone(),
                name: folder.title.clone(),
                kind: NodeKind::Folder,
                children: done.children,
                note_count: done.note_count,
                metadata: serde_json::Value::Null,
            };
            if let Some(parent) = stack.last_mut() {
                parent.note_count = parent.note_count.saturating_add(node.note_count);
                parent.children.push(node);
            }
        }

        Ok(Vec::new())
    }

    fn push_notes(&self, frame: &mut Frame<'a>) {
        let source = self.source;
        for &idx in self.notes_by_parent.get(frame.key).into_iter().flatten() {
            let note = &source.notes[idx];
            frame.note_count = frame.note_count.saturating_add(1);
            frame.children.push(TreeNode {
                id: note.id.clone(),
                name: note.title.clone(),
                kind: NodeKind::Note,
                children: Vec::new(),
                note_count: 0,
                metadata: json!({ "updated_time": note.updated_time }),
            });
        }
    }
}

/// One open folder during the descent
struct Frame<'a> {
    /// Position in `source.folders`; `None` for the root
    folder: Option<usize>,
    key: &'a str,
    /// Next child folder to visit
    next: usize,
    children: Vec<TreeNode>,
    note_count: u32,
}

impl<'a> Frame<'a> {
    fn new(folder: Option<usize>, key: &'a str) -> Self {
        Self {
            folder,
            key,
            next: 0,
            children: Vec::new(),
            note_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder(id: &str, parent: Option<&str>) -> FlatFolder {
        FlatFolder::new(id, parent, format!("Folder {}", id))
    }

    fn note(id: &str, parent: Option<&str>) -> FlatNote {
        FlatNote::new(id, parent, format!("Note {}", id))
    }

    fn ids(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    /// Recompute the count from the built tree and compare with the stored one
    fn assert_counts_consistent(nodes: &[TreeNode]) {
        for node in nodes.iter().filter(|n| n.is_folder()) {
            let direct = node.children.iter().filter(|c| !c.is_folder()).count() as u32;
            let nested: u32 = node
                .children
                .iter()
                .filter(|c| c.is_folder())
                .map(|c| c.note_count)
                .sum();
            assert_eq!(node.note_count, direct + nested, "folder {}", node.id);
            assert_counts_consistent(&node.children);
        }
    }

    #[test]
    fn test_single_folder_with_note() {
        let source: FlatStructure = serde_json::from_value(serde_json::json!({
            "folders": [{"id": 1, "parent_id": null, "title": "A"}],
            "notes": [{"id": 10, "parent_id": 1, "title": "N1"}]
        }))
        .unwrap();

        let tree = source.build().unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].id, "1");
        assert_eq!(tree[0].name, "A");
        assert_eq!(tree[0].kind, NodeKind::Folder);
        assert_eq!(tree[0].note_count, 1);
        assert_eq!(tree[0].children.len(), 1);
        assert_eq!(tree[0].children[0].id, "10");
        assert_eq!(tree[0].children[0].kind, NodeKind::Note);
    }

    #[test]
    fn test_folders_before_notes_in_source_order() {
        let source = FlatStructure::new(
            vec![folder("b", None), folder("a", None)],
            vec![note("n2", None), note("n1", None)],
        );

        let tree = source.build().unwrap();
        assert_eq!(ids(&tree), vec!["b", "a", "n2", "n1"]);
    }

    #[test]
    fn test_note_count_is_recursive() {
        let source = FlatStructure::new(
            vec![
                folder("root", None),
                folder("child", Some("root")),
                folder("grandchild", Some("child")),
                folder("empty", Some("root")),
            ],
            vec![
                note("n1", Some("root")),
                note("n2", Some("child")),
                note("n3", Some("grandchild")),
                note("n4", Some("grandchild")),
            ],
        );

        let tree = source.build().unwrap();
        assert_eq!(tree[0].note_count, 4);
        let child = tree[0].find("child").unwrap();
        assert_eq!(child.note_count, 3);
        assert_eq!(tree[0].find("empty").unwrap().note_count, 0);
        assert_counts_consistent(&tree);
    }

    #[test]
    fn test_empty_string_parent_is_root() {
        let source = FlatStructure::new(vec![folder("a", Some(""))], vec![note("n", Some(""))]);

        let tree = source.build().unwrap();
        assert_eq!(ids(&tree), vec!["a", "n"]);
    }

    #[test]
    fn test_orphans_are_omitted() {
        let source = FlatStructure::new(
            vec![
                folder("a", None),
                folder("lost", Some("missing")),
                folder("under_lost", Some("lost")),
            ],
            vec![
                note("kept", Some("a")),
                note("orphan", Some("missing")),
                note("deep_orphan", Some("under_lost")),
            ],
        );

        let tree = source.build().unwrap();
        assert_eq!(ids(&tree), vec!["a"]);
        for id in ["lost", "under_lost", "orphan", "deep_orphan"] {
            assert!(tree.iter().all(|n| n.find(id).is_none()), "{} leaked", id);
        }
        assert_eq!(tree[0].note_count, 1);
    }

    #[test]
    fn test_two_folder_cycle_is_an_error() {
        let source = FlatStructure::new(
            vec![folder("A", Some("B")), folder("B", Some("A"))],
            vec![],
        );

        let err = source.build().unwrap_err();
        assert!(matches!(err, MirrorError::StructuralCycle { .. }));
    }

    #[test]
    fn test_self_parent_is_an_error() {
        let source = FlatStructure::new(vec![folder("A", Some("A"))], vec![]);

        assert!(matches!(
            source.build(),
            Err(MirrorError::StructuralCycle { ref id, .. }) if id == "A"
        ));
    }

    #[test]
    fn test_cycle_below_valid_root_is_an_error() {
        let source = FlatStructure::new(
            vec![
                folder("top", None),
                folder("x", Some("y")),
                folder("y", Some("x")),
            ],
            vec![note("n", Some("top"))],
        );

        assert!(matches!(
            source.build(),
            Err(MirrorError::StructuralCycle { .. })
        ));
    }

    #[test]
    fn test_build_is_idempotent_and_read_only() {
        let source = FlatStructure::new(
            vec![folder("a", None), folder("b", Some("a"))],
            vec![note("n1", Some("b")), note("n2", None)],
        );
        let before = source.clone();

        let first = source.build().unwrap();
        let second = source.build().unwrap();

        assert_eq!(first, second);
        assert_eq!(source, before);
    }

    #[test]
    fn test_deep_chain() {
        let mut folders = vec![folder("f0", None)];
        for i in 1..200 {
            folders.push(folder(&format!("f{}", i), Some(&format!("f{}", i - 1))));
        }
        let source = FlatStructure::new(folders, vec![note("leaf", Some("f199"))]);

        let tree = source.build().unwrap();
        assert_eq!(tree[0].note_count, 1);
        assert_eq!(tree[0].subtree_len(), 201);
        assert_counts_consistent(&tree);
    }

    #[test]
    fn test_hundred_thousand_levels_do_not_exhaust_the_stack() {
        const DEPTH: usize = 100_000;
        // Listed deepest first so the parent-chain pre-pass walks the full chain
        let mut folders: Vec<FlatFolder> = (1..DEPTH)
            .rev()
            .map(|i| folder(&format!("f{}", i), Some(&format!("f{}", i - 1))))
            .collect();
        folders.push(folder("f0", None));
        let last = format!("f{}", DEPTH - 1);
        let source = FlatStructure::new(folders, vec![note("leaf", Some(&last))]);

        let tree = source.build().unwrap();

        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].subtree_len(), DEPTH + 1);
        let mut node = &tree[0];
        let mut depth = 0;
        while node.is_folder() {
            assert_eq!(node.note_count, 1, "folder {}", node.id);
            assert_eq!(node.children.len(), 1);
            node = &node.children[0];
            depth += 1;
        }
        assert_eq!(depth, DEPTH);
        assert_eq!(node.id, "leaf");
        assert!(tree[0].find("leaf").is_some());
    }

    #[test]
    fn test_cycle_beside_deep_chain_is_an_error() {
        let mut folders = vec![folder("f0", None)];
        for i in 1..5_000 {
            folders.push(folder(&format!("f{}", i), Some(&format!("f{}", i - 1))));
        }
        // Loop hanging off the bottom of the chain
        folders.push(folder("x", Some("y")));
        folders.push(folder("y", Some("x")));
        let source = FlatStructure::new(folders, vec![]);

        assert!(matches!(
            source.build(),
            Err(MirrorError::StructuralCycle { .. })
        ));
    }

    #[test]
    fn test_note_metadata_carries_updated_time() {
        let mut n = note("n", None);
        n.updated_time = 1_700_000_000_000;
        let source = FlatStructure::new(vec![], vec![n]);

        let tree = source.build().unwrap();
        assert_eq!(tree[0].metadata["updated_time"], 1_700_000_000_000i64);
    }
}
