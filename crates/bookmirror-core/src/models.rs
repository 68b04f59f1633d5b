//! Data models for bookmirror
//!
//! Three families of types live here:
//! - the unified tree contract (`TreeNode`) and the two backend payloads it is
//!   built from (`FlatFolder`/`FlatNote` and `NestedSourceNode`)
//! - remote sync jobs (`Job`), which the client only ever reads
//! - search queue entries (`QueueItem`) and their results

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Remote job identifier
pub type JobId = String;

// ─── Unified tree ──────────────────────────────────────────────────────────────

/// Kind of a node in the unified tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Note,
}

/// A node of the unified tree shared by both backends
///
/// Rebuilt from scratch on every structure reload; never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    /// Children in source order
    #[serde(default)]
    pub children: Vec<TreeNode>,
    /// Notes contained in this subtree (flat mode) or as reported by the
    /// backend (nested mode)
    #[serde(default)]
    pub note_count: u32,
    /// Backend-specific extras, passed through untouched
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub metadata: serde_json::Value,
}

impl TreeNode {
    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Pre-order walk over this subtree
    pub fn walk(&self) -> Walk<'_> {
        Walk::new(std::slice::from_ref(self))
    }

    /// Depth-first search for a node by id
    pub fn find(&self, id: &str) -> Option<&TreeNode> {
        self.walk().map(|(_, node)| node).find(|node| node.id == id)
    }

    /// Number of nodes in this subtree, including this one
    pub fn subtree_len(&self) -> usize {
        self.walk().count()
    }
}

// Hierarchies can be arbitrarily deep; unlink children onto a heap stack so
// dropping never recurses.
impl Drop for TreeNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

/// Pre-order iterator over a forest, yielding each node with its depth
pub struct Walk<'a> {
    stack: Vec<(usize, &'a TreeNode)>,
}

impl<'a> Walk<'a> {
    pub fn new(nodes: &'a [TreeNode]) -> Self {
        Self {
            stack: nodes.iter().rev().map(|node| (0, node)).collect(),
        }
    }
}

impl<'a> Iterator for Walk<'a> {
    type Item = (usize, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        let (depth, node) = self.stack.pop()?;
        self.stack
            .extend(node.children.iter().rev().map(|child| (depth + 1, child)));
        Some((depth, node))
    }
}

/// Counts of folders and notes across a forest
pub fn tree_totals(nodes: &[TreeNode]) -> (usize, usize) {
    Walk::new(nodes).fold((0, 0), |(folders, notes), (_, node)| {
        if node.is_folder() {
            (folders + 1, notes)
        } else {
            (folders, notes + 1)
        }
    })
}

// ─── Backend A: flat lists ─────────────────────────────────────────────────────

/// Folder record from the flat backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatFolder {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    /// Parent folder; `None` or empty string means root
    #[serde(default, deserialize_with = "de_opt_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
}

/// Note record from the flat backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatNote {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_opt_id")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub title: String,
    /// Unix timestamp in ms
    #[serde(default)]
    pub updated_time: i64,
}

impl FlatFolder {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            title: title.into(),
        }
    }
}

impl FlatNote {
    pub fn new(id: impl Into<String>, parent_id: Option<&str>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: parent_id.map(str::to_string),
            title: title.into(),
            updated_time: 0,
        }
    }
}

// ─── Backend B: nested tree ────────────────────────────────────────────────────

/// Type tag of a nested backend node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedType {
    Notebook,
    SectionGroup,
    Section,
    Page,
    /// Any tag we don't know about; treated as a leaf
    #[serde(other)]
    Other,
}

impl NestedType {
    /// Containers map to folders, everything else is a note
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NestedType::Notebook | NestedType::SectionGroup | NestedType::Section
        )
    }
}

/// Node from the nested backend, already hierarchical
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedSourceNode {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub node_type: NestedType,
    #[serde(default)]
    pub children: Vec<NestedSourceNode>,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl NestedSourceNode {
    pub fn new(id: impl Into<String>, name: impl Into<String>, node_type: NestedType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type,
            children: Vec::new(),
            page_count: 0,
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_children(mut self, children: Vec<NestedSourceNode>) -> Self {
        self.children = children;
        self
    }

    pub fn with_page_count(mut self, page_count: u32) -> Self {
        self.page_count = page_count;
        self
    }
}

impl Drop for NestedSourceNode {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut node) = pending.pop() {
            pending.append(&mut node.children);
        }
    }
}

// ─── Jobs ──────────────────────────────────────────────────────────────────────

/// Kind of remote operation a job performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Mirror the whole library
    FullSync,
    /// Mirror only books changed since the last sync
    IncrementalSync,
    /// Mirror a single book
    SyncBook,
    /// Remove mirrored notes whose book no longer exists
    CleanupOrphans,
    /// A job type reported by the server that this client does not know
    #[serde(other)]
    Other,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::FullSync,
        JobKind::IncrementalSync,
        JobKind::SyncBook,
        JobKind::CleanupOrphans,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::FullSync => "full_sync",
            JobKind::IncrementalSync => "incremental_sync",
            JobKind::SyncBook => "sync_book",
            JobKind::CleanupOrphans => "cleanup_orphans",
            JobKind::Other => "other",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        JobKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| {
                format!(
                    "Unknown job kind '{}'. Expected one of: {}",
                    s,
                    JobKind::ALL.map(JobKind::as_str).join(", ")
                )
            })
    }
}

/// Job status as reported by the remote system
///
/// `queued -> processing -> {completed, failed}`; no way out of a terminal
/// state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A long-running server-side operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(deserialize_with = "de_id")]
    pub id: JobId,
    #[serde(rename = "type")]
    pub kind: JobKind,
    pub status: JobStatus,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub completed_items: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    /// `None` when the server sent no timestamp or one we could not read
    #[serde(default, deserialize_with = "de_lenient_time")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "de_lenient_time")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Fraction of items done, 0.0 when the total is unknown
    pub fn progress(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        (self.completed_items as f64 / self.total_items as f64).min(1.0)
    }
}

// ─── Search queue ──────────────────────────────────────────────────────────────

/// A search request, as enqueued by the user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchRequest {
    /// Free-text search across mirrored notes
    KeywordSearch { query: String, page_count: u32 },
    /// Look for chapters of a book that were never mirrored
    MissingChaptersSearch {
        book_id: String,
        title: String,
        page_count: u32,
    },
}

impl SearchRequest {
    pub fn keyword(query: impl Into<String>, page_count: u32) -> Self {
        SearchRequest::KeywordSearch {
            query: query.into(),
            page_count,
        }
    }

    pub fn missing_chapters(
        book_id: impl Into<String>,
        title: impl Into<String>,
        page_count: u32,
    ) -> Self {
        SearchRequest::MissingChaptersSearch {
            book_id: book_id.into(),
            title: title.into(),
            page_count,
        }
    }

    pub fn kind(&self) -> QueueItemKind {
        match self {
            SearchRequest::KeywordSearch { .. } => QueueItemKind::KeywordSearch,
            SearchRequest::MissingChaptersSearch { .. } => QueueItemKind::MissingChaptersSearch,
        }
    }

    /// Query string sent to the search API
    pub fn query(&self) -> &str {
        match self {
            SearchRequest::KeywordSearch { query, .. } => query,
            SearchRequest::MissingChaptersSearch { title, .. } => title,
        }
    }

    pub fn page_count(&self) -> u32 {
        match self {
            SearchRequest::KeywordSearch { page_count, .. }
            | SearchRequest::MissingChaptersSearch { page_count, .. } => *page_count,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueItemKind {
    KeywordSearch,
    MissingChaptersSearch,
}

impl fmt::Display for QueueItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueItemKind::KeywordSearch => f.write_str("keyword"),
            QueueItemKind::MissingChaptersSearch => f.write_str("missing-chapters"),
        }
    }
}

/// Lifecycle of a queue item
///
/// `pending -> processing -> {completed, error}`; `error -> pending` only
/// through an explicit retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Error,
    Completed,
}

impl fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Error => "error",
            QueueStatus::Completed => "completed",
        };
        f.write_str(s)
    }
}

/// One entry of the search queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Monotonic within a queue
    pub id: u64,
    pub request: SearchRequest,
    pub status: QueueStatus,
    /// Kept after completion so results can be shown again without a new query
    #[serde(default)]
    pub results: Option<SearchResult>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(id: u64, request: SearchRequest) -> Self {
        Self {
            id,
            request,
            status: QueueStatus::Pending,
            results: None,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> QueueItemKind {
        self.request.kind()
    }
}

/// A single search match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub score: f32,
}

/// Results of one executed search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub query: String,
    #[serde(default)]
    pub hits: Vec<SearchHit>,
    /// Total matches on the server, which may exceed `hits.len()`
    #[serde(default)]
    pub total: u64,
}

// ─── Identifier decoding ───────────────────────────────────────────────────────

/// Backends send ids as strings or integers; we keep them as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Signed(n) => n.to_string(),
            RawId::Unsigned(n) => n.to_string(),
        }
    }
}

fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

// ─── Timestamp decoding ────────────────────────────────────────────────────────

/// Epoch values above this are taken to be milliseconds
const EPOCH_MILLIS_THRESHOLD: u64 = 100_000_000_000;

/// Job timestamps only inform the user, so anything unreadable becomes `None`
/// instead of failing the whole status check.
fn de_lenient_time<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| match value {
        serde_json::Value::String(text) => parse_time(&text),
        serde_json::Value::Number(n) => n.as_i64().and_then(from_epoch),
        _ => None,
    }))
}

fn parse_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    // Naive timestamps are assumed to be UTC
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn from_epoch(n: i64) -> Option<DateTime<Utc>> {
    if n.unsigned_abs() >= EPOCH_MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(n).single()
    } else {
        Utc.timestamp_opt(n, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flat_records_accept_numeric_ids() {
        let folder: FlatFolder =
            serde_json::from_value(json!({"id": 1, "parent_id": null, "title": "A"})).unwrap();
        assert_eq!(folder.id, "1");
        assert_eq!(folder.parent_id, None);

        let note: FlatNote =
            serde_json::from_value(json!({"id": 10, "parent_id": 1, "title": "N1"})).unwrap();
        assert_eq!(note.id, "10");
        assert_eq!(note.parent_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_flat_parent_id_may_be_missing() {
        let folder: FlatFolder = serde_json::from_value(json!({"id": "f1"})).unwrap();
        assert_eq!(folder.parent_id, None);
        assert_eq!(folder.title, "");
    }

    #[test]
    fn test_nested_unknown_type_is_other() {
        let node: NestedSourceNode =
            serde_json::from_value(json!({"id": "x", "type": "whiteboard"})).unwrap();
        assert_eq!(node.node_type, NestedType::Other);
        assert!(!node.node_type.is_container());
    }

    #[test]
    fn test_nested_page_count_camel_case() {
        let node: NestedSourceNode = serde_json::from_value(json!({
            "id": "nb1", "type": "notebook", "pageCount": 5,
            "children": [{"id": "p1", "type": "page"}]
        }))
        .unwrap();
        assert_eq!(node.page_count, 5);
        assert_eq!(node.children.len(), 1);
        assert!(node.node_type.is_container());
    }

    #[test]
    fn test_job_kind_parse() {
        assert_eq!("full_sync".parse::<JobKind>().unwrap(), JobKind::FullSync);
        assert_eq!("sync-book".parse::<JobKind>().unwrap(), JobKind::SyncBook);
        assert!("reticulate".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_job_deserialize_and_progress() {
        let job: Job = serde_json::from_value(json!({
            "id": 42,
            "type": "full_sync",
            "status": "processing",
            "total_items": 10,
            "completed_items": 4,
            "created_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(job.id, "42");
        assert!(job.created_at.is_some());
        assert!(!job.is_terminal());
        assert!((job.progress() - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_job_with_unknown_kind_still_decodes() {
        let job: Job = serde_json::from_value(json!({
            "id": "j9",
            "type": "reindex_covers",
            "status": "completed"
        }))
        .unwrap();
        assert_eq!(job.kind, JobKind::Other);
        assert!(job.is_terminal());
        assert!(job.created_at.is_none());
        // Never offered as something the user can start
        assert!("other".parse::<JobKind>().is_err());
    }

    #[test]
    fn test_job_timestamps_are_lenient() {
        let decode = |created: serde_json::Value| -> Job {
            serde_json::from_value(json!({
                "id": 1, "type": "full_sync", "status": "queued", "created_at": created
            }))
            .unwrap()
        };

        let expected = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).single();
        assert_eq!(decode(json!("2024-05-01T12:00:00+02:00")).created_at, expected);
        assert_eq!(decode(json!("2024-05-01 10:00:00")).created_at, expected);
        assert_eq!(decode(json!(1_714_557_600)).created_at, expected);
        assert_eq!(decode(json!(1_714_557_600_000i64)).created_at, expected);
        assert_eq!(decode(json!("last tuesday")).created_at, None);
        assert_eq!(decode(json!(null)).created_at, None);
        assert_eq!(decode(json!({"nested": true})).created_at, None);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn test_search_request_tagged_by_kind() {
        let request = SearchRequest::missing_chapters("b1", "Dune", 3);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["kind"], "missing_chapters_search");
        assert_eq!(request.kind(), QueueItemKind::MissingChaptersSearch);
        assert_eq!(request.query(), "Dune");
        assert_eq!(request.page_count(), 3);
    }

    #[test]
    fn test_tree_totals() {
        let tree = vec![TreeNode {
            id: "1".into(),
            name: "A".into(),
            kind: NodeKind::Folder,
            children: vec![TreeNode {
                id: "10".into(),
                name: "N1".into(),
                kind: NodeKind::Note,
                children: vec![],
                note_count: 0,
                metadata: serde_json::Value::Null,
            }],
            note_count: 1,
            metadata: serde_json::Value::Null,
        }];
        assert_eq!(tree_totals(&tree), (1, 1));
        assert_eq!(tree[0].subtree_len(), 2);
        assert_eq!(tree[0].find("10").map(|n| n.name.as_str()), Some("N1"));
    }

    fn leaf(id: &str) -> TreeNode {
        TreeNode {
            id: id.into(),
            name: id.into(),
            kind: NodeKind::Note,
            children: vec![],
            note_count: 0,
            metadata: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_walk_is_preorder_with_depth() {
        let mut inner = leaf("b");
        inner.kind = NodeKind::Folder;
        inner.children = vec![leaf("c")];
        let mut outer = leaf("a");
        outer.kind = NodeKind::Folder;
        outer.children = vec![inner, leaf("d")];
        let forest = vec![outer, leaf("e")];

        let visited: Vec<(usize, &str)> = Walk::new(&forest)
            .map(|(depth, node)| (depth, node.id.as_str()))
            .collect();
        assert_eq!(
            visited,
            vec![(0, "a"), (1, "b"), (2, "c"), (1, "d"), (0, "e")]
        );
        assert_eq!(tree_totals(&forest), (2, 3));
    }

    #[test]
    fn test_dropping_a_deep_tree() {
        let mut node = leaf("bottom");
        for i in 0..200_000 {
            let mut parent = leaf(&format!("f{}", i));
            parent.kind = NodeKind::Folder;
            parent.children = vec![node];
            node = parent;
        }
        assert_eq!(node.subtree_len(), 200_001);
        drop(node);
    }
}
