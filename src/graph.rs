//! The build graph: artifact nodes and the dependency edges between them.
//!
//! The graph is the sole owner of its nodes; edges are indices into the
//! owning arena, so an edge can never outlive the node it points at.

use crate::fs::{self, Fingerprint, MTime};
use crate::task::{FileView, RebuildAction, TaskResult};
use anyhow::bail;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FileId(u32);
impl FileId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One buildable or source file.
pub struct FileNode {
    pub name: String,
    /// The file's state as of construction or its last rebuild.  Never
    /// re-sampled outside those two points.
    fingerprint: Fingerprint,
    deps: Vec<FileId>,
    /// Fingerprint each dependency had when this node was last rebuilt.
    /// Index-aligned with `deps`.
    dep_seen: Vec<Fingerprint>,
    /// Absent for plain source files, which nothing regenerates.
    action: Option<Box<dyn RebuildAction>>,
}

impl FileNode {
    pub fn deps(&self) -> &[FileId] {
        &self.deps
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

#[derive(Default)]
pub struct Graph {
    files: Vec<FileNode>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    /// Registers a buildable file with its initial dependencies and the
    /// action that regenerates it.  The file's current state is captured
    /// now; a file that doesn't exist yet is not an error.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        deps: Vec<FileId>,
        action: Box<dyn RebuildAction>,
    ) -> FileId {
        self.add_file(name.into(), deps, Some(action))
    }

    /// Registers a plain source file: no dependencies, no rebuild action.
    pub fn add_source(&mut self, name: impl Into<String>) -> FileId {
        self.add_file(name.into(), Vec::new(), None)
    }

    fn add_file(
        &mut self,
        name: String,
        deps: Vec<FileId>,
        action: Option<Box<dyn RebuildAction>>,
    ) -> FileId {
        let fingerprint = fs::stat(&name)
            .map(Fingerprint::from)
            .unwrap_or(Fingerprint::UNOBSERVED);
        let dep_seen = deps
            .iter()
            .map(|&dep| self.files[dep.index()].fingerprint)
            .collect();
        let id = FileId(self.files.len() as u32);
        self.files.push(FileNode {
            name,
            fingerprint,
            deps,
            dep_seen,
            action,
        });
        id
    }

    /// Appends a dependency edge.  The snapshot slot starts unobserved and
    /// is filled in the next time the node rebuilds.
    pub fn add_dep(&mut self, id: FileId, dep: FileId) {
        let node = &mut self.files[id.index()];
        node.deps.push(dep);
        node.dep_seen.push(Fingerprint::UNOBSERVED);
    }

    pub fn add_deps(&mut self, id: FileId, deps: &[FileId]) {
        for &dep in deps {
            self.add_dep(id, dep);
        }
    }

    pub fn file(&self, id: FileId) -> &FileNode {
        &self.files[id.index()]
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn all_ids(&self) -> impl Iterator<Item = FileId> {
        (0..self.files.len()).map(|index| FileId(index as u32))
    }

    /// Whether the file is out of date: missing from disk, or any dependency
    /// at least as fresh as it.  Equal timestamps count as stale, so a change
    /// landing within one clock tick is rebuilt rather than skipped.
    /// Reads timestamps fresh from disk; cached fingerprints play no part.
    pub fn needs_update(&self, id: FileId) -> std::io::Result<bool> {
        let node = self.file(id);
        let own = match fs::stat(&node.name)? {
            MTime::Missing => return Ok(true),
            MTime::Stamp(t) => t,
        };
        for &dep in &node.deps {
            // A dependency that is itself missing can't be newer than us;
            // regenerating it is its own node's problem.
            if let MTime::Stamp(dep_mtime) = fs::stat(&self.file(dep).name)? {
                if dep_mtime >= own {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Invokes the node's rebuild action.  Errors when a stale node has no
    /// action, which means a source file is missing.
    pub(crate) fn run_action(&self, id: FileId) -> anyhow::Result<TaskResult> {
        let node = self.file(id);
        let view = FileView {
            name: &node.name,
            deps: node.deps.iter().map(|&dep| self.file(dep).name.as_str()).collect(),
        };
        match &node.action {
            Some(action) => Ok(action.run(&view)),
            None => bail!("{} is missing and has no rebuild action", node.name),
        }
    }

    /// Records the state a rebuild produced: the node's own fingerprint is
    /// re-read from disk, and the per-dependency snapshot takes each
    /// dependency's last self-reported fingerprint, not a fresh stat.
    pub(crate) fn record_update(&mut self, id: FileId) -> std::io::Result<()> {
        let fingerprint = Fingerprint::from(fs::stat(&self.files[id.index()].name)?);
        let dep_seen: Vec<Fingerprint> = self.files[id.index()]
            .deps
            .iter()
            .map(|&dep| self.files[dep.index()].fingerprint)
            .collect();
        let node = &mut self.files[id.index()];
        node.fingerprint = fingerprint;
        node.dep_seen = dep_seen;
        Ok(())
    }

    /// Runs the node's rebuild action and records the state it produced.
    /// The action's outcome is returned unchanged; no retry, no suppression.
    pub fn rebuild(&mut self, id: FileId) -> anyhow::Result<TaskResult> {
        let result = self.run_action(id)?;
        self.record_update(id)?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &tempfile::TempDir, name: &str) -> String {
        let path = dir.path().join(name);
        std::fs::write(&path, "").unwrap();
        path.to_str().unwrap().to_string()
    }

    fn ok_action() -> Box<dyn RebuildAction> {
        Box::new(|_: &FileView| TaskResult {
            success: true,
            output: Vec::new(),
        })
    }

    #[test]
    fn missing_file_needs_update() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let path = dir.path().join("out").to_str().unwrap().to_string();
        let id = graph.add_node(path, vec![], ok_action());
        assert!(graph.needs_update(id).unwrap());
    }

    #[test]
    fn existing_file_without_deps_is_current() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let id = graph.add_node(touch(&dir, "out"), vec![], ok_action());
        assert!(!graph.needs_update(id).unwrap());
    }

    #[test]
    fn missing_dep_contributes_no_staleness() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let dep = graph.add_source(dir.path().join("gone").to_str().unwrap().to_string());
        let id = graph.add_node(touch(&dir, "out"), vec![dep], ok_action());
        assert!(!graph.needs_update(id).unwrap());
    }

    #[test]
    fn add_dep_keeps_snapshot_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let a = graph.add_source(touch(&dir, "a"));
        let b = graph.add_source(touch(&dir, "b"));
        let id = graph.add_node(touch(&dir, "out"), vec![a], ok_action());
        graph.add_dep(id, b);
        let node = graph.file(id);
        assert_eq!(node.deps.len(), 2);
        assert_eq!(node.dep_seen.len(), 2);
        assert_eq!(node.dep_seen[1], Fingerprint::UNOBSERVED);
    }

    #[test]
    fn construction_snapshots_initial_deps() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let a = graph.add_source(touch(&dir, "a"));
        let id = graph.add_node(touch(&dir, "out"), vec![a], ok_action());
        assert_eq!(graph.file(id).dep_seen[0], graph.file(a).fingerprint);
    }

    #[test]
    fn rebuild_returns_action_outcome_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let id = graph.add_node(
            touch(&dir, "out"),
            vec![],
            Box::new(|_: &FileView| TaskResult {
                success: false,
                output: b"boom".to_vec(),
            }),
        );
        let result = graph.rebuild(id).unwrap();
        assert!(!result.success);
        assert_eq!(result.output, b"boom");
    }

    #[test]
    fn rebuild_refreshes_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let a = graph.add_source(touch(&dir, "a"));
        let out_path = dir.path().join("out").to_str().unwrap().to_string();
        let id = graph.add_node(out_path.clone(), vec![a], ok_action());
        assert_eq!(graph.file(id).fingerprint, Fingerprint::UNOBSERVED);

        std::fs::write(&out_path, "").unwrap();
        graph.rebuild(id).unwrap();
        assert_ne!(graph.file(id).fingerprint, Fingerprint::UNOBSERVED);
        assert_eq!(graph.file(id).dep_seen[0], graph.file(a).fingerprint);
    }

    #[test]
    fn stale_node_without_action_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut graph = Graph::new();
        let id = graph.add_source(dir.path().join("gone").to_str().unwrap().to_string());
        assert!(graph.needs_update(id).unwrap());
        let err = graph.rebuild(id).unwrap_err();
        assert!(err.to_string().contains("no rebuild action"));
    }
}
