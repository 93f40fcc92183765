// ---------------------------------------------------------------------------
// Snapshot & restore: recursive, serde-serializable image of the tree
// ---------------------------------------------------------------------------

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{Outcome, VfsError};
use crate::node::{Node, NodeBase, NodeId, NodeKind};
use crate::path::validate_name;
use crate::vfs::FileSystem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
	pub root: SnapshotNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotNode {
	pub name: String,
	pub kind: NodeKind,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub contents: Option<String>,
	#[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
	pub metadata: BTreeMap<String, serde_json::Value>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub children: Vec<SnapshotNode>,
}

impl Snapshot {
	pub fn to_json(&self) -> Outcome<String> {
		Ok(serde_json::to_string_pretty(self)?)
	}

	pub fn from_json(json: &str) -> Outcome<Self> {
		Ok(serde_json::from_str(json)?)
	}
}

#[derive(Debug, Default)]
struct Totals {
	nodes: usize,
	bytes: u64,
}

impl FileSystem {
	// -- Snapshot & Restore -----------------------------------------------

	pub fn snapshot(&self) -> Snapshot {
		Snapshot {
			root: self.snapshot_node(self.root()),
		}
	}

	fn snapshot_node(&self, id: NodeId) -> SnapshotNode {
		let Some(node) = self.node(id) else {
			return SnapshotNode {
				name: String::new(),
				kind: NodeKind::Directory,
				contents: None,
				metadata: BTreeMap::new(),
				children: Vec::new(),
			};
		};
		SnapshotNode {
			name: node.name().to_string(),
			kind: node.kind(),
			contents: node.as_file().map(|f| f.contents.clone()),
			metadata: node
				.metadata()
				.iter()
				.map(|(k, v)| (k.clone(), v.clone()))
				.collect(),
			children: node
				.children()
				.iter()
				.map(|c| self.snapshot_node(*c))
				.collect(),
		}
	}

	/// Replace the whole tree with `snap`. Nothing changes if validation fails.
	pub fn restore(&mut self, snap: Snapshot) -> Outcome<()> {
		if snap.root.kind != NodeKind::Directory {
			return Err(VfsError::InvalidSnapshot(
				"Root must be a directory".to_string(),
			));
		}

		let mut totals = Totals::default();
		self.validate_snapshot_node(&snap.root, "", 0, &mut totals)?;

		if totals.nodes > self.limits.max_node_count {
			return Err(VfsError::LimitExceeded(format!(
				"Snapshot node count {} exceeds limit ({})",
				totals.nodes, self.limits.max_node_count
			)));
		}
		if totals.bytes > self.limits.max_total_size {
			return Err(VfsError::LimitExceeded(format!(
				"Snapshot total size {} exceeds limit ({})",
				totals.bytes, self.limits.max_total_size
			)));
		}

		// Validation passed, commit
		let mut rebuilt = FileSystem::with_limits(self.limits.clone());
		rebuilt.arena.clear();
		rebuilt.dir_count = 0;
		rebuilt.root = rebuilt.insert_snapshot_node(None, &snap.root);
		*self = rebuilt;
		Ok(())
	}

	fn validate_snapshot_node(
		&self,
		snap: &SnapshotNode,
		path: &str,
		depth: usize,
		totals: &mut Totals,
	) -> Outcome<()> {
		let shown = if path.is_empty() { "/" } else { path };
		if depth > 0 {
			if let Some(err) = validate_name(&snap.name, self.limits.max_name_length) {
				return Err(VfsError::InvalidSnapshot(format!("{}: {}", shown, err)));
			}
		}
		if depth > self.limits.max_path_depth {
			return Err(VfsError::LimitExceeded(format!(
				"Snapshot path exceeds max depth ({}): {}",
				self.limits.max_path_depth, shown
			)));
		}
		totals.nodes += 1;

		match snap.kind {
			NodeKind::File => {
				if !snap.children.is_empty() {
					return Err(VfsError::InvalidSnapshot(format!(
						"File has children: {}",
						shown
					)));
				}
				let size = snap.contents.as_deref().unwrap_or("").len() as u64;
				if size > self.limits.max_file_size {
					return Err(VfsError::LimitExceeded(format!(
						"Snapshot file size {} exceeds limit ({}): {}",
						size, self.limits.max_file_size, shown
					)));
				}
				totals.bytes += size;
			}
			NodeKind::Directory => {
				if snap.contents.is_some() {
					return Err(VfsError::InvalidSnapshot(format!(
						"Directory has contents: {}",
						shown
					)));
				}
				let mut seen: HashSet<&str> = HashSet::new();
				for child in &snap.children {
					if !seen.insert(child.name.as_str()) {
						return Err(VfsError::InvalidSnapshot(format!(
							"Duplicate name \"{}\" in {}",
							child.name, shown
						)));
					}
					let child_path = format!("{}/{}", path, child.name);
					self.validate_snapshot_node(child, &child_path, depth + 1, totals)?;
				}
			}
		}
		Ok(())
	}

	fn insert_snapshot_node(&mut self, parent: Option<NodeId>, snap: &SnapshotNode) -> NodeId {
		let name = if parent.is_some() { snap.name.clone() } else { String::new() };
		let mut base = NodeBase::new(name, parent);
		base.metadata = snap
			.metadata
			.iter()
			.map(|(k, v)| (k.clone(), v.clone()))
			.collect();

		let node = match snap.kind {
			NodeKind::File => {
				let contents = snap.contents.clone().unwrap_or_default();
				self.file_count += 1;
				self.total_size += contents.len() as u64;
				Node::file(base, contents)
			}
			NodeKind::Directory => {
				self.dir_count += 1;
				Node::directory(base)
			}
		};

		let id = self.arena.insert(node);
		if let Some(dir) = parent
			.and_then(|p| self.arena.get_mut(p))
			.and_then(Node::as_dir_mut)
		{
			dir.children.push(id);
		}
		for child in &snap.children {
			self.insert_snapshot_node(Some(id), child);
		}
		id
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use crate::path::VfsLimits;

	fn sample() -> FileSystem {
		let mut fs = FileSystem::new();
		fs.mkdir("/islands/island1", true).unwrap();
		fs.write_file("/islands/island1/notes.txt", "big fish here", false)
			.unwrap();
		fs.write_file("/readme", "", false).unwrap();
		fs.set_metadata("/islands", "discovered", serde_json::json!(true))
			.unwrap();
		fs
	}

	#[test]
	fn snapshot_and_restore() {
		let mut fs = sample();
		let snap = fs.snapshot();

		fs.clear();
		assert!(!fs.exists("/islands"));

		fs.restore(snap.clone()).unwrap();
		assert_eq!(fs.snapshot(), snap);
		assert_eq!(
			fs.read_file("/islands/island1/notes.txt").unwrap(),
			"big fish here"
		);
		assert_eq!(
			fs.get_metadata("/islands", "discovered").unwrap(),
			serde_json::json!(true)
		);
		let m = fs.metrics();
		assert_eq!(m.file_count, 2);
		assert_eq!(m.directory_count, 3);
		assert_eq!(m.total_size, 13);
	}

	#[test]
	fn json_round_trip_keeps_child_order() {
		let fs = sample();
		let json = fs.snapshot().to_json().unwrap();
		let parsed = Snapshot::from_json(&json).unwrap();

		let names: Vec<&str> = parsed.root.children.iter().map(|c| c.name.as_str()).collect();
		assert_eq!(names, vec!["islands", "readme"]);
	}

	#[test]
	fn duplicate_names_are_rejected_without_changes() {
		let mut fs = sample();
		let before = fs.snapshot();

		let mut bad = before.clone();
		let dup = bad.root.children[1].clone();
		bad.root.children.push(dup);

		let err = fs.restore(bad).unwrap_err();
		assert!(matches!(err, VfsError::InvalidSnapshot(_)));
		assert_eq!(fs.snapshot(), before);
	}

	#[test]
	fn file_with_children_is_rejected() {
		let mut fs = FileSystem::new();
		let snap = Snapshot::from_json(
			r#"{"root":{"name":"","kind":"directory","children":[
				{"name":"f","kind":"file","contents":"x","children":[{"name":"g","kind":"file"}]}
			]}}"#,
		)
		.unwrap();
		assert!(matches!(fs.restore(snap), Err(VfsError::InvalidSnapshot(_))));
	}

	#[test]
	fn restore_respects_node_limit() {
		let snap = sample().snapshot();
		let mut small = FileSystem::with_limits(VfsLimits {
			max_node_count: 3,
			..VfsLimits::default()
		});
		assert!(matches!(small.restore(snap), Err(VfsError::LimitExceeded(_))));
		assert_eq!(small.metrics().node_count, 1);
	}
}
