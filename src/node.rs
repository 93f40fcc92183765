// ---------------------------------------------------------------------------
// Node model: directories and files stored in a generational arena
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Stable handle to a node in a [`crate::FileSystem`].
///
/// A handle survives moves and in-place overwrites. Once the node is deleted
/// its slot may be reused, but the bumped generation keeps the old handle
/// from resolving to the newcomer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
	index: u32,
	generation: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
	Directory,
	File,
}

impl NodeKind {
	pub fn as_str(&self) -> &str {
		match self {
			Self::Directory => "directory",
			Self::File => "file",
		}
	}
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Fields shared by every node kind.
#[derive(Debug, Clone, Default)]
pub struct NodeBase {
	pub name: String,
	/// Non-owning back-reference; `None` only for the root.
	pub parent: Option<NodeId>,
	pub metadata: HashMap<String, serde_json::Value>,
}

impl NodeBase {
	pub fn new(name: impl Into<String>, parent: Option<NodeId>) -> Self {
		Self {
			name: name.into(),
			parent,
			metadata: HashMap::new(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Directory {
	pub base: NodeBase,
	/// Owned children in insertion order. Names are unique.
	pub children: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct File {
	pub base: NodeBase,
	pub contents: String,
}

#[derive(Debug, Clone)]
pub enum Node {
	Directory(Directory),
	File(File),
}

impl Node {
	pub fn directory(base: NodeBase) -> Self {
		Self::Directory(Directory {
			base,
			children: Vec::new(),
		})
	}

	pub fn file(base: NodeBase, contents: impl Into<String>) -> Self {
		Self::File(File {
			base,
			contents: contents.into(),
		})
	}

	pub fn base(&self) -> &NodeBase {
		match self {
			Self::Directory(d) => &d.base,
			Self::File(f) => &f.base,
		}
	}

	pub fn base_mut(&mut self) -> &mut NodeBase {
		match self {
			Self::Directory(d) => &mut d.base,
			Self::File(f) => &mut f.base,
		}
	}

	pub fn name(&self) -> &str {
		&self.base().name
	}

	pub fn parent(&self) -> Option<NodeId> {
		self.base().parent
	}

	pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
		&self.base().metadata
	}

	pub fn kind(&self) -> NodeKind {
		match self {
			Self::Directory(_) => NodeKind::Directory,
			Self::File(_) => NodeKind::File,
		}
	}

	pub fn is_dir(&self) -> bool {
		matches!(self, Self::Directory(_))
	}

	pub fn is_file(&self) -> bool {
		matches!(self, Self::File(_))
	}

	pub fn as_dir(&self) -> Option<&Directory> {
		match self {
			Self::Directory(d) => Some(d),
			Self::File(_) => None,
		}
	}

	pub fn as_dir_mut(&mut self) -> Option<&mut Directory> {
		match self {
			Self::Directory(d) => Some(d),
			Self::File(_) => None,
		}
	}

	pub fn as_file(&self) -> Option<&File> {
		match self {
			Self::File(f) => Some(f),
			Self::Directory(_) => None,
		}
	}

	pub fn as_file_mut(&mut self) -> Option<&mut File> {
		match self {
			Self::File(f) => Some(f),
			Self::Directory(_) => None,
		}
	}

	/// Child handles of a directory; empty for files.
	pub fn children(&self) -> &[NodeId] {
		match self {
			Self::Directory(d) => &d.children,
			Self::File(_) => &[],
		}
	}

	/// Content length in bytes; zero for directories.
	pub fn size(&self) -> u64 {
		match self {
			Self::File(f) => f.contents.len() as u64,
			Self::Directory(_) => 0,
		}
	}
}

// ---------------------------------------------------------------------------
// Arena
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Slot {
	generation: u32,
	node: Option<Node>,
}

/// Backing store for the tree. Directories own their children only through
/// the index lists kept in [`Directory::children`].
#[derive(Debug, Default)]
pub(crate) struct Arena {
	slots: Vec<Slot>,
	free: Vec<u32>,
	len: usize,
}

impl Arena {
	pub(crate) fn new() -> Self {
		Self::default()
	}

	pub(crate) fn insert(&mut self, node: Node) -> NodeId {
		self.len += 1;
		if let Some(index) = self.free.pop() {
			let slot = &mut self.slots[index as usize];
			slot.node = Some(node);
			return NodeId {
				index,
				generation: slot.generation,
			};
		}
		let index = self.slots.len() as u32;
		self.slots.push(Slot {
			generation: 0,
			node: Some(node),
		});
		NodeId {
			index,
			generation: 0,
		}
	}

	pub(crate) fn get(&self, id: NodeId) -> Option<&Node> {
		self.slots
			.get(id.index as usize)
			.filter(|s| s.generation == id.generation)
			.and_then(|s| s.node.as_ref())
	}

	pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
		self.slots
			.get_mut(id.index as usize)
			.filter(|s| s.generation == id.generation)
			.and_then(|s| s.node.as_mut())
	}

	pub(crate) fn remove(&mut self, id: NodeId) -> Option<Node> {
		let slot = self
			.slots
			.get_mut(id.index as usize)
			.filter(|s| s.generation == id.generation)?;
		let node = slot.node.take()?;
		slot.generation = slot.generation.wrapping_add(1);
		self.free.push(id.index);
		self.len -= 1;
		Some(node)
	}

	pub(crate) fn len(&self) -> usize {
		self.len
	}

	pub(crate) fn clear(&mut self) {
		self.slots.clear();
		self.free.clear();
		self.len = 0;
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
