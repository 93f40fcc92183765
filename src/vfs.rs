// ---------------------------------------------------------------------------
// In-memory filesystem core: tree of directories and text files
// ---------------------------------------------------------------------------

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;

use crate::error::{Outcome, VfsError};
use crate::glob::match_glob;
use crate::node::{Arena, Node, NodeBase, NodeId, NodeKind};
use crate::path::{validate_name, VfsLimits, VfsPath, ROOT};
use crate::search::{search_text, SearchMatch, SearchMode, SearchOptions};

// ---------------------------------------------------------------------------
// Resolution options
// ---------------------------------------------------------------------------

/// What kind of node a resolution is required to end on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Expect {
	#[default]
	Any,
	Directory,
	File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
	/// When false, resolve to the directory that would hold the final component.
	pub must_exist: bool,
	pub expect: Expect,
	/// Create missing intermediate directories (never the final component).
	pub create_parents: bool,
}

impl ResolveOptions {
	pub fn existing() -> Self {
		Self {
			must_exist: true,
			expect: Expect::Any,
			create_parents: false,
		}
	}

	pub fn directory() -> Self {
		Self {
			expect: Expect::Directory,
			..Self::existing()
		}
	}

	pub fn file() -> Self {
		Self {
			expect: Expect::File,
			..Self::existing()
		}
	}

	pub fn parent_of() -> Self {
		Self {
			must_exist: false,
			..Self::existing()
		}
	}

	pub fn create_parents(mut self, create: bool) -> Self {
		self.create_parents = create;
		self
	}
}

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
	pub name: String,
	pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stat {
	pub path: String,
	pub kind: NodeKind,
	/// Content bytes of a file, or of everything beneath a directory.
	pub size: u64,
	pub children: usize,
	pub metadata_keys: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
	pub total_size: u64,
	pub node_count: usize,
	pub file_count: usize,
	pub directory_count: usize,
}

#[derive(Debug, Clone)]
pub struct SearchOpts {
	pub glob: Option<String>,
	pub max_results: usize,
	pub mode: SearchMode,
	pub context_before: usize,
	pub context_after: usize,
	pub count_only: bool,
}

impl Default for SearchOpts {
	fn default() -> Self {
		Self {
			glob: None,
			max_results: 100,
			mode: SearchMode::Substring,
			context_before: 0,
			context_after: 0,
			count_only: false,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutput {
	Results(Vec<SearchMatch>),
	Count(usize),
}

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// Where a node named by a path would live.
#[derive(Debug)]
struct Target {
	/// Deepest directory on the parent chain that already exists.
	deepest: NodeId,
	/// Parent components that still have to be created below `deepest`.
	missing: usize,
	/// Node already occupying the final name, if the parent exists.
	occupant: Option<NodeId>,
}

#[derive(Debug, Default)]
struct SubtreeStats {
	nodes: usize,
	bytes: u64,
	height: usize,
}

// ---------------------------------------------------------------------------
// FileSystem
// ---------------------------------------------------------------------------

pub struct FileSystem {
	pub(crate) arena: Arena,
	pub(crate) root: NodeId,
	pub(crate) limits: VfsLimits,
	pub(crate) total_size: u64,
	pub(crate) file_count: usize,
	pub(crate) dir_count: usize,
}

impl Default for FileSystem {
	fn default() -> Self {
		Self::new()
	}
}

impl FileSystem {
	// -- Constructor ------------------------------------------------------

	pub fn new() -> Self {
		Self::with_limits(VfsLimits::default())
	}

	pub fn with_limits(limits: VfsLimits) -> Self {
		let mut arena = Arena::new();
		let root = arena.insert(Node::directory(NodeBase::new("", None)));
		Self {
			arena,
			root,
			limits,
			total_size: 0,
			file_count: 0,
			dir_count: 1,
		}
	}

	pub fn limits(&self) -> &VfsLimits {
		&self.limits
	}

	pub fn root(&self) -> NodeId {
		self.root
	}

	pub fn node(&self, id: NodeId) -> Option<&Node> {
		self.arena.get(id)
	}

	/// Absolute path of a live node, rebuilt from its parent links.
	pub fn path_of(&self, id: NodeId) -> Option<String> {
		let mut names: Vec<&str> = Vec::new();
		let mut current = self.arena.get(id)?;
		while let Some(parent) = current.parent() {
			names.push(current.name());
			current = self.arena.get(parent)?;
		}
		if names.is_empty() {
			return Some(ROOT.to_string());
		}
		names.reverse();
		Some(format!("/{}", names.join("/")))
	}

	// -- Helpers (private) ------------------------------------------------

	fn fetch(&self, id: NodeId) -> Outcome<&Node> {
		self.arena
			.get(id)
			.ok_or_else(|| VfsError::NotFound(format!("stale node handle {:?}", id)))
	}

	fn display(&self, id: NodeId) -> String {
		self.path_of(id).unwrap_or_default()
	}

	fn child_named(&self, dir: NodeId, name: &str) -> Option<NodeId> {
		self.arena.get(dir)?.children().iter().copied().find(|c| {
			self.arena
				.get(*c)
				.map_or(false, |n| n.name() == name)
		})
	}

	/// Walk the first `count` components of `path` from the root.
	fn walk(&self, path: &VfsPath, count: usize) -> Outcome<NodeId> {
		let mut current = self.root;
		for (i, component) in path.components()[..count].iter().enumerate() {
			if !self.fetch(current)?.is_dir() {
				return Err(VfsError::NotADirectory(path.prefix(i).to_string()));
			}
			current = self
				.child_named(current, component)
				.ok_or_else(|| VfsError::NotFound(path.prefix(i + 1).to_string()))?;
		}
		Ok(current)
	}

	fn check_expect(&self, path: &VfsPath, id: NodeId, expect: Expect) -> Outcome<()> {
		let node = self.fetch(id)?;
		match expect {
			Expect::Directory if !node.is_dir() => {
				Err(VfsError::NotADirectory(path.to_string()))
			}
			Expect::File if !node.is_file() => Err(VfsError::NotAFile(path.to_string())),
			_ => Ok(()),
		}
	}

	/// Find where `path` would be placed without touching the tree.
	fn locate(&self, path: &VfsPath, create_parents: bool) -> Outcome<Target> {
		let parent_depth = path.depth().saturating_sub(1);
		let mut current = self.root;
		for (i, component) in path.components()[..parent_depth].iter().enumerate() {
			if !self.fetch(current)?.is_dir() {
				return Err(VfsError::NotADirectory(path.prefix(i).to_string()));
			}
			match self.child_named(current, component) {
				Some(child) => current = child,
				None if create_parents => {
					return Ok(Target {
						deepest: current,
						missing: parent_depth - i,
						occupant: None,
					});
				}
				None => return Err(VfsError::NotFound(path.prefix(i + 1).to_string())),
			}
		}
		if !self.fetch(current)?.is_dir() {
			return Err(VfsError::NotADirectory(path.prefix(parent_depth).to_string()));
		}
		Ok(Target {
			deepest: current,
			missing: 0,
			occupant: self.child_named(current, path.name()),
		})
	}

	/// Create the directories `locate` reported missing; returns the parent
	/// of the final component. Callers validate names and capacity first.
	fn materialize_parents(&mut self, path: &VfsPath, target: &Target) -> Outcome<NodeId> {
		let parent_depth = path.depth().saturating_sub(1);
		let mut current = target.deepest;
		for component in &path.components()[parent_depth - target.missing..parent_depth] {
			current = self.attach_new(current, Node::directory(NodeBase::new(component.clone(), None)))?;
			self.dir_count += 1;
		}
		Ok(current)
	}

	fn attach_new(&mut self, parent: NodeId, mut node: Node) -> Outcome<NodeId> {
		if !self.fetch(parent)?.is_dir() {
			return Err(VfsError::NotADirectory(self.display(parent)));
		}
		node.base_mut().parent = Some(parent);
		let id = self.arena.insert(node);
		if let Some(dir) = self.arena.get_mut(parent).and_then(Node::as_dir_mut) {
			dir.children.push(id);
		}
		Ok(id)
	}

	/// Link an already-allocated node under `parent`, enforcing unique names.
	fn attach(&mut self, parent: NodeId, id: NodeId) -> Outcome<()> {
		let name = self.fetch(id)?.name().to_string();
		if !self.fetch(parent)?.is_dir() {
			return Err(VfsError::NotADirectory(self.display(parent)));
		}
		if let Some(existing) = self.child_named(parent, &name) {
			if existing != id {
				return Err(VfsError::AlreadyExists(self.display(existing)));
			}
		}
		if let Some(dir) = self.arena.get_mut(parent).and_then(Node::as_dir_mut) {
			dir.children.push(id);
		}
		if let Some(node) = self.arena.get_mut(id) {
			node.base_mut().parent = Some(parent);
		}
		Ok(())
	}

	/// Unlink `id` from `parent`, returning its former position.
	fn detach(&mut self, parent: NodeId, id: NodeId) -> Outcome<usize> {
		let path = self.display(id);
		let dir = self
			.arena
			.get_mut(parent)
			.and_then(Node::as_dir_mut)
			.ok_or_else(|| VfsError::NotFound(path.clone()))?;
		let index = dir
			.children
			.iter()
			.position(|c| *c == id)
			.ok_or(VfsError::NotFound(path))?;
		dir.children.remove(index);
		Ok(index)
	}

	fn subtree_stats(&self, id: NodeId) -> Outcome<SubtreeStats> {
		let mut stats = SubtreeStats::default();
		let mut stack = vec![(id, 0usize)];
		while let Some((current, level)) = stack.pop() {
			let node = self.fetch(current)?;
			stats.nodes += 1;
			stats.bytes += node.size();
			stats.height = stats.height.max(level);
			stack.extend(node.children().iter().map(|c| (*c, level + 1)));
		}
		Ok(stats)
	}

	fn free_subtree(&mut self, id: NodeId) {
		let mut stack = vec![id];
		while let Some(current) = stack.pop() {
			match self.arena.remove(current) {
				Some(Node::File(f)) => {
					self.total_size -= f.contents.len() as u64;
					self.file_count -= 1;
				}
				Some(Node::Directory(d)) => {
					self.dir_count -= 1;
					stack.extend(d.children);
				}
				None => {}
			}
		}
	}

	fn assert_creatable(&self, path: &VfsPath, height: usize) -> Outcome<()> {
		if path.depth() + height > self.limits.max_path_depth {
			return Err(VfsError::LimitExceeded(format!(
				"Path exceeds max depth ({}): {}",
				self.limits.max_path_depth, path
			)));
		}
		for component in path.components() {
			if let Some(err) = validate_name(component, self.limits.max_name_length) {
				return Err(VfsError::InvalidName(err));
			}
		}
		Ok(())
	}

	fn assert_node_capacity(&self, additional: usize) -> Outcome<()> {
		if self.arena.len() + additional > self.limits.max_node_count {
			return Err(VfsError::LimitExceeded(format!(
				"Maximum node count exceeded ({})",
				self.limits.max_node_count
			)));
		}
		Ok(())
	}

	fn assert_file_size(&self, size: u64, path: &VfsPath) -> Outcome<()> {
		if size > self.limits.max_file_size {
			return Err(VfsError::LimitExceeded(format!(
				"File size {} exceeds limit ({}): {}",
				size, self.limits.max_file_size, path
			)));
		}
		Ok(())
	}

	fn assert_total_size(&self, additional: u64) -> Outcome<()> {
		if self.total_size + additional > self.limits.max_total_size {
			return Err(VfsError::LimitExceeded(format!(
				"Total storage size would exceed limit ({})",
				self.limits.max_total_size
			)));
		}
		Ok(())
	}

	/// Final location of a copy or move: inside `dst` when it is an existing
	/// directory, otherwise `dst` itself.
	fn destination(&self, src: NodeId, dst: &VfsPath) -> Outcome<VfsPath> {
		match self.lookup(dst, ResolveOptions::directory()) {
			Ok(_) => Ok(dst.join(self.fetch(src)?.name())),
			Err(_) => Ok(dst.clone()),
		}
	}

	fn assert_no_cycle(&self, src: NodeId, target: &Target, dst: &VfsPath) -> Outcome<()> {
		if !self.fetch(src)?.is_dir() {
			return Ok(());
		}
		let mut current = Some(target.deepest);
		while let Some(id) = current {
			if id == src {
				return Err(VfsError::Cycle {
					src: self.display(src),
					dst: dst.to_string(),
				});
			}
			current = self.fetch(id)?.parent();
		}
		Ok(())
	}

	// -- Resolution -------------------------------------------------------

	/// Read-only resolution. `create_parents` is ignored.
	pub fn lookup(&self, path: &VfsPath, opts: ResolveOptions) -> Outcome<NodeId> {
		if !opts.must_exist {
			if path.is_root() {
				return Err(VfsError::RootOperation("resolve the parent of".to_string()));
			}
			let parent = self.walk(path, path.depth() - 1)?;
			self.check_expect(&path.parent(), parent, Expect::Directory)?;
			return Ok(parent);
		}
		let id = self.walk(path, path.depth())?;
		self.check_expect(path, id, opts.expect)?;
		Ok(id)
	}

	/// Resolve `path`, creating missing intermediate directories when asked.
	///
	/// Limit and blocking-file failures happen before anything is created.
	/// A missing final component under `must_exist` is only detected after
	/// the parents exist, so that `NotFound` leaves the new parents in place.
	pub fn resolve(&mut self, path: &VfsPath, opts: ResolveOptions) -> Outcome<NodeId> {
		if opts.create_parents && !path.is_root() {
			let target = self.locate(path, true)?;
			if target.missing > 0 {
				self.assert_creatable(&path.parent(), 0)?;
				self.assert_node_capacity(target.missing)?;
				self.materialize_parents(path, &target)?;
			}
		}
		self.lookup(path, opts)
	}

	// -- File operations --------------------------------------------------

	pub fn read_file(&self, path: &str) -> Outcome<String> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::file())?;
		match self.fetch(id)? {
			Node::File(f) => Ok(f.contents.clone()),
			Node::Directory(_) => Err(VfsError::NotAFile(path.to_string())),
		}
	}

	pub fn write_file(&mut self, path: &str, contents: &str, create_parents: bool) -> Outcome<NodeId> {
		self.write_file_with_metadata(path, contents, create_parents, None)
	}

	/// Like [`write_file`](Self::write_file), seeding `metadata` on a newly
	/// created file. Overwriting an existing file keeps its metadata.
	pub fn write_file_with_metadata(
		&mut self,
		path: &str,
		contents: &str,
		create_parents: bool,
		metadata: Option<HashMap<String, serde_json::Value>>,
	) -> Outcome<NodeId> {
		let path = VfsPath::parse(path);
		if path.is_root() {
			return Err(VfsError::AlreadyExists(format!("{} (is a directory)", path)));
		}

		let new_size = contents.len() as u64;
		self.assert_file_size(new_size, &path)?;

		let target = self.locate(&path, create_parents)?;
		if let Some(id) = target.occupant {
			let old_size = match self.fetch(id)? {
				Node::File(f) => f.contents.len() as u64,
				Node::Directory(_) => {
					return Err(VfsError::AlreadyExists(format!("{} (is a directory)", path)));
				}
			};
			if new_size > old_size {
				self.assert_total_size(new_size - old_size)?;
			}
			if let Some(f) = self.arena.get_mut(id).and_then(Node::as_file_mut) {
				f.contents = contents.to_string();
			}
			self.total_size = self.total_size - old_size + new_size;
			return Ok(id);
		}

		self.assert_creatable(&path, 0)?;
		self.assert_node_capacity(target.missing + 1)?;
		self.assert_total_size(new_size)?;

		let parent = self.materialize_parents(&path, &target)?;
		let mut base = NodeBase::new(path.name(), None);
		base.metadata = metadata.unwrap_or_default();
		let id = self.attach_new(parent, Node::file(base, contents))?;
		self.file_count += 1;
		self.total_size += new_size;
		Ok(id)
	}

	pub fn append_file(&mut self, path: &str, contents: &str) -> Outcome<NodeId> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::file())?;
		let old_size = self.fetch(id)?.size();
		let added = contents.len() as u64;

		self.assert_file_size(old_size + added, &path)?;
		self.assert_total_size(added)?;

		if let Some(f) = self.arena.get_mut(id).and_then(Node::as_file_mut) {
			f.contents.push_str(contents);
		}
		self.total_size += added;
		Ok(id)
	}

	/// Create an empty file unless a file already exists at `path`.
	pub fn touch(&mut self, path: &str) -> Outcome<NodeId> {
		let parsed = VfsPath::parse(path);
		match self.lookup(&parsed, ResolveOptions::existing()) {
			Ok(id) if self.node(id).map_or(false, Node::is_file) => Ok(id),
			_ => self.write_file(path, "", false),
		}
	}

	// -- Directory operations ---------------------------------------------

	pub fn mkdir(&mut self, path: &str, create_parents: bool) -> Outcome<NodeId> {
		self.mkdir_with_metadata(path, create_parents, None)
	}

	/// Like [`mkdir`](Self::mkdir). `metadata` lands on the final directory
	/// only when it is created here; intermediate parents start empty.
	pub fn mkdir_with_metadata(
		&mut self,
		path: &str,
		create_parents: bool,
		metadata: Option<HashMap<String, serde_json::Value>>,
	) -> Outcome<NodeId> {
		let path = VfsPath::parse(path);
		if path.is_root() {
			return Ok(self.root);
		}

		let target = self.locate(&path, create_parents)?;
		if let Some(id) = target.occupant {
			if self.fetch(id)?.is_dir() {
				return Ok(id);
			}
			return Err(VfsError::AlreadyExists(format!("{} (is a file)", path)));
		}

		self.assert_creatable(&path, 0)?;
		self.assert_node_capacity(target.missing + 1)?;

		let parent = self.materialize_parents(&path, &target)?;
		let mut base = NodeBase::new(path.name(), None);
		base.metadata = metadata.unwrap_or_default();
		let id = self.attach_new(parent, Node::directory(base))?;
		self.dir_count += 1;
		Ok(id)
	}

	pub fn list_dir(&self, path: &str) -> Outcome<Vec<String>> {
		Ok(self.entries(path)?.into_iter().map(|e| e.name).collect())
	}

	pub fn entries(&self, path: &str) -> Outcome<Vec<DirEntry>> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::directory())?;
		let mut entries = Vec::new();
		for child in self.fetch(id)?.children() {
			let node = self.fetch(*child)?;
			entries.push(DirEntry {
				name: node.name().to_string(),
				kind: node.kind(),
			});
		}
		Ok(entries)
	}

	// -- Navigation -------------------------------------------------------

	pub fn exists(&self, path: &str) -> bool {
		self.lookup(&VfsPath::parse(path), ResolveOptions::existing())
			.is_ok()
	}

	pub fn is_file(&self, path: &str) -> bool {
		self.lookup(&VfsPath::parse(path), ResolveOptions::file()).is_ok()
	}

	pub fn is_dir(&self, path: &str) -> bool {
		self.lookup(&VfsPath::parse(path), ResolveOptions::directory())
			.is_ok()
	}

	pub fn stat(&self, path: &str) -> Outcome<Stat> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::existing())?;
		let node = self.fetch(id)?;
		let mut metadata_keys: Vec<String> = node.metadata().keys().cloned().collect();
		metadata_keys.sort();

		Ok(Stat {
			path: path.to_string(),
			kind: node.kind(),
			size: self.subtree_stats(id)?.bytes,
			children: node.children().len(),
			metadata_keys,
		})
	}

	// -- Metadata ---------------------------------------------------------

	pub fn set_metadata(&mut self, path: &str, key: &str, value: serde_json::Value) -> Outcome<()> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::existing())?;
		if let Some(node) = self.arena.get_mut(id) {
			node.base_mut().metadata.insert(key.to_string(), value);
		}
		Ok(())
	}

	pub fn get_metadata(&self, path: &str, key: &str) -> Outcome<serde_json::Value> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::existing())?;
		self.fetch(id)?
			.metadata()
			.get(key)
			.cloned()
			.ok_or_else(|| VfsError::MetadataKeyNotFound {
				path: path.to_string(),
				key: key.to_string(),
			})
	}

	pub fn remove_metadata(&mut self, path: &str, key: &str) -> Outcome<serde_json::Value> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::existing())?;
		self.arena
			.get_mut(id)
			.and_then(|n| n.base_mut().metadata.remove(key))
			.ok_or_else(|| VfsError::MetadataKeyNotFound {
				path: path.to_string(),
				key: key.to_string(),
			})
	}

	/// Copy of every metadata entry on the node.
	pub fn get_all_metadata(&self, path: &str) -> Outcome<HashMap<String, serde_json::Value>> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::existing())?;
		Ok(self.fetch(id)?.metadata().clone())
	}

	// -- Structural operations --------------------------------------------

	pub fn copy(&mut self, src: &str, dst: &str) -> Outcome<NodeId> {
		let src_path = VfsPath::parse(src);
		let dst_path = VfsPath::parse(dst);

		let src_id = self.lookup(&src_path, ResolveOptions::existing())?;
		let final_path = self.destination(src_id, &dst_path)?;
		if final_path.is_root() {
			return Err(VfsError::AlreadyExists(final_path.to_string()));
		}

		let target = self.locate(&final_path, true)?;
		self.assert_no_cycle(src_id, &target, &final_path)?;
		if target.occupant.is_some() {
			return Err(VfsError::AlreadyExists(final_path.to_string()));
		}

		let stats = self.subtree_stats(src_id)?;
		self.assert_creatable(&final_path, stats.height)?;
		self.assert_node_capacity(target.missing + stats.nodes)?;
		self.assert_total_size(stats.bytes)?;

		let parent = self.materialize_parents(&final_path, &target)?;
		self.clone_subtree(src_id, parent, Some(final_path.name().to_string()))
	}

	fn clone_subtree(&mut self, src: NodeId, parent: NodeId, rename: Option<String>) -> Outcome<NodeId> {
		let node = self.fetch(src)?;
		let mut base = node.base().clone();
		base.parent = None;
		if let Some(name) = rename {
			base.name = name;
		}
		let (copy, children) = match node {
			Node::File(f) => (Node::file(base, f.contents.clone()), Vec::new()),
			Node::Directory(d) => (Node::directory(base), d.children.clone()),
		};

		let size = copy.size();
		let is_file = copy.is_file();
		let id = self.attach_new(parent, copy)?;
		if is_file {
			self.file_count += 1;
			self.total_size += size;
		} else {
			self.dir_count += 1;
		}

		for child in children {
			self.clone_subtree(child, id, None)?;
		}
		Ok(id)
	}

	/// Move a node, keeping its identity. `move` is reserved in Rust.
	pub fn move_node(&mut self, src: &str, dst: &str) -> Outcome<NodeId> {
		let src_path = VfsPath::parse(src);
		let dst_path = VfsPath::parse(dst);
		if src_path.is_root() {
			return Err(VfsError::RootOperation("move".to_string()));
		}

		let src_id = self.lookup(&src_path, ResolveOptions::existing())?;
		let final_path = self.destination(src_id, &dst_path)?;
		if final_path.is_root() {
			return Err(VfsError::AlreadyExists(final_path.to_string()));
		}

		let target = self.locate(&final_path, true)?;
		self.assert_no_cycle(src_id, &target, &final_path)?;
		match target.occupant {
			Some(id) if id == src_id => return Ok(src_id),
			Some(_) => return Err(VfsError::AlreadyExists(final_path.to_string())),
			None => {}
		}

		let stats = self.subtree_stats(src_id)?;
		self.assert_creatable(&final_path, stats.height)?;
		self.assert_node_capacity(target.missing)?;

		let parent = self.materialize_parents(&final_path, &target)?;
		self.relocate(src_id, parent, final_path.name())?;
		Ok(src_id)
	}

	/// Detach, rename and reattach. A failed attach puts the node back where it was.
	fn relocate(&mut self, id: NodeId, new_parent: NodeId, new_name: &str) -> Outcome<()> {
		let node = self.fetch(id)?;
		let old_name = node.name().to_string();
		let old_parent = node
			.parent()
			.ok_or_else(|| VfsError::RootOperation("move".to_string()))?;

		let index = self.detach(old_parent, id)?;
		if let Some(node) = self.arena.get_mut(id) {
			node.base_mut().name = new_name.to_string();
		}

		if let Err(e) = self.attach(new_parent, id) {
			if let Some(node) = self.arena.get_mut(id) {
				let base = node.base_mut();
				base.name = old_name;
				base.parent = Some(old_parent);
			}
			if let Some(dir) = self.arena.get_mut(old_parent).and_then(Node::as_dir_mut) {
				let at = index.min(dir.children.len());
				dir.children.insert(at, id);
			}
			return Err(e);
		}
		Ok(())
	}

	pub fn delete(&mut self, path: &str, recursive: bool) -> Outcome<()> {
		let path = VfsPath::parse(path);
		if path.is_root() {
			return Err(VfsError::RootOperation("delete".to_string()));
		}

		let id = self.lookup(&path, ResolveOptions::existing())?;
		let node = self.fetch(id)?;
		if !node.children().is_empty() && !recursive {
			return Err(VfsError::NotEmpty(path.to_string()));
		}
		let parent = node
			.parent()
			.ok_or_else(|| VfsError::RootOperation("delete".to_string()))?;

		self.detach(parent, id)?;
		self.free_subtree(id);
		Ok(())
	}

	/// Drop everything except an empty root.
	pub fn clear(&mut self) {
		self.arena.clear();
		self.root = self.arena.insert(Node::directory(NodeBase::new("", None)));
		self.total_size = 0;
		self.file_count = 0;
		self.dir_count = 1;
	}

	// -- Query operations -------------------------------------------------

	/// Every file under the root as `(path, id)`, depth first in child order.
	fn files(&self) -> Vec<(String, NodeId)> {
		let mut out = Vec::new();
		let mut stack = vec![(String::new(), self.root)];
		while let Some((prefix, id)) = stack.pop() {
			let Some(node) = self.arena.get(id) else {
				continue;
			};
			match node {
				Node::File(_) => out.push((prefix, id)),
				Node::Directory(d) => {
					for child in d.children.iter().rev() {
						if let Some(c) = self.arena.get(*child) {
							stack.push((format!("{}/{}", prefix, c.name()), *child));
						}
					}
				}
			}
		}
		out
	}

	pub fn glob(&self, patterns: &[String]) -> Vec<String> {
		let mut positive_patterns: Vec<&str> = Vec::new();
		let mut negative_patterns: Vec<&str> = Vec::new();

		for p in patterns {
			if let Some(stripped) = p.strip_prefix('!') {
				negative_patterns.push(stripped);
			} else {
				positive_patterns.push(p);
			}
		}

		let match_all = positive_patterns.is_empty();

		let mut results: Vec<String> = self
			.files()
			.into_iter()
			.map(|(path, _)| path)
			.filter(|path| match_all || positive_patterns.iter().any(|p| match_glob(path, p)))
			.filter(|path| !negative_patterns.iter().any(|p| match_glob(path, p)))
			.collect();
		results.sort();
		results
	}

	pub fn tree(&self, root_path: Option<&str>) -> Outcome<String> {
		let path = VfsPath::parse(root_path.unwrap_or(ROOT));
		let id = self.lookup(&path, ResolveOptions::directory())?;

		let mut lines: Vec<String> = Vec::new();
		lines.push(if path.is_root() {
			ROOT.to_string()
		} else {
			path.name().to_string()
		});

		self.build_tree(id, "", &mut lines)?;

		Ok(lines.join("\n"))
	}

	fn build_tree(&self, dir: NodeId, prefix: &str, lines: &mut Vec<String>) -> Outcome<()> {
		let children = self.fetch(dir)?.children();

		for (i, child) in children.iter().enumerate() {
			let child_node = self.fetch(*child)?;
			let is_last = i == children.len() - 1;
			let connector = if is_last {
				"\u{2514}\u{2500}\u{2500} "
			} else {
				"\u{251C}\u{2500}\u{2500} "
			};
			let child_prefix = if is_last {
				"    "
			} else {
				"\u{2502}   "
			};

			if child_node.is_dir() {
				lines.push(format!("{}{}{}/", prefix, connector, child_node.name()));
				self.build_tree(*child, &format!("{}{}", prefix, child_prefix), lines)?;
			} else {
				lines.push(format!(
					"{}{}{} ({} bytes)",
					prefix,
					connector,
					child_node.name(),
					child_node.size()
				));
			}
		}
		Ok(())
	}

	pub fn du(&self, path: &str) -> Outcome<u64> {
		let path = VfsPath::parse(path);
		let id = self.lookup(&path, ResolveOptions::existing())?;
		Ok(self.subtree_stats(id)?.bytes)
	}

	pub fn search(&self, query: &str, options: SearchOpts) -> Outcome<SearchOutput> {
		let compiled_regex = if options.mode == SearchMode::Regex {
			Some(Regex::new(query).map_err(|e| VfsError::InvalidPattern(format!("Invalid regex: {}", e)))?)
		} else {
			None
		};

		let search_opts = SearchOptions {
			max_results: options.max_results,
			mode: options.mode.clone(),
			context_before: options.context_before,
			context_after: options.context_after,
			count_only: options.count_only,
		};

		let mut count: usize = 0;
		let mut results: Vec<SearchMatch> = Vec::new();

		for (path, id) in self.files() {
			if !options.count_only && results.len() >= options.max_results {
				break;
			}
			if let Some(ref glob_pattern) = options.glob {
				if !match_glob(&path, glob_pattern) {
					continue;
				}
			}

			let Some(file) = self.arena.get(id).and_then(Node::as_file) else {
				continue;
			};
			let hit_limit = search_text(
				&path,
				&file.contents,
				query,
				&search_opts,
				compiled_regex.as_ref(),
				&mut count,
				&mut results,
			);
			if hit_limit {
				break;
			}
		}

		if options.count_only {
			Ok(SearchOutput::Count(count))
		} else {
			Ok(SearchOutput::Results(results))
		}
	}

	// -- Metrics ----------------------------------------------------------

	pub fn metrics(&self) -> Metrics {
		Metrics {
			total_size: self.total_size,
			node_count: self.arena.len(),
			file_count: self.file_count,
			directory_count: self.dir_count,
		}
	}
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;

	fn counters(fs: &FileSystem) -> (usize, usize, usize, u64) {
		let m = fs.metrics();
		(m.node_count, m.file_count, m.directory_count, m.total_size)
	}

	#[test]
	fn counters_follow_copy_move_delete() {
		let mut fs = FileSystem::new();
		fs.write_file("/a/b/c.txt", "abc", true).unwrap();
		assert_eq!(counters(&fs), (4, 1, 3, 3));

		fs.copy("/a", "/z").unwrap();
		assert_eq!(counters(&fs), (7, 2, 5, 6));

		fs.move_node("/z/b", "/moved").unwrap();
		assert_eq!(counters(&fs), (7, 2, 5, 6));

		fs.delete("/a", true).unwrap();
		assert_eq!(counters(&fs), (4, 1, 3, 3));

		fs.clear();
		assert_eq!(counters(&fs), (1, 0, 1, 0));
	}

	#[test]
	fn locate_reports_missing_parents() {
		let mut fs = FileSystem::new();
		fs.mkdir("/a", false).unwrap();
		let target = fs.locate(&VfsPath::parse("/a/b/c/d"), true).unwrap();
		assert_eq!(fs.path_of(target.deepest).as_deref(), Some("/a"));
		assert_eq!(target.missing, 2);
		assert!(target.occupant.is_none());
	}

	#[test]
	fn move_onto_itself_is_a_no_op() {
		let mut fs = FileSystem::new();
		let id = fs.write_file("/f", "x", false).unwrap();
		fs.mkdir("/d", false).unwrap();
		assert_eq!(fs.move_node("/f", "/f").unwrap(), id);
		assert_eq!(fs.list_dir("/").unwrap(), vec!["f", "d"]);
	}

	#[test]
	fn stat_sums_directory_contents() {
		let mut fs = FileSystem::new();
		fs.write_file("/log/a", "1234", true).unwrap();
		fs.write_file("/log/sub/b", "56", true).unwrap();

		let stat = fs.stat("/log").unwrap();
		assert_eq!(stat.kind, NodeKind::Directory);
		assert_eq!(stat.size, 6);
		assert_eq!(stat.children, 2);
		assert_eq!(fs.stat("/log/a").unwrap().size, 4);
	}

	#[test]
	fn tree_of_subdirectory_uses_its_name() {
		let mut fs = FileSystem::new();
		fs.write_file("/bay/cove", "", true).unwrap();
		assert_eq!(
			fs.tree(Some("/bay")).unwrap(),
			"bay\n\u{2514}\u{2500}\u{2500} cove (0 bytes)"
		);
		assert!(matches!(fs.tree(Some("/bay/cove")), Err(VfsError::NotADirectory(_))));
	}

	#[test]
	fn search_respects_glob_and_cap() {
		let mut fs = FileSystem::new();
		fs.write_file("/a.txt", "net\nnet\nnet", false).unwrap();
		fs.write_file("/b.md", "net", false).unwrap();

		let opts = SearchOpts {
			glob: Some("*.md".to_string()),
			..SearchOpts::default()
		};
		match fs.search("net", opts).unwrap() {
			SearchOutput::Results(r) => {
				assert_eq!(r.len(), 1);
				assert_eq!(r[0].path, "/b.md");
			}
			SearchOutput::Count(_) => panic!("expected results"),
		}

		let opts = SearchOpts {
			max_results: 2,
			..SearchOpts::default()
		};
		match fs.search("net", opts).unwrap() {
			SearchOutput::Results(r) => assert_eq!(r.len(), 2),
			SearchOutput::Count(_) => panic!("expected results"),
		}
	}

	#[test]
	fn failed_append_changes_nothing() {
		let mut fs = FileSystem::with_limits(VfsLimits {
			max_file_size: 4,
			..VfsLimits::default()
		});
		fs.write_file("/f", "abc", false).unwrap();
		assert!(matches!(fs.append_file("/f", "de"), Err(VfsError::LimitExceeded(_))));
		assert_eq!(fs.read_file("/f").unwrap(), "abc");
		assert_eq!(fs.metrics().total_size, 3);
	}

	#[test]
	fn creation_metadata_applies_only_to_new_nodes() {
		let mut fs = FileSystem::new();
		let seed: HashMap<String, serde_json::Value> =
			[("locked".to_string(), serde_json::json!(true))].into_iter().collect();

		fs.mkdir_with_metadata("/islands/island2", true, Some(seed.clone()))
			.unwrap();
		assert_eq!(fs.get_all_metadata("/islands/island2").unwrap(), seed);
		assert!(fs.get_all_metadata("/islands").unwrap().is_empty());

		let other: HashMap<String, serde_json::Value> =
			[("visited".to_string(), serde_json::json!(1))].into_iter().collect();
		fs.mkdir_with_metadata("/islands/island2", false, Some(other.clone()))
			.unwrap();
		assert_eq!(fs.get_all_metadata("/islands/island2").unwrap(), seed);

		fs.write_file_with_metadata("/islands/island2/chest", "gold", false, Some(seed.clone()))
			.unwrap();
		fs.write_file_with_metadata("/islands/island2/chest", "empty", false, Some(other))
			.unwrap();
		assert_eq!(fs.read_file("/islands/island2/chest").unwrap(), "empty");
		assert_eq!(fs.get_all_metadata("/islands/island2/chest").unwrap(), seed);
	}

	#[test]
	fn failed_attach_puts_node_back_in_place() {
		let mut fs = FileSystem::new();
		for name in ["a", "b", "c"] {
			fs.write_file(&format!("/src/{}", name), name, true).unwrap();
		}
		fs.write_file("/dst/b", "other", true).unwrap();
		let before = fs.snapshot();

		let b = fs
			.lookup(&VfsPath::parse("/src/b"), ResolveOptions::existing())
			.unwrap();
		let dst = fs
			.lookup(&VfsPath::parse("/dst"), ResolveOptions::directory())
			.unwrap();

		assert!(matches!(fs.relocate(b, dst, "b"), Err(VfsError::AlreadyExists(_))));
		assert_eq!(fs.snapshot(), before);
		assert_eq!(fs.list_dir("/src").unwrap(), vec!["a", "b", "c"]);
		assert_eq!(fs.path_of(b).as_deref(), Some("/src/b"));
	}

	#[test]
	fn resolve_keeps_created_parents_when_final_is_missing() {
		let mut fs = FileSystem::new();
		let path = VfsPath::parse("/p/q/r");
		let opts = ResolveOptions::existing().create_parents(true);

		assert!(matches!(fs.resolve(&path, opts), Err(VfsError::NotFound(_))));
		assert!(fs.is_dir("/p/q"));
		assert!(!fs.exists("/p/q/r"));
	}

	#[test]
	fn moving_directory_onto_itself_is_a_cycle() {
		let mut fs = FileSystem::new();
		fs.mkdir("/d", false).unwrap();
		let before = fs.snapshot();

		assert!(matches!(fs.move_node("/d", "/d"), Err(VfsError::Cycle { .. })));
		assert_eq!(fs.snapshot(), before);
	}
}
