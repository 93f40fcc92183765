// ---------------------------------------------------------------------------
// VfsServer: JSON-RPC dispatcher
// ---------------------------------------------------------------------------
//
// Reads one JSON-RPC 2.0 request per line, routes it to a FileSystem
// operation through `dispatch()`, and answers on the transport.
// ---------------------------------------------------------------------------

use std::io::{BufRead, Write};

use crate::error::VfsError;
use crate::path::VfsLimits;
use crate::protocol::*;
use crate::transport::NdjsonTransport;
use crate::vfs::{FileSystem, SearchOpts, SearchOutput};

type HandlerResult = Result<serde_json::Value, VfsError>;

/// JSON-RPC server that owns one [`FileSystem`].
pub struct VfsServer<W: Write> {
	transport: NdjsonTransport<W>,
	fs: FileSystem,
	/// Limits from the command line; `initialize` overrides start from these.
	defaults: VfsLimits,
}

impl<W: Write> VfsServer<W> {
	pub fn new(transport: NdjsonTransport<W>, defaults: VfsLimits) -> Self {
		Self {
			transport,
			fs: FileSystem::with_limits(defaults.clone()),
			defaults,
		}
	}

	pub fn into_writer(self) -> W {
		self.transport.into_inner()
	}

	/// Main loop: one request per line until EOF.
	pub fn run<R: BufRead>(&mut self, reader: R) -> Result<(), VfsError> {
		for line_result in reader.lines() {
			let line = line_result?;
			if line.trim().is_empty() {
				continue;
			}

			let request: JsonRpcRequest = match serde_json::from_str(&line) {
				Ok(r) => r,
				Err(e) => {
					tracing::warn!("Failed to parse request: {}", e);
					self.transport.write_error(
						0,
						PARSE_ERROR,
						format!("Parse error: {}", e),
						None,
					);
					continue;
				}
			};

			self.dispatch(request);
		}

		tracing::info!("stdin closed, shutting down");
		Ok(())
	}

	// ── Dispatch ──────────────────────────────────────────────────────────

	fn dispatch(&mut self, req: JsonRpcRequest) {
		let id = req.id;
		tracing::debug!(id, method = %req.method, "request");

		let fs = &mut self.fs;
		let result = match req.method.as_str() {
			// -- Lifecycle -----------------------------------------------
			"initialize" => handle_initialize(fs, &self.defaults, req.params),

			// -- Files ---------------------------------------------------
			"fs/readFile" => handle_read_file(fs, req.params),
			"fs/writeFile" => handle_write_file(fs, req.params),
			"fs/appendFile" => handle_append_file(fs, req.params),
			"fs/touch" => handle_touch(fs, req.params),

			// -- Directories ---------------------------------------------
			"fs/mkdir" => handle_mkdir(fs, req.params),
			"fs/listDir" => handle_list_dir(fs, req.params),
			"fs/entries" => handle_entries(fs, req.params),

			// -- Navigation ----------------------------------------------
			"fs/exists" => parse_params::<PathParams>(req.params)
				.map(|p| serde_json::json!({ "exists": fs.exists(&p.path) })),
			"fs/isFile" => parse_params::<PathParams>(req.params)
				.map(|p| serde_json::json!({ "isFile": fs.is_file(&p.path) })),
			"fs/isDir" => parse_params::<PathParams>(req.params)
				.map(|p| serde_json::json!({ "isDir": fs.is_dir(&p.path) })),
			"fs/stat" => handle_stat(fs, req.params),

			// -- Structure -----------------------------------------------
			"fs/copy" => handle_copy(fs, req.params),
			"fs/move" => handle_move(fs, req.params),
			"fs/delete" => handle_delete(fs, req.params),
			"fs/clear" => {
				fs.clear();
				Ok(serde_json::json!({}))
			}

			// -- Metadata ------------------------------------------------
			"meta/set" => handle_set_metadata(fs, req.params),
			"meta/get" => handle_get_metadata(fs, req.params),
			"meta/remove" => handle_remove_metadata(fs, req.params),
			"meta/getAll" => handle_get_all_metadata(fs, req.params),

			// -- Query ---------------------------------------------------
			"query/tree" => handle_tree(fs, req.params),
			"query/du" => handle_du(fs, req.params),
			"query/glob" => handle_glob(fs, req.params),
			"query/search" => handle_search(fs, req.params),
			"query/metrics" => Ok(serde_json::json!(fs.metrics())),

			// -- Snapshot ------------------------------------------------
			"snapshot/save" => Ok(serde_json::json!({ "snapshot": fs.snapshot() })),
			"snapshot/restore" => handle_restore(fs, req.params),

			// -- Unknown -------------------------------------------------
			_ => {
				self.transport.write_error(
					id,
					METHOD_NOT_FOUND,
					format!("Unknown method: {}", req.method),
					None,
				);
				return;
			}
		};

		match result {
			Ok(value) => self.transport.write_response(id, value),
			Err(VfsError::Json(e)) => {
				self.transport
					.write_error(id, INVALID_PARAMS, format!("Invalid params: {}", e), None)
			}
			Err(e) => {
				tracing::debug!(id, code = e.code(), "{}", e);
				self.transport.write_error(
					id,
					VFS_ERROR,
					e.to_string(),
					Some(e.to_json_rpc_error()),
				)
			}
		}
	}
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, VfsError> {
	Ok(serde_json::from_value(params)?)
}

/// Start over with an empty tree, optionally with different limits.
fn handle_initialize(
	fs: &mut FileSystem,
	defaults: &VfsLimits,
	params: serde_json::Value,
) -> HandlerResult {
	let p: InitializeParams = if params.is_null() {
		InitializeParams::default()
	} else {
		parse_params(params)?
	};
	let overrides = p.limits.unwrap_or_default();
	let limits = VfsLimits {
		max_file_size: overrides.max_file_size.unwrap_or(defaults.max_file_size),
		max_total_size: overrides.max_total_size.unwrap_or(defaults.max_total_size),
		max_path_depth: overrides.max_path_depth.unwrap_or(defaults.max_path_depth),
		max_name_length: overrides.max_name_length.unwrap_or(defaults.max_name_length),
		max_node_count: overrides.max_node_count.unwrap_or(defaults.max_node_count),
	};
	tracing::info!(?limits, "filesystem initialized");
	*fs = FileSystem::with_limits(limits);
	Ok(serde_json::json!({}))
}

fn path_result(fs: &FileSystem, id: crate::node::NodeId) -> HandlerResult {
	Ok(serde_json::json!({ "path": fs.path_of(id) }))
}

fn handle_read_file(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	let contents = fs.read_file(&p.path)?;
	Ok(serde_json::json!({ "contents": contents }))
}

fn handle_write_file(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: WriteFileParams = parse_params(params)?;
	let id = fs.write_file_with_metadata(
		&p.path,
		&p.contents,
		p.create_parents.unwrap_or(false),
		p.metadata,
	)?;
	path_result(fs, id)
}

fn handle_append_file(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: AppendFileParams = parse_params(params)?;
	let id = fs.append_file(&p.path, &p.contents)?;
	path_result(fs, id)
}

fn handle_touch(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	let id = fs.touch(&p.path)?;
	path_result(fs, id)
}

fn handle_mkdir(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: MkdirParams = parse_params(params)?;
	let id = fs.mkdir_with_metadata(&p.path, p.create_parents.unwrap_or(false), p.metadata)?;
	path_result(fs, id)
}

fn handle_list_dir(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	let names = fs.list_dir(&p.path)?;
	Ok(serde_json::json!({ "names": names }))
}

fn handle_entries(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	let entries = fs.entries(&p.path)?;
	Ok(serde_json::json!({ "entries": entries }))
}

fn handle_stat(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	Ok(serde_json::json!(fs.stat(&p.path)?))
}

fn handle_copy(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: TransferParams = parse_params(params)?;
	let id = fs.copy(&p.src, &p.dst)?;
	path_result(fs, id)
}

fn handle_move(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: TransferParams = parse_params(params)?;
	let id = fs.move_node(&p.src, &p.dst)?;
	path_result(fs, id)
}

fn handle_delete(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: DeleteParams = parse_params(params)?;
	fs.delete(&p.path, p.recursive.unwrap_or(false))?;
	Ok(serde_json::json!({}))
}

fn handle_set_metadata(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: SetMetadataParams = parse_params(params)?;
	fs.set_metadata(&p.path, &p.key, p.value)?;
	Ok(serde_json::json!({}))
}

fn handle_get_metadata(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: MetadataKeyParams = parse_params(params)?;
	let value = fs.get_metadata(&p.path, &p.key)?;
	Ok(serde_json::json!({ "value": value }))
}

fn handle_remove_metadata(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: MetadataKeyParams = parse_params(params)?;
	let value = fs.remove_metadata(&p.path, &p.key)?;
	Ok(serde_json::json!({ "value": value }))
}

fn handle_get_all_metadata(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	let metadata = fs.get_all_metadata(&p.path)?;
	Ok(serde_json::json!({ "metadata": metadata }))
}

fn handle_tree(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: OptionalPathParams = if params.is_null() {
		OptionalPathParams { path: None }
	} else {
		parse_params(params)?
	};
	let tree = fs.tree(p.path.as_deref())?;
	Ok(serde_json::json!({ "tree": tree }))
}

fn handle_du(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: PathParams = parse_params(params)?;
	let size = fs.du(&p.path)?;
	Ok(serde_json::json!({ "size": size }))
}

fn handle_glob(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: GlobParams = parse_params(params)?;
	let paths = fs.glob(&p.pattern.into_vec());
	Ok(serde_json::json!({ "paths": paths }))
}

fn handle_search(fs: &FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: SearchParams = parse_params(params)?;
	let defaults = SearchOpts::default();
	let opts = SearchOpts {
		glob: p.glob,
		max_results: p.max_results.unwrap_or(defaults.max_results),
		mode: p.mode.unwrap_or(defaults.mode),
		context_before: p.context_before.unwrap_or(defaults.context_before),
		context_after: p.context_after.unwrap_or(defaults.context_after),
		count_only: p.count_only.unwrap_or(defaults.count_only),
	};
	match fs.search(&p.query, opts)? {
		SearchOutput::Results(matches) => Ok(serde_json::json!({ "matches": matches })),
		SearchOutput::Count(count) => Ok(serde_json::json!({ "count": count })),
	}
}

fn handle_restore(fs: &mut FileSystem, params: serde_json::Value) -> HandlerResult {
	let p: RestoreParams = parse_params(params)?;
	fs.restore(p.snapshot)?;
	Ok(serde_json::json!({}))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::{json, Value};

	fn exchange(requests: &[Value]) -> Vec<Value> {
		let input: String = requests.iter().map(|r| format!("{}\n", r)).collect();
		let mut server = VfsServer::new(NdjsonTransport::new(Vec::new()), VfsLimits::default());
		server.run(input.as_bytes()).unwrap();
		let out = String::from_utf8(server.into_writer()).unwrap();
		out.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
	}

	fn request(id: u64, method: &str, params: Value) -> Value {
		json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params })
	}

	#[test]
	fn write_then_read() {
		let replies = exchange(&[
			request(1, "fs/writeFile", json!({ "path": "/a/b.txt", "contents": "bait", "createParents": true })),
			request(2, "fs/readFile", json!({ "path": "/a/b.txt" })),
		]);
		assert_eq!(replies[0]["result"]["path"], "/a/b.txt");
		assert_eq!(replies[1]["result"]["contents"], "bait");
	}

	#[test]
	fn unknown_method_is_method_not_found() {
		let replies = exchange(&[request(9, "fs/teleport", json!({}))]);
		assert_eq!(replies[0]["id"], 9);
		assert_eq!(replies[0]["error"]["code"], METHOD_NOT_FOUND);
	}

	#[test]
	fn missing_params_are_invalid_params() {
		let replies = exchange(&[request(3, "fs/readFile", json!({}))]);
		assert_eq!(replies[0]["error"]["code"], INVALID_PARAMS);
	}

	#[test]
	fn filesystem_errors_carry_vfs_code() {
		let replies = exchange(&[request(4, "fs/readFile", json!({ "path": "/nope" }))]);
		assert_eq!(replies[0]["error"]["code"], VFS_ERROR);
		assert_eq!(replies[0]["error"]["data"]["vfsCode"], "VFS_NOT_FOUND");
	}

	#[test]
	fn garbage_line_gets_parse_error_and_loop_continues() {
		let mut server = VfsServer::new(NdjsonTransport::new(Vec::new()), VfsLimits::default());
		let input = "not json\n{\"id\":5,\"method\":\"query/metrics\"}\n";
		server.run(input.as_bytes()).unwrap();
		let out = String::from_utf8(server.into_writer()).unwrap();
		let replies: Vec<Value> = out.lines().map(|l| serde_json::from_str(l).unwrap()).collect();

		assert_eq!(replies[0]["id"], 0);
		assert_eq!(replies[0]["error"]["code"], PARSE_ERROR);
		assert_eq!(replies[1]["result"]["nodeCount"], 1);
	}

	#[test]
	fn initialize_applies_limit_overrides() {
		let replies = exchange(&[
			request(1, "fs/mkdir", json!({ "path": "/old" })),
			request(2, "initialize", json!({ "limits": { "maxNodeCount": 2 } })),
			request(3, "fs/exists", json!({ "path": "/old" })),
			request(4, "fs/mkdir", json!({ "path": "/one" })),
			request(5, "fs/mkdir", json!({ "path": "/two" })),
		]);
		assert_eq!(replies[2]["result"]["exists"], false);
		assert!(replies[3].get("result").is_some());
		assert_eq!(replies[4]["error"]["data"]["vfsCode"], "VFS_LIMIT_EXCEEDED");
	}

	#[test]
	fn search_count_only() {
		let replies = exchange(&[
			request(1, "fs/writeFile", json!({ "path": "/log", "contents": "cod\ncod\neel" })),
			request(2, "query/search", json!({ "query": "cod", "countOnly": true })),
			request(3, "query/search", json!({ "query": "e+l", "mode": "regex" })),
		]);
		assert_eq!(replies[1]["result"]["count"], 2);
		assert_eq!(replies[2]["result"]["matches"][0]["line"], 3);
	}

	#[test]
	fn snapshot_save_and_restore() {
		let replies = exchange(&[
			request(1, "fs/writeFile", json!({ "path": "/keep", "contents": "x" })),
			request(2, "snapshot/save", Value::Null),
			request(3, "fs/clear", Value::Null),
			request(4, "snapshot/restore", json!({ "snapshot": {
				"root": { "name": "", "kind": "directory", "children": [
					{ "name": "keep", "kind": "file", "contents": "x" }
				]}
			}})),
			request(5, "fs/readFile", json!({ "path": "/keep" })),
		]);
		assert_eq!(replies[1]["result"]["snapshot"]["root"]["children"][0]["name"], "keep");
		assert_eq!(replies[4]["result"]["contents"], "x");
	}

	#[test]
	fn creation_metadata_over_the_wire() {
		let replies = exchange(&[
			request(1, "fs/mkdir", json!({ "path": "/isle", "metadata": { "locked": true } })),
			request(2, "fs/writeFile", json!({ "path": "/isle/map", "contents": "x", "metadata": { "owner": "gull" } })),
			request(3, "fs/writeFile", json!({ "path": "/isle/map", "contents": "y", "metadata": { "owner": "crab" } })),
			request(4, "meta/getAll", json!({ "path": "/isle" })),
			request(5, "meta/get", json!({ "path": "/isle/map", "key": "owner" })),
		]);
		assert_eq!(replies[3]["result"]["metadata"], json!({ "locked": true }));
		assert_eq!(replies[4]["result"]["value"], "gull");
	}
}
