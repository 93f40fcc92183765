use std::fmt;
use std::str::FromStr;

// ── Constants ───────────────────────────────────────────────────────────────

pub const SEPARATOR: char = '/';
pub const ROOT: &str = "/";

// ── Limits ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VfsLimits {
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub max_path_depth: usize,
    pub max_name_length: usize,
    pub max_node_count: usize,
}

impl Default for VfsLimits {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,  // 10 MB
            max_total_size: 100 * 1024 * 1024, // 100 MB
            max_path_depth: 32,
            max_name_length: 255,
            max_node_count: 10_000,
        }
    }
}

// ── VfsPath ─────────────────────────────────────────────────────────────────

/// A parsed, normalized slash-separated location.
///
/// Parsing never fails: repeated and trailing separators collapse, `.` is
/// dropped and `..` pops the previous component, stopping at the root.
/// Equality compares the normalized components only.
#[derive(Debug, Clone)]
pub struct VfsPath {
    raw: String,
    components: Vec<String>,
    absolute: bool,
}

impl VfsPath {
    pub fn parse(raw: &str) -> Self {
        let mut components: Vec<String> = Vec::new();
        for token in raw.split(SEPARATOR) {
            match token {
                "" | "." => continue,
                ".." => {
                    components.pop();
                }
                other => components.push(other.to_string()),
            }
        }

        Self {
            raw: raw.to_string(),
            components,
            absolute: raw.starts_with(SEPARATOR),
        }
    }

    pub fn root() -> Self {
        Self::parse(ROOT)
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Whether the input string began with the separator.
    pub fn is_absolute(&self) -> bool {
        self.absolute
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Final component, or `""` for the root.
    pub fn name(&self) -> &str {
        self.components.last().map(String::as_str).unwrap_or("")
    }

    /// Path with the final component removed. The root is its own parent.
    pub fn parent(&self) -> VfsPath {
        let mut components = self.components.clone();
        components.pop();
        Self::from_components(components)
    }

    /// Resolve `rel` against this path. Absolute inputs replace it outright.
    pub fn join(&self, rel: &str) -> VfsPath {
        if rel.starts_with(SEPARATOR) {
            return Self::parse(rel);
        }
        Self::parse(&format!("{}{}{}", self, SEPARATOR, rel))
    }

    /// Canonical path of the first `count` components.
    pub fn prefix(&self, count: usize) -> VfsPath {
        let end = count.min(self.components.len());
        Self::from_components(self.components[..end].to_vec())
    }

    fn from_components(components: Vec<String>) -> Self {
        let raw = render(&components);
        Self {
            raw,
            components,
            absolute: true,
        }
    }
}

fn render(components: &[String]) -> String {
    if components.is_empty() {
        ROOT.to_string()
    } else {
        format!("{}{}", SEPARATOR, components.join(ROOT))
    }
}

impl fmt::Display for VfsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(&self.components))
    }
}

impl PartialEq for VfsPath {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for VfsPath {}

impl FromStr for VfsPath {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<&str> for VfsPath {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

// ── Validation ──────────────────────────────────────────────────────────────

/// Check if a name contains control characters.
fn has_forbidden_chars(name: &str) -> bool {
    name.chars().any(char::is_control)
}

/// Validate the name of a node about to be created. Returns `Some(error_message)` if invalid.
pub fn validate_name(name: &str, max_name_length: usize) -> Option<String> {
    if name.is_empty() {
        return Some("Name cannot be empty".to_string());
    }
    if name == "." || name == ".." {
        return Some(format!("Reserved name: {}", name));
    }
    if name.contains(SEPARATOR) {
        return Some(format!("Name contains a separator: {}", name));
    }
    if name.len() > max_name_length {
        return Some(format!(
            "Name exceeds max length ({}): {}",
            max_name_length, name
        ));
    }
    if has_forbidden_chars(name) {
        return Some("Name contains forbidden characters".to_string());
    }
    None
}

// ── Tests ───────────────────────────────────────────────────────────────────
