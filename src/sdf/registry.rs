use super::{DeviceDescription, SdfError};
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Reference key inside SDF documents
const SDF_REF: &str = "sdfRef";

/// Marker for a reference into the current document
const SELF_DOCUMENT: &str = "#";

/// Resolves device class names into fully expanded self-descriptions.
///
/// Raw documents are cached by file name; once inserted an entry is never
/// replaced, so concurrent readers always see the same parsed document.
pub struct SdfRegistry {
    directory: PathBuf,
    documents: DashMap<String, Arc<Value>>,
    descriptions: DashMap<String, Arc<DeviceDescription>>,
}

/// Parsed `sdfRef` token
#[derive(Debug, Clone, PartialEq)]
pub struct SdfReference {
    /// Target file, `None` for a self-reference
    pub file: Option<String>,
    /// Path segments inside the target document
    pub path: Vec<String>,
}

impl SdfReference {
    /// Parse `<file>/<dotted.path>` or `#/<dotted.path>`.
    ///
    /// Slashes after the file part are treated like dots.
    pub fn parse(token: &str) -> Result<Self, SdfError> {
        let (file, inner) = token
            .split_once('/')
            .ok_or_else(|| SdfError::InvalidReference(token.to_string()))?;
        if file.is_empty() {
            return Err(SdfError::InvalidReference(token.to_string()));
        }

        let path: Vec<String> = inner
            .split(['.', '/'])
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if path.is_empty() {
            return Err(SdfError::InvalidReference(token.to_string()));
        }

        Ok(Self {
            file: (file != SELF_DOCUMENT).then(|| file.to_string()),
            path,
        })
    }
}

/// Per-call resolution state
struct Resolution {
    /// `(file, path)` pairs currently being expanded
    stack: Vec<(String, String)>,
    /// Already expanded targets
    resolved: HashMap<(String, String), Value>,
}

impl SdfRegistry {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            documents: DashMap::new(),
            descriptions: DashMap::new(),
        }
    }

    /// Typed description of a device class (cached)
    pub fn describe(&self, class_name: &str) -> Result<Arc<DeviceDescription>, SdfError> {
        if let Some(description) = self.descriptions.get(class_name) {
            return Ok(Arc::clone(description.value()));
        }

        let tree = self.resolve(class_name)?;
        let description = Arc::new(DeviceDescription::from_resolved(class_name, &tree)?);
        let entry = self
            .descriptions
            .entry(class_name.to_string())
            .or_insert(description);
        Ok(Arc::clone(entry.value()))
    }

    /// Fully resolved description tree for a device class
    pub fn resolve(&self, class_name: &str) -> Result<Value, SdfError> {
        let file = document_file_name(class_name)?;
        let document = self.load_document(&file)?;
        self.resolve_document(&file, document)
    }

    /// Resolve every reference in `document`, which is treated as file `file_name`.
    ///
    /// A document without references is returned unchanged.
    pub fn resolve_document(&self, file_name: &str, document: Arc<Value>) -> Result<Value, SdfError> {
        let mut state = Resolution {
            stack: Vec::new(),
            resolved: HashMap::new(),
        };
        let file = document_file_name(file_name)?;
        self.resolve_node(&document, &file, &document, &mut state)
    }

    /// Load and cache a raw document by file name
    pub fn load_document(&self, file_name: &str) -> Result<Arc<Value>, SdfError> {
        let file = document_file_name(file_name)?;
        if let Some(document) = self.documents.get(&file) {
            return Ok(Arc::clone(document.value()));
        }

        let path = self.directory.join(&file);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SdfError::NotFound(file.clone())
            } else {
                SdfError::Io {
                    file: file.clone(),
                    message: e.to_string(),
                }
            }
        })?;
        let document: Value = serde_json::from_str(&contents).map_err(|e| SdfError::Parse {
            file: file.clone(),
            message: e.to_string(),
        })?;

        debug!(file = %file, "Loaded self-description document");

        let entry = self.documents.entry(file).or_insert(Arc::new(document));
        Ok(Arc::clone(entry.value()))
    }

    fn resolve_node(
        &self,
        node: &Value,
        file: &str,
        document: &Arc<Value>,
        state: &mut Resolution,
    ) -> Result<Value, SdfError> {
        match node {
            Value::Object(map) => match map.get(SDF_REF) {
                Some(token) => self.resolve_reference(map, token, file, document, state),
                None => {
                    let mut out = Map::with_capacity(map.len());
                    for (key, value) in map {
                        out.insert(key.clone(), self.resolve_node(value, file, document, state)?);
                    }
                    Ok(Value::Object(out))
                }
            },
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve_node(item, file, document, state))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            other => Ok(other.clone()),
        }
    }

    /// Replace the object holding `sdfRef` with the referenced sub-tree.
    ///
    /// Sibling keys of `sdfRef` are kept and override referenced keys.
    fn resolve_reference(
        &self,
        holder: &Map<String, Value>,
        token: &Value,
        file: &str,
        document: &Arc<Value>,
        state: &mut Resolution,
    ) -> Result<Value, SdfError> {
        let token = token
            .as_str()
            .ok_or_else(|| SdfError::InvalidReference(token.to_string()))?;
        let reference = SdfReference::parse(token)?;

        let (target_file, target_document) = match &reference.file {
            None => (file.to_string(), Arc::clone(document)),
            Some(name) => {
                let name = document_file_name(name)?;
                let doc = self.load_document(&name)?;
                (name, doc)
            }
        };

        let key = (target_file.clone(), reference.path.join("."));
        let target = match state.resolved.get(&key) {
            Some(done) => done.clone(),
            None => {
                if state.stack.contains(&key) {
                    return Err(SdfError::Cycle(token.to_string()));
                }
                let raw = lookup(&target_document, &reference.path)
                    .ok_or_else(|| SdfError::Unresolved(token.to_string()))?;

                state.stack.push(key.clone());
                let expanded = self.resolve_node(raw, &target_file, &target_document, state);
                state.stack.pop();
                let expanded = expanded?;

                state.resolved.insert(key, expanded.clone());
                expanded
            }
        };

        let overrides: Vec<_> = holder.iter().filter(|(k, _)| k.as_str() != SDF_REF).collect();
        if overrides.is_empty() {
            return Ok(target);
        }

        let mut merged = match target {
            Value::Object(map) => map,
            _ => return Err(SdfError::InvalidReference(token.to_string())),
        };
        for (key, value) in overrides {
            merged.insert(key.clone(), self.resolve_node(value, file, document, state)?);
        }
        Ok(Value::Object(merged))
    }
}

/// `<name>.json`, provided `name` stays inside the registry directory
fn document_file_name(name: &str) -> Result<String, SdfError> {
    let plain = !name.is_empty()
        && !name.contains(['/', '\\'])
        && !name.contains("..")
        && !Path::new(name).is_absolute();
    if !plain {
        return Err(SdfError::InvalidName(name.to_string()));
    }

    if name.ends_with(".json") {
        Ok(name.to_string())
    } else {
        Ok(format!("{}.json", name))
    }
}

fn lookup<'a>(document: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(document, |node, segment| node.get(segment.as_str()))
}
