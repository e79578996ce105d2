//! Declarative endpoint definitions.

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};
use strum::Display;

use super::key;
use crate::cache::{CacheKey, Tag};
use crate::error::{DeskError, Result};
use crate::transport::request::{Method, MultipartForm, RequestBody, RequestDescriptor};

/// Reads are cached and provide tags; writes invalidate them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum EndpointKind {
    Query,
    Mutation,
}

/// Declared tag binding, resolved against call arguments and the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSpec {
    /// `{kind}:LIST`, always emitted (even for empty results).
    List(String),
    /// `{kind}:<args[arg]>`.
    Arg { kind: String, arg: String },
    /// `{kind}:{id}`.
    Fixed { kind: String, id: String },
    /// One `{kind}:<item[id_field]>` per element of the array at `pointer`.
    Items {
        kind: String,
        pointer: String,
        id_field: String,
    },
    /// `{kind}:<value at pointer>` in the response.
    Field { kind: String, pointer: String },
}

impl TagSpec {
    pub fn list(kind: impl Into<String>) -> Self {
        Self::List(kind.into())
    }

    pub fn arg(kind: impl Into<String>, arg: impl Into<String>) -> Self {
        Self::Arg {
            kind: kind.into(),
            arg: arg.into(),
        }
    }

    pub fn fixed(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Fixed {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn items(
        kind: impl Into<String>,
        pointer: impl Into<String>,
        id_field: impl Into<String>,
    ) -> Self {
        Self::Items {
            kind: kind.into(),
            pointer: pointer.into(),
            id_field: id_field.into(),
        }
    }

    pub fn field(kind: impl Into<String>, pointer: impl Into<String>) -> Self {
        Self::Field {
            kind: kind.into(),
            pointer: pointer.into(),
        }
    }

    fn resolve(&self, args: &Value, response: &Value, out: &mut Vec<Tag>) {
        match self {
            Self::List(kind) => out.push(Tag::list(kind.clone())),
            Self::Arg { kind, arg } => {
                if let Some(id) = args.get(arg).and_then(id_string) {
                    out.push(Tag::id(kind.clone(), id));
                }
            }
            Self::Fixed { kind, id } => out.push(Tag::id(kind.clone(), id.clone())),
            Self::Items {
                kind,
                pointer,
                id_field,
            } => {
                let items = response.pointer(pointer).and_then(Value::as_array);
                for item in items.into_iter().flatten() {
                    if let Some(id) = item.get(id_field).and_then(id_string) {
                        out.push(Tag::id(kind.clone(), id));
                    }
                }
            }
            Self::Field { kind, pointer } => {
                if let Some(id) = response.pointer(pointer).and_then(id_string) {
                    out.push(Tag::id(kind.clone(), id));
                }
            }
        }
    }
}

fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Resolved tags in declaration order, each at most once.
fn resolve_all(specs: &[TagSpec], args: &Value, response: &Value) -> Vec<Tag> {
    let mut tags = Vec::new();
    for spec in specs {
        spec.resolve(args, response, &mut tags);
    }
    let mut seen = HashSet::new();
    tags.retain(|tag| seen.insert(tag.clone()));
    tags
}

/// One named operation of the remote API.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDef {
    pub name: String,
    pub kind: EndpointKind,
    pub method: Method,
    /// Path with `{param}` placeholders filled from call arguments.
    pub path: String,
    pub provides: Vec<TagSpec>,
    pub invalidates: Vec<TagSpec>,
}

impl EndpointDef {
    /// A cached `GET`.
    pub fn query(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Query,
            method: Method::Get,
            path: path.into(),
            provides: Vec::new(),
            invalidates: Vec::new(),
        }
    }

    pub fn mutation(name: impl Into<String>, method: Method, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EndpointKind::Mutation,
            method,
            path: path.into(),
            provides: Vec::new(),
            invalidates: Vec::new(),
        }
    }

    pub fn provides(mut self, spec: TagSpec) -> Self {
        self.provides.push(spec);
        self
    }

    pub fn invalidates(mut self, spec: TagSpec) -> Self {
        self.invalidates.push(spec);
        self
    }

    pub fn provided_tags(&self, args: &Value, response: &Value) -> Vec<Tag> {
        resolve_all(&self.provides, args, response)
    }

    pub fn invalidated_tags(&self, args: &Value, response: &Value) -> Vec<Tag> {
        resolve_all(&self.invalidates, args, response)
    }

    /// Placeholder names in path order.
    pub fn path_params(&self) -> Vec<&str> {
        let mut params = Vec::new();
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            let Some(len) = rest[start..].find('}') else {
                break;
            };
            params.push(&rest[start + 1..start + len]);
            rest = &rest[start + len + 1..];
        }
        params
    }

    /// Fill placeholders, removing consumed arguments from `args`.
    ///
    /// Each value becomes exactly one percent-encoded segment; `/`, `.` and
    /// `..` are rejected.
    pub fn render_path(&self, args: &mut Map<String, Value>) -> Result<String> {
        let mut path = self.path.clone();
        for param in self.path_params() {
            let value = args.remove(param).ok_or_else(|| {
                DeskError::InvalidArgument(format!("{} requires `{param}`", self.name))
            })?;
            let segment = match &value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(DeskError::InvalidArgument(format!(
                        "`{param}` must be a string or number"
                    )))
                }
            };
            if segment.is_empty() || segment == "." || segment == ".." || segment.contains('/') {
                return Err(DeskError::InvalidArgument(format!(
                    "`{param}` is not a valid path segment: {segment:?}"
                )));
            }
            path = path.replace(&format!("{{{param}}}"), &urlencoding::encode(&segment));
        }
        Ok(path)
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(_) | Value::Bool(_) => Some(value.to_string()),
        other => Some(other.to_string()),
    }
}

/// Catalog of named endpoints.
///
/// # Example
/// ```
/// use serde_json::json;
/// use storedesk::endpoint::{EndpointDef, EndpointRegistry, TagSpec};
///
/// let registry = EndpointRegistry::new().with(
///     EndpointDef::query("orders.get", "/orders/{id}").provides(TagSpec::arg("Order", "id")),
/// );
/// let request = registry.build_request("orders.get", &json!({"id": "A"}), None)?;
/// assert_eq!(request.path, "/orders/A");
/// # Ok::<(), storedesk::error::DeskError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<String, EndpointDef>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, def: EndpointDef) -> Self {
        self.register(def);
        self
    }

    pub fn register(&mut self, def: EndpointDef) {
        self.endpoints.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Result<&EndpointDef> {
        self.endpoints
            .get(name)
            .ok_or_else(|| DeskError::UnknownEndpoint(name.to_string()))
    }

    /// Endpoints sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &EndpointDef> {
        self.endpoints.values()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn cache_key(&self, name: &str, args: &Value) -> Result<CacheKey> {
        self.get(name)?;
        Ok(key::cache_key(name, args))
    }

    /// Build the request for calling `name` with `args`.
    ///
    /// Arguments not used by the path go to the query string for GET/DELETE,
    /// to the JSON body otherwise, or become text fields next to an attachment.
    pub fn build_request(
        &self,
        name: &str,
        args: &Value,
        attachment: Option<MultipartForm>,
    ) -> Result<RequestDescriptor> {
        let def = self.get(name)?;
        let mut remaining = match args {
            Value::Null => Map::new(),
            Value::Object(map) => map.clone(),
            _ => {
                return Err(DeskError::InvalidArgument(format!(
                    "{name} expects an object of arguments"
                )))
            }
        };
        let path = def.render_path(&mut remaining)?;
        let mut descriptor = RequestDescriptor::new(def.method, path);

        if let Some(mut form) = attachment {
            for (field, value) in &remaining {
                if let Some(text) = scalar_string(value) {
                    form = form.text(field.clone(), text);
                }
            }
            descriptor.body = RequestBody::Multipart(form);
        } else if def.method.args_in_query() {
            for (field, value) in &remaining {
                match value {
                    Value::Array(items) => {
                        for item in items {
                            if let Some(text) = scalar_string(item) {
                                descriptor.query.push((field.clone(), text));
                            }
                        }
                    }
                    other => {
                        if let Some(text) = scalar_string(other) {
                            descriptor.query.push((field.clone(), text));
                        }
                    }
                }
            }
        } else if !remaining.is_empty() {
            descriptor.body = RequestBody::Json(Value::Object(remaining));
        }
        Ok(descriptor)
    }
}
