//! Operation descriptors supplied by feature modules.
//!
//! A descriptor is defined once (typically in a `LazyLock`) and only read by
//! the executors.

use std::collections::BTreeSet;

use serde_json::{Map, Value};

use crate::errors::{FoldError, FoldResult};

/// Variables object sent alongside an operation document.
pub type Variables = Map<String, Value>;

/// Whether an operation reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Query => "query",
            OperationKind::Mutation => "mutation",
        }
    }
}

/// Declared variable names of an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariablesShape {
    pub required: Vec<String>,
    pub optional: Vec<String>,
}

impl VariablesShape {
    /// Names of required variables that are absent or `null`.
    pub fn missing(&self, variables: &Variables) -> Vec<String> {
        self.required
            .iter()
            .filter(|name| variables.get(name.as_str()).map_or(true, Value::is_null))
            .cloned()
            .collect()
    }
}

/// Maps a response field path to the entity tag it carries.
///
/// `path` is dot-separated and walks into arrays transparently, so
/// `"funds"` matches every element of a `funds: [...]` list. Each object
/// found yields the bare entity tag (`"Fund"`) and, when `id_field` is set
/// and present, an instance tag (`"Fund:42"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRule {
    pub path: String,
    pub entity: String,
    pub id_field: Option<String>,
}

impl TagRule {
    pub fn new(path: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            entity: entity.into(),
            id_field: Some("id".to_string()),
        }
    }

    pub fn with_id_field(mut self, field: Option<&str>) -> Self {
        self.id_field = field.map(str::to_string);
        self
    }

    fn collect(&self, data: &Value, out: &mut BTreeSet<String>) {
        let segments: Vec<&str> = self.path.split('.').filter(|s| !s.is_empty()).collect();
        let mut nodes = Vec::new();
        walk(data, &segments, &mut nodes);

        for node in nodes {
            out.insert(self.entity.clone());
            let id = self
                .id_field
                .as_deref()
                .and_then(|field| node.get(field))
                .and_then(scalar_id);
            if let Some(id) = id {
                out.insert(format!("{}:{}", self.entity, id));
            }
        }
    }
}

fn walk<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    match value {
        Value::Array(items) => {
            for item in items {
                walk(item, segments, out);
            }
        }
        Value::Object(map) => match segments.split_first() {
            Some((head, rest)) => {
                if let Some(next) = map.get(*head) {
                    walk(next, rest, out);
                }
            }
            None => out.push(value),
        },
        _ => {}
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A named query or mutation document and everything the executors need to
/// know about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDescriptor {
    pub name: String,
    pub kind: OperationKind,
    pub document: String,
    pub variables: VariablesShape,
    pub tag_rules: Vec<TagRule>,
    /// Tags a mutation always writes, independent of its response.
    pub writes: Vec<String>,
}

impl OperationDescriptor {
    pub fn query(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Query, document)
    }

    pub fn mutation(name: impl Into<String>, document: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Mutation, document)
    }

    fn new(name: impl Into<String>, kind: OperationKind, document: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            document: document.into(),
            variables: VariablesShape::default(),
            tag_rules: Vec::new(),
            writes: Vec::new(),
        }
    }

    pub fn require(mut self, variable: impl Into<String>) -> Self {
        self.variables.required.push(variable.into());
        self
    }

    pub fn optional(mut self, variable: impl Into<String>) -> Self {
        self.variables.optional.push(variable.into());
        self
    }

    pub fn tag(mut self, path: impl Into<String>, entity: impl Into<String>) -> Self {
        self.tag_rules.push(TagRule::new(path, entity));
        self
    }

    pub fn tag_rule(mut self, rule: TagRule) -> Self {
        self.tag_rules.push(rule);
        self
    }

    pub fn writes(mut self, tag: impl Into<String>) -> Self {
        self.writes.push(tag.into());
        self
    }

    pub fn is_query(&self) -> bool {
        self.kind == OperationKind::Query
    }

    pub fn is_mutation(&self) -> bool {
        self.kind == OperationKind::Mutation
    }

    /// Fails with `InvalidVariables` when a required variable is missing.
    pub fn check_variables(&self, variables: &Variables) -> FoldResult<()> {
        let missing = self.variables.missing(variables);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(FoldError::invalid_variables(format!(
                "{} is missing required variable(s): {}",
                self.name,
                missing.join(", ")
            )))
        }
    }

    /// Entity tags present in a response, per the declared tag rules.
    pub fn derive_tags(&self, data: &Value) -> BTreeSet<String> {
        let mut tags = BTreeSet::new();
        for rule in &self.tag_rules {
            rule.collect(data, &mut tags);
        }
        tags
    }

    /// Tags a successful mutation invalidates: static writes plus response tags.
    pub fn written_tags(&self, data: &Value) -> BTreeSet<String> {
        let mut tags = self.derive_tags(data);
        tags.extend(self.writes.iter().cloned());
        tags
    }
}

/// Coerce caller variables into a variables object.
pub fn to_variables<V: serde::Serialize>(variables: V) -> FoldResult<Variables> {
    match serde_json::to_value(variables) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(FoldError::invalid_variables(format!(
            "variables must be an object, got {other}"
        ))),
        Err(e) => Err(FoldError::invalid_variables(e.to_string())),
    }
}
