//! Stable request identities.
//!
//! A [`RequestKey`] addresses both the in-flight (dedup) registry and the
//! cache. Keys are built from the operation name, the tenant scope and a
//! canonical rendering of the variables, so property order never matters.

use std::fmt;
use std::fmt::Write as _;

use serde_json::Value;

use crate::operation::{OperationDescriptor, Variables};
use crate::tenant::TenantScope;

/// Opaque identity of an (operation, variables, scope) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestKey(String);

impl RequestKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Computes request keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestKeyer;

impl RequestKeyer {
    pub fn new() -> Self {
        Self
    }

    /// `name@scope#{canonical variables}`.
    pub fn compute_key(
        &self,
        descriptor: &OperationDescriptor,
        variables: &Variables,
        scope: &TenantScope,
    ) -> RequestKey {
        let mut out = String::with_capacity(descriptor.name.len() + 64);
        out.push_str(&descriptor.name);
        out.push('@');
        out.push_str(scope.organisation_id.as_str());
        out.push('/');
        match &scope.branch_id {
            Some(branch) => out.push_str(branch.as_str()),
            None => out.push('-'),
        }
        out.push('#');
        write_object(&mut out, variables.iter());
        RequestKey(out)
    }
}

/// Canonical JSON: object keys sorted, no whitespace.
fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => write_object(out, map.iter()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // Scalars already have a single JSON rendering.
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}

fn write_object<'a>(out: &mut String, entries: impl Iterator<Item = (&'a String, &'a Value)>) {
    let mut entries: Vec<_> = entries.collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    out.push('{');
    for (i, (k, v)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        let _ = write!(out, "{}", Value::String(k.clone()));
        out.push(':');
        write_canonical(out, v);
    }
    out.push('}');
}
