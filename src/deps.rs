//! Dependency-gap filter: which of a repository's dependencies have no
//! indexed package yet.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::IndexedPackage;
use crate::error::Result;

/// A dependency as reported by a language analyzer.  `dep_data` is the
/// language-specific descriptor (for Java, a Maven-style `id`, `version`...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyReference {
    #[serde(default)]
    pub dep_data: Map<String, Value>,
    #[serde(default)]
    pub hints: Map<String, Value>,
}

/// Map a dependency onto the package query that uniquely identifies its
/// package, discarding version information.  Languages without a mapping
/// yield `None`.
pub fn pkg_query(language: &str, dep: &DependencyReference) -> Option<Value> {
    match language {
        "Java" => {
            let id = dep.dep_data.get("id").cloned().unwrap_or(Value::Null);
            Some(serde_json::json!({ "id": id }))
        }
        _ => None,
    }
}

#[async_trait::async_trait]
pub trait PackageIndex: Send + Sync {
    /// Whether at least one indexed package for `language` matches `query`.
    async fn has_package(&self, language: &str, query: &Value) -> Result<bool>;
}

/// Keep the dependencies that have no matching indexed package, in input
/// order.  A dependency whose language has no query mapping cannot be
/// matched and is always kept.
pub async fn unfetched(
    index: &dyn PackageIndex,
    language: &str,
    deps: Vec<DependencyReference>,
) -> Result<Vec<DependencyReference>> {
    let mut out = Vec::new();
    for dep in deps {
        let indexed = match pkg_query(language, &dep) {
            Some(query) => index.has_package(language, &query).await?,
            None => false,
        };
        if !indexed {
            out.push(dep);
        }
    }
    debug!(language, unfetched = out.len(), "filtered dependencies");
    Ok(out)
}

// ---------------------------------------------------------------------------
// In-memory index
// ---------------------------------------------------------------------------

/// Package descriptors grouped by language.  A query matches a descriptor
/// when every key of the query object is present in the descriptor with an
/// equal value.
#[derive(Debug, Default)]
pub struct MemoryPackageIndex {
    by_language: HashMap<String, Vec<Value>>,
}

impl MemoryPackageIndex {
    pub fn new(packages: &[IndexedPackage]) -> Self {
        let mut by_language: HashMap<String, Vec<Value>> = HashMap::new();
        for pkg in packages {
            by_language
                .entry(pkg.language.clone())
                .or_default()
                .push(pkg.descriptor.clone());
        }
        Self { by_language }
    }
}

fn descriptor_matches(descriptor: &Value, query: &Value) -> bool {
    match (descriptor, query) {
        (Value::Object(desc), Value::Object(q)) => {
            q.iter().all(|(k, v)| desc.get(k) == Some(v))
        }
        _ => descriptor == query,
    }
}

#[async_trait::async_trait]
impl PackageIndex for MemoryPackageIndex {
    async fn has_package(&self, language: &str, query: &Value) -> Result<bool> {
        Ok(self
            .by_language
            .get(language)
            .is_some_and(|pkgs| pkgs.iter().any(|p| descriptor_matches(p, query))))
    }
}
