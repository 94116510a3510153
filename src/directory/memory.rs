//! In-process repository catalog.

use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use super::{NewRepo, RepoDirectory, RepositoryRecord};
use crate::error::{Error, Result};

#[derive(Debug, Default)]
struct Catalog {
    by_name: HashMap<String, RepositoryRecord>,
    next_id: i32,
}

impl Catalog {
    fn insert(&mut self, entry: &NewRepo) -> bool {
        if self.by_name.contains_key(&entry.name) {
            return false;
        }
        self.next_id += 1;
        self.by_name.insert(
            entry.name.clone(),
            RepositoryRecord {
                id: self.next_id,
                name: entry.name.clone(),
                enabled: entry.enabled,
            },
        );
        true
    }
}

/// [`RepoDirectory`] kept entirely in memory.  Ids are assigned from 1 in
/// insertion order.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    catalog: RwLock<Catalog>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(seed: impl IntoIterator<Item = NewRepo>) -> Self {
        let mut catalog = Catalog::default();
        for entry in seed {
            catalog.insert(&entry);
        }
        Self {
            catalog: RwLock::new(catalog),
        }
    }

    /// Administratively enable or disable a repository.
    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        let record = catalog
            .by_name
            .get_mut(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))?;
        record.enabled = enabled;
        debug!(repo = %name, enabled, "repository flag updated");
        Ok(())
    }
}

#[async_trait::async_trait]
impl RepoDirectory for MemoryDirectory {
    async fn insert_if_absent(&self, entries: &[NewRepo]) -> Result<Vec<String>> {
        let mut catalog = self.catalog.write().await;
        let inserted: Vec<String> = entries
            .iter()
            .filter(|entry| catalog.insert(entry))
            .map(|entry| entry.name.clone())
            .collect();
        debug!(
            requested = entries.len(),
            inserted = inserted.len(),
            "batch insert applied"
        );
        Ok(inserted)
    }

    async fn resolve(&self, name: &str) -> Result<RepositoryRecord> {
        self.catalog
            .read()
            .await
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    async fn list_enabled(&self) -> Result<Vec<String>> {
        let catalog = self.catalog.read().await;
        let mut names: Vec<String> = catalog
            .by_name
            .values()
            .filter(|r| r.enabled)
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_repo(name: &str) -> NewRepo {
        NewRepo {
            name: name.to_string(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn insert_if_absent_reports_only_new_names() {
        let dir = MemoryDirectory::new();
        let first = dir
            .insert_if_absent(&[new_repo("a"), new_repo("b")])
            .await
            .unwrap();
        assert_eq!(first, vec!["a", "b"]);

        let second = dir
            .insert_if_absent(&[new_repo("a"), new_repo("b"), new_repo("c")])
            .await
            .unwrap();
        assert_eq!(second, vec!["c"]);
    }

    #[tokio::test]
    async fn insert_does_not_touch_existing_records() {
        let dir = MemoryDirectory::with_seed([NewRepo {
            name: "a".into(),
            enabled: false,
        }]);
        dir.insert_if_absent(&[new_repo("a")]).await.unwrap();
        let record = dir.resolve("a").await.unwrap();
        assert!(!record.enabled);
        assert_eq!(record.id, 1);
    }

    #[tokio::test]
    async fn duplicate_names_in_one_batch_insert_once() {
        let dir = MemoryDirectory::new();
        let inserted = dir
            .insert_if_absent(&[new_repo("a"), new_repo("a")])
            .await
            .unwrap();
        assert_eq!(inserted, vec!["a"]);
    }

    #[tokio::test]
    async fn resolve_unknown_is_not_found() {
        let dir = MemoryDirectory::new();
        assert!(matches!(
            dir.resolve("missing").await,
            Err(Error::NotFound(name)) if name == "missing"
        ));
    }

    #[tokio::test]
    async fn list_enabled_is_sorted_and_filtered() {
        let dir = MemoryDirectory::with_seed([new_repo("zeta"), new_repo("alpha"), new_repo("mid")]);
        dir.set_enabled("mid", false).await.unwrap();
        assert_eq!(dir.list_enabled().await.unwrap(), vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn set_enabled_unknown_is_not_found() {
        let dir = MemoryDirectory::new();
        assert!(dir.set_enabled("nope", true).await.is_err());
    }
}
