use crate::model::{Id, Release, SchemaKind, SchemaRegistry};
use crate::store::Store;
use anyhow::{anyhow, Result};

pub struct ReleaseOperations;

impl ReleaseOperations {
    /// Create the initial release of a repository, assigned the latest
    /// version of every registered chain. The first release has nothing to
    /// migrate, so it starts out migrated.
    pub async fn create_initial_release<S: Store + ?Sized>(
        store: &S,
        registry: &SchemaRegistry,
        name: &str,
        author: &str,
    ) -> Result<Release> {
        let mut release = Release::new(name, author);
        Self::assign_latest_versions(&mut release, registry);
        release.migrated = true;
        store.upsert_release(release.clone()).await?;
        Ok(release)
    }

    /// Fork a new release off the current tip of the branch chain. The new
    /// release gets the latest version of every registered chain and is not
    /// migrated until a release migration run moved the content over.
    pub async fn fork_release<S: Store + ?Sized>(
        store: &S,
        registry: &SchemaRegistry,
        source_release_id: &Id,
        name: &str,
        author: &str,
    ) -> Result<Release> {
        let mut source = store
            .get_release(source_release_id)
            .await?
            .ok_or_else(|| anyhow!("release '{}' not found", source_release_id))?;
        if source.next_release.is_some() {
            return Err(anyhow!(
                "release '{}' already has a successor; fork from the chain tip",
                source.name
            ));
        }

        let mut release = Release::new(name, author);
        release.previous_release = Some(source.id.clone());
        Self::assign_latest_versions(&mut release, registry);

        source.next_release = Some(release.id.clone());
        store.upsert_release(release.clone()).await?;
        store.upsert_release(source).await?;

        log::info!("forked release '{}' from '{}'", release.id, source_release_id);
        Ok(release)
    }

    /// Point a release at a new schema version. One transaction, exclusive
    /// per (release, schema): any previously assigned version of the same
    /// schema is unassigned in the same step. Never migrates anything;
    /// `Release.migrated` stays false until an explicit migration run
    /// succeeds.
    pub async fn assign_schema_version<S: Store + ?Sized>(
        store: &S,
        registry: &SchemaRegistry,
        release_id: &Id,
        kind: SchemaKind,
        schema_name: &str,
        version_id: &Id,
    ) -> Result<Release> {
        let chain = registry
            .chain(kind, schema_name)
            .ok_or_else(|| anyhow!("no registered {:?} chain named '{}'", kind, schema_name))?;
        if chain.version(version_id).is_none() {
            return Err(anyhow!(
                "version '{}' does not belong to schema '{}'",
                version_id,
                schema_name
            ));
        }
        store
            .assign_schema_version(release_id, kind, schema_name, version_id)
            .await
    }

    /// Flip `Release.migrated` after a run finished with zero captured
    /// errors. The caller owns this decision; the migration handler never
    /// flips it.
    pub async fn mark_release_migrated<S: Store + ?Sized>(
        store: &S,
        release_id: &Id,
    ) -> Result<Release> {
        let mut release = store
            .get_release(release_id)
            .await?
            .ok_or_else(|| anyhow!("release '{}' not found", release_id))?;
        release.migrated = true;
        store.upsert_release(release.clone()).await?;
        Ok(release)
    }

    fn assign_latest_versions(release: &mut Release, registry: &SchemaRegistry) {
        for chain in registry.chains() {
            if let Some(latest) = chain.latest() {
                release.assign_version(chain.kind, &chain.name, latest.id.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldSchema, FieldType, SchemaVersionChain};
    use crate::store::{InMemoryStore, ReleaseStore};
    use std::collections::HashMap;

    fn registry_with_chain() -> SchemaRegistry {
        let mut chain = SchemaVersionChain::new("article", SchemaKind::Schema);
        chain.push_version(
            vec![FieldSchema::new("title", FieldType::String)],
            HashMap::new(),
            None,
        );
        chain.push_version(
            vec![FieldSchema::new("headline", FieldType::String)],
            HashMap::from([("headline".to_string(), "title".to_string())]),
            None,
        );
        let mut registry = SchemaRegistry::new();
        registry.register(chain);
        registry
    }

    #[tokio::test]
    async fn fork_links_the_branch_chain() {
        let store = InMemoryStore::new();
        let registry = registry_with_chain();
        let initial =
            ReleaseOperations::create_initial_release(&store, &registry, "initial", "admin")
                .await
                .unwrap();
        assert!(initial.migrated);

        let forked = ReleaseOperations::fork_release(&store, &registry, &initial.id, "v2", "admin")
            .await
            .unwrap();
        assert_eq!(forked.previous_release, Some(initial.id.clone()));
        assert!(!forked.migrated);

        let initial = store.get_release(&initial.id).await.unwrap().unwrap();
        assert_eq!(initial.next_release, Some(forked.id.clone()));

        // Forking off a release that already has a successor is refused.
        let err = ReleaseOperations::fork_release(&store, &registry, &initial.id, "v3", "admin")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("successor"));
    }

    #[tokio::test]
    async fn double_reassignment_keeps_one_edge() {
        let store = InMemoryStore::new();
        let registry = registry_with_chain();
        let release =
            ReleaseOperations::create_initial_release(&store, &registry, "initial", "admin")
                .await
                .unwrap();

        let chain = registry.chain(SchemaKind::Schema, "article").unwrap();
        let v1 = chain.versions()[0].id.clone();
        let v2 = chain.versions()[1].id.clone();

        // A -> B -> C without an intervening migration run.
        ReleaseOperations::assign_schema_version(
            &store,
            &registry,
            &release.id,
            SchemaKind::Schema,
            "article",
            &v1,
        )
        .await
        .unwrap();
        let updated = ReleaseOperations::assign_schema_version(
            &store,
            &registry,
            &release.id,
            SchemaKind::Schema,
            "article",
            &v2,
        )
        .await
        .unwrap();

        assert_eq!(updated.schema_versions.len(), 1);
        assert_eq!(
            updated.assigned_version(SchemaKind::Schema, "article"),
            Some(&v2)
        );
        assert!(!updated.migrated);
    }

    #[tokio::test]
    async fn assigning_a_foreign_version_is_refused() {
        let store = InMemoryStore::new();
        let registry = registry_with_chain();
        let release =
            ReleaseOperations::create_initial_release(&store, &registry, "initial", "admin")
                .await
                .unwrap();

        let err = ReleaseOperations::assign_schema_version(
            &store,
            &registry,
            &release.id,
            SchemaKind::Schema,
            "article",
            &"not-a-version".to_string(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("does not belong"));
    }
}
