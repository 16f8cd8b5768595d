use async_trait::async_trait;

use crate::lock::{lock_key, LockManager};
use crate::{Metadata, StoreError, Value};

/// Top-level metadata key reserved for privileged callers.
pub const SYSTEM_METADATA_KEY: &str = "system";

/// Identifies the row whose metadata is merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MetadataTarget {
    pub table: String,
    pub key_field: String,
    pub key_value: String,
}

impl MetadataTarget {
    pub fn new(
        table: impl Into<String>,
        key_field: impl Into<String>,
        key_value: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            key_field: key_field.into(),
            key_value: key_value.into(),
        }
    }

    /// String hashed into the advisory lock token.
    pub fn lock_name(&self) -> String {
        format!("{}:{}:{}", self.table, self.key_field, self.key_value)
    }

    fn validate(&self) -> Result<(), StoreError> {
        if self.table.trim().is_empty() {
            return Err(StoreError::invalid("metadata merge requires a table"));
        }
        if self.key_field.trim().is_empty() {
            return Err(StoreError::invalid("metadata merge requires a key field"));
        }
        if self.key_value.trim().is_empty() {
            return Err(StoreError::invalid("metadata merge requires a key value"));
        }
        Ok(())
    }
}

/// Raw metadata access used by the merge protocol.
#[async_trait]
pub trait MetadataRepository: Send + Sync {
    /// Reads metadata of the target row, soft-deleted rows included.
    /// `Ok(None)` when the row does not exist.
    async fn read_metadata(&self, target: &MetadataTarget) -> Result<Option<Metadata>, StoreError>;

    async fn write_metadata(
        &self,
        target: &MetadataTarget,
        metadata: &Metadata,
    ) -> Result<(), StoreError>;
}

/// Deep-merges `patch` into `base`: nested objects merge key by key, anything else
/// (scalars, arrays, type changes) is replaced by the patch value.
pub fn deep_merge(base: &mut Metadata, patch: Metadata) {
    for (key, value) in patch {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn merge_objects(base: &mut serde_json::Map<String, Value>, patch: serde_json::Map<String, Value>) {
    for (key, value) in patch {
        match (base.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_objects(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Serialises metadata merges per entity through a [`LockManager`].
pub struct MetadataMerger<L, R> {
    locks: L,
    repository: R,
}

impl<L, R> MetadataMerger<L, R>
where
    L: LockManager,
    R: MetadataRepository,
{
    pub fn new(locks: L, repository: R) -> Self {
        Self { locks, repository }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    /// Merges `patch` into the stored metadata and returns the result.
    ///
    /// Unprivileged callers cannot touch the top-level `system` key.
    pub async fn merge(
        &self,
        target: &MetadataTarget,
        mut patch: Metadata,
        privileged: bool,
    ) -> Result<Metadata, StoreError> {
        target.validate()?;
        if patch.is_empty() {
            return Err(StoreError::invalid("metadata patch must not be empty"));
        }
        if !privileged {
            patch.remove(SYSTEM_METADATA_KEY);
        }

        let guard = self.locks.lock(lock_key(&target.lock_name())).await?;
        let result = self.merge_locked(target, patch).await;
        if let Err(error) = self.locks.unlock(guard).await {
            tracing::error!(
                table = %target.table,
                key = %target.key_value,
                error = %error,
                "failed to release metadata merge lock"
            );
        }
        result
    }

    async fn merge_locked(
        &self,
        target: &MetadataTarget,
        patch: Metadata,
    ) -> Result<Metadata, StoreError> {
        let mut current = self
            .repository
            .read_metadata(target)
            .await?
            .ok_or_else(|| StoreError::not_found("entity", target.lock_name()))?;

        deep_merge(&mut current, patch);
        self.repository.write_metadata(target, &current).await?;
        Ok(current)
    }
}
