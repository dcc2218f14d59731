//! Idempotent resolve-or-create of an item's remote counterpart.
//!
//! The provider enforces UID uniqueness, so the only way to end up with two
//! remote objects for one item would be creating without looking first. Every
//! path that could have created an object without learning its id (a crash
//! after the write, a create that collided, a create whose response lost the
//! id) is followed by a lookup before any error is surfaced.

use serde_json::Value;

use super::{CorrelationKey, RemoteError, RemoteProvider, RemoteResult};
use crate::config::SyncConfig;
use crate::models::ItemId;

pub struct RemoteResolver<'a, P: RemoteProvider + ?Sized> {
    provider: &'a P,
    config: &'a SyncConfig,
}

impl<'a, P: RemoteProvider + ?Sized> RemoteResolver<'a, P> {
    pub const fn new(provider: &'a P, config: &'a SyncConfig) -> Self {
        Self { provider, config }
    }

    /// Correlation key for an item under the configured namespace
    pub fn correlation_key(&self, item_id: &ItemId) -> CorrelationKey {
        CorrelationKey::for_item(
            &self.config.correlation_namespace,
            &self.config.private_property_key,
            item_id,
        )
    }

    /// Return the remote id bound to `item_id`, creating the object only if
    /// no lookup finds one
    pub async fn resolve_or_create(&self, item_id: &ItemId, payload: &Value) -> RemoteResult<String> {
        let key = self.correlation_key(item_id);
        let container_id = self.config.container_id.as_str();

        if let Some(existing) = self.find_existing(&key).await? {
            tracing::debug!("Reusing remote object {existing} for item {item_id}");
            return Ok(existing);
        }

        let body = key.apply_to_payload(payload);
        let created = match self.provider.create_object(container_id, &body).await {
            Ok(created) => created,
            Err(error) if error.is_conflict() => {
                tracing::warn!("Create for item {item_id} collided ({error}); re-checking");
                return match self.find_existing(&key).await? {
                    Some(existing) => Ok(existing),
                    None => Err(error),
                };
            }
            Err(error) => return Err(error),
        };

        if let Some(id) = created
            .id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
        {
            tracing::info!("Created remote object {id} for item {item_id}");
            return Ok(id);
        }

        tracing::warn!("Create for item {item_id} returned no object id; re-checking");
        self.find_existing(&key).await?.ok_or_else(|| {
            RemoteError::MalformedResponse(format!(
                "create for item {item_id} returned no id and no object carries uid {}",
                key.uid
            ))
        })
    }

    async fn find_existing(&self, key: &CorrelationKey) -> RemoteResult<Option<String>> {
        let container_id = self.config.container_id.as_str();

        if let Some(found) = self.provider.lookup_by_uid(container_id, &key.uid).await? {
            return Ok(Some(found.id));
        }

        let found = self
            .provider
            .lookup_by_private_key(container_id, &key.private_key, &key.private_value)
            .await?;
        Ok(found.map(|found| found.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CreateBehavior, FakeProvider};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn payload() -> Value {
        json!({ "summary": "Dentist" })
    }

    #[tokio::test(flavor = "current_thread")]
    async fn second_call_reuses_created_object() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        let item_id = ItemId::new();

        let first = resolver.resolve_or_create(&item_id, &payload()).await.unwrap();
        let second = resolver.resolve_or_create(&item_id, &payload()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.create_calls(), 1);
        assert_eq!(provider.object_count(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn created_object_carries_correlation_identity() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        let item_id = ItemId::new();

        let remote_id = resolver.resolve_or_create(&item_id, &payload()).await.unwrap();
        let stored = provider.payload_of(&remote_id).unwrap();
        let key = resolver.correlation_key(&item_id);
        assert_eq!(stored["iCalUID"], json!(key.uid));
        assert_eq!(
            stored["extendedProperties"]["private"]["agenda_item_id"],
            json!(item_id.as_str())
        );
        assert_eq!(stored["summary"], json!("Dentist"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn falls_back_to_private_property_lookup() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        let item_id = ItemId::new();
        let key = resolver.correlation_key(&item_id);
        provider.insert_object(
            "legacy-event",
            json!({ "extendedProperties": { "private": { key.private_key.clone(): key.private_value.clone() } } }),
        );

        let remote_id = resolver.resolve_or_create(&item_id, &payload()).await.unwrap();
        assert_eq!(remote_id, "legacy-event");
        assert_eq!(provider.create_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn conflict_on_create_recovers_existing_object() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        let item_id = ItemId::new();
        // Another worker wins the race between our lookup and our create
        provider.set_create_behavior(CreateBehavior::ConflictAfterRacingInsert);

        let remote_id = resolver.resolve_or_create(&item_id, &payload()).await.unwrap();
        assert_eq!(provider.object_count(), 1);
        assert_eq!(provider.payload_of(&remote_id).unwrap()["iCalUID"], json!(resolver.correlation_key(&item_id).uid));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn conflict_without_existing_object_is_reraised() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        provider.set_create_behavior(CreateBehavior::Fail(RemoteError::AlreadyExists(
            "duplicate".to_string(),
        )));

        let error = resolver
            .resolve_or_create(&ItemId::new(), &payload())
            .await
            .unwrap_err();
        assert_eq!(error, RemoteError::AlreadyExists("duplicate".to_string()));
        assert_eq!(provider.object_count(), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_id_in_create_response_triggers_recheck() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        let item_id = ItemId::new();
        provider.set_create_behavior(CreateBehavior::StoreWithoutId);

        let remote_id = resolver.resolve_or_create(&item_id, &payload()).await.unwrap();
        assert!(provider.payload_of(&remote_id).is_some());
        assert_eq!(provider.create_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn missing_id_without_stored_object_is_malformed() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        provider.set_create_behavior(CreateBehavior::DropWithoutId);

        let error = resolver
            .resolve_or_create(&ItemId::new(), &payload())
            .await
            .unwrap_err();
        assert!(matches!(error, RemoteError::MalformedResponse(_)));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn other_failures_propagate_unchanged() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        let failure = RemoteError::Rejected {
            status: 403,
            message: "forbidden".to_string(),
        };
        provider.set_create_behavior(CreateBehavior::Fail(failure.clone()));

        let error = resolver
            .resolve_or_create(&ItemId::new(), &payload())
            .await
            .unwrap_err();
        assert_eq!(error, failure);
        assert_eq!(provider.create_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn lookup_failure_prevents_create() {
        let provider = FakeProvider::new();
        let config = SyncConfig::default();
        let resolver = RemoteResolver::new(&provider, &config);
        provider.fail_lookups(RemoteError::Transient("HTTP 503".to_string()));

        let error = resolver
            .resolve_or_create(&ItemId::new(), &payload())
            .await
            .unwrap_err();
        assert!(error.is_transient());
        assert_eq!(provider.create_calls(), 0);
    }
}
