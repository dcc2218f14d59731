//! In-memory provider used by unit tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::remote::{
    CreateResponse, RemoteError, RemoteObject, RemoteProvider, RemoteRef, RemoteResult,
};

/// How the next `create_object` calls behave
#[derive(Debug, Clone)]
pub enum CreateBehavior {
    /// Store the object and return its id
    Store,
    /// Store the object but answer without an id
    StoreWithoutId,
    /// Store nothing and answer without an id
    DropWithoutId,
    /// Store the object as if another writer did, then answer 409
    ConflictAfterRacingInsert,
    /// Store nothing and fail
    Fail(RemoteError),
}

#[derive(Debug)]
struct FakeState {
    objects: BTreeMap<String, Value>,
    next_id: u32,
    create_calls: usize,
    update_calls: usize,
    create_behavior: CreateBehavior,
    lookup_failure: Option<RemoteError>,
    get_failure: Option<RemoteError>,
    update_failure: Option<RemoteError>,
}

#[derive(Debug)]
pub struct FakeProvider {
    state: Mutex<FakeState>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                objects: BTreeMap::new(),
                next_id: 1,
                create_calls: 0,
                update_calls: 0,
                create_behavior: CreateBehavior::Store,
                lookup_failure: None,
                get_failure: None,
                update_failure: None,
            }),
        }
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn update_calls(&self) -> usize {
        self.state.lock().unwrap().update_calls
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    pub fn payload_of(&self, id: &str) -> Option<Value> {
        self.state.lock().unwrap().objects.get(id).cloned()
    }

    pub fn insert_object(&self, id: &str, payload: Value) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(id.to_string(), payload);
    }

    pub fn remove_object(&self, id: &str) {
        self.state.lock().unwrap().objects.remove(id);
    }

    /// Move the start of a stored object, as an edit made in the calendar would
    pub fn set_start(&self, id: &str, start: &str) {
        let mut state = self.state.lock().unwrap();
        let payload = state.objects.get_mut(id).unwrap();
        payload["start"] = serde_json::json!({ "dateTime": start });
    }

    pub fn set_create_behavior(&self, behavior: CreateBehavior) {
        self.state.lock().unwrap().create_behavior = behavior;
    }

    pub fn fail_lookups(&self, error: RemoteError) {
        self.state.lock().unwrap().lookup_failure = Some(error);
    }

    pub fn fail_gets(&self, error: RemoteError) {
        self.state.lock().unwrap().get_failure = Some(error);
    }

    pub fn fail_updates(&self, error: RemoteError) {
        self.state.lock().unwrap().update_failure = Some(error);
    }

    fn store(state: &mut FakeState, payload: &Value) -> String {
        let id = format!("evt-{}", state.next_id);
        state.next_id += 1;
        state.objects.insert(id.clone(), payload.clone());
        id
    }
}

#[async_trait]
impl RemoteProvider for FakeProvider {
    async fn lookup_by_uid(
        &self,
        _container_id: &str,
        uid: &str,
    ) -> RemoteResult<Option<RemoteRef>> {
        let state = self.state.lock().unwrap();
        if let Some(error) = &state.lookup_failure {
            return Err(error.clone());
        }
        Ok(state
            .objects
            .iter()
            .find(|(_, payload)| payload["iCalUID"].as_str() == Some(uid))
            .map(|(id, _)| RemoteRef::new(id.clone())))
    }

    async fn lookup_by_private_key(
        &self,
        _container_id: &str,
        key: &str,
        value: &str,
    ) -> RemoteResult<Option<RemoteRef>> {
        let state = self.state.lock().unwrap();
        if let Some(error) = &state.lookup_failure {
            return Err(error.clone());
        }
        Ok(state
            .objects
            .iter()
            .find(|(_, payload)| {
                payload["extendedProperties"]["private"][key].as_str() == Some(value)
            })
            .map(|(id, _)| RemoteRef::new(id.clone())))
    }

    async fn create_object(
        &self,
        _container_id: &str,
        payload: &Value,
    ) -> RemoteResult<CreateResponse> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        match state.create_behavior.clone() {
            CreateBehavior::Store => {
                let id = Self::store(&mut state, payload);
                Ok(CreateResponse { id: Some(id) })
            }
            CreateBehavior::StoreWithoutId => {
                Self::store(&mut state, payload);
                Ok(CreateResponse { id: Some("  ".to_string()) })
            }
            CreateBehavior::DropWithoutId => Ok(CreateResponse::default()),
            CreateBehavior::ConflictAfterRacingInsert => {
                Self::store(&mut state, payload);
                Err(RemoteError::AlreadyExists("The requested identifier already exists".to_string()))
            }
            CreateBehavior::Fail(error) => Err(error),
        }
    }

    async fn get_object(
        &self,
        _container_id: &str,
        remote_id: &str,
    ) -> RemoteResult<Option<RemoteObject>> {
        let state = self.state.lock().unwrap();
        if let Some(error) = &state.get_failure {
            return Err(error.clone());
        }
        Ok(state.objects.get(remote_id).map(|payload| RemoteObject {
            id: remote_id.to_string(),
            status: payload["status"].as_str().map(ToString::to_string),
            start: payload["start"]["dateTime"].as_str().map(ToString::to_string),
            summary: payload["summary"].as_str().map(ToString::to_string),
            description: payload["description"].as_str().map(ToString::to_string),
        }))
    }

    async fn update_object(
        &self,
        _container_id: &str,
        remote_id: &str,
        payload: &Value,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().unwrap();
        state.update_calls += 1;
        if let Some(error) = &state.update_failure {
            return Err(error.clone());
        }
        let stored = state
            .objects
            .get_mut(remote_id)
            .ok_or_else(|| RemoteError::NotFound(remote_id.to_string()))?;
        if let (Some(stored), Some(patch)) = (stored.as_object_mut(), payload.as_object()) {
            for (key, value) in patch {
                stored.insert(key.clone(), value.clone());
            }
        }
        Ok(())
    }
}
