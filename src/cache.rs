use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::client::ApiClient;
use crate::error::ApiError;

type SharedFetch = Shared<BoxFuture<'static, Result<Value, Arc<ApiError>>>>;

/// What a consumer of a cached path currently sees
#[derive(Debug, Clone, PartialEq)]
pub enum FetchState {
    Idle,
    Loading,
    Ready(Value),
    Failed(String),
}

#[derive(Default)]
struct Entry {
    data: Option<(Value, Instant)>,
    error: Option<Arc<ApiError>>,
    inflight: Option<(u64, SharedFetch)>,
    generation: u64,
}

/// Read cache in front of [`ApiClient::get`].
///
/// Identical concurrent reads share a single request, and a value younger than
/// the dedupe interval is served without touching the network. Writes go
/// straight to the client; callers invalidate or revalidate the affected
/// paths afterwards.
pub struct FetchCache {
    client: Arc<ApiClient>,
    dedupe_interval: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl FetchCache {
    pub fn new(client: Arc<ApiClient>, dedupe_interval: Duration) -> Self {
        Self {
            client,
            dedupe_interval,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub async fn get(&self, path: &str) -> Result<Value, Arc<ApiError>> {
        self.fetch(path, false).await
    }

    /// Fetch again even if a fresh value is cached; joins a request already in flight
    pub async fn revalidate(&self, path: &str) -> Result<Value, Arc<ApiError>> {
        self.fetch(path, true).await
    }

    pub async fn invalidate(&self, path: &str) {
        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&cache_key(path)) {
            entry.data = None;
            entry.error = None;
        }
    }

    pub async fn state(&self, path: &str) -> FetchState {
        let entries = self.entries.lock().await;
        match entries.get(&cache_key(path)) {
            None => FetchState::Idle,
            Some(entry) if entry.inflight.is_some() => FetchState::Loading,
            Some(Entry {
                error: Some(e), ..
            }) => FetchState::Failed(e.user_message()),
            Some(Entry {
                data: Some((value, _)),
                ..
            }) => FetchState::Ready(value.clone()),
            Some(_) => FetchState::Idle,
        }
    }

    async fn fetch(&self, path: &str, force: bool) -> Result<Value, Arc<ApiError>> {
        let key = cache_key(path);

        let (generation, fetch) = {
            let mut entries = self.entries.lock().await;
            let entry = entries.entry(key.clone()).or_default();

            if let Some((generation, fetch)) = &entry.inflight {
                tracing::trace!(path = %key, "joining in-flight fetch");
                (*generation, fetch.clone())
            } else {
                if !force {
                    if let Some((value, fetched_at)) = &entry.data {
                        if entry.error.is_none() && fetched_at.elapsed() < self.dedupe_interval {
                            return Ok(value.clone());
                        }
                    }
                }

                entry.generation += 1;
                let client = Arc::clone(&self.client);
                let request_path = key.clone();
                let fetch = async move { client.get(&request_path).await.map_err(Arc::new) }
                    .boxed()
                    .shared();
                entry.inflight = Some((entry.generation, fetch.clone()));
                (entry.generation, fetch)
            }
        };

        let result = fetch.await;

        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get_mut(&key) {
            let settles_this_fetch = matches!(&entry.inflight, Some((g, _)) if *g == generation);
            if settles_this_fetch {
                entry.inflight = None;
                match &result {
                    Ok(value) => {
                        entry.data = Some((value.clone(), Instant::now()));
                        entry.error = None;
                    }
                    Err(e) => entry.error = Some(Arc::clone(e)),
                }
            }
        }

        result
    }
}

/// Paths are keyed the way the client normalizes them
fn cache_key(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
