//! Durable `session_key -> last successful route` map (§3, `LastRoute`).
//!
//! Persistence follows the same atomic write-temp-then-rename idiom as the
//! Job Store catalog.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::model::LastRoute;

use super::DeliveryError;

#[async_trait]
pub trait LastRouteStore: Send + Sync {
    async fn get(&self, session_key: &str) -> Option<LastRoute>;
    async fn set(&self, session_key: &str, route: LastRoute) -> Result<(), DeliveryError>;
}

#[derive(Default, Serialize, Deserialize)]
struct RouteFile {
    routes: HashMap<String, LastRoute>,
}

pub struct FileLastRouteStore {
    path: PathBuf,
    routes: Mutex<HashMap<String, LastRoute>>,
}

impl FileLastRouteStore {
    pub fn open(state_dir: &Path) -> Result<Self, DeliveryError> {
        let dir = state_dir.join("delivery");
        fs::create_dir_all(&dir)?;
        let path = dir.join("last_route.json");
        let routes = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str::<RouteFile>(&content)?.routes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            routes: Mutex::new(routes),
        })
    }

    fn persist(&self, routes: &HashMap<String, LastRoute>) -> Result<(), DeliveryError> {
        let content = serde_json::to_string_pretty(&RouteFile {
            routes: routes.clone(),
        })?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, &content)?;
        if self.path.exists() {
            fs::copy(&self.path, self.path.with_extension("json.bak"))?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[async_trait]
impl LastRouteStore for FileLastRouteStore {
    async fn get(&self, session_key: &str) -> Option<LastRoute> {
        self.routes
            .lock()
            .expect("last-route mutex poisoned")
            .get(session_key)
            .cloned()
    }

    async fn set(&self, session_key: &str, route: LastRoute) -> Result<(), DeliveryError> {
        let mut routes = self.routes.lock().expect("last-route mutex poisoned");
        routes.insert(session_key.to_string(), route);
        self.persist(&routes)
    }
}

/// Convenience constructor used by Channel Drivers on every successful
/// outbound send.
pub fn route_now(channel: &str, target: &str) -> LastRoute {
    LastRoute {
        channel: channel.to_string(),
        target: target.to_string(),
        updated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = FileLastRouteStore::open(dir.path()).unwrap();
        store
            .set("agent:a:main", route_now("telegram", "555"))
            .await
            .unwrap();
        let got = store.get("agent:a:main").await.unwrap();
        assert_eq!(got.channel, "telegram");
        assert_eq!(got.target, "555");
    }

    #[tokio::test]
    async fn missing_session_returns_none() {
        let dir = TempDir::new().unwrap();
        let store = FileLastRouteStore::open(dir.path()).unwrap();
        assert!(store.get("agent:a:main").await.is_none());
    }

    #[tokio::test]
    async fn survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = FileLastRouteStore::open(dir.path()).unwrap();
            store
                .set("agent:a:main", route_now("slack", "channel:C1"))
                .await
                .unwrap();
        }
        let reopened = FileLastRouteStore::open(dir.path()).unwrap();
        let got = reopened.get("agent:a:main").await.unwrap();
        assert_eq!(got.target, "channel:C1");
    }
}
