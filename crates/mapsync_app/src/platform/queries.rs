use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use mapsync_client::{ApiPath, QueryPolicy, QuerySpec};
use mapsync_core::QueryKey;

/// Refetch interval for external source status.
const SOURCES_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Engine-side name of a query. Also used in log lines.
pub fn engine_key(key: &QueryKey) -> String {
    match key {
        QueryKey::Project(id) => format!("project:{id}"),
        QueryKey::MapDocument(id) => format!("map:{id}"),
        QueryKey::MapTree(id) => format!("map-tree:{id}"),
        QueryKey::Conversations(project_id) => format!("conversations:{project_id}"),
        QueryKey::ConversationMessages(id) => format!("messages:{id}"),
        QueryKey::Sources(project_id) => format!("sources:{project_id}"),
    }
}

pub fn query_spec(key: &QueryKey) -> QuerySpec {
    let (path, policy) = match key {
        QueryKey::Project(id) => (
            ApiPath::new(["api", "projects", id.as_str()]),
            QueryPolicy::default(),
        ),
        QueryKey::MapDocument(id) => (
            ApiPath::new(["api", "maps", id.as_str()]),
            QueryPolicy::default(),
        ),
        QueryKey::MapTree(id) => (
            ApiPath::new(["api", "maps", id.as_str(), "tree"]),
            QueryPolicy::default(),
        ),
        QueryKey::Conversations(project_id) => (
            ApiPath::new(["api", "conversations"]).with_query("project_id", project_id.as_str()),
            QueryPolicy::default(),
        ),
        QueryKey::ConversationMessages(id) => {
            let id = id.to_string();
            (
                ApiPath::new(["api", "conversations", id.as_str(), "messages"]),
                QueryPolicy::default(),
            )
        }
        QueryKey::Sources(project_id) => (
            ApiPath::new(["api", "projects", project_id.as_str(), "sources"]),
            QueryPolicy::polling(SOURCES_POLL_INTERVAL),
        ),
    };
    QuerySpec { path, policy }
}

/// Maps engine keys back to the reducer's keys for the queries currently watched.
#[derive(Default)]
pub struct QueryRegistry {
    keys: Mutex<HashMap<String, QueryKey>>,
}

impl QueryRegistry {
    pub fn register(&self, key: &QueryKey) -> String {
        let name = engine_key(key);
        if let Ok(mut keys) = self.keys.lock() {
            keys.insert(name.clone(), key.clone());
        }
        name
    }

    pub fn release(&self, key: &QueryKey) -> String {
        let name = engine_key(key);
        if let Ok(mut keys) = self.keys.lock() {
            keys.remove(&name);
        }
        name
    }

    pub fn lookup(&self, name: &str) -> Option<QueryKey> {
        self.keys.lock().ok()?.get(name).cloned()
    }
}
