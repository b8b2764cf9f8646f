use std::{io::ErrorKind, path::PathBuf, sync::Arc};

use tokio::sync::Mutex;
use tracing::{debug, warn};

use arrosage_common::{ClientError, ReconnectPolicy, RuntimeConfig, SessionConfig};

const TOKEN_FILE: &str = "auth_token";
const RUNTIME_FILE: &str = "runtime.json";

/// Holds the bearer token issued at login.
///
/// The transport and the API client read it again on every connection and
/// request, so a token saved after a re-login is picked up without rebuilding
/// either of them.
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    path: Option<Arc<PathBuf>>,
    cached: Arc<Mutex<Option<String>>>,
}

impl TokenStore {
    pub fn in_memory(token: Option<String>) -> Self {
        Self {
            path: None,
            cached: Arc::new(Mutex::new(token)),
        }
    }

    pub fn file(path: PathBuf) -> Self {
        Self {
            path: Some(Arc::new(path)),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn load(&self) -> Result<Option<String>, ClientError> {
        let mut cached = self.cached.lock().await;
        let Some(path) = &self.path else {
            return Ok(cached.clone());
        };

        match tokio::fs::read_to_string(path.as_ref()).await {
            Ok(raw) => {
                let token = raw.trim();
                *cached = (!token.is_empty()).then(|| token.to_string());
                Ok(cached.clone())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                *cached = None;
                Ok(None)
            }
            Err(err) => Err(ClientError::Storage(format!(
                "failed to read {}: {err}",
                path.display()
            ))),
        }
    }

    pub async fn save(&self, token: &str) -> Result<(), ClientError> {
        let mut cached = self.cached.lock().await;
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|err| ClientError::Storage(err.to_string()))?;
            }
            tokio::fs::write(path.as_ref(), token)
                .await
                .map_err(|err| ClientError::Storage(err.to_string()))?;
        }
        *cached = Some(token.to_string());
        debug!("auth token stored");
        Ok(())
    }

    pub async fn clear(&self) -> Result<(), ClientError> {
        let mut cached = self.cached.lock().await;
        *cached = None;
        let Some(path) = &self.path else {
            return Ok(());
        };
        match tokio::fs::remove_file(path.as_ref()).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ClientError::Storage(err.to_string())),
        }
    }
}

/// Durable client state under the data directory.
#[derive(Clone)]
pub struct AppStore {
    data_dir: Arc<PathBuf>,
    runtime_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl AppStore {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ARROSAGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.arrosage"));
        Self::new(data_dir)
    }

    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join(RUNTIME_FILE)),
            data_dir: Arc::new(data_dir),
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn token_store(&self) -> TokenStore {
        TokenStore::file(self.data_dir.join(TOKEN_FILE))
    }

    pub async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.runtime_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(runtime)?;
        tokio::fs::write(path, payload).await?;
        Ok(())
    }
}

pub fn apply_env_overrides(session: &mut SessionConfig) {
    apply_overrides(session, |key| std::env::var(key).ok());
}

fn apply_overrides(session: &mut SessionConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("ARROSAGE_API_URL") {
        session.endpoints.api_base_url = url;
    }
    if let Some(url) = var("ARROSAGE_WS_URL") {
        session.endpoints.ws_url = url;
    }
    if let Some(policy) = var("ARROSAGE_RECONNECT") {
        match policy.trim().to_lowercase().as_str() {
            "auto" => session.transport.reconnect = ReconnectPolicy::auto(),
            "deferred" => session.transport.reconnect = ReconnectPolicy::Deferred,
            other => warn!("ignoring unknown ARROSAGE_RECONNECT value {other:?}"),
        }
    }
    if let Some(timeout) = var("ARROSAGE_PENDING_TIMEOUT_MS").and_then(|raw| raw.parse().ok()) {
        session.store.pending_timeout_ms = timeout;
    }
    if let Some(interval) = var("ARROSAGE_POLL_INTERVAL_MS").and_then(|raw| raw.parse().ok()) {
        session.poll_interval_ms = Some(interval);
    }
}
