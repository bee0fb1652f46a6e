// ABOUTME: Sandbox session manager mapping logical service names to acquired remote sandboxes
// ABOUTME: Tracks every acquired sandbox and releases all of them best-effort at session end

use crate::client::{
    ClientError, ExtraParams, HttpSandboxClient, SandboxApi, SandboxDescriptor, SandboxDetails,
};
use crate::names::{NameTable, GROUPED_RESOURCE_TYPE};
use futures::stream::{self, StreamExt};
use harness_config::{ConfigError, SandboxConfig};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, ManagerError>;

/// Logical name -> reachable endpoint URL, for names that were acquired.
pub type EndpointOverrides = BTreeMap<String, String>;

/// Outcome of a `release_all` pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseSummary {
    pub released: usize,
    pub failed: usize,
}

/// One session's worth of remote sandboxes.
///
/// Acquisition is partial by nature: names whose sandbox could not be created
/// are simply missing from the returned [`EndpointOverrides`]. Every sandbox
/// the service hands back is tracked before its endpoints are inspected, so
/// [`SandboxManager::release_all`] reaches it even if it turned out unusable.
pub struct SandboxManager {
    api: Arc<dyn SandboxApi>,
    names: NameTable,
    max_concurrency: usize,
    acquired: Mutex<Vec<SandboxDescriptor>>,
}

impl SandboxManager {
    /// Create a manager talking to the provisioning service over HTTP.
    pub fn new(config: &SandboxConfig) -> Result<Self> {
        let client = HttpSandboxClient::new(config)?;
        Ok(Self::with_api(Arc::new(client)).with_max_concurrency(config.max_concurrency))
    }

    /// Create a manager from `KLAVIS_API_KEY` and related environment variables.
    pub fn from_env() -> Result<Self> {
        let config = SandboxConfig::from_env()?;
        Self::new(&config)
    }

    /// Create a manager over any [`SandboxApi`] implementation.
    pub fn with_api(api: Arc<dyn SandboxApi>) -> Self {
        Self {
            api,
            names: NameTable::default(),
            max_concurrency: harness_config::constants::DEFAULT_MAX_CONCURRENCY,
            acquired: Mutex::new(Vec::new()),
        }
    }

    pub fn with_names(mut self, names: NameTable) -> Self {
        self.names = names;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn names(&self) -> &NameTable {
        &self.names
    }

    /// Acquire sandboxes for every requested logical name.
    ///
    /// Grouped names share one `local_dev` request; every other name gets its
    /// own request. Failures are logged and the name is left out of the result.
    pub async fn acquire_many<I, S>(
        &self,
        names: I,
        extra_params: &HashMap<String, ExtraParams>,
    ) -> EndpointOverrides
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let partition = self.names.partition(names);
        let mut overrides = EndpointOverrides::new();

        if !partition.grouped.is_empty() {
            self.acquire_grouped(&partition.grouped, extra_params, &mut overrides)
                .await;
        }

        let names = &self.names;
        let api = &self.api;
        let mut pending = stream::iter(partition.ungrouped.iter().map(|name| {
            let resource_type = names.resource_type(name);
            let params = extra_params.get(name).cloned().unwrap_or_default();
            async move {
                let result = api.acquire(resource_type, &params).await;
                (name, resource_type, result)
            }
        }))
        .buffer_unordered(self.max_concurrency);

        while let Some((name, resource_type, result)) = pending.next().await {
            let descriptor = match result {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!(
                        name = %name,
                        resource_type,
                        "Failed to acquire sandbox: {}",
                        e
                    );
                    continue;
                }
            };

            self.track(descriptor.clone()).await;

            match descriptor.first_endpoint() {
                Some((key, url)) => {
                    let result_key = if key == resource_type {
                        name.clone()
                    } else {
                        key.to_string()
                    };
                    info!(
                        name = %result_key,
                        sandbox_id = %descriptor.id,
                        url,
                        "Acquired sandbox"
                    );
                    overrides.insert(result_key, url.to_string());
                }
                None => warn!(
                    name = %name,
                    sandbox_id = %descriptor.id,
                    "Sandbox acquired but response listed no endpoint"
                ),
            }
        }

        overrides
    }

    async fn acquire_grouped(
        &self,
        grouped: &[String],
        extra_params: &HashMap<String, ExtraParams>,
        overrides: &mut EndpointOverrides,
    ) {
        let params = merge_grouped_params(grouped, extra_params);

        let descriptor = match self.api.acquire(GROUPED_RESOURCE_TYPE, &params).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                warn!(
                    names = ?grouped,
                    resource_type = GROUPED_RESOURCE_TYPE,
                    "Failed to acquire grouped sandbox: {}",
                    e
                );
                return;
            }
        };

        self.track(descriptor.clone()).await;

        for name in grouped {
            let key = self.names.response_key(name);
            match descriptor.endpoint(key) {
                Some(url) => {
                    info!(
                        name = %name,
                        sandbox_id = %descriptor.id,
                        url,
                        "Acquired grouped sandbox endpoint"
                    );
                    overrides.insert(name.clone(), url.to_string());
                }
                None => warn!(
                    name = %name,
                    key,
                    sandbox_id = %descriptor.id,
                    "Grouped sandbox response has no endpoint for name"
                ),
            }
        }
    }

    /// Record a descriptor once per `(resource_type, id)`, so release never
    /// deletes the same sandbox twice.
    async fn track(&self, descriptor: SandboxDescriptor) {
        let mut acquired = self.acquired.lock().await;
        let known = acquired
            .iter()
            .any(|d| d.resource_type == descriptor.resource_type && d.id == descriptor.id);
        if known {
            warn!(
                sandbox_id = %descriptor.id,
                resource_type = %descriptor.resource_type,
                "Service returned an already tracked sandbox"
            );
            return;
        }
        acquired.push(descriptor);
    }

    /// Release every tracked sandbox exactly once and forget all of them.
    ///
    /// Individual failures are logged, never retried; the session is empty
    /// afterwards regardless.
    pub async fn release_all(&self) -> ReleaseSummary {
        let drained = std::mem::take(&mut *self.acquired.lock().await);
        if drained.is_empty() {
            return ReleaseSummary::default();
        }

        let api = &self.api;
        let summary = stream::iter(drained.iter().map(|descriptor| async move {
            let result = api
                .release(&descriptor.resource_type, &descriptor.id)
                .await;
            (descriptor, result)
        }))
        .buffer_unordered(self.max_concurrency)
        .fold(
            ReleaseSummary::default(),
            |mut summary, (descriptor, result)| async move {
                match result {
                    Ok(()) => {
                        info!(
                            sandbox_id = %descriptor.id,
                            resource_type = %descriptor.resource_type,
                            "Released sandbox"
                        );
                        summary.released += 1;
                    }
                    Err(e) => {
                        warn!(
                            sandbox_id = %descriptor.id,
                            resource_type = %descriptor.resource_type,
                            "Failed to release sandbox: {}",
                            e
                        );
                        summary.failed += 1;
                    }
                }
                summary
            },
        )
        .await;

        info!(
            released = summary.released,
            failed = summary.failed,
            "Sandbox session released"
        );
        summary
    }

    /// Diagnostic passthrough to the describe endpoint.
    pub async fn get_details(
        &self,
        resource_type: &str,
        sandbox_id: &str,
    ) -> std::result::Result<SandboxDetails, ClientError> {
        self.api.describe(resource_type, sandbox_id).await
    }

    /// Snapshot of every tracked sandbox, in acquisition order.
    pub async fn acquired(&self) -> Vec<SandboxDescriptor> {
        self.acquired.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.acquired.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.acquired.lock().await.is_empty()
    }

    /// Id of the tracked `local_dev` sandbox, the target of workspace sync.
    pub async fn local_dev_sandbox_id(&self) -> Option<String> {
        self.acquired
            .lock()
            .await
            .iter()
            .find(|d| d.resource_type == GROUPED_RESOURCE_TYPE)
            .map(|d| d.id.clone())
    }
}

impl Drop for SandboxManager {
    fn drop(&mut self) {
        let leaked = self.acquired.get_mut().len();
        if leaked > 0 {
            warn!(
                count = leaked,
                "Sandbox manager dropped without release_all; remote sandboxes left to idle timeout"
            );
        }
    }
}

/// Union of the grouped names' extra params, later names overwriting earlier keys.
fn merge_grouped_params(
    grouped: &[String],
    extra_params: &HashMap<String, ExtraParams>,
) -> ExtraParams {
    let mut sorted: Vec<&String> = grouped.iter().collect();
    sorted.sort();

    let mut merged = ExtraParams::new();
    for name in sorted {
        if let Some(params) = extra_params.get(name) {
            for (key, value) in params {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    merged
}
