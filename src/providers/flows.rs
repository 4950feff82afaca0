//! Flow providers backed by memory or by a directory of flow files.

use super::FlowProvider;
use crate::error::{Error, Result};
use crate::models::flow::normalize_flow_name;
use crate::models::Flow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

/// On-disk encodings a flow file may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowFormat {
    Json,
    Yaml,
}

impl FlowFormat {
    /// Detects the format from a file name, `None` for files that are not flows.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".flow.json") {
            Some(Self::Json)
        } else if name.ends_with(".flow.yaml") || name.ends_with(".flow.yml") {
            Some(Self::Yaml)
        } else {
            None
        }
    }
}

/// Parses a flow definition. Malformed documents are configuration errors.
pub fn parse_flow(contents: &str, format: FlowFormat) -> Result<Flow> {
    let parsed = match format {
        FlowFormat::Json => serde_json::from_str::<Flow>(contents).map_err(|e| e.to_string()),
        FlowFormat::Yaml => serde_yaml::from_str::<Flow>(contents).map_err(|e| e.to_string()),
    };

    let mut flow = parsed.map_err(|e| Error::Configuration(format!("Invalid flow definition: {}", e)))?;
    flow.name = normalize_flow_name(&flow.name);
    Ok(flow)
}

/// Flows held in memory, keyed by normalized name.
#[derive(Debug, Default, Clone)]
pub struct StaticFlowProvider {
    flows: HashMap<String, Arc<Flow>>,
}

impl StaticFlowProvider {
    pub fn new(flows: impl IntoIterator<Item = Flow>) -> Self {
        let flows = flows
            .into_iter()
            .map(|flow| (normalize_flow_name(&flow.name), Arc::new(flow)))
            .collect();
        Self { flows }
    }

    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.insert(normalize_flow_name(&flow.name), Arc::new(flow));
        self
    }
}

#[async_trait]
impl FlowProvider for StaticFlowProvider {
    async fn find_flow(&self, name: &str) -> Result<Option<Arc<Flow>>> {
        Ok(self.flows.get(&normalize_flow_name(name)).cloned())
    }

    async fn flow_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.flows.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}

/// Loads every `*.flow.json`, `*.flow.yaml` and `*.flow.yml` file under a
/// directory, recursively. Call [`reload`](Self::reload) to pick up edits.
#[derive(Debug)]
pub struct FileFlowProvider {
    directory: PathBuf,
    flows: RwLock<HashMap<String, Arc<Flow>>>,
}

impl FileFlowProvider {
    pub async fn load(directory: impl Into<PathBuf>) -> Result<Self> {
        let provider = Self {
            directory: directory.into(),
            flows: RwLock::new(HashMap::new()),
        };
        provider.reload().await?;
        Ok(provider)
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Re-reads the directory, replacing all flows atomically. Returns the
    /// number of flows loaded.
    pub async fn reload(&self) -> Result<usize> {
        let mut loaded = HashMap::new();
        for path in collect_flow_files(&self.directory).await? {
            let Some(format) = FlowFormat::from_path(&path) else {
                continue;
            };
            let contents = tokio::fs::read_to_string(&path).await?;
            let flow = parse_flow(&contents, format).map_err(|e| {
                Error::Configuration(format!("{} ({})", e, path.display()))
            })?;

            tracing::debug!(flow = %flow.name, path = %path.display(), "[FlowProvider] Loaded flow");
            if let Some(previous) = loaded.insert(flow.name.clone(), Arc::new(flow)) {
                return Err(Error::Configuration(format!(
                    "Flow '{}' is defined more than once under {}",
                    previous.name,
                    self.directory.display()
                )));
            }
        }

        let count = loaded.len();
        *self.flows.write().await = loaded;
        tracing::info!(
            directory = %self.directory.display(),
            count,
            "[FlowProvider] Flows loaded"
        );
        Ok(count)
    }
}

async fn collect_flow_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut pending = vec![root.to_path_buf()];
    let mut files = Vec::new();

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::Flow(format!("Cannot read flow directory {}: {}", dir.display(), e)))?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
            } else if FlowFormat::from_path(&path).is_some() {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[async_trait]
impl FlowProvider for FileFlowProvider {
    async fn find_flow(&self, name: &str) -> Result<Option<Arc<Flow>>> {
        Ok(self.flows.read().await.get(&normalize_flow_name(name)).cloned())
    }

    async fn flow_names(&self) -> Result<Vec<String>> {
        let mut names: Vec<_> = self.flows.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
