//! Pipeline manager
//!
//! Keyed collection of live pipelines. Create builds the pipeline before
//! storing it, so a configuration error never leaves a half-registered
//! entry. All operations are serialized by the manager's mutex.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use super::Pipeline;
use crate::config::PipelineConfig;
use crate::{Error, Result};

/// Process-level collection of pipelines
pub struct PipelineManager {
    pipelines: Mutex<HashMap<String, Arc<Pipeline>>>,
}

impl PipelineManager {
    pub fn new() -> Self {
        Self {
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Process-singleton instance
    pub fn global() -> &'static PipelineManager {
        static MANAGER: OnceLock<PipelineManager> = OnceLock::new();
        MANAGER.get_or_init(PipelineManager::new)
    }

    /// Build a pipeline under a fresh id and return the id
    pub async fn create(&self, config: PipelineConfig) -> Result<String> {
        let mut pipelines = self.pipelines.lock().await;
        let id = Uuid::new_v4().to_string();
        let pipeline = Arc::new(Pipeline::new(id.clone(), config));
        pipeline.build().await?;
        pipelines.insert(id.clone(), pipeline);
        info!(pipeline = %id, "pipeline created");
        Ok(id)
    }

    /// Map-form convenience for control surfaces
    pub async fn create_from_value(&self, config: serde_json::Value) -> Result<String> {
        self.create(PipelineConfig::from_value(config)?).await
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Pipeline>> {
        self.pipelines.lock().await.get(id).cloned()
    }

    /// Ids of all live pipelines
    pub async fn list(&self) -> Vec<String> {
        self.pipelines.lock().await.keys().cloned().collect()
    }

    pub async fn start(&self, id: &str) -> Result<()> {
        let pipelines = self.pipelines.lock().await;
        let pipeline = pipelines
            .get(id)
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        pipeline.run().await
    }

    pub async fn stop(&self, id: &str) -> Result<()> {
        let pipelines = self.pipelines.lock().await;
        let pipeline = pipelines
            .get(id)
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        pipeline.shutdown().await;
        Ok(())
    }

    /// Reload a pipeline's configuration, preserving its run state
    pub async fn update_config(&self, id: &str, config: serde_json::Value) -> Result<()> {
        let pipelines = self.pipelines.lock().await;
        let pipeline = pipelines
            .get(id)
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        pipeline.update_config(PipelineConfig::from_value(config)?).await
    }

    /// Live parameter update on one node
    pub async fn update_node_params(
        &self,
        id: &str,
        node_name: &str,
        params: serde_json::Value,
    ) -> Result<()> {
        let pipelines = self.pipelines.lock().await;
        let pipeline = pipelines
            .get(id)
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        pipeline.update_node_params(node_name, params).await
    }

    /// Shut a pipeline down and remove it
    pub async fn delete(&self, id: &str) -> Result<()> {
        let mut pipelines = self.pipelines.lock().await;
        let pipeline = pipelines
            .remove(id)
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        pipeline.shutdown().await;
        info!(pipeline = %id, "pipeline deleted");
        Ok(())
    }
}

impl Default for PipelineManager {
    fn default() -> Self {
        Self::new()
    }
}
