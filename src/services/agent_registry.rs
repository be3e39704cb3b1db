//! Maps a job's ATS source to the agent that applies there.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::agents::{AgentSettings, GenericAgent, GreenhouseAgent, LeverAgent};
use crate::domain::models::JobSource;
use crate::domain::ports::{Agent, ArtifactStore, BrowserLauncher};

/// Registry of vendor agents with a generic fallback.
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
    fallback: Arc<dyn Agent>,
}

impl AgentRegistry {
    /// Empty registry; every source resolves to `fallback`.
    pub fn new(fallback: Arc<dyn Agent>) -> Self {
        Self {
            agents: HashMap::new(),
            fallback,
        }
    }

    /// Greenhouse and Lever agents plus the generic fallback, all sharing one
    /// launcher and artifact store.
    pub fn with_defaults(
        launcher: Arc<dyn BrowserLauncher>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: AgentSettings,
    ) -> Self {
        let fallback = Arc::new(GenericAgent::new(launcher.clone(), artifacts.clone(), settings));
        Self::new(fallback)
            .register(
                JobSource::Greenhouse,
                Arc::new(GreenhouseAgent::new(launcher.clone(), artifacts.clone(), settings)),
            )
            .register(
                JobSource::Lever,
                Arc::new(LeverAgent::new(launcher, artifacts, settings)),
            )
    }

    pub fn register(mut self, source: JobSource, agent: Arc<dyn Agent>) -> Self {
        self.agents.insert(source.as_str().to_string(), agent);
        self
    }

    /// Agent for `source`; unknown sources get the fallback.
    pub fn resolve(&self, source: &JobSource) -> Arc<dyn Agent> {
        self.agents
            .get(source.as_str())
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Registered source tags, sorted.
    pub fn sources(&self) -> Vec<&str> {
        let mut sources: Vec<&str> = self.agents.keys().map(String::as_str).collect();
        sources.sort_unstable();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::artifacts::FilesystemArtifactStore;
    use crate::adapters::browser::ScriptedBrowser;

    fn registry() -> AgentRegistry {
        AgentRegistry::with_defaults(
            Arc::new(ScriptedBrowser::accepting()),
            Arc::new(FilesystemArtifactStore::new(std::env::temp_dir())),
            AgentSettings::default(),
        )
    }

    #[test]
    fn test_resolves_known_vendors() {
        let registry = registry();
        assert_eq!(registry.resolve(&JobSource::Greenhouse).name(), "greenhouse");
        assert_eq!(registry.resolve(&JobSource::Lever).name(), "lever");
        assert_eq!(registry.sources(), vec!["greenhouse", "lever"]);
    }

    #[test]
    fn test_unknown_source_falls_back_to_generic() {
        let registry = registry();
        let agent = registry.resolve(&JobSource::Other("workday".into()));
        assert_eq!(agent.name(), "generic");
    }

    #[test]
    fn test_register_overrides() {
        let generic: Arc<dyn Agent> = registry().resolve(&JobSource::Other("x".into()));
        let registry = registry().register(JobSource::Greenhouse, generic);
        assert_eq!(registry.resolve(&JobSource::Greenhouse).name(), "generic");
    }
}
