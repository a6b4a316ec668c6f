use anyhow::{bail, Result};
use std::sync::Arc;

use crate::agent::{Agent, AgentDescriptor};

/// Routable agents in registration order. Names are unique.
#[derive(Default, Clone)]
pub struct AgentRegistry {
    agents: Vec<Arc<dyn Agent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, agent: Arc<dyn Agent>) -> Result<()> {
        let name = agent.name();
        if name.trim().is_empty() {
            bail!("agent name must not be empty");
        }
        if self.get(name).is_some() {
            bail!("agent already registered: {name}");
        }
        self.agents.push(agent);
        Ok(())
    }

    pub fn with_agent(mut self, agent: Arc<dyn Agent>) -> Result<Self> {
        self.register(agent)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Agent>> {
        self.agents.iter().find(|a| a.name() == name)
    }

    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(|a| a.descriptor().clone()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}
