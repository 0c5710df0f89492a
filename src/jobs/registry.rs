//! Mapping from job names to spawnable actions

use std::collections::HashMap;

use crate::config::ScraperConfig;
use crate::errors::JobError;

/// Fully resolved command for one job run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAction {
    /// Canonical target name, used as the guard key
    pub target: String,
    pub program: String,
    pub args: Vec<String>,
}

/// Registry of runnable targets and their aliases
///
/// Resolution is case-sensitive and exact-match only. Aliases map to a
/// canonical target; the canonical name is what the guard table keys on,
/// so triggering a job through an alias contends with the same slot as
/// triggering it directly.
pub struct JobRegistry {
    command: String,
    base_args: Vec<String>,
    targets: Vec<String>,
    aliases: HashMap<String, String>,
}

impl JobRegistry {
    pub fn from_config(config: &ScraperConfig) -> Self {
        let mut registry = Self {
            command: config.command.clone(),
            base_args: config.args.clone(),
            targets: Vec::new(),
            aliases: HashMap::new(),
        };

        for target in &config.spiders {
            registry.register(target);
        }
        for (alias, canonical) in &config.aliases {
            registry.register_alias(alias, canonical);
        }

        registry
    }

    /// Register a canonical target by name
    pub fn register(&mut self, target: &str) {
        if !self.targets.iter().any(|t| t == target) {
            self.targets.push(target.to_string());
        }
    }

    /// Register an alternate name for a canonical target
    pub fn register_alias(&mut self, alias: &str, canonical: &str) {
        self.aliases
            .insert(alias.to_string(), canonical.to_string());
    }

    /// Resolve a job name (canonical or alias) to its action
    pub fn resolve(&self, name: &str) -> Result<JobAction, JobError> {
        let canonical = if self.targets.iter().any(|t| t == name) {
            name
        } else if let Some(canonical) = self.aliases.get(name) {
            // An alias pointing at an unregistered target is still unknown
            if !self.targets.iter().any(|t| t == canonical) {
                return Err(JobError::UnknownJob {
                    target: name.to_string(),
                });
            }
            canonical.as_str()
        } else {
            return Err(JobError::UnknownJob {
                target: name.to_string(),
            });
        };

        let mut args = self.base_args.clone();
        args.push(canonical.to_string());

        Ok(JobAction {
            target: canonical.to_string(),
            program: self.command.clone(),
            args,
        })
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }
}
