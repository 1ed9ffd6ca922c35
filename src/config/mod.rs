// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Configuration system for beatgrid.
//!
//! A quantize file describes one run: the search tree, which job handler
//! and notation policies to use, and the beats to quantize. Files are YAML
//! unless their extension is `.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration as StdDuration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::jobs::{JobHandler, ParallelJobHandler, SerialJobHandler};
use crate::music::{Duration, Tempo};
use crate::notation::{
    AttackPointOptimizer, ConcatenatingGraceHandler, DiscardingGraceHandler, GraceHandler,
    NaiveAttackPointOptimizer, NullAttackPointOptimizer,
};
use crate::quantize::{
    Beat, Onset, QuantizationJob, Quantizer, SearchTree, SubdivisionRule,
    DEFAULT_REFINEMENT_THRESHOLD,
};

/// Root configuration for a quantization run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuantizeFile {
    #[serde(default)]
    pub search_tree: SearchTreeConfig,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub grace: GraceConfig,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Attach tempo marks where the tempo changes
    #[serde(default = "default_attach_tempos")]
    pub attach_tempos: bool,
    #[serde(default)]
    pub beats: Vec<BeatConfig>,
}

fn default_attach_tempos() -> bool {
    true
}

impl Default for QuantizeFile {
    fn default() -> Self {
        Self {
            search_tree: SearchTreeConfig::default(),
            jobs: JobsConfig::default(),
            grace: GraceConfig::default(),
            optimizer: OptimizerKind::default(),
            attach_tempos: default_attach_tempos(),
            beats: Vec::new(),
        }
    }
}

impl QuantizeFile {
    /// Load a configuration file, choosing the format by extension
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let file = if is_toml(path) {
            Self::from_toml(&contents)
        } else {
            Self::from_yaml(&contents)
        }
        .with_context(|| format!("Invalid config file: {:?}", path))?;
        file.validate()?;
        Ok(file)
    }

    /// Parse a configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse YAML configuration")
    }

    /// Parse a configuration from TOML string
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    /// Serialize to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize configuration to YAML")
    }

    /// Serialize to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string(self).context("Failed to serialize configuration to TOML")
    }

    /// Save configuration, choosing the format by extension
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let text = if is_toml(path) {
            self.to_toml()?
        } else {
            self.to_yaml()?
        };
        fs::write(path, text).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Check every section before anything is built from it
    pub fn validate(&self) -> Result<()> {
        self.search_tree.build()?;
        self.jobs.validate()?;
        self.grace.build()?;
        self.beats()?;
        Ok(())
    }

    /// Build the configured beats in order
    pub fn beats(&self) -> Result<Vec<Beat>> {
        self.beats
            .iter()
            .enumerate()
            .map(|(i, beat)| beat.build().with_context(|| format!("Invalid beat {}", i)))
            .collect()
    }

    /// Build a quantizer with every configured policy
    pub fn build_quantizer(&self) -> Result<Quantizer> {
        let optimizer: Box<dyn AttackPointOptimizer> = match self.optimizer {
            OptimizerKind::Naive => Box::new(NaiveAttackPointOptimizer),
            OptimizerKind::Null => Box::new(NullAttackPointOptimizer),
        };
        Ok(Quantizer::new(self.search_tree.build()?)
            .with_job_handler(self.jobs.build()?)
            .with_grace_handler(self.grace.build()?)
            .with_optimizer(optimizer)
            .with_attach_tempos(self.attach_tempos))
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false)
}

/// Search tree constraint, either as depth levels or a nested definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchTreeConfig {
    /// Divisors allowed at each depth, e.g. `[[2, 3], [2]]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<Vec<u32>>>,
    /// Nested child count -> rule map
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<SubdivisionRule>,
    /// Onsets a node needs beyond this count to be refined
    #[serde(default = "default_refinement_threshold")]
    pub refinement_threshold: usize,
}

fn default_refinement_threshold() -> usize {
    DEFAULT_REFINEMENT_THRESHOLD
}

impl Default for SearchTreeConfig {
    fn default() -> Self {
        Self {
            levels: None,
            definition: None,
            refinement_threshold: default_refinement_threshold(),
        }
    }
}

impl SearchTreeConfig {
    /// Build the search tree; the default tree when neither form is given
    pub fn build(&self) -> Result<SearchTree> {
        let tree = match (&self.levels, &self.definition) {
            (Some(_), Some(_)) => bail!("search_tree takes either levels or definition, not both"),
            (Some(levels), None) => SearchTree::from_levels(levels)?,
            (None, Some(definition)) => SearchTree::new(definition.clone())?,
            (None, None) => SearchTree::default(),
        };
        Ok(tree.with_refinement_threshold(self.refinement_threshold))
    }
}

/// Which job handler runs the search
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HandlerKind {
    #[default]
    Serial,
    Parallel,
}

/// Job handler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobsConfig {
    #[serde(default)]
    pub handler: HandlerKind,
    /// Exact pool size; overrides `cpu_multiplier`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,
    /// Workers per available CPU
    #[serde(default = "default_cpu_multiplier")]
    pub cpu_multiplier: usize,
    /// Give up on outstanding results after this many milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

fn default_cpu_multiplier() -> usize {
    crate::jobs::parallel::DEFAULT_CPU_MULTIPLIER
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            handler: HandlerKind::default(),
            workers: None,
            cpu_multiplier: default_cpu_multiplier(),
            timeout_ms: None,
        }
    }
}

impl JobsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == Some(0) {
            bail!("jobs.workers must be at least 1");
        }
        if self.cpu_multiplier == 0 {
            bail!("jobs.cpu_multiplier must be at least 1");
        }
        if self.timeout_ms == Some(0) {
            bail!("jobs.timeout_ms must be positive");
        }
        Ok(())
    }

    /// Build the configured job handler
    pub fn build(&self) -> Result<Box<dyn JobHandler<QuantizationJob>>> {
        self.validate()?;
        let handler: Box<dyn JobHandler<QuantizationJob>> = match self.handler {
            HandlerKind::Serial => Box::new(SerialJobHandler),
            HandlerKind::Parallel => {
                let mut handler = match self.workers {
                    Some(workers) => ParallelJobHandler::with_workers(workers),
                    None => ParallelJobHandler::with_cpu_multiplier(self.cpu_multiplier),
                };
                if let Some(ms) = self.timeout_ms {
                    handler = handler.with_timeout(StdDuration::from_millis(ms));
                }
                Box::new(handler)
            }
        };
        Ok(handler)
    }
}

/// Which grace handler resolves crowded attack points
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraceKind {
    #[default]
    Concatenating,
    Discarding,
}

/// Grace handler configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraceConfig {
    #[serde(default)]
    pub handler: GraceKind,
    /// Duration of each grace note
    #[serde(default = "default_grace_duration")]
    pub duration: Duration,
}

fn default_grace_duration() -> Duration {
    Duration::new(1, 16)
}

impl Default for GraceConfig {
    fn default() -> Self {
        Self {
            handler: GraceKind::default(),
            duration: default_grace_duration(),
        }
    }
}

impl GraceConfig {
    pub fn build(&self) -> Result<Box<dyn GraceHandler>> {
        let handler: Box<dyn GraceHandler> = match self.handler {
            GraceKind::Concatenating => Box::new(ConcatenatingGraceHandler::new(self.duration)?),
            GraceKind::Discarding => Box::new(DiscardingGraceHandler),
        };
        Ok(handler)
    }
}

/// Which attack-point optimizer rewrites logical ties
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OptimizerKind {
    #[default]
    #[serde(rename = "naive")]
    Naive,
    #[serde(rename = "none")]
    Null,
}

/// One beat of input
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeatConfig {
    pub span: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tempo: Option<Tempo>,
    #[serde(default)]
    pub onsets: Vec<Onset>,
}

impl BeatConfig {
    pub fn build(&self) -> Result<Beat> {
        Ok(Beat::new(self.span, self.tempo, self.onsets.clone())?)
    }
}
