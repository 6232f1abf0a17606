use bevy::log::warn;
use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{BundleError, BundleResult};

/// Name of the per-user configuration file in `$HOME`.
pub const CONFIG_FILE: &str = ".bundlerc";

/// Fraction of the mean edge length used as the first pass step when
/// `step_size` is unset.
pub const DEFAULT_STEP_FRACTION: f32 = 0.1;

/// How the per-half subdivision count grows from one pass to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubdivisionGrowth {
    /// `n * factor`
    Multiply { factor: usize },
    /// `n + step`
    Add { step: usize },
}

impl Default for SubdivisionGrowth {
    fn default() -> Self {
        SubdivisionGrowth::Multiply { factor: 2 }
    }
}

impl SubdivisionGrowth {
    pub fn next(self, current: usize) -> usize {
        match self {
            SubdivisionGrowth::Multiply { factor } => current.saturating_mul(factor),
            SubdivisionGrowth::Add { step } => current.saturating_add(step),
        }
    }
}

/// Bundling options, loaded from `~/.bundlerc` (TOML) or built in code.
///
/// Lengths marked "× mean" are fractions of the mean edge length so the
/// defaults work at any coordinate scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Resource)]
pub struct BundleConfig {
    /// Number of relaxation passes. 0 yields straight edges.
    #[serde(default = "default_passes")]
    pub passes: usize,
    /// Interior points per half-edge in the first pass.
    #[serde(default = "default_initial_subdivisions", alias = "initialSubdivisions")]
    pub initial_subdivisions: usize,
    /// Upper bound for the subdivision schedule.
    #[serde(default = "default_max_subdivisions", alias = "maxSubdivisions")]
    pub max_subdivisions: usize,
    /// Largest distance (world units) a point may travel in the first pass.
    #[serde(default, alias = "stepSize", skip_serializing_if = "Option::is_none")]
    pub step_size: Option<f32>,
    /// Step multiplier applied after every pass.
    #[serde(default = "default_step_decay", alias = "stepDecay")]
    pub step_decay: f32,
    /// Iterations in the first pass.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Iteration count multiplier applied after every pass.
    #[serde(default = "default_iteration_decay", alias = "iterationDecay")]
    pub iteration_decay: f32,
    /// Pull of each control point toward the midpoint of its neighbours.
    #[serde(default = "default_spring_constant", alias = "springConstant")]
    pub spring_constant: f32,
    /// Distance (× mean) at which a partner's pull peaks.
    #[serde(default = "default_attraction_radius", alias = "attractionRadius")]
    pub attraction_radius: f32,
    /// Pairs scoring below this never influence each other.
    #[serde(
        default = "default_compatibility_threshold",
        alias = "compatibilityThreshold"
    )]
    pub compatibility_threshold: f32,
    /// Influencing points considered per control point.
    #[serde(default = "default_max_neighbors", alias = "maxNeighbors")]
    pub max_neighbors: usize,
    /// Let opposing edges bundle side by side in separate lanes.
    #[serde(default)]
    pub bidirectional: bool,
    /// Lane separation (× mean) for opposing edges.
    #[serde(default = "default_lane_width", alias = "laneWidth")]
    pub lane_width: f32,
    /// Scale each partner's pull by its relative edge weight.
    #[serde(default, alias = "weightAttraction")]
    pub weight_attraction: bool,
    #[serde(default, alias = "subdivisionGrowth")]
    pub subdivision_growth: SubdivisionGrowth,
}

fn default_passes() -> usize { 5 }
fn default_initial_subdivisions() -> usize { 1 }
fn default_max_subdivisions() -> usize { 64 }
fn default_step_decay() -> f32 { 0.5 }
fn default_iterations() -> usize { 50 }
fn default_iteration_decay() -> f32 { 2.0 / 3.0 }
fn default_spring_constant() -> f32 { 0.1 }
fn default_attraction_radius() -> f32 { 0.25 }
fn default_compatibility_threshold() -> f32 { 0.05 }
fn default_max_neighbors() -> usize { 32 }
fn default_lane_width() -> f32 { 0.02 }

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            initial_subdivisions: default_initial_subdivisions(),
            max_subdivisions: default_max_subdivisions(),
            step_size: None,
            step_decay: default_step_decay(),
            iterations: default_iterations(),
            iteration_decay: default_iteration_decay(),
            spring_constant: default_spring_constant(),
            attraction_radius: default_attraction_radius(),
            compatibility_threshold: default_compatibility_threshold(),
            max_neighbors: default_max_neighbors(),
            bidirectional: false,
            lane_width: default_lane_width(),
            weight_attraction: false,
            subdivision_growth: SubdivisionGrowth::default(),
        }
    }
}

fn in_unit_interval(v: f32) -> bool {
    v.is_finite() && (0.0..=1.0).contains(&v)
}

impl BundleConfig {
    /// Rejects out-of-range options, naming the first offender.
    pub fn validate(&self) -> BundleResult<()> {
        if self.initial_subdivisions == 0 {
            return Err(BundleError::option("initial_subdivisions", "must be at least 1"));
        }
        if self.max_subdivisions < self.initial_subdivisions {
            return Err(BundleError::option(
                "max_subdivisions",
                format!("must be >= initial_subdivisions ({})", self.initial_subdivisions),
            ));
        }
        if let SubdivisionGrowth::Multiply { factor: 0 } = self.subdivision_growth {
            return Err(BundleError::option("subdivision_growth", "factor must be at least 1"));
        }
        if let Some(step) = self.step_size {
            if !step.is_finite() || step <= 0.0 {
                return Err(BundleError::option("step_size", format!("{step} is not a positive length")));
            }
        }
        if !in_unit_interval(self.step_decay) || self.step_decay == 0.0 {
            return Err(BundleError::option("step_decay", "must lie in (0, 1]"));
        }
        if self.iterations == 0 {
            return Err(BundleError::option("iterations", "must be at least 1"));
        }
        if !in_unit_interval(self.iteration_decay) || self.iteration_decay == 0.0 {
            return Err(BundleError::option("iteration_decay", "must lie in (0, 1]"));
        }
        if !in_unit_interval(self.spring_constant) {
            return Err(BundleError::option("spring_constant", "must lie in [0, 1]"));
        }
        if !self.attraction_radius.is_finite() || self.attraction_radius <= 0.0 {
            return Err(BundleError::option("attraction_radius", "must be positive"));
        }
        if !in_unit_interval(self.compatibility_threshold) {
            return Err(BundleError::option(
                "compatibility_threshold",
                format!("{} is outside [0, 1]", self.compatibility_threshold),
            ));
        }
        if self.max_neighbors == 0 {
            return Err(BundleError::option("max_neighbors", "must be at least 1"));
        }
        if !self.lane_width.is_finite() || self.lane_width < 0.0 {
            return Err(BundleError::option("lane_width", "must be a non-negative length"));
        }
        Ok(())
    }
}

/// Reads and validates a TOML configuration file.
pub fn load_config_from(path: &Path) -> BundleResult<BundleConfig> {
    let contents = fs::read_to_string(path)?;
    let config: BundleConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

/// Attempts to load the configuration from `~/.bundlerc`.
/// Falls back to default if the file is missing or invalid.
pub fn load_config() -> BundleConfig {
    if let Ok(home) = env::var("HOME") {
        let path = PathBuf::from(home).join(CONFIG_FILE);
        if path.exists() {
            match load_config_from(&path) {
                Ok(config) => return config,
                Err(err) => warn!("[CONFIG] Ignoring ~/{}: {}", CONFIG_FILE, err),
            }
        }
    }
    BundleConfig::default()
}
