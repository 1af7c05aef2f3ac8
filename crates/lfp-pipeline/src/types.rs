//! Shared types for the longest flow path pipeline.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::corridor::Corridor;
use crate::grid::{Cell, DistanceGrid, PathGrid};
use crate::seed::SeedMask;
use crate::thin::Skeleton;

/// A map coordinate (easting, northing) in the grid's units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// X / easting.
    pub easting: f64,
    /// Y / northing.
    pub northing: f64,
}

impl Coordinate {
    /// Create a new coordinate.
    #[must_use]
    pub const fn new(easting: f64, northing: f64) -> Self {
        Self { easting, northing }
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.easting, self.northing)
    }
}

/// Failure to parse an `easting,northing` pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("expected `easting,northing`, got {0:?}")]
pub struct ParseCoordinateError(String);

impl FromStr for Coordinate {
    type Err = ParseCoordinateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseCoordinateError(s.to_string());
        let (e, n) = s.split_once(',').ok_or_else(err)?;
        let easting = e.trim().parse::<f64>().map_err(|_| err())?;
        let northing = n.trim().parse::<f64>().map_err(|_| err())?;
        Ok(Self::new(easting, northing))
    }
}

/// Configuration for the longest flow path pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Tolerance below the maximum combined flow length, in map units,
    /// within which cells are kept in the corridor. Absorbs floating-point
    /// drift between differently ordered summations.
    pub epsilon: f64,

    /// Upper bound on thinning iterations. Each iteration strips at most
    /// one layer from every side of the corridor.
    pub max_thin_iterations: usize,
}

impl PipelineConfig {
    /// Default corridor tolerance in map units.
    pub const DEFAULT_EPSILON: f64 = 0.0005;

    /// Default cap on thinning iterations.
    pub const DEFAULT_MAX_THIN_ITERATIONS: usize = 200;

    /// Check the configuration for values the pipeline cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`FlowPathError::InvalidConfig`] if `epsilon` is negative
    /// or not finite, or `max_thin_iterations` is zero.
    pub fn validate(&self) -> Result<(), FlowPathError> {
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(FlowPathError::InvalidConfig(format!(
                "epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        if self.max_thin_iterations == 0 {
            return Err(FlowPathError::InvalidConfig(
                "max_thin_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            epsilon: Self::DEFAULT_EPSILON,
            max_thin_iterations: Self::DEFAULT_MAX_THIN_ITERATIONS,
        }
    }
}

/// Errors raised by individual pipeline components.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FlowPathError {
    /// The seed mask is empty or addresses cells outside the grid.
    #[error("invalid seed: {reason}")]
    InvalidSeed {
        /// What was wrong with the seeds.
        reason: String,
    },

    /// The outlet coordinate does not fall inside the grid extent.
    #[error("coordinate ({easting}, {northing}) lies outside the grid extent")]
    OutOfBounds {
        /// Requested easting.
        easting: f64,
        /// Requested northing.
        northing: f64,
    },

    /// No cell has both a downstream and an upstream flow length, or no
    /// cell drains into the outlet at all.
    #[error("no flow path reaches the outlet")]
    NoReachablePath,

    /// Thinning was asked to operate on an empty mask.
    #[error("corridor mask is empty")]
    EmptyCorridor,

    /// The direction field loops back on itself.
    #[error("direction field contains a cycle through cell ({row}, {col})")]
    CyclicDirection {
        /// Row of a cell on the cycle.
        row: usize,
        /// Column of a cell on the cycle.
        col: usize,
    },

    /// Two grids that must align have different shapes.
    #[error("grid shape mismatch: expected {expected} cells, got {actual}")]
    GridMismatch {
        /// Cell count of the reference grid.
        expected: usize,
        /// Cell count of the offending grid.
        actual: usize,
    },

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),

    /// The caller requested cancellation.
    #[error("computation cancelled")]
    Cancelled,
}

impl FlowPathError {
    pub(crate) const fn cyclic_at(cell: Cell) -> Self {
        Self::CyclicDirection {
            row: cell.row,
            col: cell.col,
        }
    }
}

/// Pipeline stage identifiers, used to tag failures and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    /// Configuration validation.
    Configure,
    /// Outlet snapping and seed derivation.
    Seed,
    /// Downstream flow length propagation.
    Downstream,
    /// Upstream flow length propagation.
    Upstream,
    /// Combined-distance corridor extraction.
    Corridor,
    /// Corridor thinning.
    Thin,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Seed => "seed",
            Self::Downstream => "downstream",
            Self::Upstream => "upstream",
            Self::Corridor => "corridor",
            Self::Thin => "thin",
        };
        f.write_str(name)
    }
}

/// A component failure tagged with the stage that produced it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    /// The stage that failed.
    pub stage: Stage,
    /// The underlying failure.
    #[source]
    pub source: FlowPathError,
}

impl PipelineError {
    /// Tag `source` with `stage`.
    #[must_use]
    pub const fn new(stage: Stage, source: FlowPathError) -> Self {
        Self { stage, source }
    }

    /// The underlying component error.
    #[must_use]
    pub const fn kind(&self) -> &FlowPathError {
        &self.source
    }
}

/// Result of running the pipeline, with intermediates discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    /// The thinned longest flow path.
    pub path: PathGrid,
    /// The cell the outlet coordinate snapped to.
    pub outlet: Cell,
    /// Length of the longest flow path in map units.
    pub longest_length: f64,
}

/// Result of running the pipeline with every intermediate grid kept.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedResult {
    /// The cell the outlet coordinate snapped to.
    pub outlet: Cell,
    /// Seed cells derived from the outlet.
    pub seeds: SeedMask,
    /// Flow length from each cell down to the outlet.
    pub downstream: DistanceGrid,
    /// Flow length from each cell up to its farthest source.
    pub upstream: DistanceGrid,
    /// Combined grid, maximum, and corridor mask.
    pub corridor: Corridor,
    /// Thinned path and thinning statistics.
    pub skeleton: Skeleton,
}

impl StagedResult {
    /// The final path grid.
    #[must_use]
    pub const fn path(&self) -> &PathGrid {
        &self.skeleton.path
    }

    /// Length of the longest flow path in map units.
    #[must_use]
    pub const fn longest_length(&self) -> f64 {
        self.corridor.max_combined
    }

    /// Drop the intermediates.
    #[must_use]
    pub fn into_process_result(self) -> ProcessResult {
        ProcessResult {
            path: self.skeleton.path,
            outlet: self.outlet,
            longest_length: self.corridor.max_combined,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn coordinate_parses_pair() {
        let c: Coordinate = "637500.5, 221750".parse().unwrap();
        assert_eq!(c, Coordinate::new(637_500.5, 221_750.0));
    }

    #[test]
    fn coordinate_rejects_garbage() {
        assert!("637500".parse::<Coordinate>().is_err());
        assert!("a,b".parse::<Coordinate>().is_err());
    }

    #[test]
    fn coordinate_display_is_parseable() {
        let c = Coordinate::new(1.5, -2.25);
        assert_eq!(c.to_string().parse::<Coordinate>().unwrap(), c);
    }

    #[test]
    fn config_defaults() {
        let config = PipelineConfig::default();
        assert!((config.epsilon - 0.0005).abs() < f64::EPSILON);
        assert_eq!(config.max_thin_iterations, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_rejects_bad_values() {
        let negative = PipelineConfig {
            epsilon: -1.0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            negative.validate(),
            Err(FlowPathError::InvalidConfig(_))
        ));

        let nan = PipelineConfig {
            epsilon: f64::NAN,
            ..PipelineConfig::default()
        };
        assert!(nan.validate().is_err());

        let no_iterations = PipelineConfig {
            max_thin_iterations: 0,
            ..PipelineConfig::default()
        };
        assert!(no_iterations.validate().is_err());
    }

    #[test]
    fn config_json_fills_missing_fields() {
        let config: PipelineConfig = serde_json::from_str(r#"{"epsilon": 0.01}"#).unwrap();
        assert!((config.epsilon - 0.01).abs() < f64::EPSILON);
        assert_eq!(
            config.max_thin_iterations,
            PipelineConfig::DEFAULT_MAX_THIN_ITERATIONS
        );
    }

    #[test]
    fn pipeline_error_names_stage() {
        let err = PipelineError::new(Stage::Corridor, FlowPathError::NoReachablePath);
        assert_eq!(
            err.to_string(),
            "corridor stage failed: no flow path reaches the outlet"
        );
        assert_eq!(err.kind(), &FlowPathError::NoReachablePath);
    }

    #[test]
    fn cyclic_error_display() {
        let err = FlowPathError::CyclicDirection { row: 2, col: 3 };
        assert_eq!(
            err.to_string(),
            "direction field contains a cycle through cell (2, 3)"
        );
    }
}
