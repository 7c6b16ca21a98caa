//! Centralized default values for orion-perf configuration.
//!
//! These defaults are used as fallback values when neither a settings file nor
//! the environment provide a value.

// ============================================================================
// Orion Invocation Defaults
// ============================================================================

/// Name of the orion executable looked up on the search path.
pub const DEFAULT_ORION_BINARY: &str = "orion";

/// Container runtime used when orion is not installed locally.
pub const DEFAULT_CONTAINER_RUNTIME: &str = "podman";

/// Container image that ships the orion executable.
pub const DEFAULT_CONTAINER_IMAGE: &str = "orion";

/// Exit code orion uses to signal that it ran successfully and found a changepoint.
///
/// Zero means no changepoint was found, any other code is an execution failure.
pub const DEFAULT_CHANGEPOINT_EXIT_CODE: i32 = 3;

/// Maximum time (in seconds) a single orion invocation may run before it is killed.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 1800;

// ============================================================================
// Data Source Defaults
// ============================================================================

/// Index pattern orion searches for run metadata.
pub const DEFAULT_METADATA_INDEX: &str = "perf_scale_ci*";

/// Index pattern orion searches for benchmark results.
pub const DEFAULT_BENCHMARK_INDEX: &str = "ripsaw-kube-burner-*";

// ============================================================================
// Configuration Discovery Defaults
// ============================================================================

/// Directory holding the orion configuration files.
pub const DEFAULT_CONFIGS_DIR: &str = "/orion/examples/";

/// Configurations used when the configuration directory cannot be listed.
pub const DEFAULT_FALLBACK_CONFIGS: &[&str] = &[
    "trt-external-payload-cluster-density.yaml",
    "trt-external-payload-node-density.yaml",
    "trt-external-payload-node-density-cni.yaml",
    "trt-external-payload-crd-scale.yaml",
];

// ============================================================================
// Tool Defaults
// ============================================================================

/// Version analyzed when a tool is invoked without one.
pub const DEFAULT_VERSION: &str = "4.19";

/// Lookback window (in days) used when a tool is invoked without one.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 15;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changepoint_code_is_not_success() {
        assert_ne!(DEFAULT_CHANGEPOINT_EXIT_CODE, 0);
    }

    #[test]
    fn test_fallback_configs_are_yaml_basenames() {
        assert_eq!(DEFAULT_FALLBACK_CONFIGS.len(), 4);
        assert!(DEFAULT_FALLBACK_CONFIGS
            .iter()
            .all(|c| c.ends_with(".yaml") && !c.contains('/')));
    }
}
