//! Harness configuration
//!
//! The bundle manifest (`bundles.toml`) is the configuration-time definition of the registry, the
//! per-bundle directory layout, and the generator contract. CLI flags override individual values.
//!
//! ```toml
//! bundles = ["basic", "i18n"]
//! root = "bundles"
//!
//! [layout]
//! reference = "reference"
//! generated = "generated"
//!
//! [generator]
//! program = "python3"
//! args = ["-m", "stdoc", "."]
//! timeout_secs = 300
//! clean = true
//!
//! [generator.env]
//! PYTHONPATH = "{manifest_dir}/.."
//! ```
//!
//! `{manifest_dir}` in environment values expands to the directory containing the manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::generator::GeneratorCommand;
use crate::registry::{BundleRegistry, Layout, is_single_component};

/// Placeholder expanded in generator environment values.
pub const MANIFEST_DIR_PLACEHOLDER: &str = "{manifest_dir}";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("cannot read manifest '{}': {source}", path.display())]
    #[diagnostic(
        code(stdoc_golden::manifest_unreadable),
        help("pass --manifest or set STDOC_GOLDEN_MANIFEST")
    )]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest '{}': {source}", path.display())]
    #[diagnostic(code(stdoc_golden::manifest_invalid))]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid bundle name '{0}'")]
    #[diagnostic(
        code(stdoc_golden::invalid_bundle_name),
        help("bundle names are single directory names below the bundle root")
    )]
    InvalidBundleName(String),

    #[error("invalid layout: {0}")]
    #[diagnostic(code(stdoc_golden::invalid_layout))]
    InvalidLayout(String),

    #[error("generator program must not be empty")]
    #[diagnostic(code(stdoc_golden::empty_program))]
    EmptyProgram,

    #[error("--jobs must be at least 1")]
    #[diagnostic(code(stdoc_golden::invalid_jobs))]
    InvalidJobs,
}

// ============================================================================
// Manifest file
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    #[serde(default)]
    bundles: Vec<String>,
    root: Option<PathBuf>,
    #[serde(default)]
    layout: PartialLayout,
    #[serde(default)]
    generator: PartialGenerator,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialLayout {
    reference: Option<String>,
    generated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialGenerator {
    program: Option<String>,
    args: Option<Vec<String>>,
    timeout_secs: Option<u64>,
    clean: Option<bool>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

// ============================================================================
// Resolved configuration
// ============================================================================

/// Values taken from the command line; `None`/empty leaves the manifest value in place.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub program: Option<String>,
    /// Replaces the manifest's argument list when non-empty
    pub args: Vec<String>,
    /// Added to (and overriding) the manifest's environment
    pub env: Vec<(String, String)>,
    pub timeout_secs: Option<u64>,
    pub no_clean: bool,
    pub jobs: Option<usize>,
}

/// Immutable configuration for one harness invocation.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub registry: BundleRegistry,
    pub layout: Layout,
    pub generator: GeneratorCommand,
    /// Bounded wait for each generator invocation
    pub timeout: Option<Duration>,
    /// Clear the generated tree before invoking the generator
    pub clean: bool,
    /// Maximum number of bundles evaluated at once
    pub jobs: usize,
}

impl HarnessConfig {
    /// Load the manifest at `path` and apply `overrides`.
    pub fn load(path: &Path, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let manifest_dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let manifest_dir = manifest_dir.canonicalize().unwrap_or(manifest_dir);

        let manifest: Manifest = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::resolve(manifest, &manifest_dir, overrides)
    }

    /// Parse manifest text as if it lived in `manifest_dir`.
    pub fn from_manifest_str(
        text: &str,
        manifest_dir: &Path,
        overrides: &ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        let manifest: Manifest = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: manifest_dir.join("bundles.toml"),
            source,
        })?;
        Self::resolve(manifest, manifest_dir, overrides)
    }

    fn resolve(manifest: Manifest, manifest_dir: &Path, overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        for name in &manifest.bundles {
            if !is_single_component(name) {
                return Err(ConfigError::InvalidBundleName(name.clone()));
            }
        }

        let defaults = Layout::default();
        let layout = Layout {
            reference: manifest.layout.reference.unwrap_or(defaults.reference),
            generated: manifest.layout.generated.unwrap_or(defaults.generated),
        };
        validate_layout(&layout)?;

        let root = match manifest.root {
            Some(root) => manifest_dir.join(root),
            None => manifest_dir.to_path_buf(),
        };
        let registry = BundleRegistry::new(&root, manifest.bundles);

        let mut generator = GeneratorCommand::default();
        if let Some(program) = manifest.generator.program {
            generator.program = program;
        }
        if let Some(args) = manifest.generator.args {
            generator.args = args;
        }
        let dir = manifest_dir.to_string_lossy();
        generator.env = manifest
            .generator
            .env
            .into_iter()
            .map(|(key, value)| (key, value.replace(MANIFEST_DIR_PLACEHOLDER, &dir)))
            .collect();

        if let Some(program) = &overrides.program {
            generator.program = program.clone();
        }
        if !overrides.args.is_empty() {
            generator.args = overrides.args.clone();
        }
        for (key, value) in &overrides.env {
            generator.env.insert(key.clone(), value.clone());
        }
        if generator.program.trim().is_empty() {
            return Err(ConfigError::EmptyProgram);
        }

        let jobs = overrides.jobs.unwrap_or(1);
        if jobs == 0 {
            return Err(ConfigError::InvalidJobs);
        }

        let timeout = overrides
            .timeout_secs
            .or(manifest.generator.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        let clean = !overrides.no_clean && manifest.generator.clean.unwrap_or(true);

        Ok(Self {
            registry,
            layout,
            generator,
            timeout,
            clean,
            jobs,
        })
    }
}

fn validate_layout(layout: &Layout) -> Result<(), ConfigError> {
    for (label, name) in [("reference", &layout.reference), ("generated", &layout.generated)] {
        if !is_single_component(name) {
            return Err(ConfigError::InvalidLayout(format!(
                "{label} directory '{name}' must be a single directory name"
            )));
        }
    }
    if layout.reference == layout.generated {
        return Err(ConfigError::InvalidLayout(format!(
            "reference and generated directories are both '{}'",
            layout.reference
        )));
    }
    Ok(())
}
