// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration for gotest-explorer.
//!
//! The config is layered: the embedded [default config](ExplorerConfig::DEFAULT_CONFIG) first,
//! then `.config/gotest-explorer.toml` under the workspace root (or a file passed in explicitly).
//! Callers may apply further overrides through the `set_` methods.

use crate::{
    errors::{ConfigParseError, ConfigParseErrorKind},
    helpers::uri_to_path,
    model::{DEFAULT_DYNAMIC_SUBTEST_LIMIT, ModelOptions},
};
use camino::Utf8Path;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat, builder::DefaultState};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::{cmp::Ordering, collections::BTreeSet, fmt, str::FromStr, sync::LazyLock};
use tracing::warn;

/// Returns the number of logical CPUs, computed once.
pub fn get_num_cpus() -> usize {
    static NUM_CPUS: LazyLock<usize> =
        LazyLock::new(|| match std::thread::available_parallelism() {
            Ok(count) => count.into(),
            Err(err) => {
                warn!("unable to determine num-cpus ({err}), assuming 1 logical CPU");
                1
            }
        });

    *NUM_CPUS
}

/// Overall configuration for gotest-explorer.
#[derive(Clone, Debug)]
pub struct ExplorerConfig {
    view: ViewSettings,
    exclude: ExcludeGlobs,
    dynamic_subtest_limit: usize,
    run_package_benchmarks: bool,
    module_max_depth: usize,
    runner: RunnerSettings,
    strict: bool,
}

impl ExplorerConfig {
    /// The default location of the config within the workspace root.
    pub const CONFIG_PATH: &'static str = ".config/gotest-explorer.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Workspace-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../default-config.toml");

    /// Environment variables that override config use this prefix, plus a _.
    pub const ENVIRONMENT_PREFIX: &'static str = "GOTEST_EXPLORER";

    /// Reads the config from the given file, or if not specified from `.config/gotest-explorer.toml`
    /// in the workspace root.
    ///
    /// A missing file in the default location is not an error; a missing explicit file is.
    pub fn from_sources(
        workspace_root: &Utf8Path,
        config_file: Option<&Utf8Path>,
    ) -> Result<Self, ConfigParseError> {
        let (config_file, source) = match config_file {
            Some(file) => (file.to_owned(), File::new(file.as_str(), FileFormat::Toml)),
            None => {
                let config_file = workspace_root.join(Self::CONFIG_PATH);
                let source = File::new(config_file.as_str(), FileFormat::Toml).required(false);
                (config_file, source)
            }
        };

        let builder = Self::make_default_config().add_source(source);
        Self::build_and_deserialize_config(&builder)
            .map_err(|kind| ConfigParseError::new(Some(config_file), kind))
    }

    /// Returns the view settings.
    pub fn view(&self) -> &ViewSettings {
        &self.view
    }

    /// Returns the options used to build the model.
    pub fn model_options(&self) -> ModelOptions {
        ModelOptions {
            exclude: self.exclude.clone(),
            dynamic_subtest_limit: self.dynamic_subtest_limit,
        }
    }

    /// Returns true if benchmarks run whenever their whole package is selected.
    pub fn run_package_benchmarks(&self) -> bool {
        self.run_package_benchmarks
    }

    /// Returns how many directories deep to search for modules.
    pub fn module_max_depth(&self) -> usize {
        self.module_max_depth
    }

    /// Returns the settings for spawning test processes.
    pub fn runner(&self) -> &RunnerSettings {
        &self.runner
    }

    /// Returns true if discovery errors should be returned rather than logged.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Overrides whether packages are nested.
    pub fn set_nest_packages(&mut self, nest_packages: bool) {
        self.view.nest_packages = nest_packages;
    }

    /// Overrides whether test files are shown.
    pub fn set_show_files(&mut self, show_files: bool) {
        self.view.show_files = show_files;
    }

    /// Overrides the number of packages tested at once.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) {
        self.runner.test_threads = test_threads;
    }

    /// Overrides the go binary.
    pub fn set_go_binary(&mut self, go_binary: impl Into<String>) {
        self.runner.go_binary = go_binary.into();
    }

    /// Overrides strict mode.
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Overrides whether package benchmarks run.
    pub fn set_run_package_benchmarks(&mut self, run: bool) {
        self.run_package_benchmarks = run;
    }

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_deserialize_config(
        builder: &ConfigBuilder<DefaultState>,
    ) -> Result<Self, ConfigParseErrorKind> {
        let config = builder
            .build_cloned()
            .map_err(|error| ConfigParseErrorKind::BuildError(Box::new(error)))?;

        let mut ignored = BTreeSet::new();
        let mut cb = |path: serde_ignored::Path| {
            ignored.insert(path.to_string());
        };
        let ignored_de = serde_ignored::Deserializer::new(config, &mut cb);
        let config: ExplorerConfigDeserialize = serde_path_to_error::deserialize(ignored_de)
            .map_err(|error| {
                // serde_path_to_error already reports the key, so drop it from the config error.
                let path = error.path().clone();
                let error = match error.into_inner() {
                    ConfigError::At { error, .. } => *error,
                    other => other,
                };
                ConfigParseErrorKind::DeserializeError(Box::new(serde_path_to_error::Error::new(
                    path, error,
                )))
            })?;

        for key in &ignored {
            warn!("ignoring unknown configuration key `{key}`");
        }

        config.into_config()
    }
}

impl Default for ExplorerConfig {
    /// The values in [`ExplorerConfig::DEFAULT_CONFIG`].
    fn default() -> Self {
        Self {
            view: ViewSettings::default(),
            exclude: ExcludeGlobs::default(),
            dynamic_subtest_limit: DEFAULT_DYNAMIC_SUBTEST_LIMIT,
            run_package_benchmarks: false,
            module_max_depth: 2,
            runner: RunnerSettings::default(),
            strict: false,
        }
    }
}

/// Whether discovered tests are shown.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiscoveryMode {
    /// Show discovered tests.
    #[default]
    On,

    /// Show nothing.
    Off,
}

/// Settings that control the shape of the presented tree.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ViewSettings {
    /// Nest packages under their nearest ancestor package.
    pub nest_packages: bool,

    /// Nest subtests under their parent test.
    pub nest_subtests: bool,

    /// Show test files between packages and tests.
    pub show_files: bool,

    /// Whether discovered tests are shown at all.
    pub discovery: DiscoveryMode,
}

impl Default for ViewSettings {
    fn default() -> Self {
        Self {
            nest_packages: false,
            nest_subtests: true,
            show_files: false,
            discovery: DiscoveryMode::On,
        }
    }
}

/// Settings for spawning `go test`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunnerSettings {
    /// The go binary.
    pub go_binary: String,

    /// Extra flags passed to `go test`.
    pub build_flags: Vec<String>,

    /// The number of packages tested at once.
    pub test_threads: TestThreads,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            go_binary: "go".to_owned(),
            build_flags: Vec::new(),
            test_threads: TestThreads::NumCpus,
        }
    }
}

/// Glob patterns for test files to ignore.
#[derive(Clone, Debug)]
pub struct ExcludeGlobs {
    patterns: Vec<String>,
    set: GlobSet,
}

impl Default for ExcludeGlobs {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }
}

impl ExcludeGlobs {
    /// Compiles a list of glob patterns.
    pub fn new<I, S>(patterns: I) -> Result<Self, ConfigParseErrorKind>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut all = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let glob = Glob::new(pattern).map_err(|err| ConfigParseErrorKind::InvalidExcludeGlob {
                pattern: pattern.to_owned(),
                err,
            })?;
            builder.add(glob);
            all.push(pattern.to_owned());
        }
        let set = builder
            .build()
            .map_err(|err| ConfigParseErrorKind::InvalidExcludeGlob {
                pattern: all.join(", "),
                err,
            })?;
        Ok(Self { patterns: all, set })
    }

    /// Returns the patterns as written.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Returns true if the file at `uri` matches any pattern.
    ///
    /// `file://` URIs are matched as paths; anything else is matched as written.
    pub fn is_excluded(&self, uri: &str) -> bool {
        if self.set.is_empty() {
            return false;
        }
        match uri_to_path(uri) {
            Some(path) => self.set.is_match(path),
            None => self.set.is_match(uri),
        }
    }
}

/// Type for the test-threads config key.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// Run this many packages at once.
    Count(usize),

    /// Run as many packages at once as there are logical CPUs.
    NumCpus,
}

impl TestThreads {
    /// Gets the actual number of test threads computed at runtime. This is always at least 1.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(threads) => threads.max(1),
            Self::NumCpus => get_num_cpus(),
        }
    }
}

impl FromStr for TestThreads {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "num-cpus" {
            return Ok(Self::NumCpus);
        }

        match s.parse::<isize>() {
            Err(e) => Err(format!("error parsing `{s}`: {e}")),
            Ok(0) => Err("test-threads may not be 0".to_owned()),
            Ok(j) if j < 0 => Ok(TestThreads::Count(
                (get_num_cpus() as isize + j).max(1) as usize,
            )),
            Ok(j) => Ok(TestThreads::Count(j as usize)),
        }
    }
}

impl fmt::Display for TestThreads {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(threads) => write!(f, "{threads}"),
            Self::NumCpus => write!(f, "num-cpus"),
        }
    }
}

impl<'de> Deserialize<'de> for TestThreads {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl serde::de::Visitor<'_> for V {
            type Value = TestThreads;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                write!(formatter, "an integer or the string \"num-cpus\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v == "num-cpus" {
                    Ok(TestThreads::NumCpus)
                } else {
                    Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Str(v),
                        &self,
                    ))
                }
            }

            // TOML integers are i64.
            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v.cmp(&0) {
                    Ordering::Greater => Ok(TestThreads::Count(v as usize)),
                    Ordering::Less => Ok(TestThreads::Count(
                        (get_num_cpus() as i64 + v).max(1) as usize,
                    )),
                    Ordering::Equal => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Signed(v),
                        &self,
                    )),
                }
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                match v {
                    0 => Err(serde::de::Error::invalid_value(
                        serde::de::Unexpected::Unsigned(v),
                        &self,
                    )),
                    v => Ok(TestThreads::Count(v as usize)),
                }
            }
        }

        deserializer.deserialize_any(V)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ExplorerConfigDeserialize {
    nest_packages: bool,
    nest_subtests: bool,
    show_files: bool,
    discovery: DiscoveryMode,
    run_package_benchmarks: bool,
    dynamic_subtest_limit: usize,
    exclude: Vec<String>,
    module_max_depth: usize,
    go_binary: String,
    build_flags: Vec<String>,
    test_threads: TestThreads,
    strict: bool,
}

impl ExplorerConfigDeserialize {
    fn into_config(self) -> Result<ExplorerConfig, ConfigParseErrorKind> {
        if let TestThreads::Count(0) = self.test_threads {
            return Err(ConfigParseErrorKind::ZeroTestThreads);
        }
        Ok(ExplorerConfig {
            view: ViewSettings {
                nest_packages: self.nest_packages,
                nest_subtests: self.nest_subtests,
                show_files: self.show_files,
                discovery: self.discovery,
            },
            exclude: ExcludeGlobs::new(&self.exclude)?,
            dynamic_subtest_limit: self.dynamic_subtest_limit,
            run_package_benchmarks: self.run_package_benchmarks,
            module_max_depth: self.module_max_depth,
            runner: RunnerSettings {
                go_binary: self.go_binary,
                build_flags: self.build_flags,
                test_threads: self.test_threads,
            },
            strict: self.strict,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino_tempfile::Utf8TempDir;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn load(contents: &str) -> Result<ExplorerConfig, ConfigParseError> {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config_dir = dir.path().join(".config");
        std::fs::create_dir_all(&config_dir).expect("created .config");
        std::fs::write(config_dir.join("gotest-explorer.toml"), contents).expect("wrote config");
        ExplorerConfig::from_sources(dir.path(), None)
    }

    #[test]
    fn default_config_matches_default_impl() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let config = ExplorerConfig::from_sources(dir.path(), None).expect("default config parses");
        let default = ExplorerConfig::default();

        assert_eq!(config.view(), default.view());
        assert_eq!(config.runner(), default.runner());
        assert_eq!(config.exclude.patterns(), default.exclude.patterns());
        assert_eq!(config.dynamic_subtest_limit, default.dynamic_subtest_limit);
        assert_eq!(config.module_max_depth(), default.module_max_depth());
        assert_eq!(
            config.run_package_benchmarks(),
            default.run_package_benchmarks()
        );
        assert_eq!(config.strict(), default.strict());
    }

    #[test]
    fn workspace_config_overrides_defaults() {
        let config = load(indoc! {r#"
            nest-packages = true
            show-files = true
            discovery = "off"
            exclude = ["**/testdata/**"]
            dynamic-subtest-limit = 5
            build-flags = ["-tags=integration"]
            test-threads = 3
        "#})
        .expect("config parses");

        assert_eq!(
            *config.view(),
            ViewSettings {
                nest_packages: true,
                nest_subtests: true,
                show_files: true,
                discovery: DiscoveryMode::Off,
            }
        );
        assert_eq!(config.model_options().dynamic_subtest_limit, 5);
        assert_eq!(config.runner().build_flags, vec!["-tags=integration"]);
        assert_eq!(config.runner().test_threads, TestThreads::Count(3));
        assert!(
            config
                .model_options()
                .exclude
                .is_excluded("file:///src/foo/testdata/x_test.go")
        );
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = Utf8TempDir::new().expect("created temp dir");
        let missing = dir.path().join("missing.toml");
        let err = ExplorerConfig::from_sources(dir.path(), Some(&missing))
            .expect_err("missing explicit config is an error");
        assert_eq!(err.config_file(), Some(&missing));
    }

    #[test]
    fn bad_values_are_errors() {
        let err = load("test-threads = 0\n").expect_err("zero threads is invalid");
        assert!(matches!(
            err.kind(),
            ConfigParseErrorKind::DeserializeError(_)
        ));

        let err = load("exclude = [\"a/{b\"]\n").expect_err("unclosed brace is invalid");
        assert!(matches!(
            err.kind(),
            ConfigParseErrorKind::InvalidExcludeGlob { .. }
        ));
    }

    #[test_case("4", Some(TestThreads::Count(4)) ; "positive")]
    #[test_case("num-cpus", Some(TestThreads::NumCpus) ; "num cpus")]
    #[test_case("0", None ; "zero")]
    #[test_case("many", None ; "garbage")]
    fn test_threads_from_str(input: &str, expected: Option<TestThreads>) {
        assert_eq!(input.parse::<TestThreads>().ok(), expected);
    }

    #[test]
    fn test_threads_never_compute_to_zero() {
        assert_eq!(TestThreads::Count(0).compute(), 1);
        assert_eq!(TestThreads::Count(3).compute(), 3);

        let mut config = ExplorerConfig::default();
        config.set_test_threads(TestThreads::Count(0));
        assert_eq!(config.runner().test_threads.compute(), 1);
    }

    #[test]
    fn exclude_globs_match_paths() {
        let globs = ExcludeGlobs::new(["**/vendor/**", "**/*_integration_test.go"])
            .expect("valid globs");
        assert!(globs.is_excluded("file:///src/foo/vendor/dep/dep_test.go"));
        assert!(globs.is_excluded("file:///src/foo/db_integration_test.go"));
        assert!(!globs.is_excluded("file:///src/foo/foo_test.go"));
        assert!(!ExcludeGlobs::default().is_excluded("file:///src/foo/vendor/x_test.go"));
    }
}
