// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Command-line parsing and command execution.

use crate::{
    ExpectedError, Result,
    output::{OutputContext, OutputOpts, OutputWriter},
    reporter::{MessageFormat, RunReporter, Styles, write_tree},
};
use camino::Utf8PathBuf;
use clap::{ArgGroup, Args, Parser, Subcommand};
use gotest_metadata::{ExplorerExitCode, ModuleRecord, ModulesQuery, PackageRecord, PackagesQuery};
use gotest_runner::{
    config::{ExplorerConfig, TestThreads},
    discovery::{CommandDiscovery, Discovery, SnapshotDiscovery},
    errors::{DiscoveryError, DisplayErrorChain},
    explorer::Explorer,
    run_request::{ResolvedRunRequest, RunSelection},
    runner::TestRunner,
};
use std::{io::Write, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Discover, list and run Go tests.
#[derive(Debug, Parser)]
#[command(
    name = "gotest-explorer",
    version,
    styles = crate::output::clap_styles::style(),
    max_term_width = 100,
)]
pub struct ExplorerApp {
    #[clap(flatten)]
    output: OutputOpts,

    #[clap(subcommand)]
    command: Command,
}

impl ExplorerApp {
    /// Initializes logging and returns the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|err| ExpectedError::RuntimeCreateError { err })?;
        runtime.block_on(self.command.exec(output, output_writer))
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List discovered tests as a tree
    List(ListOpts),

    /// Run tests
    ///
    /// Items are given by ID, in the form printed by `list --message-format json`. With no items,
    /// every discovered test runs.
    Run(RunOpts),
}

impl Command {
    async fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        match self {
            Self::List(opts) => opts.exec(output, output_writer).await,
            Self::Run(opts) => opts.exec(output, output_writer).await,
        }
    }
}

#[derive(Debug, Args)]
struct ListOpts {
    #[clap(flatten)]
    common: CommonOpts,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,
}

impl ListOpts {
    async fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let session = self.common.setup().await?;
        let tree = session.explorer.resolver().tree();

        let mut writer = output_writer.stdout_writer();
        match self.message_format {
            MessageFormat::Human => {
                write_tree(&tree, &stdout_styles(output), &mut writer)
                    .map_err(ExpectedError::write_output)?;
            }
            MessageFormat::Json => {
                serde_json::to_writer_pretty(&mut writer, &tree)
                    .map_err(ExpectedError::serialize_output)?;
                writeln!(writer).map_err(ExpectedError::write_output)?;
            }
        }
        writer.flush().map_err(ExpectedError::write_output)?;
        Ok(ExplorerExitCode::OK)
    }
}

#[derive(Debug, Args)]
struct RunOpts {
    #[clap(flatten)]
    common: CommonOpts,

    /// Items to run [default: everything]
    #[arg(value_name = "ITEM_ID")]
    items: Vec<String>,

    /// Items to leave out
    #[arg(long, short = 'E', value_name = "ITEM_ID")]
    exclude: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t, value_name = "FORMAT")]
    message_format: MessageFormat,
}

impl RunOpts {
    async fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let Session {
            mut explorer,
            workspaces,
            config,
        } = self.common.setup().await?;

        let selection = RunSelection::parse(&self.items, &self.exclude)?;
        let policy = explorer.run_policy();
        let request = ResolvedRunRequest::resolve(explorer.model(), &selection, policy)?;
        if request.is_empty() {
            return Err(ExpectedError::NoTestsRun { workspaces });
        }

        let runner = TestRunner::new(config.runner().clone(), policy);
        info!(
            "running {} {} with {} {}",
            request.packages().len(),
            if request.packages().len() == 1 { "package" } else { "packages" },
            runner.test_threads(),
            if runner.test_threads() == 1 { "thread" } else { "threads" },
        );

        let cancel = CancellationToken::new();
        let ctrl_c_token = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    warn!("interrupted, cancelling run");
                    ctrl_c_token.cancel();
                }
                Err(err) => warn!("failed to listen for Ctrl-C: {}", DisplayErrorChain::new(&err)),
            }
        });

        let reporter = RunReporter::new(
            explorer.model(),
            &request,
            self.message_format,
            stdout_styles(output),
            output.verbose,
        );
        let mut writer = output_writer.stdout_writer();
        let mut write_error = None;
        let start = Instant::now();
        let report = explorer
            .run_tests(&runner, &request, &cancel, |event| {
                if write_error.is_none() {
                    write_error = reporter.write_event(&event, &mut writer).err();
                }
            })
            .await?;
        if let Some(err) = write_error {
            return Err(ExpectedError::write_output(err));
        }

        reporter
            .write_summary(&report, start.elapsed(), &mut writer)
            .and_then(|()| writer.flush())
            .map_err(ExpectedError::write_output)?;

        if report.cancelled || report.stats.has_failures() {
            Err(ExpectedError::TestRunFailed)
        } else {
            Ok(ExplorerExitCode::OK)
        }
    }
}

#[derive(Debug, Args)]
#[command(group = ArgGroup::new("discovery-source").required(true))]
struct CommonOpts {
    /// Workspace directories to explore [default: the current directory]
    #[arg(long = "workspace", short = 'w', value_name = "DIR")]
    workspaces: Vec<Utf8PathBuf>,

    /// Config file [default: .config/gotest-explorer.toml in the first workspace]
    #[arg(long, value_name = "PATH", env = "GOTEST_EXPLORER_CONFIG_FILE")]
    config_file: Option<Utf8PathBuf>,

    /// Answer discovery queries from a JSON snapshot
    #[arg(
        long,
        value_name = "PATH",
        group = "discovery-source",
        env = "GOTEST_EXPLORER_SNAPSHOT"
    )]
    snapshot: Option<Utf8PathBuf>,

    /// Run this program to answer discovery queries
    #[arg(
        long,
        value_name = "PROGRAM",
        group = "discovery-source",
        env = "GOTEST_EXPLORER_DISCOVERY_COMMAND"
    )]
    discovery_command: Option<String>,

    /// Extra argument passed to the discovery program (may be repeated)
    #[arg(
        long = "discovery-arg",
        value_name = "ARG",
        requires = "discovery_command",
        allow_hyphen_values = true
    )]
    discovery_args: Vec<String>,

    #[clap(flatten)]
    overrides: ConfigOverrides,
}

struct Session {
    explorer: Explorer<AnyDiscovery>,
    workspaces: Vec<Utf8PathBuf>,
    config: ExplorerConfig,
}

impl CommonOpts {
    async fn setup(self) -> Result<Session> {
        let cwd = current_dir()?;
        let workspaces: Vec<Utf8PathBuf> = if self.workspaces.is_empty() {
            vec![cwd.clone()]
        } else {
            self.workspaces
                .into_iter()
                .map(|dir| if dir.is_relative() { cwd.join(dir) } else { dir })
                .collect()
        };

        let first = workspaces.first().map_or(cwd.as_path(), Utf8PathBuf::as_path);
        let mut config = ExplorerConfig::from_sources(first, self.config_file.as_deref())?;
        self.overrides.apply(&mut config);

        let discovery = match (self.snapshot, self.discovery_command) {
            (Some(path), _) => AnyDiscovery::Snapshot(SnapshotDiscovery::from_file(&path)?),
            (None, Some(program)) => {
                AnyDiscovery::Command(CommandDiscovery::new(program, self.discovery_args))
            }
            // clap requires one of the two.
            (None, None) => AnyDiscovery::Snapshot(SnapshotDiscovery::default()),
        };

        let mut explorer = Explorer::new(discovery, &config);
        for dir in &workspaces {
            let id = explorer.add_workspace(dir).await?;
            debug!(workspace = %id, "added workspace");
        }
        Ok(Session {
            explorer,
            workspaces,
            config,
        })
    }
}

#[derive(Debug, Default, Args)]
#[command(next_help_heading = "Config overrides")]
struct ConfigOverrides {
    /// Nest packages under their nearest ancestor package
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", env = "GOTEST_EXPLORER_NEST_PACKAGES")]
    nest_packages: Option<bool>,

    /// Show test files between packages and tests
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", env = "GOTEST_EXPLORER_SHOW_FILES")]
    show_files: Option<bool>,

    /// Run benchmarks when their whole package is selected
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", env = "GOTEST_EXPLORER_RUN_PACKAGE_BENCHMARKS")]
    run_package_benchmarks: Option<bool>,

    /// Fail on discovery errors instead of logging them
    #[arg(long, value_name = "BOOL", num_args = 0..=1, default_missing_value = "true", env = "GOTEST_EXPLORER_STRICT")]
    strict: Option<bool>,

    /// Number of packages to test at once
    #[arg(long, short = 'j', value_name = "N", env = "GOTEST_EXPLORER_TEST_THREADS")]
    test_threads: Option<TestThreads>,

    /// The go binary used to run tests
    #[arg(long, value_name = "PATH", env = "GOTEST_EXPLORER_GO_BINARY")]
    go_binary: Option<String>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut ExplorerConfig) {
        if let Some(nest_packages) = self.nest_packages {
            config.set_nest_packages(nest_packages);
        }
        if let Some(show_files) = self.show_files {
            config.set_show_files(show_files);
        }
        if let Some(run) = self.run_package_benchmarks {
            config.set_run_package_benchmarks(run);
        }
        if let Some(strict) = self.strict {
            config.set_strict(strict);
        }
        if let Some(test_threads) = self.test_threads {
            config.set_test_threads(test_threads);
        }
        if let Some(go_binary) = self.go_binary {
            config.set_go_binary(go_binary);
        }
    }
}

/// The discovery service chosen on the command line.
#[derive(Debug)]
enum AnyDiscovery {
    Snapshot(SnapshotDiscovery),
    Command(CommandDiscovery),
}

impl Discovery for AnyDiscovery {
    async fn modules(&self, query: &ModulesQuery) -> Result<Vec<ModuleRecord>, DiscoveryError> {
        match self {
            Self::Snapshot(discovery) => discovery.modules(query).await,
            Self::Command(discovery) => discovery.modules(query).await,
        }
    }

    async fn packages(&self, query: &PackagesQuery) -> Result<Vec<PackageRecord>, DiscoveryError> {
        match self {
            Self::Snapshot(discovery) => discovery.packages(query).await,
            Self::Command(discovery) => discovery.packages(query).await,
        }
    }
}

fn current_dir() -> Result<Utf8PathBuf> {
    let dir = std::env::current_dir().map_err(|err| ExpectedError::CurrentDirInvalid { err })?;
    Utf8PathBuf::try_from(dir).map_err(|err| ExpectedError::CurrentDirInvalidUtf8 {
        path: err.into_path_buf(),
    })
}

fn stdout_styles(output: OutputContext) -> Styles {
    let mut styles = Styles::default();
    if output.stdout_colorized() {
        styles.colorize();
    }
    styles
}
