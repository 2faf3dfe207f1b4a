use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use updraft_engine::{
    BuiltinUpdateTransform, ProcessTransformHost, RoutingHost, TransformRunner, UpdateCommand,
    UpdateConfig, UpdateOptions,
};
use updraft_registry::{open_registry, CachedMetadataSource};
use updraft_workspace::{GitRepository, WorkspaceLayout};

mod completion;
mod render;

use completion::write_completions_script;
use render::{OutputStyle, TerminalLogger};

#[derive(Parser, Debug)]
#[command(name = "updraft")]
#[command(about = "Update workspace packages and run their migrations", long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
    #[command(flatten)]
    update: UpdateArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a shell completion script.
    Completions { shell: Shell },
}

#[derive(Args, Debug, Default)]
struct UpdateArgs {
    /// Packages to update, as `name` or `name@spec`.
    packages: Vec<String>,
    /// Ignore peer dependency mismatches.
    #[arg(long)]
    force: bool,
    /// Use the prerelease (`next`) dist-tag when no version is given.
    #[arg(long)]
    next: bool,
    /// Only run migrations of an installed package.
    #[arg(long)]
    migrate_only: bool,
    /// Single migration to run with `--migrate-only`.
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    /// Commit the update and each migration step separately.
    #[arg(short = 'C', long)]
    create_commits: bool,
    #[arg(long)]
    allow_dirty: bool,
    #[arg(long)]
    verbose: bool,
    #[arg(long)]
    all: bool,
    /// Workspace root; defaults to the current directory.
    #[arg(long)]
    cwd: Option<PathBuf>,
}

impl UpdateArgs {
    fn to_options(&self) -> UpdateOptions {
        UpdateOptions {
            packages: self.packages.clone(),
            force: self.force,
            next: self.next,
            migrate_only: self.migrate_only,
            name: self.name.clone(),
            from: self.from.clone(),
            to: self.to.clone(),
            create_commits: self.create_commits,
            allow_dirty: self.allow_dirty,
            verbose: self.verbose,
            all: self.all,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Completions { shell }) = cli.command {
        return write_completions_script(shell, &mut std::io::stdout());
    }

    let args = cli.update;
    init_tracing(args.verbose);

    let root = match &args.cwd {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("failed resolving current directory")?,
    };
    let env: BTreeMap<String, String> = std::env::vars().collect();

    let layout = WorkspaceLayout::new(root);
    let config = UpdateConfig::load(&layout, &env)?;
    tracing::debug!(registry = %config.registry, package_manager = %config.package_manager, "loaded configuration");

    let style = OutputStyle::detect(std::io::stdout().is_terminal(), &env);
    let logger = TerminalLogger::new(style, args.verbose);
    let registry = CachedMetadataSource::new(open_registry(&config.registry)?);

    let update = BuiltinUpdateTransform::new(&layout, &registry, &logger, config.skip_install);
    let process = ProcessTransformHost::new(layout.root(), &logger);
    let host = RoutingHost::new(update, process);
    let runner = TransformRunner::new(&host, &logger);
    let vcs = GitRepository::new(layout.root());

    let command = UpdateCommand::new(&layout, &config, &registry, &runner, &vcs, &logger);
    let outcome = command.run(&args.to_options())?;
    logger.finish();

    std::process::exit(outcome.exit_code());
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
