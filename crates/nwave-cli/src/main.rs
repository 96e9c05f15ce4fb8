mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::roadmap::RoadmapSubcommand;
use des_core::hooks::Protocol;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "nwave-copilot",
    about = "nWave for GitHub Copilot: install agents and skills, and enforce TDD discipline through DES hooks",
    version,
    propagate_version = true
)]
struct Cli {
    /// Project root (default: auto-detect from .nwave/ or .git/)
    #[arg(long, global = true, env = "NWAVE_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a native Copilot CLI plugin directory
    BuildPlugin {
        /// Output directory (default: <source>/packages/nwave-plugin)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// Directory containing nWave/ (default: $NWAVE_FRAMEWORK_DIR or search upward)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Program the generated hooks.json invokes
        #[arg(long, default_value = des_core::install::DEFAULT_HOOK_PROGRAM)]
        program: String,
    },

    /// Install nWave agents and skills into ~/.copilot
    Install {
        /// Preview without changes
        #[arg(long)]
        dry_run: bool,
        /// Directory containing nWave/ (default: $NWAVE_FRAMEWORK_DIR or search upward)
        #[arg(long)]
        source: Option<PathBuf>,
    },

    /// Remove nWave agents and skills from ~/.copilot
    Uninstall {
        /// Preview without changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Add DES hook configs and prompt files to the current project
    Init {
        /// Preview without changes
        #[arg(long)]
        dry_run: bool,
        /// Directory containing nWave/ (default: $NWAVE_FRAMEWORK_DIR or search upward)
        #[arg(long)]
        source: Option<PathBuf>,
        /// Program the hook configs invoke (default: this executable)
        #[arg(long)]
        program: Option<String>,
    },

    /// Remove DES hook configs and prompt files from the current project
    Deinit {
        /// Preview without changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Verify installed agents and skills and this project's hooks and prompts
    Status,

    /// Show nwave-copilot version
    Version,

    /// Answer a hook invocation: reads the host's JSON on stdin
    Hook {
        /// Host protocol: claude or copilot
        #[arg(long, default_value = "claude")]
        protocol: Protocol,
        /// pre-tool-use | subagent-stop | post-tool-use | pre-write
        action: String,
    },

    /// Append one TDD phase outcome to a feature's execution log
    LogPhase {
        /// Directory containing execution-log.yaml
        #[arg(long)]
        project_dir: PathBuf,
        #[arg(long)]
        step_id: String,
        #[arg(long)]
        phase: String,
        /// EXECUTED or SKIPPED
        #[arg(long)]
        status: String,
        /// Outcome (PASS/FAIL) or skip reason
        #[arg(long, default_value = "")]
        data: String,
        #[arg(long)]
        turns_used: Option<u64>,
        #[arg(long)]
        tokens_used: Option<u64>,
    },

    /// Scaffold and validate roadmap.yaml files
    Roadmap {
        #[command(subcommand)]
        subcommand: RoadmapSubcommand,
    },

    /// Check that every roadmap step has a complete DES trace
    VerifyDeliver {
        /// Feature directory containing roadmap.yaml and execution-log.yaml
        project_dir: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::BuildPlugin {
            output,
            source,
            program,
        } => cmd::build_plugin::run(output, source.as_deref(), &program, cli.json),
        Commands::Install { dry_run, source } => {
            cmd::install::install(source.as_deref(), dry_run, cli.json)
        }
        Commands::Uninstall { dry_run } => cmd::install::uninstall(dry_run, cli.json),
        Commands::Init {
            dry_run,
            source,
            program,
        } => cmd::install::init(&root, source.as_deref(), program, dry_run, cli.json),
        Commands::Deinit { dry_run } => cmd::install::deinit(&root, dry_run, cli.json),
        Commands::Status => cmd::install::status(&root, cli.json),
        Commands::Version => cmd::version::run(cli.json),
        Commands::Hook { protocol, action } => cmd::hook::run(&root, protocol, &action),
        Commands::LogPhase {
            project_dir,
            step_id,
            phase,
            status,
            data,
            turns_used,
            tokens_used,
        } => cmd::log_phase::run(
            &root,
            &project_dir,
            des_core::log_phase::PhaseRecord {
                step_id: &step_id,
                phase: &phase,
                status: &status,
                data: &data,
                turns_used,
                tokens_used,
            },
            cli.json,
        ),
        Commands::Roadmap { subcommand } => cmd::roadmap::run(&root, subcommand, cli.json),
        Commands::VerifyDeliver { project_dir } => {
            cmd::verify_deliver::run(&root, &project_dir, cli.json)
        }
    };

    if let Err(e) = result {
        // Commands that already reported their outcome only set the code.
        if let Some(exit) = e.downcast_ref::<cmd::Exit>() {
            std::process::exit(exit.0);
        }
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
