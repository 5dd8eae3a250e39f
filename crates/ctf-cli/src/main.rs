mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{deploy::DeployArgs, flags::FlagFormat};
use ctf_core::Operation;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "ctf",
    about = "Deploy, redeploy and destroy CTF tracks with OpenTofu and Ansible",
    version,
    propagate_version = true
)]
struct Cli {
    /// CTF root (default: auto-detect from challenges/ and .deploy/)
    #[arg(long, global = true, env = "CTF_ROOT_DIR")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision and configure tracks that are not deployed yet
    Deploy(DeployArgs),

    /// Re-run provisioning and configuration on already deployed tracks
    Redeploy(DeployArgs),

    /// Plan tracks without changing infrastructure or recorded state
    Check(DeployArgs),

    /// Tear down deployed tracks
    Destroy {
        #[command(flatten)]
        args: DeployArgs,

        /// Do not ask for confirmation
        #[arg(long, short = 'f')]
        force: bool,
    },

    /// Show the recorded deployment state of tracks
    Status {
        /// Only these tracks (directory names)
        #[arg(long = "tracks", short = 't')]
        tracks: Vec<String>,
    },

    /// List the tracks found under challenges/
    List,

    /// Print the flags declared by tracks
    Flags {
        /// Only these tracks (directory names)
        #[arg(long = "tracks", short = 't')]
        tracks: Vec<String>,

        #[arg(long, value_enum, default_value_t = FlagFormat::Json)]
        format: FlagFormat,
    },

    /// Print the services declared by tracks
    Services {
        /// Only these tracks (directory names)
        #[arg(long = "tracks", short = 't')]
        tracks: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Deploy(_)
        | Commands::Redeploy(_)
        | Commands::Check(_)
        | Commands::Destroy { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Deploy(args) => {
            cmd::deploy::run(&root, Operation::Deploy, args, false, cli.json)
        }
        Commands::Redeploy(args) => {
            cmd::deploy::run(&root, Operation::Redeploy, args, false, cli.json)
        }
        Commands::Check(args) => cmd::check::run(&root, args, cli.json),
        Commands::Destroy { args, force } => {
            cmd::deploy::run(&root, Operation::Destroy, args, force, cli.json)
        }
        Commands::Status { tracks } => cmd::status::run(&root, &tracks, cli.json),
        Commands::List => cmd::list::run(&root, cli.json),
        Commands::Flags { tracks, format } => cmd::flags::run(&root, &tracks, format),
        Commands::Services { tracks } => cmd::services::run(&root, &tracks, cli.json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
