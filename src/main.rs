use clap::{Parser, Subcommand};

use comet::config::CONFIG_FILE;
use comet::{AppError, Config};

#[derive(Parser)]
#[command(name = "comet", version)]
#[command(about = "Cosmic tool for provisioning and managing infrastructure")]
struct Cli {
    /// Config file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: String,
    /// Stacks directory
    #[arg(long, global = true)]
    dir: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stacks or components
    #[command(visible_alias = "ls")]
    List {
        stack: Option<String>,
        /// Show metadata details
        #[arg(short, long)]
        details: bool,
    },
    /// Show changes required by the current configuration
    Plan {
        stack: String,
        components: Vec<String>,
    },
    /// Create or update infrastructure
    Apply {
        stack: String,
        components: Vec<String>,
    },
    /// Destroy previously-created infrastructure
    Destroy {
        stack: String,
        components: Vec<String>,
    },
    /// Initialize backends and providers
    Init {
        stack: String,
        components: Vec<String>,
    },
    /// Show output values from components
    Output {
        stack: String,
        component: Option<String>,
        key: Option<String>,
        /// Emit outputs as JSON
        #[arg(long)]
        json: bool,
    },
    /// Kubeconfig for a stack
    #[command(visible_alias = "kube")]
    Kubeconfig {
        stack: String,
        /// Merge into the user's kubeconfig
        #[arg(short, long)]
        save: bool,
    },
    /// Bootstrap secrets and dependencies
    Bootstrap {
        /// Force re-run all steps
        #[arg(short, long)]
        force: bool,
        #[command(subcommand)]
        command: Option<BootstrapCommands>,
    },
    /// Generate TypeScript definitions for IDE support
    Types,
    /// Delete generated files and tool caches
    Clean,
    /// Print version information
    Version,
}

#[derive(Subcommand)]
enum BootstrapCommands {
    /// Show bootstrap status
    Status,
    /// Clear bootstrap state
    Clear,
}

fn main() {
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(err) => fatal(err),
    };
    if let Some(dir) = &cli.dir {
        config.stacks_dir = dir.clone();
    }

    init_tracing(&config.log_level);
    config.export_env();

    let result = match cli.command {
        Commands::List { stack, details } => comet::list(&config, stack.as_deref(), details),
        Commands::Plan { stack, components } => comet::plan(&config, &stack, &components),
        Commands::Apply { stack, components } => comet::apply(&config, &stack, &components),
        Commands::Destroy { stack, components } => comet::destroy(&config, &stack, &components),
        Commands::Init { stack, components } => comet::init(&config, &stack, &components),
        Commands::Output { stack, component, key, json } => {
            comet::output(&config, &stack, component.as_deref(), key.as_deref(), json)
        }
        Commands::Kubeconfig { stack, save } => comet::kubeconfig(&config, &stack, save),
        Commands::Bootstrap { force, command } => match command {
            None => comet::run_bootstrap(&config, force),
            Some(BootstrapCommands::Status) => comet::bootstrap_status(&config),
            Some(BootstrapCommands::Clear) => comet::bootstrap_clear(),
        },
        Commands::Types => comet::write_types(&config),
        Commands::Clean => comet::clean(&config),
        Commands::Version => {
            println!("comet {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(err) = result {
        fatal(err);
    }
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.to_lowercase()));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn fatal(err: AppError) -> ! {
    eprintln!("{err}");
    std::process::exit(1);
}
