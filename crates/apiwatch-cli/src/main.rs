use anyhow::Result;
use apiwatch_cli::commands;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apiwatch")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Watch a live browser session and aggregate failing API calls",
    long_about = "Apiwatch drives a Chrome session with network logging enabled, validates every \
                  API response it observes (HTTP status, payload shape, business code), and \
                  aggregates failures per endpoint into a live query surface and a shutdown report."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the browser and monitor API traffic until interrupted
    Watch {
        /// URL to open once monitoring is wired up
        #[arg(long)]
        url: Option<String>,

        /// Chrome user-data directory (a scratch profile by default)
        #[arg(long, value_name = "DIR")]
        user_data_dir: Option<PathBuf>,

        /// Extra-headers properties file injected into every request
        #[arg(long, default_value = "config.properties", value_name = "FILE")]
        config: PathBuf,

        /// Port for the statistics/query server
        #[arg(long, default_value_t = 5000)]
        web_port: u16,

        /// Disable the statistics/query server
        #[arg(long)]
        no_web: bool,

        /// Directory the shutdown report is written into
        #[arg(long, default_value = "summary", value_name = "DIR")]
        output_dir: PathBuf,

        /// Run Chrome headless
        #[arg(long)]
        headless: bool,
    },

    /// Generate shell completion scripts
    #[command(long_about = "Generate shell completion scripts.\n\n\
        SUPPORTED SHELLS: bash, zsh, fish, powershell, elvish\n\n\
        INSTALLATION:\n  \
        bash:  apiwatch completion --shell bash >> ~/.bashrc\n  \
        zsh:   apiwatch completion --shell zsh > ~/.zfunc/_apiwatch (then add to ~/.zshrc)\n  \
        fish:  apiwatch completion --shell fish > ~/.config/fish/completions/apiwatch.fish")]
    Completion {
        /// Shell to generate completions for
        #[arg(long, value_enum)]
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Watch {
            url,
            user_data_dir,
            config,
            web_port,
            no_web,
            output_dir,
            headless,
        } => {
            commands::watch::execute(commands::watch::WatchOpts {
                url,
                user_data_dir,
                config,
                web_port,
                no_web,
                output_dir,
                headless,
            })
            .await
        }
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new(
            "apiwatch=debug,apiwatch_cli=debug,apiwatch_core=debug,apiwatch_browser=debug,apiwatch_server=debug",
        )
    } else {
        EnvFilter::new("apiwatch=info,apiwatch_cli=info,apiwatch_browser=info,apiwatch_server=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}
