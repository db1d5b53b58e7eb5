use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pipethis::config::Config;
use pipethis::error::PipethisError;
use pipethis::interrupt::Interrupt;
use pipethis::lookup::{KeyringLocation, ServiceKind};
use pipethis::RunOptions;

#[derive(Parser)]
#[command(
    name = "pipethis",
    about = "Replace `curl | sh` with author verification for piped scripts",
    version,
    author
)]
struct Cli {
    /// Executable to run the script with
    #[arg(long, env = "SHELL", default_value = "/bin/sh")]
    target: String,

    /// Open the script in an editor before running it
    #[arg(long)]
    inspect: bool,

    /// Editor used with --inspect
    #[arg(long, env = "EDITOR", default_value = "vi")]
    editor: String,

    /// Skip author and signature verification
    #[arg(long)]
    no_verify: bool,

    /// Detached signature location (defaults to <SCRIPT>.sig)
    #[arg(long)]
    signature: Option<String>,

    /// Key service used to find the author (keybase, local)
    #[arg(long)]
    lookup_with: Option<String>,

    /// Config file path
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Write a starter config file and exit
    #[arg(long)]
    init_config: bool,

    /// Overwrite an existing config file with --init-config
    #[arg(long, requires = "init_config")]
    force: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(long, short = 'q')]
    quiet: bool,

    /// Script location: a local path or URL. Reads STDIN when omitted
    script: Option<String>,

    /// Arguments passed through to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    // Everything the run created is dropped inside `run`, so temporary
    // files are gone before the process exits.
    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}

fn init_tracing(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "pipethis=warn",
        (false, 0) => "pipethis=info",
        (false, 1) => "pipethis=debug",
        (false, _) => "pipethis=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> Result<i32, PipethisError> {
    let config_path = match cli.config {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if cli.init_config {
        return cmd_init_config(config_path, cli.force);
    }

    let config = Config::load(&config_path)?;

    let lookup_with = match cli.lookup_with {
        Some(name) => ServiceKind::from_str_lenient(&name)
            .ok_or(PipethisError::UnknownService(name))?,
        None => config.lookup_with,
    };

    let options = RunOptions {
        target: cli.target,
        inspect: cli.inspect,
        editor: cli.editor,
        verify: !cli.no_verify,
        signature: cli.signature,
        lookup_with,
        location: cli.script,
        script_args: cli.args,
        keyring: KeyringLocation::from_env(config.keyring.path.clone()),
        interrupt: Interrupt::install()?,
    };

    pipethis::execute(&options, &config)?;
    Ok(0)
}

fn cmd_init_config(path: PathBuf, force: bool) -> Result<i32, PipethisError> {
    if path.exists() && !force {
        eprintln!("{} already exists. Use --force to overwrite.", path.display());
        return Ok(1);
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, Config::starter_toml())?;
    println!("Created {}", path.display());

    Ok(0)
}
