//! `bowtie-sync` CLI entrypoint.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use bowtie_sync::api::BowtieClient;
use bowtie_sync::cli::{Cli, Commands, MessageLevel, OutputFormatter, StateCommands};
use bowtie_sync::config::{BowtieConfig, ConfigParser, ConfigValidator, find_config_file};
use bowtie_sync::error::Result;
use bowtie_sync::reconciler::Reconciler;
use bowtie_sync::state::{LocalStateStore, StateStore, generate_holder_id};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

const CONFIG_TEMPLATE: &str = include_str!("../templates/bowtie.yaml");
const ENV_TEMPLATE: &str = include_str!("../templates/.env.example");
const GITIGNORE_ENTRIES: [&str; 2] = [".env", ".bowtie/"];

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. `RUST_LOG` takes precedence.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs a command. `Ok(false)` means the command completed but reported a
/// failure (failed actions, detected drift).
async fn run(cli: Cli) -> Result<bool> {
    let formatter = OutputFormatter::new(cli.output);
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force, &formatter),
        Commands::Validate { warnings } => cmd_validate(config, warnings, &formatter),
        Commands::Plan { detailed } => cmd_plan(config, detailed, &formatter).await,
        Commands::Apply {
            yes,
            continue_on_error,
        } => cmd_apply(config, yes, continue_on_error, &formatter).await,
        Commands::Drift => cmd_drift(config, &formatter).await,
        Commands::Destroy { yes } => cmd_destroy(config, yes, &formatter).await,
        Commands::State { command } => cmd_state(config, command, &formatter).await,
    }
}

/// Writes command output to stdout.
fn emit(output: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", output.trim_end())?;
    Ok(())
}

/// Asks for confirmation on stderr. Returns true when the answer matches.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}

/// Writes a starter configuration.
fn cmd_init(path: &Path, force: bool, formatter: &OutputFormatter) -> Result<bool> {
    info!("Initializing bowtie-sync in: {}", path.display());

    let config_path = path.join("bowtie.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        emit(&formatter.message(
            MessageLevel::Warning,
            &format!(
                "Configuration file already exists: {} (use --force to overwrite)",
                config_path.display()
            ),
        ))?;
        return Ok(true);
    }

    std::fs::create_dir_all(path)?;
    std::fs::write(&config_path, CONFIG_TEMPLATE)?;
    debug!("Created: {}", config_path.display());
    std::fs::write(&env_path, ENV_TEMPLATE)?;
    debug!("Created: {}", env_path.display());

    let existing = if gitignore_path.exists() {
        std::fs::read_to_string(&gitignore_path)?
    } else {
        String::new()
    };
    let missing: Vec<&str> = GITIGNORE_ENTRIES
        .into_iter()
        .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
        .collect();
    if !missing.is_empty() {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&gitignore_path)?;
        if !existing.is_empty() && !existing.ends_with('\n') {
            writeln!(file)?;
        }
        for entry in missing {
            writeln!(file, "{entry}")?;
        }
        debug!("Updated: {}", gitignore_path.display());
    }

    emit(&formatter.message(
        MessageLevel::Success,
        &format!(
            "Initialized {}. Copy .env.example to .env, edit bowtie.yaml, then run 'bowtie-sync plan'.",
            path.display()
        ),
    ))?;
    Ok(true)
}

/// Validates the configuration without contacting the controller.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let config_file = resolve_config_path(config_path)?;
    info!("Validating configuration: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;
    let result = ConfigValidator::new().validate(&config)?;

    emit(&formatter.format_validation(&config, &result, show_warnings))?;
    Ok(true)
}

/// Shows the actions an apply would take.
async fn cmd_plan(
    config_path: Option<&Path>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (config, state_store) = load_config_and_store(config_path)?;
    let client = create_client(&config).await?;

    let preview = Reconciler::new(&config, &state_store, &client).plan().await?;
    let diff = detailed.then_some(&preview.diff);
    emit(&formatter.format_plan(&preview.plan, diff))?;
    Ok(true)
}

/// Applies the configuration.
async fn cmd_apply(
    config_path: Option<&Path>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (config, state_store) = load_config_and_store(config_path)?;
    let client = create_client(&config).await?;
    let reconciler =
        Reconciler::new(&config, &state_store, &client).with_continue_on_error(continue_on_error);

    if !auto_approve {
        let preview = reconciler.plan().await?;
        emit(&formatter.format_plan(&preview.plan, None))?;
        if preview.plan.is_empty() {
            return Ok(true);
        }
        if !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
            emit(&formatter.message(MessageLevel::Warning, "Apply cancelled."))?;
            return Ok(true);
        }
    }

    let result = reconciler.reconcile().await?;
    emit(&formatter.format_reconciliation(&result))?;
    Ok(result.success)
}

/// Reports drift between the configuration and the controller.
async fn cmd_drift(config_path: Option<&Path>, formatter: &OutputFormatter) -> Result<bool> {
    let (config, state_store) = load_config_and_store(config_path)?;
    let client = create_client(&config).await?;

    let report = Reconciler::new(&config, &state_store, &client)
        .check_drift()
        .await?;
    emit(&formatter.format_drift(&report))?;
    Ok(report.is_converged())
}

/// Deletes every entity recorded in state.
async fn cmd_destroy(
    config_path: Option<&Path>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (config, state_store) = load_config_and_store(config_path)?;

    let Some(state) = state_store.load().await? else {
        emit(&formatter.message(MessageLevel::Warning, "No state found, nothing to destroy."))?;
        return Ok(true);
    };

    if !auto_approve {
        eprintln!(
            "This will delete {} managed entities from the controller.",
            state.entity_count()
        );
        if !confirm("Type 'destroy' to confirm: ", "destroy")? {
            emit(&formatter.message(MessageLevel::Warning, "Destroy cancelled."))?;
            return Ok(true);
        }
    }

    let client = create_client(&config).await?;
    let result = Reconciler::new(&config, &state_store, &client)
        .destroy()
        .await?;
    emit(&formatter.format_reconciliation(&result))?;
    Ok(result.success)
}

/// Local state subcommands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<bool> {
    let (_config, state_store) = load_config_and_store(config_path)?;

    match command {
        StateCommands::Show => {
            match state_store.load().await? {
                Some(state) => emit(&formatter.format_state(&state))?,
                None => emit(&formatter.message(MessageLevel::Warning, "No state found."))?,
            }
            if let Some(lock) = state_store.get_lock_info().await? {
                emit(&formatter.format_lock(&lock))?;
            }
        }
        StateCommands::Lock { holder } => {
            let holder = holder.unwrap_or_else(generate_holder_id);
            let lock = state_store.acquire_lock(&holder, "manual").await?;
            emit(&formatter.format_lock(&lock))?;
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                let message = match state_store.force_unlock().await? {
                    Some(lock) => format!("Removed lock held by {}", lock.holder),
                    None => String::from("State was not locked."),
                };
                emit(&formatter.message(MessageLevel::Success, &message))?;
            } else if let Some(id) = lock_id {
                state_store.release_lock(&id).await?;
                emit(&formatter.message(MessageLevel::Success, "State unlocked."))?;
            } else {
                emit(&formatter.message(
                    MessageLevel::Error,
                    "Provide --lock-id or use --force",
                ))?;
                return Ok(false);
            }
        }
    }

    Ok(true)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the configuration file path.
fn resolve_config_path(config_path: Option<&Path>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.to_path_buf()))
}

/// Directory containing the configuration file.
fn config_dir(config_file: &Path) -> PathBuf {
    config_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads and validates the configuration and opens its state store.
fn load_config_and_store(config_path: Option<&Path>) -> Result<(BowtieConfig, LocalStateStore)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading configuration from: {}", config_file.display());

    let base = config_dir(&config_file);
    let parser = ConfigParser::new().with_base_path(&base);
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;
    ConfigValidator::new().validate(&config)?;

    let state_store = LocalStateStore::relative_to(&base, config.state_path());
    debug!("Using state at: {}", state_store.location());
    Ok((config, state_store))
}

/// Connects to the controller with credentials from the environment.
async fn create_client(config: &BowtieConfig) -> Result<BowtieClient> {
    BowtieClient::connect(&ConfigParser::host(config)?, ConfigParser::credentials()?).await
}
