//! lbstack CLI entrypoint.
//!
//! This is the main entrypoint for the lbstack command-line tool.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use lbstack::cli::{Cli, Commands, OutputFormatter, StateCommands};
use lbstack::config::{
    ConfigParser, ConfigValidator, StackConfig, find_config_file, resolve_password,
};
use lbstack::dataplane::DataplaneClient;
use lbstack::error::{ConfigError, LbStackError, Result};
use lbstack::stack::{DesiredStack, StackOrchestrator};
use lbstack::state::{
    HistoryEntry, LifecycleOperation, LocalStateStore, STATE_DIR, StackState, StateStore,
};
use lbstack::transaction::ParentOperation;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system. Logs go to stderr so stdout stays
/// parseable in JSON output mode.
fn init_logging(verbose: bool, json: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(config_path, warnings, &formatter),
        Commands::Plan => cmd_plan(&Workspace::load(config_path)?, &formatter).await,
        Commands::Apply { yes } => {
            let workspace = Workspace::load(config_path)?;
            with_lock(&workspace.store, "apply", cmd_apply(&workspace, yes, &formatter)).await
        }
        Commands::Show => cmd_show(&Workspace::load(config_path)?, &formatter).await,
        Commands::Drift => cmd_drift(&Workspace::load(config_path)?, &formatter).await,
        Commands::Destroy { yes } => {
            let workspace = Workspace::load(config_path)?;
            with_lock(
                &workspace.store,
                "destroy",
                cmd_destroy(&workspace, yes, &formatter),
            )
            .await
        }
        Commands::State { command } => cmd_state(config_path, command, &formatter).await,
    }
}

/// Write a starter stack file.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Initializing lbstack in: {}", path.display());

    let config_path = path.join("lbstack.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    if !force && config_path.exists() {
        eprintln!("Stack file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    std::fs::write(&config_path, include_str!("../templates/lbstack.yaml"))?;
    eprintln!("Created: {}", config_path.display());

    std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
    eprintln!("Created: {}", env_path.display());

    let state_entry = format!("{STATE_DIR}/");
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        let missing: Vec<&str> = [".env", state_entry.as_str()]
            .into_iter()
            .filter(|entry| !existing.lines().any(|line| line.trim() == *entry))
            .collect();
        if !missing.is_empty() {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# lbstack")?;
            for entry in missing {
                writeln!(file, "{entry}")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, format!(".env\n{state_entry}\n"))?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nStack initialized.");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and set DATAPLANE_PASSWORD");
    eprintln!("  2. Edit lbstack.yaml to describe your backend and frontend");
    eprintln!("  3. Run 'lbstack validate' to check the stack file");
    eprintln!("  4. Run 'lbstack plan' to see what would change");
    eprintln!("  5. Run 'lbstack apply' to reconcile HAProxy");

    Ok(())
}

/// Validate the stack file.
fn cmd_validate(
    config_path: Option<&Path>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, config_file) = load_config(config_path)?;
    info!("Validating stack file: {}", config_file.display());

    let result = ConfigValidator::new().check(&config);
    println!("{}", formatter.format_validation(&result, show_warnings));

    if result.is_valid() {
        Ok(())
    } else {
        Err(LbStackError::Config(ConfigError::validation_general(
            format!("{} error(s) in {}", result.error_count(), config_file.display()),
        )))
    }
}

/// Show what an apply would change.
async fn cmd_plan(workspace: &Workspace, formatter: &OutputFormatter) -> Result<()> {
    let client = workspace.client()?;
    let prior = workspace.store.load().await?;

    let plan = workspace
        .orchestrator(&client)
        .plan(&workspace.desired, prior.as_ref())
        .await?;

    println!("{}", formatter.format_plan(&plan));
    Ok(())
}

/// Create or update the stack.
///
/// With nothing recorded and none of the declared parents present remotely
/// the stack is created; otherwise it is updated.
async fn cmd_apply(workspace: &Workspace, auto_approve: bool, formatter: &OutputFormatter) -> Result<()> {
    let client = workspace.client()?;
    let orchestrator = workspace.orchestrator(&client);
    let desired = &workspace.desired;
    let prior = workspace.store.load().await?;

    let plan = orchestrator.plan(desired, prior.as_ref()).await?;
    let fresh = prior.as_ref().is_none_or(StackState::is_empty)
        && plan
            .parent_operations()
            .all(|op| matches!(op, ParentOperation::Create { .. }));

    if !plan.has_changes() {
        println!(
            "{}",
            formatter.format_message("success", "No changes to apply.")
        );
        return Ok(());
    }

    println!("{}", formatter.format_plan(&plan));
    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    let (operation, result) = if fresh {
        debug!("No recorded or remote parents, creating stack");
        (LifecycleOperation::Create, orchestrator.create(desired).await)
    } else {
        (
            LifecycleOperation::Update,
            orchestrator.update(desired, prior.as_ref()).await,
        )
    };

    let mut outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            record_failure(workspace, prior, operation, &e).await;
            return Err(e);
        }
    };

    if operation == LifecycleOperation::Create
        && let Some(prior) = &prior
    {
        carry_history(&mut outcome.state, prior);
    }

    workspace.store.save(&outcome.state).await?;
    let verb = if operation == LifecycleOperation::Create {
        "created"
    } else {
        "updated"
    };
    println!("{}", formatter.format_outcome(verb, &outcome));
    Ok(())
}

/// Show the deployed stack.
async fn cmd_show(workspace: &Workspace, formatter: &OutputFormatter) -> Result<()> {
    let client = workspace.client()?;
    let prior = workspace.store.load().await?;

    let outcome = workspace
        .orchestrator(&client)
        .read(&workspace.desired, prior.as_ref())
        .await?;

    println!("{}", formatter.format_state(&outcome.state));
    Ok(())
}

/// Check for drift.
async fn cmd_drift(workspace: &Workspace, formatter: &OutputFormatter) -> Result<()> {
    let client = workspace.client()?;
    let prior = workspace.store.load().await?;

    let report = workspace
        .orchestrator(&client)
        .drift(&workspace.desired, prior.as_ref())
        .await?;

    println!("{}", formatter.format_drift(&report));
    Ok(())
}

/// Delete every parent and entry of the stack.
async fn cmd_destroy(workspace: &Workspace, auto_approve: bool, formatter: &OutputFormatter) -> Result<()> {
    let client = workspace.client()?;
    let desired = &workspace.desired;
    let prior = workspace.store.load().await?;

    eprintln!("The following parents will be deleted with all their entries:");
    for parent in &desired.parents {
        eprintln!("  - {}", parent.scope());
    }
    if let Some(prior) = &prior {
        for scope in prior.scopes() {
            if desired.parent(scope.parent_type, &scope.parent_name).is_none() {
                eprintln!("  - {scope} (recorded)");
            }
        }
    }

    if !auto_approve
        && !confirm(
            "\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ",
            "destroy",
        )?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let result = workspace
        .orchestrator(&client)
        .delete(desired, prior.as_ref())
        .await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            record_failure(workspace, prior, LifecycleOperation::Delete, &e).await;
            return Err(e);
        }
    };

    workspace.store.save(&outcome.state).await?;
    println!("{}", formatter.format_outcome("deleted", &outcome));
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&Path>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, config_file) = load_config(config_path)?;
    let store = state_store(&config, &config_file);

    match command {
        StateCommands::Show => {
            if let Some(state) = store.load().await? {
                println!("{}", formatter.format_state(&state));
            } else {
                println!("{}", formatter.format_message("warning", "No state recorded."));
            }
        }
        StateCommands::Lock => {
            let lock = store.lock_info().await?;
            println!("{}", formatter.format_lock(lock.as_ref()));
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                store.force_unlock().await?;
                println!("{}", formatter.format_message("success", "State forcefully unlocked."));
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                println!("{}", formatter.format_message("success", "State unlocked."));
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Everything a remote command needs.
struct Workspace {
    config: StackConfig,
    desired: DesiredStack,
    store: LocalStateStore,
}

impl Workspace {
    /// Loads and validates the stack file and opens its state store.
    fn load(config_path: Option<&Path>) -> Result<Self> {
        let (config, config_file) = load_config(config_path)?;

        let validation = ConfigValidator::new().validate(&config)?;
        for warning in &validation.warnings {
            warn!("{warning}");
        }

        let desired = DesiredStack::from_config(&config)?;
        let store = state_store(&config, &config_file);
        debug!(
            "Stack '{}' with {} declared entries, state backend: {}",
            desired.name,
            desired.entry_count(),
            store.backend_type()
        );

        Ok(Self {
            config,
            desired,
            store,
        })
    }

    /// Creates a Data Plane API client.
    fn client(&self) -> Result<DataplaneClient> {
        let dataplane = &self.config.dataplane;
        let password = resolve_password(dataplane, |name| std::env::var(name).ok())?;
        DataplaneClient::with_timeout(
            &dataplane.url,
            &dataplane.username,
            &password,
            dataplane.timeout_secs,
        )
    }

    /// Creates an orchestrator configured from the stack file.
    fn orchestrator<'a>(&self, client: &'a DataplaneClient) -> StackOrchestrator<'a, DataplaneClient> {
        StackOrchestrator::new(client)
            .with_position_policy(self.config.reconcile.position_policy)
            .with_order_strategy(self.config.reconcile.order_strategy)
    }
}

/// Resolves, loads and env-overrides the stack file.
fn load_config(config_path: Option<&Path>) -> Result<(StackConfig, PathBuf)> {
    let config_file = match config_path {
        Some(path) => path.to_path_buf(),
        None => find_config_file(".")?,
    };
    debug!("Loading stack file from: {}", config_file.display());

    let parser = ConfigParser::new().with_base_path(config_dir(&config_file));
    parser.load_dotenv()?;
    let config = parser.load_with_env(&config_file)?;

    Ok((config, config_file))
}

/// Directory holding the stack file.
fn config_dir(config_file: &Path) -> &Path {
    config_file
        .parent()
        .unwrap_or_else(|| Path::new("."))
}

/// Opens the local state store for the stack.
fn state_store(config: &StackConfig, config_file: &Path) -> LocalStateStore {
    let base = config_dir(config_file);
    let dir = config
        .state
        .path
        .as_ref()
        .map_or_else(|| base.join(STATE_DIR), |path| base.join(path));
    LocalStateStore::with_base_dir(dir, &config.stack.name)
}

/// Runs `work` while holding the stack lock.
async fn with_lock<F>(store: &LocalStateStore, operation: &str, work: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let lock = store.acquire_lock(operation).await?;
    let result = work.await;
    if let Err(e) = store.release_lock(&lock.lock_id).await {
        warn!("Failed to release state lock {}: {e}", lock.lock_id);
    }
    result
}

/// Records a failed lifecycle call in the prior state.
async fn record_failure(
    workspace: &Workspace,
    prior: Option<StackState>,
    operation: LifecycleOperation,
    error: &LbStackError,
) {
    let mut state = prior.unwrap_or_else(|| StackState::new(&workspace.desired.name));
    state.record(HistoryEntry::failure(operation, error.to_string()));
    if let Err(e) = workspace.store.save(&state).await {
        warn!("Failed to record {operation} failure in state: {e}");
    }
}

/// Keeps earlier history when a stack is recreated.
fn carry_history(state: &mut StackState, prior: &StackState) {
    let latest = state.history.pop();
    state.inherit_history(prior);
    if let Some(entry) = latest {
        state.record(entry);
    }
}

/// Prompts on stderr and compares the answer.
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}
