use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use filess_core::diagnostic::{Diagnostic, Severity};
use filess_core::provider::{Provider, ProviderError};
use filess_core::resource::{Resource, ResourceId, State};
use filess_core::schema::ResourceSchema;
use filess_provider::config::{API_TOKEN_ENV, API_URL_ENV, DEFAULT_API_URL};
use filess_provider::{Cancellation, DatabaseController, FilessProvider, ProviderConfig, resources};
use filess_state::{LocalBackend, ResourceState, StateBackend, StateFile};

mod differ;
mod display;
mod manifest;

use differ::{Diff, PlanSummary, create_plan};

/// Environment variable holding the log filter
const LOG_ENV: &str = "FILESS_LOG";

const INTERRUPTED: &str = "Interrupted. State reflects the operations completed so far.";

#[derive(Parser)]
#[command(name = "filess")]
#[command(about = "Manage filess.io databases declaratively", long_about = None)]
struct Cli {
    /// API token used to authenticate against filess.io
    #[arg(long, env = API_TOKEN_ENV, hide_env_values = true, global = true)]
    api_token: Option<String>,

    /// Base URL of the filess.io API
    #[arg(long, env = API_URL_ENV, default_value = DEFAULT_API_URL, global = true)]
    api_url: String,

    /// Path to the state file
    #[arg(long, default_value = LocalBackend::DEFAULT_STATE_FILE, global = true)]
    state: PathBuf,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the JSON configuration file
        #[arg(default_value = "main.json")]
        file: PathBuf,
    },
    /// Re-read every resource in state from the API
    Refresh,
    /// Destroy all resources recorded in state
    Destroy {
        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Show the recorded state with sensitive values masked
    Show,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let backend = LocalBackend::with_path(&cli.state);
    let interrupt = listen_for_interrupt();
    let result = match &cli.command {
        Commands::Apply { file } => run_apply(&cli, &backend, &interrupt, file).await,
        Commands::Refresh => run_refresh(&cli, &backend, &interrupt).await,
        Commands::Destroy { auto_approve } => {
            run_destroy(&cli, &backend, &interrupt, *auto_approve).await
        }
        Commands::Show => run_show(&backend).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn get_schemas() -> HashMap<String, ResourceSchema> {
    resources::resource_types()
        .into_iter()
        .map(|resource_type| (resource_type.name().to_string(), resource_type.schema()))
        .collect()
}

fn get_provider(cli: &Cli, interrupt: &Cancellation) -> Result<FilessProvider, String> {
    let config = ProviderConfig::new(&cli.api_url, cli.api_token.clone().unwrap_or_default());
    let client = config
        .connect()
        .map_err(|e| format!("Invalid provider configuration: {}", e))?;
    Ok(FilessProvider::with_controller(
        DatabaseController::new(client).with_cancellation(interrupt.clone()),
    ))
}

/// Signal that fires on the first Ctrl+C
fn listen_for_interrupt() -> Cancellation {
    let (tx, interrupt) = Cancellation::new();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted by user");
            tx.send_replace(true);
        }
    });
    interrupt
}

/// Run a provider operation, giving up when the user hits Ctrl+C
///
/// Only for operations with nothing to record mid-flight. Creates observe the
/// signal themselves so the assigned id survives an interrupt.
async fn interruptible<T>(
    interrupt: &Cancellation,
    operation: impl Future<Output = T>,
) -> Result<T, String> {
    tokio::select! {
        result = operation => Ok(result),
        _ = interrupt.cancelled() => Err(INTERRUPTED.to_string()),
    }
}

async fn load_state(backend: &dyn StateBackend) -> Result<StateFile, String> {
    Ok(backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
        .unwrap_or_default())
}

async fn save_state(backend: &dyn StateBackend, state: &mut StateFile) -> Result<(), String> {
    state.increment_serial();
    backend
        .write_state(state)
        .await
        .map_err(|e| format!("Failed to write state: {}", e))
}

fn identifier_of(state: &State) -> Result<&str, String> {
    state
        .identifier
        .as_deref()
        .ok_or_else(|| format!("{} has no recorded identifier", state.id))
}

/// Stored attributes overlaid with what the API reports now
async fn refresh_resource(
    provider: &dyn Provider,
    interrupt: &Cancellation,
    stored: &ResourceState,
) -> Result<State, String> {
    let refreshed = interruptible(interrupt, provider.read(&stored.id(), &stored.identifier))
        .await?
        .map_err(|e| format!("Failed to read state: {}", e))?;
    if !refreshed.exists {
        return Ok(refreshed);
    }

    let mut attributes = stored.attribute_values();
    attributes.extend(refreshed.attributes);
    Ok(State {
        attributes,
        ..refreshed
    })
}

fn print_failure(diff: &Diff, e: &ProviderError) {
    println!("  {} {} - {}", "✗".red(), diff, e);
}

fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

async fn run_apply(
    cli: &Cli,
    backend: &dyn StateBackend,
    interrupt: &Cancellation,
    file: &Path,
) -> Result<(), String> {
    let desired = manifest::load(file)?;
    let schemas = get_schemas();
    manifest::validate_resources(&schemas, &desired)?;

    let provider = get_provider(cli, interrupt)?;
    let mut state = load_state(backend).await?;

    let mut current_states: HashMap<ResourceId, State> = HashMap::new();
    for stored in &state.resources {
        let current = if desired.iter().any(|r| r.id == stored.id()) {
            refresh_resource(&provider, interrupt, stored).await?
        } else {
            stored.to_state()
        };
        current_states.insert(stored.id(), current);
    }

    let plan = create_plan(&schemas, &desired, &current_states)?;
    if plan.is_empty() {
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    display::print_plan(&plan);
    println!("{}", PlanSummary::of(&plan));
    println!();
    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    for diff in &plan {
        let applied = match diff {
            Diff::Create(resource) => create(&provider, backend, &mut state, diff, resource).await?,
            Diff::Update { from, to, .. } => {
                let identifier = identifier_of(from)?;
                match interruptible(interrupt, provider.update(&to.id, identifier, from, to)).await? {
                    Ok(outcome) => {
                        let exists = record(&provider, &mut state, &to.id, &outcome.value);
                        save_state(backend, &mut state).await?;
                        if exists {
                            println!("  {} {}", "✓".green(), diff);
                        } else {
                            print_vanished(diff);
                        }
                        display::print_diagnostics(&outcome.diagnostics);
                        exists && !has_errors(&outcome.diagnostics)
                    }
                    Err(e) => {
                        print_failure(diff, &e);
                        false
                    }
                }
            }
            Diff::Replace { from, to, .. } => {
                let identifier = identifier_of(from)?;
                match interruptible(interrupt, provider.delete(&from.id, identifier)).await? {
                    Ok(()) => {
                        state.remove_resource(&from.id.resource_type, &from.id.name);
                        save_state(backend, &mut state).await?;
                        create(&provider, backend, &mut state, diff, to).await?
                    }
                    Err(e) => {
                        print_failure(diff, &e);
                        false
                    }
                }
            }
            Diff::Delete(current) => {
                let identifier = identifier_of(current)?;
                match interruptible(interrupt, provider.delete(&current.id, identifier)).await? {
                    Ok(()) => {
                        state.remove_resource(&current.id.resource_type, &current.id.name);
                        save_state(backend, &mut state).await?;
                        println!("  {} {}", "✓".green(), diff);
                        true
                    }
                    Err(e) => {
                        print_failure(diff, &e);
                        false
                    }
                }
            }
        };

        if applied {
            success_count += 1;
        } else {
            failure_count += 1;
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Apply complete! {} changes applied.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

/// Create a resource and record it; a failed create that already produced
/// a backend id is recorded too, so the next run can adopt or delete it
///
/// Not wrapped in `interruptible`: the provider stops on the interrupt
/// signal itself and reports the id it was waiting on.
async fn create(
    provider: &dyn Provider,
    backend: &dyn StateBackend,
    state: &mut StateFile,
    diff: &Diff,
    resource: &Resource,
) -> Result<bool, String> {
    match provider.create(resource).await {
        Ok(outcome) => {
            record(provider, state, &resource.id, &outcome.value);
            save_state(backend, state).await?;
            println!("  {} {}", "✓".green(), diff);
            display::print_diagnostics(&outcome.diagnostics);
            Ok(!has_errors(&outcome.diagnostics))
        }
        Err(e) => {
            if let Some(identifier) = &e.identifier {
                let partial = ResourceState::new(
                    &resource.id.resource_type,
                    &resource.id.name,
                    provider.name(),
                    identifier,
                );
                let partial = resource
                    .attributes
                    .iter()
                    .fold(partial, |acc, (k, v)| acc.with_attribute(k, v.to_json()));
                state.upsert_resource(partial);
                save_state(backend, state).await?;
            }
            print_failure(diff, &e);
            if e.is_cancelled() {
                return Err(INTERRUPTED.to_string());
            }
            Ok(false)
        }
    }
}

/// Store `current` under `id`, or drop the entry when the resource is gone
///
/// Returns whether the resource still exists.
fn record(provider: &dyn Provider, state: &mut StateFile, id: &ResourceId, current: &State) -> bool {
    match ResourceState::from_state(current, provider.name()) {
        Some(resource) => {
            state.upsert_resource(resource);
            true
        }
        None => {
            state.remove_resource(&id.resource_type, &id.name);
            false
        }
    }
}

fn print_vanished(target: impl std::fmt::Display) {
    println!(
        "  {} {} {}",
        "-".red().bold(),
        target,
        "(no longer exists, removed from state)".dimmed()
    );
}

async fn run_refresh(
    cli: &Cli,
    backend: &dyn StateBackend,
    interrupt: &Cancellation,
) -> Result<(), String> {
    let mut state = load_state(backend).await?;
    if state.resources.is_empty() {
        println!("{}", "No resources in state.".yellow());
        return Ok(());
    }

    let provider = get_provider(cli, interrupt)?;
    let stored: Vec<ResourceState> = state.resources.clone();
    for resource in &stored {
        let current = refresh_resource(&provider, interrupt, resource).await?;
        if record(&provider, &mut state, &resource.id(), &current) {
            println!("  {} {}", "✓".green(), resource.id());
        } else {
            print_vanished(resource.id());
        }
    }

    save_state(backend, &mut state).await?;
    println!();
    println!("{}", "Refresh complete!".green().bold());
    Ok(())
}

async fn run_destroy(
    cli: &Cli,
    backend: &dyn StateBackend,
    interrupt: &Cancellation,
    auto_approve: bool,
) -> Result<(), String> {
    let mut state = load_state(backend).await?;
    if state.resources.is_empty() {
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    println!("{}", "Destroy Plan:".red().bold());
    println!();
    for resource in &state.resources {
        println!("  {} {}", "-".red().bold(), resource.id());
    }
    println!();
    println!(
        "Plan: {} to destroy.",
        state.resources.len().to_string().red()
    );
    println!();

    // Confirmation prompt
    if !auto_approve {
        println!(
            "{}",
            "Do you really want to destroy all resources?"
                .yellow()
                .bold()
        );
        println!(
            "  {}",
            "This action cannot be undone. Type 'yes' to confirm.".yellow()
        );
        print!("\n  Enter a value: ");
        std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

        let mut input = String::new();
        std::io::stdin()
            .read_line(&mut input)
            .map_err(|e| e.to_string())?;

        if input.trim() != "yes" {
            println!();
            println!("{}", "Destroy cancelled.".yellow());
            return Ok(());
        }
        println!();
    }

    let provider = get_provider(cli, interrupt)?;

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let mut success_count = 0;
    let mut failure_count = 0;

    let stored: Vec<ResourceState> = state.resources.iter().rev().cloned().collect();
    for resource in stored {
        let id = resource.id();
        match interruptible(interrupt, provider.delete(&id, &resource.identifier)).await? {
            Ok(()) => {
                state.remove_resource(&resource.resource_type, &resource.name);
                save_state(backend, &mut state).await?;
                println!("  {} delete {}", "✓".green(), id);
                success_count += 1;
            }
            Err(e) => {
                println!("  {} delete {} - {}", "✗".red(), id, e);
                failure_count += 1;
            }
        }
    }

    println!();
    if failure_count == 0 {
        println!(
            "{}",
            format!("Destroy complete! {} resources destroyed.", success_count)
                .green()
                .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            success_count, failure_count
        ))
    }
}

async fn run_show(backend: &dyn StateBackend) -> Result<(), String> {
    let Some(state) = backend
        .read_state()
        .await
        .map_err(|e| format!("Failed to read state: {}", e))?
    else {
        println!("{}", "No state.".yellow());
        return Ok(());
    };

    if state.resources.is_empty() {
        println!("{}", "No resources in state.".yellow());
        return Ok(());
    }

    let schemas = get_schemas();
    for (index, resource) in state.resources.iter().enumerate() {
        if index > 0 {
            println!();
        }
        display::print_resource_state(resource, schemas.get(&resource.resource_type));
    }
    Ok(())
}
