//! Command-line interface for leadflow: manage flows, leads, and the worker.
//!
//! This file implements the CLI entry point for leadflow, allowing users to
//! install the schema, manage flows and steps, capture leads, inspect jobs
//! and events, and run the polling worker.
//!
//! ## How
//!
//! Run the CLI with various subcommands to interact with leadflow. See
//! `--help` for usage details.
//!
//! ### Example
//!
//! ```sh
//! leadflow admin install
//! leadflow flow create 1 "Quick Follow-up"
//! leadflow step add 1 --step-type email --config '{"subject": "Hi {{name}}"}'
//! leadflow lead add 1 "Ann" ann@x.com --message "I'd like a quote"
//! leadflow worker run
//! ```
use clap::{Parser, Subcommand};
use leadflow::config::Config;
use leadflow::store::Store;
use leadflow::types::{FlowUpdate, JobStatus, NewFlow, NewLead, StepUpdate, TRIGGER_NEW_LEAD};
use std::fs::File;
use std::process;
use std::sync::Arc;

mod output;

use crate::output::{JsonOutputWriter, OutputWriter, TableOutputWriter};

#[derive(Parser)]
#[command(name = "leadflow")]
#[command(about = "A PostgreSQL-backed lead follow-up automation CLI")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Database URL (highest priority, overrides all other config sources)
    #[arg(long, short = 'd')]
    dsn: Option<String>,

    /// Schema name for leadflow tables (default: public)
    #[arg(long, short = 's')]
    schema: Option<String>,

    /// Config file path (overrides environment variables and defaults)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Log destination: stderr or file path
    #[arg(long, default_value = "stderr")]
    log_dest: String,

    /// Log level: error, warn, info, debug, trace
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output format: json, table
    #[arg(long, default_value = "table")]
    format: String,

    /// Output destination: stdout or file path
    #[arg(long, default_value = "stdout")]
    out: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Admin Commands
    Admin {
        #[command(subcommand)]
        admin_command: AdminCommands,
    },
    /// Flow Commands
    Flow {
        #[command(subcommand)]
        flow_command: FlowCommands,
    },
    /// Step Commands
    Step {
        #[command(subcommand)]
        step_command: StepCommands,
    },
    /// Lead Commands
    Lead {
        #[command(subcommand)]
        lead_command: LeadCommands,
    },
    /// Job Commands
    Job {
        #[command(subcommand)]
        job_command: JobCommands,
    },
    /// Event Commands
    Event {
        #[command(subcommand)]
        event_command: EventCommands,
    },
    /// Worker Commands
    Worker {
        #[command(subcommand)]
        worker_command: WorkerCommands,
    },
    /// Materialize follow-ups for leads that have none
    Reconcile,
}

#[derive(Subcommand)]
enum AdminCommands {
    /// Install the leadflow schema
    Install,
    /// Verify the leadflow installation
    Verify,
    /// Get system-wide statistics
    Stats,
}

#[derive(Subcommand)]
enum FlowCommands {
    /// Create a new flow
    Create {
        /// Tenant the flow belongs to
        customer: i64,
        /// Name of the flow
        name: String,
        /// Trigger identifier
        #[arg(long, default_value = TRIGGER_NEW_LEAD)]
        trigger: String,
        /// Create the flow inactive
        #[arg(long)]
        inactive: bool,
    },
    /// List a tenant's flows
    List {
        /// Tenant ID
        customer: i64,
    },
    /// Get a flow by ID
    Get {
        /// Flow ID
        id: i64,
    },
    /// Update a flow
    Update {
        /// Flow ID
        id: i64,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New trigger identifier
        #[arg(long)]
        trigger: Option<String>,
        /// Activate the flow
        #[arg(long, conflicts_with = "deactivate")]
        activate: bool,
        /// Deactivate the flow
        #[arg(long)]
        deactivate: bool,
    },
    /// Delete a flow and its steps
    Delete {
        /// Flow ID
        id: i64,
    },
    /// List a flow's steps in order
    Steps {
        /// Flow ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum StepCommands {
    /// Append a step to a flow
    Add {
        /// Flow ID
        flow: i64,
        /// Step type (wait, email, ...)
        #[arg(long)]
        step_type: String,
        /// Minutes to wait since the previous step
        #[arg(long, default_value = "0")]
        delay: i32,
        /// Step config as a JSON object
        #[arg(long, default_value = "{}")]
        config: String,
    },
    /// Update a step
    Update {
        /// Step ID
        id: i64,
        /// New step type
        #[arg(long)]
        step_type: Option<String>,
        /// New delay in minutes
        #[arg(long)]
        delay: Option<i32>,
        /// New config as a JSON object
        #[arg(long)]
        config: Option<String>,
    },
    /// Delete a step (remaining steps are renumbered)
    Delete {
        /// Step ID
        id: i64,
    },
    /// Reorder a flow's steps to the given id sequence
    Reorder {
        /// Flow ID
        flow: i64,
        /// Step IDs in the desired order (must cover every step exactly once)
        ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
enum LeadCommands {
    /// Capture a lead and schedule its follow-ups
    Add {
        /// Tenant the lead belongs to
        customer: i64,
        /// Contact name
        name: String,
        /// Contact email address
        email: String,
        /// Contact phone number
        #[arg(long)]
        phone: Option<String>,
        /// Message from the capture form
        #[arg(long)]
        message: Option<String>,
    },
    /// List a tenant's leads
    List {
        /// Tenant ID
        customer: i64,
    },
    /// Update a lead's status
    Status {
        /// Lead ID
        id: i64,
        /// New status (e.g. new, contacted, closed)
        status: String,
    },
}

#[derive(Subcommand)]
enum JobCommands {
    /// List a tenant's jobs
    List {
        /// Tenant ID
        customer: i64,
        /// Filter by status (pending, done, failed)
        #[arg(long)]
        status: Option<String>,
    },
    /// List the jobs scheduled for a lead
    Lead {
        /// Lead ID
        id: i64,
    },
}

#[derive(Subcommand)]
enum EventCommands {
    /// List a tenant's recent events
    List {
        /// Tenant ID
        customer: i64,
        /// Maximum number of events
        #[arg(long, default_value = "50")]
        limit: i64,
    },
    /// List a lead's recent events
    Lead {
        /// Lead ID
        id: i64,
        /// Maximum number of events
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum WorkerCommands {
    /// Run the polling worker until interrupted
    Run {
        /// Poll interval (e.g. '5s', '1m'); overrides config
        #[arg(long)]
        interval: Option<String>,
        /// Batch size per tick; overrides config
        #[arg(long)]
        batch: Option<usize>,
    },
    /// Run a single tick and exit
    Tick,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.to_lowercase().as_str() {
        "error" => tracing::Level::ERROR,
        "warn" => tracing::Level::WARN,
        "info" => tracing::Level::INFO,
        "debug" => tracing::Level::DEBUG,
        "trace" => tracing::Level::TRACE,
        other => {
            eprintln!("Unknown log level '{}', defaulting to INFO", other);
            tracing::Level::INFO
        }
    };

    let writer: Box<dyn Fn() -> Box<dyn std::io::Write + Send> + Send + Sync> =
        if cli.log_dest == "stderr" {
            Box::new(|| Box::new(std::io::stderr()))
        } else {
            let file = std::fs::File::create(&cli.log_dest).expect("Failed to create log file");
            Box::new(move || Box::new(file.try_clone().expect("Failed to clone log file")))
        };

    let subscriber = tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(writer)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run_cli(cli).await {
        tracing::error!("Error: {}", e);
        process::exit(1);
    }
}

/// Run the CLI with the provided arguments and configuration.
async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    // Priority order:
    // 1. --dsn CLI argument (if provided)
    // 2. --config CLI argument (if provided)
    // 3. LEADFLOW_CONFIG_FILE environment variable
    // 4. LEADFLOW_DSN and other environment variables
    // 5. Default config files (leadflow.yaml, leadflow.yml)
    let mut config = Config::load_with_options(cli.dsn.clone(), cli.config.clone())
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;
    if let Some(schema) = &cli.schema {
        config = config.with_schema(schema)?;
    }

    // Worker flags override config before the store is built.
    if let Commands::Worker {
        worker_command: WorkerCommands::Run { interval, batch },
    } = &cli.command
    {
        if let Some(interval) = interval {
            let duration: std::time::Duration = interval
                .parse::<humantime::Duration>()
                .map_err(|e| anyhow::anyhow!("Invalid interval '{}': {}", interval, e))?
                .into();
            config.poll_interval_seconds = duration.as_secs().max(1);
        }
        if let Some(batch) = batch {
            config.batch_size = *batch;
        }
    }

    let store = leadflow::connect_with_config(&config).await?;

    let writer = match cli.format.to_lowercase().as_str() {
        "json" => OutputWriter::Json(JsonOutputWriter),
        _ => OutputWriter::Table(TableOutputWriter),
    };
    let mut out_writer: Box<dyn std::io::Write> = match cli.out.as_str() {
        "stdout" => Box::new(std::io::stdout()),
        _ => Box::new(File::create(&cli.out)?),
    };
    let out: &mut dyn std::io::Write = out_writer.as_mut();

    match cli.command {
        Commands::Admin { admin_command } => {
            handle_admin_commands(&store, admin_command, writer, out).await?
        }
        Commands::Flow { flow_command } => {
            handle_flow_commands(&store, flow_command, writer, out).await?
        }
        Commands::Step { step_command } => {
            handle_step_commands(&store, step_command, writer, out).await?
        }
        Commands::Lead { lead_command } => {
            handle_lead_commands(&store, lead_command, writer, out).await?
        }
        Commands::Job { job_command } => {
            handle_job_commands(&store, job_command, writer, out).await?
        }
        Commands::Event { event_command } => {
            handle_event_commands(&store, event_command, writer, out).await?
        }
        Commands::Worker { worker_command } => {
            handle_worker_commands(&store, worker_command).await?
        }
        Commands::Reconcile => {
            tracing::info!("Reconciling leads without follow-ups...");
            let created = leadflow::materializer(&store).reconcile().await?;
            tracing::info!("Created {} jobs", created);
            writeln!(out, "Created {} jobs", created)?;
        }
    }
    Ok(())
}

async fn handle_admin_commands(
    store: &leadflow::AnyStore,
    command: AdminCommands,
    writer: OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    match command {
        AdminCommands::Install => {
            tracing::info!("Installing leadflow schema ...");
            leadflow::admin(store).install().await?;
            tracing::info!("Installation completed successfully");
        }

        AdminCommands::Verify => {
            tracing::info!("Verifying leadflow installation...");
            leadflow::admin(store).verify().await?;
            tracing::info!("Verification completed successfully");
        }

        AdminCommands::Stats => {
            tracing::info!("Getting system statistics...");
            let stats = leadflow::admin(store).stats().await?;
            writer.write_item(&stats, out)?;
        }
    }
    Ok(())
}

async fn handle_flow_commands(
    store: &leadflow::AnyStore,
    command: FlowCommands,
    writer: OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    match command {
        FlowCommands::Create {
            customer,
            name,
            trigger,
            inactive,
        } => {
            tracing::info!("Creating flow '{}' for customer {}...", name, customer);
            let flow = leadflow::admin(store)
                .create_flow(NewFlow {
                    customer_id: customer,
                    name,
                    trigger,
                    is_active: !inactive,
                })
                .await?;
            writer.write_item(&flow, out)?;
        }

        FlowCommands::List { customer } => {
            tracing::info!("Listing flows for customer {}...", customer);
            let flows = leadflow::admin(store).list_flows(customer).await?;
            writer.write_list(&flows, out)?;
        }

        FlowCommands::Get { id } => {
            let flow = leadflow::admin(store).get_flow(id).await?;
            writer.write_item(&flow, out)?;
        }

        FlowCommands::Update {
            id,
            name,
            trigger,
            activate,
            deactivate,
        } => {
            let is_active = match (activate, deactivate) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let flow = leadflow::admin(store)
                .update_flow(
                    id,
                    FlowUpdate {
                        name,
                        trigger,
                        is_active,
                    },
                )
                .await?;
            writer.write_item(&flow, out)?;
        }

        FlowCommands::Delete { id } => {
            tracing::info!("Deleting flow {}...", id);
            leadflow::admin(store).delete_flow(id).await?;
            writeln!(out, "Flow {} deleted", id)?;
        }

        FlowCommands::Steps { id } => {
            let steps = leadflow::admin(store).list_steps(id).await?;
            writer.write_list(&steps, out)?;
        }
    }
    Ok(())
}

async fn handle_step_commands(
    store: &leadflow::AnyStore,
    command: StepCommands,
    writer: OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    match command {
        StepCommands::Add {
            flow,
            step_type,
            delay,
            config,
        } => {
            let config: serde_json::Value = serde_json::from_str(&config)
                .map_err(|e| anyhow::anyhow!("Invalid step config JSON: {}", e))?;
            let step = leadflow::admin(store)
                .append_step(flow, &step_type, delay, config)
                .await?;
            writer.write_item(&step, out)?;
        }

        StepCommands::Update {
            id,
            step_type,
            delay,
            config,
        } => {
            let config = match config {
                Some(raw) => Some(
                    serde_json::from_str(&raw)
                        .map_err(|e| anyhow::anyhow!("Invalid step config JSON: {}", e))?,
                ),
                None => None,
            };
            let step = leadflow::admin(store)
                .update_step(
                    id,
                    StepUpdate {
                        step_type,
                        delay_minutes: delay,
                        config,
                    },
                )
                .await?;
            writer.write_item(&step, out)?;
        }

        StepCommands::Delete { id } => {
            leadflow::admin(store).delete_step(id).await?;
            writeln!(out, "Step {} deleted", id)?;
        }

        StepCommands::Reorder { flow, ids } => {
            let steps = leadflow::admin(store).reorder_steps(flow, &ids).await?;
            writer.write_list(&steps, out)?;
        }
    }
    Ok(())
}

async fn handle_lead_commands(
    store: &leadflow::AnyStore,
    command: LeadCommands,
    writer: OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    match command {
        LeadCommands::Add {
            customer,
            name,
            email,
            phone,
            message,
        } => {
            let lead = leadflow::materializer(store)
                .capture_lead(NewLead {
                    customer_id: customer,
                    name,
                    email,
                    phone,
                    message,
                })
                .await?;
            writer.write_item(&lead, out)?;
        }

        LeadCommands::List { customer } => {
            let leads = store.leads().list(customer).await?;
            writer.write_list(&leads, out)?;
        }

        LeadCommands::Status { id, status } => {
            let lead = leadflow::admin(store).update_lead_status(id, &status).await?;
            writer.write_item(&lead, out)?;
        }
    }
    Ok(())
}

async fn handle_job_commands(
    store: &leadflow::AnyStore,
    command: JobCommands,
    writer: OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    match command {
        JobCommands::List { customer, status } => {
            let status = match status {
                Some(raw) => Some(
                    raw.parse::<JobStatus>()
                        .map_err(|e| anyhow::anyhow!("{}", e))?,
                ),
                None => None,
            };
            let jobs = store.jobs().list(customer, status).await?;
            writer.write_list(&jobs, out)?;
        }

        JobCommands::Lead { id } => {
            let jobs = store.jobs().list_for_lead(id).await?;
            writer.write_list(&jobs, out)?;
        }
    }
    Ok(())
}

async fn handle_event_commands(
    store: &leadflow::AnyStore,
    command: EventCommands,
    writer: OutputWriter,
    out: &mut dyn std::io::Write,
) -> anyhow::Result<()> {
    match command {
        EventCommands::List { customer, limit } => {
            let events = store.events().list(customer, limit).await?;
            writer.write_list(&events, out)?;
        }

        EventCommands::Lead { id, limit } => {
            let events = store.events().list_for_lead(id, limit).await?;
            writer.write_list(&events, out)?;
        }
    }
    Ok(())
}

async fn handle_worker_commands(
    store: &leadflow::AnyStore,
    command: WorkerCommands,
) -> anyhow::Result<()> {
    let config = store.config().clone();
    let mailer = Arc::new(leadflow::SmtpMailer::from_config(&config)?);
    let executor =
        leadflow::StepExecutor::new(store.clone(), mailer, config.sender_email.clone());
    let poller = leadflow::Poller::new(store.clone(), executor);

    match command {
        WorkerCommands::Run { .. } => {
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

            let runner = {
                let poller = poller.clone();
                tokio::spawn(async move { poller.run(shutdown_rx).await })
            };

            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupt received, finishing current tick...");
            shutdown_tx.send(true).ok();
            runner.await?;
        }

        WorkerCommands::Tick => {
            let summary = poller.tick(chrono::Utc::now()).await?;
            tracing::info!(
                claimed = summary.claimed,
                done = summary.done,
                failed = summary.failed,
                "tick processed"
            );
        }
    }
    Ok(())
}
