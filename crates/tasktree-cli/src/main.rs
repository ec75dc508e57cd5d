mod output;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use tasktree_core::scope::{self, resolve_active_scope};
use tasktree_core::scope_ops::{self, ImportSource};
use tasktree_core::task_ops::{self, NewTask};
use tasktree_core::vcs::GitCli;
use tasktree_core::Context;

#[derive(Parser)]
#[command(name = "tasktree", version, about = "Task stores scoped to repositories, directories and worktrees")]
struct Cli {
    /// Directory to start from (defaults to the working directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,
    /// Scope to act on: a relative path, a scope id, @root, @current or @parent
    #[arg(long, global = true)]
    scope: Option<String>,
    /// Emit JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print version information
    Version,
    #[command(flatten)]
    Work(WorkCommand),
}

/// Commands that operate on a store and need a resolved context.
#[derive(Subcommand)]
enum WorkCommand {
    /// Create a task in the active scope
    Add {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Parent task reference
        #[arg(long)]
        parent: Option<String>,
    },
    /// List tasks of the active scope
    List,
    /// Show one task
    Show { task: String },
    /// Append a log entry to a task
    Log { task: String, text: String },
    /// Record a checkpoint closing pending entries
    Checkpoint {
        task: String,
        #[arg(long)]
        summary: String,
        #[arg(long, default_value = "")]
        next: String,
    },
    /// Reconcile another store into the active scope
    Import(ImportArgs),
    /// Manage scopes
    #[command(subcommand)]
    Scope(ScopeCommand),
}

#[derive(Args)]
struct ImportArgs {
    /// Directory holding the source store
    #[arg(long, conflicts_with = "branch", required_unless_present = "branch")]
    path: Option<PathBuf>,
    /// Branch whose worktree holds the source store
    #[arg(long)]
    branch: Option<String>,
    /// Delete fully reconciled source tasks, and the source store once empty
    #[arg(long)]
    rm: bool,
    /// Tag imported tasks with the source scope id
    #[arg(long)]
    as_tag: bool,
}

#[derive(Subcommand)]
enum ScopeCommand {
    /// List every known scope
    List,
    /// Show the active scope and how it was chosen
    Current,
    /// Create a child scope
    Add {
        path: PathBuf,
        #[arg(long)]
        id: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Link the active scope under an existing parent scope
    AddParent { parent: String },
    /// Change a child scope's id
    Rename { scope: String, new_id: String },
    /// Delete a child scope
    Delete {
        scope: String,
        #[arg(long)]
        force: bool,
    },
    /// Move one task to another scope
    Assign { task: String, scope: String },
    /// Move every task carrying a tag to another scope
    Export { tag: String, scope: String },
    /// Register git worktrees that hold a store
    SyncWorktrees,
    /// Rewrite scope configs to match the directory tree
    Refresh,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let json = cli.json;
    if let Err(err) = run(cli) {
        output::print_error(&err, json);
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Version => {
            if cli.json {
                output::print_ok(None, &json!({"version": tasktree_core::version()}))?;
            } else {
                println!("tasktree {}", tasktree_core::version());
            }
            Ok(())
        }
        Command::Work(command) => run_work(cli.root, cli.scope.as_deref(), cli.json, command),
    }
}

fn run_work(
    root: Option<PathBuf>,
    scope_id: Option<&str>,
    json: bool,
    command: WorkCommand,
) -> Result<()> {
    let start = match root {
        Some(root) => root,
        None => std::env::current_dir().context("resolve current dir")?,
    };
    let mut ctx = Context::new(&start, Box::new(GitCli));
    tracing::debug!(root = ?ctx.topology_root(), "starting");
    let active = resolve_active_scope(&mut ctx, scope_id)?;

    match command {
        WorkCommand::Add {
            name,
            description,
            tags,
            parent,
        } => {
            let view = task_ops::create_task(
                &mut ctx,
                &NewTask {
                    name,
                    description,
                    tags,
                    parent,
                },
            )?;
            if json {
                output::print_ok(Some("task"), &view)?;
            } else {
                println!("Created {}:{}", view.scope, view.record.id);
            }
        }
        WorkCommand::List => {
            let tasks = task_ops::list_tasks(&mut ctx)?;
            let store = ctx.current_store()?;
            let scope_id = scope::display_id(&ctx, store.path());
            if json {
                output::print_ok(None, &json!({"scope": scope_id, "tasks": tasks}))?;
            } else {
                print!("{}", output::render_listing(&scope_id, &tasks));
            }
        }
        WorkCommand::Show { task } => {
            let view = task_ops::show_task(&mut ctx, &task)?;
            if json {
                output::print_ok(Some("task"), &view)?;
            } else {
                print!("{}", output::render_task(&view));
            }
        }
        WorkCommand::Log { task, text } => {
            let view = task_ops::log_entry(&mut ctx, &task, &text)?;
            if json {
                output::print_ok(Some("task"), &view)?;
            } else {
                println!("Logged to {}:{}", view.scope, view.record.id);
            }
        }
        WorkCommand::Checkpoint {
            task,
            summary,
            next,
        } => {
            let view = task_ops::add_checkpoint(&mut ctx, &task, &summary, &next)?;
            if json {
                output::print_ok(Some("task"), &view)?;
            } else {
                println!("Checkpointed {}:{}", view.scope, view.record.id);
            }
        }
        WorkCommand::Import(args) => {
            let source = match (args.path, args.branch) {
                (Some(path), _) => ImportSource::Path(path),
                (None, Some(branch)) => ImportSource::Branch(branch),
                (None, None) => anyhow::bail!("either --path or --branch is required"),
            };
            let report = scope_ops::import_from(&mut ctx, &source, args.rm, args.as_tag)?;
            if json {
                output::print_ok(None, &report)?;
            } else {
                print!("{}", output::render_import(&report));
            }
        }
        WorkCommand::Scope(command) => run_scope(&mut ctx, command, json, &active)?,
    }
    Ok(())
}

fn run_scope(
    ctx: &mut Context,
    command: ScopeCommand,
    json: bool,
    active: &scope::ActiveScope,
) -> Result<()> {
    match command {
        ScopeCommand::List => {
            let scopes = scope_ops::list_scopes(ctx)?;
            if json {
                output::print_ok(Some("scopes"), &scopes)?;
            } else {
                print!("{}", output::render_scopes(&scopes));
            }
        }
        ScopeCommand::Current => {
            let current = scope_ops::current_scope(ctx, active);
            if json {
                output::print_ok(None, &current)?;
            } else {
                println!(
                    "{} ({}, {})",
                    current.id,
                    current.path.display(),
                    current.source.as_str()
                );
                if let Some(branch) = &current.branch {
                    println!("branch: {}", branch);
                }
                println!(
                    "scan depth: {} ({})",
                    current.scan_depth, current.scan_depth_source
                );
            }
        }
        ScopeCommand::Add { path, id, tags } => {
            let entry = scope_ops::add_scope(ctx, &path, id.as_deref(), &tags)?;
            if json {
                output::print_ok(Some("scope"), &entry)?;
            } else {
                println!("Added scope {} at {}", entry.id, entry.path);
            }
        }
        ScopeCommand::AddParent { parent } => {
            let link = scope_ops::add_parent(ctx, &parent)?;
            if json {
                output::print_ok(None, &link)?;
            } else {
                println!("Linked {} under {}", link.entry.id, link.parent.display());
            }
        }
        ScopeCommand::Rename { scope, new_id } => {
            let renamed = scope_ops::rename_scope(ctx, &scope, &new_id)?;
            if json {
                output::print_ok(None, &renamed)?;
            } else {
                println!("Renamed {} -> {}", renamed.old_id, renamed.new_id);
            }
        }
        ScopeCommand::Delete { scope, force } => {
            let deleted = scope_ops::delete_scope(ctx, &scope, force)?;
            if json {
                output::print_ok(None, &deleted)?;
            } else {
                println!(
                    "Deleted scope {} ({} task(s))",
                    deleted.id, deleted.tasks_deleted
                );
            }
        }
        ScopeCommand::Assign { task, scope } => {
            let report = scope_ops::assign_task(ctx, &task, &scope)?;
            if json {
                output::print_ok(None, &report)?;
            } else {
                print!("{}", output::render_import(&report));
            }
        }
        ScopeCommand::Export { tag, scope } => {
            let report = scope_ops::export_tagged(ctx, &tag, &scope)?;
            if json {
                output::print_ok(None, &report)?;
            } else {
                print!("{}", output::render_import(&report));
            }
        }
        ScopeCommand::SyncWorktrees => {
            let sync = scope_ops::sync_worktrees(ctx)?;
            if json {
                output::print_ok(None, &sync)?;
            } else {
                for entry in &sync.registered {
                    println!("registered {} ({})", entry.id, entry.path);
                }
                for entry in &sync.dropped {
                    println!("dropped {} ({})", entry.id, entry.path);
                }
            }
        }
        ScopeCommand::Refresh => {
            let report = scope_ops::refresh(ctx)?;
            if json {
                output::print_ok(None, &report)?;
            } else {
                println!(
                    "Refreshed {} child scope(s), wrote {} config(s)",
                    report.children.len(),
                    report.written.len()
                );
            }
        }
    }
    Ok(())
}
