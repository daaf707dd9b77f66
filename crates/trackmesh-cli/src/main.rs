use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use trackmesh_core::config::{resolve_config, resolve_project_code_field};
use trackmesh_core::credentials;
use trackmesh_core::engine::SyncEngine;
use trackmesh_core::file_store::JsonStore;
use trackmesh_core::node::NodeKind;
use trackmesh_core::record::{FieldMap, FieldValue, Filter, RemoteRecord, PROJECT_RECORD_TYPE};
use trackmesh_core::schema::RemoteSchema;
use trackmesh_core::store::RemoteStore;
use trackmesh_core::tree::LocalTreeSource;
use trackmesh_core::tree_file::YamlTreeSource;

#[derive(Parser)]
#[command(name = "trackmesh", version, about = "Reconcile a local project tree into a production tracking store")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the local project tree into the remote store snapshot
    Sync {
        /// Local project tree file (YAML)
        #[arg(long)]
        project: PathBuf,
        /// Remote store snapshot file (JSON)
        #[arg(long)]
        remote: PathBuf,
        /// Id of the remote project record; looked up or created when absent
        #[arg(long)]
        project_record: Option<String>,
    },
    /// Summarize the link state of the local project tree
    Status {
        /// Local project tree file (YAML)
        #[arg(long)]
        project: PathBuf,
    },
    /// Store the local login used for the tracking service
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Remove the stored local login
    Logout,
    /// Print version information
    Version,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Command::Sync {
            project,
            remote,
            project_record,
        }) => run_sync(&project, &remote, project_record.as_deref()),
        Some(Command::Status { project }) => run_status(&project),
        Some(Command::Login { username, password }) => run_login(&username, &password),
        Some(Command::Logout) => run_logout(),
        Some(Command::Version) => {
            println!("trackmesh {}", trackmesh_core::version());
            Ok(())
        }
        None => {
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}

fn project_dir(project: &Path) -> PathBuf {
    match project.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn run_sync(project: &Path, remote: &Path, project_record: Option<&str>) -> Result<()> {
    let source = YamlTreeSource::new(project);
    let store = JsonStore::new(remote);
    let project_dir = project_dir(project);

    let config = resolve_config(&project_dir);
    let schema = match &config.schema {
        Some(overrides) => RemoteSchema::default().with_overrides(overrides),
        None => RemoteSchema::default(),
    };

    let record = resolve_project_record(&source, &store, &project_dir, project_record)?;
    let report = SyncEngine::new(&source, &store, &schema).run(&record)?;

    println!("project record: {}", record.id);
    println!("created: {}", report.created);
    println!("linked: {}", report.linked);
    println!("conflicts: {}", report.conflicts);
    println!("passed through: {}", report.passed_through);
    println!("status: {}", report.status);
    Ok(())
}

/// Find the remote project record by id, fall back to the snapshot's single
/// project, and finally create one named after the local root.
fn resolve_project_record(
    source: &YamlTreeSource,
    store: &JsonStore,
    project_dir: &Path,
    id: Option<&str>,
) -> Result<RemoteRecord> {
    if let Some(id) = id {
        return store
            .find_one(PROJECT_RECORD_TYPE, &[Filter::id_is(id)])?
            .with_context(|| format!("no {PROJECT_RECORD_TYPE} record with id {id}"));
    }
    if let Some(existing) = store.find_one(PROJECT_RECORD_TYPE, &[])? {
        return Ok(existing);
    }

    let tree = source.load()?;
    let root = tree
        .node(tree.root_id())
        .context("project root is missing")?;
    let code_field = resolve_project_code_field(project_dir);
    let mut fields = FieldMap::new();
    fields.insert(code_field, FieldValue::text(&root.name));
    Ok(store.create(PROJECT_RECORD_TYPE, fields)?)
}

fn run_status(project: &Path) -> Result<()> {
    let source = YamlTreeSource::new(project);
    let tree = source.load()?;

    let mut linked = 0;
    let mut unlinked = 0;
    let mut organizational = 0;
    for node in tree.nodes_in_order() {
        if node.kind == NodeKind::Project {
            continue;
        }
        if !node.is_trackable() {
            organizational += 1;
        } else if node.remote_id().is_some() {
            linked += 1;
        } else {
            unlinked += 1;
        }
    }

    let root = tree
        .node(tree.root_id())
        .context("project root is missing")?;
    let root_state = match root.remote_id() {
        Some(remote_id) => format!("linked to {remote_id}"),
        None => "not linked".to_string(),
    };
    println!("project: {} ({root_state})", root.name);
    println!("linked: {linked}");
    println!("unlinked: {unlinked}");
    println!("organizational: {organizational}");
    Ok(())
}

fn run_login(username: &str, password: &str) -> Result<()> {
    let path = credentials::save_login(username, password)?;
    let config = resolve_config(Path::new("."));
    let (ok, message) = credentials::check_login(&config, credentials::load_login().as_ref());
    println!("login stored at {}", path.display());
    if !ok {
        println!("warning: {message}");
    }
    Ok(())
}

fn run_logout() -> Result<()> {
    credentials::clear_login()?;
    println!("login cleared");
    Ok(())
}
