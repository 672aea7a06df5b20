use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};
use wami_contracts::config::resolve_home;
use wami_contracts::flows::{
    commit_to_store, create_flow, delete_flow, find_by_name, EditorForm, Flow, FlowStore, Step,
};
use wami_contracts::intent::PROTOCOL_HELP_COMMANDS;
use wami_contracts::share::{stage_transfer, CachedBlob, ShareManifest};
use wami_engine::{load, Resolution, RunOutcome, SaveOutcome, SourceDescriptor, WamiApp};

#[derive(Debug, Parser)]
#[command(name = "wami", version, about = "Build and run image flows")]
struct Cli {
    /// Session home (flows, transfer cache, events, config).
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Flows(FlowsCommand),
    Run(RunArgs),
    Share(ShareArgs),
    Activate(ActivateArgs),
}

#[derive(Debug, Subcommand)]
enum FlowsCommand {
    List,
    Show {
        name: String,
    },
    Create {
        name: String,
        /// JSON array of `{"type": ..., "params": [...]}` steps.
        #[arg(long)]
        steps: Option<String>,
    },
    Delete {
        name: String,
    },
    /// Commit an editor form (`{"name": ..., "steps": [{"type": ..., "inputs": [...]}]}`).
    Edit {
        name: String,
        #[arg(long)]
        form: String,
    },
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    flow: String,
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[arg(long)]
    save_in_place: bool,
    #[arg(long)]
    export: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct ShareArgs {
    #[arg(required = true)]
    files: Vec<PathBuf>,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    url: Option<String>,
}

#[derive(Debug, Parser)]
struct ActivateArgs {
    /// Launch query, e.g. `share-target=1` or `url=web%2Bwami%3A%2F%2Fblur`.
    #[arg(long)]
    query: String,
    #[arg(long)]
    export: Option<PathBuf>,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("wami error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let home = resolve_home(cli.home);
    let mut app =
        WamiApp::open(&home).with_context(|| format!("opening session at {}", home.display()))?;
    match cli.command {
        Command::Flows(command) => run_flows(&app, command),
        Command::Run(args) => run_flow(&app, args),
        Command::Share(args) => run_share(&mut app, args),
        Command::Activate(args) => run_activate(&mut app, args),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn require_flow(store: &dyn FlowStore, name: &str) -> Result<Flow> {
    let flows = store.get_flows()?;
    match find_by_name(&flows, name) {
        Some(flow) => Ok(flow.clone()),
        None => bail!("no flow named '{name}'"),
    }
}

fn run_flows(app: &WamiApp, command: FlowsCommand) -> Result<i32> {
    let store = app.store();
    match command {
        FlowsCommand::List => {
            for flow in store.get_flows()? {
                println!("{}\t{}\t{} steps", flow.id, flow.name, flow.steps.len());
            }
        }
        FlowsCommand::Show { name } => {
            let flow = require_flow(store, &name)?;
            print_json(&serde_json::to_value(&flow)?)?;
        }
        FlowsCommand::Create { name, steps } => {
            let steps: Vec<Step> = match steps {
                Some(raw) => serde_json::from_str(&raw).context("parsing --steps")?,
                None => Vec::new(),
            };
            let flow = create_flow(store, &name, steps)?;
            info!(flow = %flow.name, id = %flow.id, "flow created");
            print_json(&serde_json::to_value(&flow)?)?;
        }
        FlowsCommand::Delete { name } => {
            let flow = require_flow(store, &name)?;
            if !delete_flow(store, &flow.id)? {
                bail!("flow '{name}' vanished before it could be deleted");
            }
            println!("deleted {}", flow.id);
        }
        FlowsCommand::Edit { name, form } => {
            let flow = require_flow(store, &name)?;
            let form: EditorForm = serde_json::from_str(&form).context("parsing --form")?;
            let updated = commit_to_store(store, &flow, &form)?;
            if app.session().refresh_flow(&updated) {
                info!(flow = %updated.name, "current flow refreshed");
            }
            print_json(&serde_json::to_value(&updated)?)?;
        }
    }
    Ok(0)
}

fn run_flow(app: &WamiApp, args: RunArgs) -> Result<i32> {
    let flow = require_flow(app.store(), &args.flow)?;
    let session = app.session();
    session.select_flow(flow);

    let mut inputs = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let input = load(SourceDescriptor::Picked { path: path.clone() })
            .with_context(|| format!("reading {}", path.display()))?;
        inputs.push(input);
    }
    session.set_inputs(inputs);

    let outcome = session.run()?;
    let RunOutcome::Published { count } = outcome else {
        bail!("run did not publish outputs: {outcome:?}");
    };
    println!("published {count} output(s)");

    if args.save_in_place {
        match session.save_in_place()? {
            SaveOutcome::Skipped => {
                println!("save in place skipped: outputs do not map onto writable inputs")
            }
            SaveOutcome::Saved(report) => {
                for path in &report.written {
                    println!("saved {}", path.display());
                }
                for (path, reason) in &report.failed {
                    eprintln!("failed to save {}: {reason}", path.display());
                }
                if !report.failed.is_empty() {
                    return Ok(2);
                }
            }
        }
    }
    if let Some(dir) = args.export.as_deref() {
        export(app, dir)?;
    }
    Ok(0)
}

fn export(app: &WamiApp, dir: &Path) -> Result<()> {
    let written = app
        .session()
        .export_outputs(dir)
        .with_context(|| format!("exporting to {}", dir.display()))?;
    for path in written {
        println!("exported {}", path.display());
    }
    Ok(())
}

fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "bmp" => "image/bmp",
        "svg" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

fn run_share(app: &mut WamiApp, args: ShareArgs) -> Result<i32> {
    let mut blobs = Vec::with_capacity(args.files.len());
    let mut names = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        blobs.push(CachedBlob::new(content_type_for(path), bytes));
        names.push(
            path.file_name()
                .and_then(|value| value.to_str())
                .unwrap_or("image")
                .to_string(),
        );
    }
    let manifest = ShareManifest {
        file_count: i64::try_from(blobs.len())?,
        file_names: Some(names),
        title: args.title,
        url: args.url,
    };
    stage_transfer(app.cache_mut(), &manifest, &blobs)?;
    println!(
        "staged {} file(s); consume with `wami activate --query share-target=1`",
        blobs.len()
    );
    Ok(0)
}

fn resolution_json(resolution: &Resolution) -> Value {
    json!({
        "flow": resolution.flow.as_ref().map(|flow| json!({
            "id": flow.id,
            "name": flow.name,
            "steps": flow.steps,
        })),
        "created": resolution.created,
        "images": resolution.images,
        "auto_run": resolution.auto_run.is_some(),
        "scrubbed_query": resolution.scrubbed_query,
        "error": resolution.error.as_ref().map(|err| err.to_string()),
    })
}

fn run_activate(app: &mut WamiApp, args: ActivateArgs) -> Result<i32> {
    let Some(mut resolution) = app.activate(&args.query) else {
        println!(
            "no activation in query; protocol commands: {}",
            PROTOCOL_HELP_COMMANDS.join(", ")
        );
        return Ok(0);
    };
    print_json(&resolution_json(&resolution))?;

    if let Some(handle) = resolution.auto_run.take() {
        match handle.join() {
            Ok(RunOutcome::Published { count }) => println!("auto-run published {count} output(s)"),
            Ok(outcome) => println!("auto-run did not publish: {outcome:?}"),
            Err(err) => eprintln!("auto-run failed: {err}"),
        }
    }
    if let Some(dir) = args.export.as_deref() {
        export(app, dir)?;
    }
    Ok(if resolution.error.is_some() { 2 } else { 0 })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use clap::Parser;

    use super::{content_type_for, Cli, Command, FlowsCommand};

    #[test]
    fn content_types_follow_extensions() {
        assert_eq!(content_type_for(Path::new("a/cat.PNG")), "image/png");
        assert_eq!(content_type_for(Path::new("b.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn parses_nested_flow_commands() {
        let cli = Cli::parse_from(["wami", "--home", "/tmp/w", "flows", "show", "Sepia"]);
        assert_eq!(cli.home.as_deref(), Some(Path::new("/tmp/w")));
        assert!(matches!(
            cli.command,
            Command::Flows(FlowsCommand::Show { ref name }) if name == "Sepia"
        ));
    }

    #[test]
    fn run_requires_files() {
        assert!(Cli::try_parse_from(["wami", "run", "--flow", "x"]).is_err());
        let cli = Cli::try_parse_from(["wami", "run", "--flow", "x", "a.png", "--save-in-place"]);
        assert!(matches!(cli.map(|cli| cli.command), Ok(Command::Run(args)) if args.save_in_place));
    }
}
