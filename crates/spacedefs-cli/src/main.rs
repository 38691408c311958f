use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use spacedefs::{Builtins, LoaderKind, Namespace, SlotValue, SpaceConfig, SpaceRegistry, SpaceWatcher};

#[derive(Parser, Debug)]
#[command(name = "spacedefs", about = "Inspect and call the definitions of a space")]
struct Args {
    /// Config file (default: ~/.spacedefs/spacedefs.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Space root, overrides the config
    #[arg(long, global = true)]
    root: Option<String>,

    /// Unit format: source or dylib
    #[arg(long, global = true)]
    loader: Option<LoaderKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List slot names and definition kinds
    List,
    /// List slot names and candidate source paths without loading anything
    Paths,
    /// Print one definition
    Show { name: String },
    /// Call a function definition with a JSON argument
    Call {
        name: String,
        #[arg(default_value = "null")]
        input: String,
    },
    /// Reload whenever the space changes
    Watch,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = resolve_config(&args)?;

    match args.command {
        Command::List => {
            let mut registry = SpaceRegistry::from_config(&config, Builtins::standard())?;
            registry.load()?;
            print_listing(&registry);
        }
        Command::Paths => {
            let mut registry = SpaceRegistry::from_config(&config, Builtins::standard())?
                .with_load_defs(false);
            registry.load()?;
            for name in registry.names() {
                if let Some(path) = registry.get(name).and_then(SlotValue::as_path) {
                    println!("{}\t{}", name, path.display());
                }
            }
        }
        Command::Show { name } => {
            let walker = config.walker(Builtins::standard());
            let mut namespace = Namespace::new();
            walker.discover(&config.root()?, config.load_defs, Some(name.as_str()), &mut namespace)?;
            match namespace.get(&name) {
                Some(SlotValue::Definition(definition)) => match definition.as_object() {
                    Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
                    None => println!("<function>"),
                },
                Some(SlotValue::Path(path)) => println!("{}", path.display()),
                None => anyhow::bail!("no definition named {}", name),
            }
        }
        Command::Call { name, input } => {
            let input: Value = serde_json::from_str(&input)
                .map_err(|e| anyhow::anyhow!("invalid JSON argument: {}", e))?;
            let mut registry = SpaceRegistry::from_config(&config, Builtins::standard())?;
            registry.load()?;
            let output = registry.call(&name, input)?;
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Command::Watch => {
            let mut registry = SpaceRegistry::from_config(&config, Builtins::standard())?;
            registry.load()?;
            print_listing(&registry);

            let watcher = SpaceWatcher::new(registry.root(), config.watch_debounce())?;
            loop {
                if !watcher.wait_for_change(None) {
                    break;
                }
                tracing::info!("Space change detected, reloading...");
                match registry.reload() {
                    Ok(summary) if summary.is_empty() => {}
                    Ok(_) => print_listing(&registry),
                    Err(e) => tracing::warn!("Reload failed: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn resolve_config(args: &Args) -> anyhow::Result<SpaceConfig> {
    let mut config = match &args.config {
        Some(path) => SpaceConfig::load(path)?,
        None => SpaceConfig::load_or_default()?,
    };

    if let Some(root) = &args.root {
        config.root = Some(root.clone());
    }
    if let Some(loader) = args.loader {
        config.loader = loader;
    }

    Ok(config)
}

fn print_listing(registry: &SpaceRegistry) {
    for name in registry.names() {
        if let Some(value) = registry.get(name) {
            println!("{}\t{}", name, value.kind());
        }
    }
}
