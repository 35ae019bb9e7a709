use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use weld_audit::AuditLedger;
use weld_cli::{sync_pull, sync_push, SyncReport};
use weld_compile::build;
use weld_inject::{
    InjectionFilter, InjectionKind, InjectionLocation, InjectionOrigin, InjectionRegistry,
    InjectionUpdate, NewInjection, render_document,
};
use weld_patch::{apply_patch, AttributeUpdate, PatchOutcome, PatchRequest};
use weld_store::{MirrorStore, SectionStore, SitePaths};
use weld_surrealdb::{SurrealCliConfig, SurrealCliMirror};

const DEFAULT_ROOT_SECTION: &str = "index.html";

#[derive(Parser)]
#[command(name = "weld", about = "Content management for section-based static sites")]
struct Cli {
    /// Site root directory. Falls back to WELD_SITE_ROOT, then ".".
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Mirror usage: off, auto (use when reachable), on (required).
    #[arg(long, global = true, value_enum, default_value_t = MirrorMode::Auto)]
    mirror: MirrorMode,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum MirrorMode {
    Off,
    Auto,
    On,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand include directives and write the servable document.
    Build(BuildArgs),
    /// Locate an element by data-id across all sections and patch it.
    Patch(PatchArgs),
    /// Apply active injections to the built document.
    Render(RenderArgs),
    /// Manage script/style injections.
    Injection {
        #[command(subcommand)]
        command: InjectionCommands,
    },
    /// Query the audit ledger.
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
    /// Bulk sync between the section directory and the mirror.
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
    /// Report section, ledger, injection and mirror state.
    Status,
}

#[derive(clap::Args)]
struct BuildArgs {
    /// Root section to expand.
    #[arg(long, default_value = DEFAULT_ROOT_SECTION)]
    root_section: String,
}

#[derive(clap::Args)]
struct PatchArgs {
    /// Element identifier (data-id attribute value).
    element_id: String,
    /// Replacement inner HTML; an empty string clears the element.
    content: String,
    #[arg(long, default_value = "unknown")]
    admin: String,
    /// New href (anchors only).
    #[arg(long)]
    href: Option<String>,
    /// New target (anchors only); an empty value removes the attribute.
    #[arg(long)]
    target: Option<String>,
    /// Skip the rebuild step after a successful patch.
    #[arg(long)]
    no_rebuild: bool,
    /// Root section the rebuild compiles.
    #[arg(long, default_value = DEFAULT_ROOT_SECTION)]
    root_section: String,
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Request path the render decision is based on.
    #[arg(long, default_value = "/")]
    path: String,
    /// Write the rendered document here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum InjectionCommands {
    Add(InjectionAddArgs),
    Update(InjectionUpdateArgs),
    Delete {
        injection_id: String,
    },
    List(InjectionListArgs),
    /// Toggle the active flag. Allowed for system injections too.
    Toggle {
        injection_id: String,
        #[arg(long)]
        off: bool,
    },
}

#[derive(clap::Args)]
struct InjectionAddArgs {
    name: String,
    #[arg(long, value_enum)]
    kind: KindArg,
    #[arg(long, value_enum)]
    location: LocationArg,
    /// Inline payload; mutually exclusive with --code-file.
    #[arg(long)]
    code: Option<String>,
    #[arg(long)]
    code_file: Option<PathBuf>,
    /// Register as a system injection (content becomes immutable).
    #[arg(long)]
    system: bool,
    #[arg(long)]
    inactive: bool,
    /// Explicit id; minted when omitted.
    #[arg(long)]
    id: Option<String>,
    #[arg(long, default_value = "system")]
    admin: String,
}

#[derive(clap::Args)]
struct InjectionUpdateArgs {
    injection_id: String,
    #[arg(long)]
    name: Option<String>,
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    #[arg(long, value_enum)]
    location: Option<LocationArg>,
    #[arg(long)]
    code: Option<String>,
    #[arg(long)]
    code_file: Option<PathBuf>,
}

#[derive(clap::Args)]
struct InjectionListArgs {
    #[arg(long, value_enum)]
    kind: Option<KindArg>,
    #[arg(long, value_enum)]
    location: Option<LocationArg>,
    #[arg(long)]
    system_only: bool,
    #[arg(long)]
    active_only: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Script,
    Style,
}

impl From<KindArg> for InjectionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Script => InjectionKind::Script,
            KindArg::Style => InjectionKind::Style,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LocationArg {
    BeforeHeadClose,
    BeforeBodyClose,
}

impl From<LocationArg> for InjectionLocation {
    fn from(location: LocationArg) -> Self {
        match location {
            LocationArg::BeforeHeadClose => InjectionLocation::BeforeHeadClose,
            LocationArg::BeforeBodyClose => InjectionLocation::BeforeBodyClose,
        }
    }
}

#[derive(Subcommand)]
enum AuditCommands {
    /// Most recent patch entries, newest first.
    Recent {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum SyncCommands {
    /// Upload every section file into the mirror.
    Push {
        #[arg(long, default_value = "system")]
        admin: String,
    },
    /// Restore section files from the mirror.
    Pull {
        #[arg(long, default_value = "system")]
        admin: String,
        /// Rebuild the servable document after pulling.
        #[arg(long)]
        rebuild: bool,
        /// Root section the rebuild compiles.
        #[arg(long, default_value = DEFAULT_ROOT_SECTION)]
        root_section: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let paths = SitePaths::from_cli_and_env(cli.root.clone());

    let result = match cli.command {
        Commands::Build(args) => run_build(&paths, &args),
        Commands::Patch(args) => run_patch(&paths, cli.mirror, &args),
        Commands::Render(args) => run_render(&paths, &args),
        Commands::Injection { command } => run_injection(&paths, command),
        Commands::Audit { command } => run_audit(&paths, command),
        Commands::Sync { command } => run_sync(&paths, cli.mirror, command),
        Commands::Status => run_status(&paths, cli.mirror),
    };

    if let Err(err) = result {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}

/// Resolve the mirror for the requested mode. `auto` degrades to no mirror
/// with a warning when the database is unreachable; `on` makes that fatal.
fn resolve_mirror(mode: MirrorMode) -> Result<Option<SurrealCliMirror>, String> {
    if mode == MirrorMode::Off {
        return Ok(None);
    }
    let mirror = SurrealCliMirror::new(SurrealCliConfig::from_env());
    match mirror.is_ready() {
        Ok(true) => Ok(Some(mirror)),
        Ok(false) => match mode {
            MirrorMode::On => Err("mirror required but surrealdb is not ready".to_string()),
            _ => {
                eprintln!("Warning: mirror disabled: surrealdb is not ready");
                Ok(None)
            }
        },
        Err(err) => match mode {
            MirrorMode::On => Err(format!("mirror required but unreachable: {}", err)),
            _ => {
                eprintln!("Warning: mirror disabled: {}", err);
                Ok(None)
            }
        },
    }
}

fn print_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {}", warning);
    }
}

fn run_build(paths: &SitePaths, args: &BuildArgs) -> Result<(), String> {
    let store = SectionStore::new(paths.sections_dir());
    let report = build(&store, paths, &args.root_section).map_err(|err| err.to_string())?;
    print_warnings(&report.warnings);
    println!("built {}", report.output_path.display());
    Ok(())
}

fn run_patch(paths: &SitePaths, mode: MirrorMode, args: &PatchArgs) -> Result<(), String> {
    let store = SectionStore::new(paths.sections_dir());
    let ledger = AuditLedger::new(paths.ledger_path());
    let mirror = resolve_mirror(mode)?;

    let request = PatchRequest {
        attributes: AttributeUpdate {
            href: args.href.clone(),
            target: args.target.clone(),
        },
        ..PatchRequest::new(&args.element_id, &args.content, &args.admin)
    };
    let outcome = apply_patch(
        &store,
        &ledger,
        mirror.as_ref().map(|m| m as &dyn MirrorStore),
        &request,
    )
    .map_err(|err| err.to_string())?;

    match outcome {
        PatchOutcome::Updated(report) => {
            print_warnings(&report.warnings);
            println!(
                "patched {} in {} (mirror_synced={})",
                args.element_id, report.filename, report.mirror_synced
            );
            if !args.no_rebuild {
                let build_report =
                    build(&store, paths, &args.root_section).map_err(|err| err.to_string())?;
                print_warnings(&build_report.warnings);
                println!("rebuilt {}", build_report.output_path.display());
            }
            Ok(())
        }
        PatchOutcome::NotFound { warnings } => {
            print_warnings(&warnings);
            Err(format!(
                "element not found in any section file: {}",
                args.element_id
            ))
        }
    }
}

fn run_render(paths: &SitePaths, args: &RenderArgs) -> Result<(), String> {
    let document = std::fs::read_to_string(paths.output_index())
        .map_err(|err| format!("servable document unreadable: {}", err))?;
    let registry = InjectionRegistry::new(paths.injections_path());
    let head = registry
        .active_by_location(InjectionLocation::BeforeHeadClose)
        .map_err(|err| err.to_string())?;
    let body = registry
        .active_by_location(InjectionLocation::BeforeBodyClose)
        .map_err(|err| err.to_string())?;
    let report = render_document(&document, &args.path, &head, &body);
    print_warnings(&report.warnings);
    match &args.out {
        Some(out) => {
            weld_store::atomic_write(out, &report.output).map_err(|err| err.to_string())?;
            println!("rendered {}", out.display());
        }
        None => print!("{}", report.output),
    }
    Ok(())
}

fn run_injection(paths: &SitePaths, command: InjectionCommands) -> Result<(), String> {
    let registry = InjectionRegistry::new(paths.injections_path());
    match command {
        InjectionCommands::Add(args) => {
            let code = load_code(args.code, args.code_file)?
                .ok_or_else(|| "one of --code or --code-file is required".to_string())?;
            let injection = registry
                .create(
                    NewInjection {
                        injection_id: args.id,
                        name: args.name,
                        kind: args.kind.into(),
                        code,
                        location: args.location.into(),
                        origin: if args.system {
                            InjectionOrigin::System
                        } else {
                            InjectionOrigin::User
                        },
                        is_active: !args.inactive,
                    },
                    &args.admin,
                )
                .map_err(|err| err.to_string())?;
            println!("created {}", injection.injection_id);
            Ok(())
        }
        InjectionCommands::Update(args) => {
            let code = load_code(args.code, args.code_file)?;
            let injection = registry
                .update(
                    &args.injection_id,
                    InjectionUpdate {
                        name: args.name,
                        kind: args.kind.map(Into::into),
                        code,
                        location: args.location.map(Into::into),
                        is_active: None,
                    },
                )
                .map_err(|err| err.to_string())?;
            println!("updated {}", injection.injection_id);
            Ok(())
        }
        InjectionCommands::Delete { injection_id } => {
            registry.delete(&injection_id).map_err(|err| err.to_string())?;
            println!("deleted {}", injection_id);
            Ok(())
        }
        InjectionCommands::List(args) => {
            let filter = InjectionFilter {
                kind: args.kind.map(Into::into),
                location: args.location.map(Into::into),
                origin: args.system_only.then_some(InjectionOrigin::System),
                is_active: args.active_only.then_some(true),
            };
            for injection in registry.list(&filter).map_err(|err| err.to_string())? {
                println!(
                    "{}  {}  {}  {:?}  active={}  {}",
                    injection.injection_id,
                    injection.kind.as_str(),
                    injection.location.as_str(),
                    injection.origin,
                    injection.is_active,
                    injection.name
                );
            }
            Ok(())
        }
        InjectionCommands::Toggle { injection_id, off } => {
            let injection = registry
                .set_active(&injection_id, !off)
                .map_err(|err| err.to_string())?;
            println!(
                "{} is now {}",
                injection.injection_id,
                if injection.is_active { "active" } else { "inactive" }
            );
            Ok(())
        }
    }
}

fn load_code(code: Option<String>, code_file: Option<PathBuf>) -> Result<Option<String>, String> {
    match (code, code_file) {
        (Some(_), Some(_)) => Err("--code and --code-file are mutually exclusive".to_string()),
        (Some(code), None) => Ok(Some(code)),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|err| format!("read {}: {}", path.display(), err)),
        (None, None) => Ok(None),
    }
}

fn run_audit(paths: &SitePaths, command: AuditCommands) -> Result<(), String> {
    let ledger = AuditLedger::new(paths.ledger_path());
    match command {
        AuditCommands::Recent { limit } => {
            for entry in ledger.recent_patches(limit).map_err(|err| err.to_string())? {
                let line =
                    serde_json::to_string(&entry).map_err(|err| err.to_string())?;
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn run_sync(paths: &SitePaths, mode: MirrorMode, command: SyncCommands) -> Result<(), String> {
    let store = SectionStore::new(paths.sections_dir());
    let ledger = AuditLedger::new(paths.ledger_path());
    // Sync is meaningless without a mirror, so `off` is rejected and `auto`
    // behaves like `on`.
    let mirror = resolve_mirror(match mode {
        MirrorMode::Off => {
            return Err("sync requires a mirror; rerun without --mirror off".to_string())
        }
        _ => MirrorMode::On,
    })?
    .ok_or_else(|| "mirror unavailable".to_string())?;

    match command {
        SyncCommands::Push { admin } => {
            let report = sync_push(&store, &ledger, &mirror, &admin)?;
            print_sync_report("push", &report);
            Ok(())
        }
        SyncCommands::Pull {
            admin,
            rebuild,
            root_section,
        } => {
            let report = sync_pull(&store, &ledger, &mirror, &admin)?;
            print_sync_report("pull", &report);
            if rebuild && !report.synced.is_empty() {
                let build_report =
                    build(&store, paths, &root_section).map_err(|err| err.to_string())?;
                print_warnings(&build_report.warnings);
                println!("rebuilt {}", build_report.output_path.display());
            }
            Ok(())
        }
    }
}

fn print_sync_report(direction: &str, report: &SyncReport) {
    print_warnings(&report.warnings);
    for (filename, reason) in &report.failed {
        eprintln!("Warning: {} failed for {}: {}", direction, filename, reason);
    }
    println!(
        "{}: {} synced, {} skipped, {} failed",
        direction,
        report.synced.len(),
        report.skipped.len(),
        report.failed.len()
    );
}

fn run_status(paths: &SitePaths, mode: MirrorMode) -> Result<(), String> {
    let store = SectionStore::new(paths.sections_dir());
    let ledger = AuditLedger::new(paths.ledger_path());
    let registry = InjectionRegistry::new(paths.injections_path());

    let sections = store.list().map_err(|err| err.to_string())?;
    println!("site root: {}", paths.root.display());
    println!("sections: {}", sections.len());
    println!(
        "ledger events: {}",
        ledger.event_count().map_err(|err| err.to_string())?
    );
    println!(
        "injections: {}",
        registry
            .list(&InjectionFilter::default())
            .map_err(|err| err.to_string())?
            .len()
    );
    println!(
        "built document: {}",
        if paths.output_index().exists() {
            "present"
        } else {
            "absent"
        }
    );
    match mode {
        MirrorMode::Off => println!("mirror: off"),
        _ => {
            let mirror = SurrealCliMirror::new(SurrealCliConfig::from_env());
            match mirror.is_ready() {
                Ok(true) => println!("mirror: ready ({})", mirror.config().endpoint),
                Ok(false) => println!("mirror: not ready ({})", mirror.config().endpoint),
                Err(err) => println!("mirror: unreachable ({})", err),
            }
        }
    }
    Ok(())
}
