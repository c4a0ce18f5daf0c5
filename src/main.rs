//! hakgal CLI: governed fact insertion into a SQLite knowledge base.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use hakgal::config::EngineConfig;
use hakgal::engine::{FactStatus, GovernanceEngine};
use hakgal::error::HakError;
use hakgal::governance::{GovernanceContext, OverrideFlags, WriteAccess};
use hakgal::paths::HakPaths;
use hakgal::statement;

#[derive(Parser)]
#[command(name = "hakgal", version, about = "Governance-gated knowledge base")]
struct Cli {
    #[command(flatten)]
    locations: Locations,

    #[command(subcommand)]
    command: Commands,
}

/// Where the database, config and constitution live.
#[derive(Args)]
struct Locations {
    /// SQLite database file.
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Engine config (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Constitution document (JSON). Defaults to constitution.json in the
    /// config dir if present, else the built-in constitution.
    #[arg(long, global = true)]
    constitution: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file and database schema.
    Init,

    /// Submit facts through the governance gate.
    Add {
        /// Facts, e.g. "IsA(Socrates, Human)."
        facts: Vec<String>,

        /// JSON file holding an array of fact strings.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Write token, required when HAKGAL_WRITE_TOKEN is set.
        #[arg(long)]
        token: Option<String>,

        /// Print the decision for every fact.
        #[arg(long, short)]
        verbose: bool,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Show the gate decision for a fact without storing it.
    Explain {
        fact: String,

        #[command(flatten)]
        context: ContextArgs,
    },

    /// Parse a statement and print its parts.
    Parse { statement: String },

    /// List stored facts.
    List {
        #[arg(long, default_value = "20")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,

        /// Only facts with this predicate.
        #[arg(long)]
        predicate: Option<String>,
    },

    /// Show one stored fact.
    Show { statement: String },

    /// Fact and audit counts.
    Stats,

    /// Print recent audit entries.
    Audit {
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Recompute the audit hash chain.
    VerifyAudit,
}

/// Per-call governance context.
#[derive(Args)]
struct ContextArgs {
    /// Provenance tag recorded on stored facts.
    #[arg(long, default_value = "user")]
    source: String,

    /// Caller role; "admin" may submit Delete* facts.
    #[arg(long)]
    role: Option<String>,

    /// Mark the submission as not externally legal.
    #[arg(long)]
    not_legal: bool,

    /// Flag the call as a bulk operation.
    #[arg(long)]
    bulk: bool,

    /// Emergency mode: higher harm ceiling, lower assessment confidence.
    #[arg(long)]
    emergency: bool,

    /// Confidence stored with the facts, 0..=1.
    #[arg(long)]
    confidence: Option<f64>,

    /// Skip rule evaluation for this call; the value is the authorization.
    #[arg(long, value_name = "AUTHORIZATION")]
    bypass: Option<String>,

    /// Grant all four override sign-offs.
    #[arg(long)]
    override_signoff: bool,
}

impl ContextArgs {
    fn into_context(self) -> GovernanceContext {
        let mut ctx = GovernanceContext::new(self.source)
            .with_externally_legal(!self.not_legal)
            .with_bulk(self.bulk)
            .with_emergency(self.emergency);
        if let Some(role) = self.role {
            ctx = ctx.with_role(role);
        }
        if let Some(confidence) = self.confidence {
            ctx = ctx.with_confidence(confidence);
        }
        if let Some(authorization) = self.bypass {
            ctx = ctx.with_bypass(authorization);
        }
        if self.override_signoff {
            ctx = ctx.with_overrides(OverrideFlags::granted());
        }
        ctx
    }
}

/// Resolved locations plus the engine config built from them.
struct Resolved {
    paths: HakPaths,
    config_file: PathBuf,
    config: EngineConfig,
}

impl Locations {
    /// Explicit config file, then the XDG default, then built-in defaults;
    /// command-line overrides on top, XDG locations for anything still unset.
    fn resolve(&self) -> Result<Resolved> {
        let paths = HakPaths::resolve().map_err(HakError::from)?;
        let config_file = self.config.clone().unwrap_or_else(|| paths.config_file());
        let mut config = if self.config.is_some() || config_file.exists() {
            EngineConfig::load(&config_file).map_err(HakError::from)?
        } else {
            EngineConfig::default()
        };
        if let Some(db) = &self.db {
            config.db_path = Some(db.clone());
        }
        if let Some(constitution) = &self.constitution {
            config.constitution_path = Some(constitution.clone());
        }
        let config = config.with_default_paths(&paths);
        Ok(Resolved {
            paths,
            config_file,
            config,
        })
    }

    fn engine(&self) -> Result<GovernanceEngine> {
        Ok(GovernanceEngine::new(self.resolve()?.config)?)
    }
}

fn print_parse(text: &str) -> Result<()> {
    let parsed = statement::parse(text);
    if !parsed.is_parseable() {
        miette::bail!("unparseable statement: {text}");
    }
    println!("predicate: {}", parsed.predicate);
    for (i, arg) in parsed.arguments.iter().enumerate() {
        println!("  arg {}: {arg}", i + 1);
    }
    println!("canonical: {}", parsed.canonical());
    println!("domain:    {}", parsed.domain());
    Ok(())
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let locations = &cli.locations;

    match cli.command {
        // Needs neither paths nor a database.
        Commands::Parse { statement: text } => print_parse(&text)?,

        Commands::Init => {
            let Resolved {
                paths,
                config_file,
                config,
            } = locations.resolve()?;
            paths.ensure_dirs().map_err(HakError::from)?;
            if !config_file.exists() {
                config.save(&config_file).map_err(HakError::from)?;
                println!("Wrote config to {}", config_file.display());
            }
            let engine = GovernanceEngine::new(config)?;
            let constitution = engine.gate().constitution();
            println!(
                "Initialized fact store at {}",
                engine
                    .store()
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| ":memory:".into())
            );
            println!(
                "Constitution v{} ({} rules, #{})",
                constitution.version,
                constitution.rules.len(),
                constitution.policy_hash()
            );
        }

        Commands::Add {
            mut facts,
            file,
            token,
            verbose,
            context,
        } => {
            WriteAccess::from_env()
                .check(token.as_deref())
                .map_err(HakError::from)?;

            if let Some(file) = file {
                let content = std::fs::read_to_string(&file).into_diagnostic()?;
                let from_file: Vec<String> = serde_json::from_str(&content).into_diagnostic()?;
                facts.extend(from_file);
            }
            if facts.is_empty() {
                miette::bail!("no facts given; pass them as arguments or with --file");
            }

            let ctx = context.into_context();
            let mut engine = locations.engine()?;
            let report = engine.governed_add_facts_verbose(&facts, &ctx)?;

            if verbose {
                for outcome in &report.outcomes {
                    let status = match &outcome.status {
                        FactStatus::Inserted { id } => format!("inserted #{id}"),
                        FactStatus::Duplicate => "duplicate".to_string(),
                        FactStatus::Denied { reason } => format!("denied ({reason})"),
                    };
                    println!("  {:<40} {status}", outcome.input);
                }
            }
            println!(
                "Inserted {} of {} facts ({} duplicate, {} denied)",
                report.inserted,
                facts.len(),
                report.duplicates,
                report.denied
            );
            if report.audit_failures > 0 {
                println!("Warning: {} audit entries could not be written", report.audit_failures);
            }
            let metrics = engine.metrics();
            println!(
                "Latency {:.2} ms (avg {:.2}, max {:.2}, SLO violations {})",
                report.elapsed_ms,
                metrics.avg_latency_ms,
                metrics.max_latency_ms,
                metrics.slo_violations
            );
        }

        Commands::Explain { fact, context } => {
            let engine = locations.engine()?;
            let decision = engine.explain(&fact, &context.into_context());
            println!("{}", decision.explain());
        }

        Commands::List {
            limit,
            offset,
            predicate,
        } => {
            let engine = locations.engine()?;
            let store = engine.store();
            let facts = match predicate {
                Some(p) => store.by_predicate(&p, limit).map_err(HakError::from)?,
                None => store.list(limit, offset).map_err(HakError::from)?,
            };
            if facts.is_empty() {
                println!("No facts stored.");
            }
            for fact in &facts {
                println!(
                    "  #{:<6} {:<50} [{}] source={} confidence={:.2}",
                    fact.id,
                    fact.statement,
                    fact.domain,
                    fact.source.as_deref().unwrap_or("-"),
                    fact.confidence
                );
            }
        }

        Commands::Show { statement } => {
            let engine = locations.engine()?;
            match engine.store().get(&statement).map_err(HakError::from)? {
                Some(fact) => {
                    let json = serde_json::to_string_pretty(&fact).into_diagnostic()?;
                    println!("{json}");
                }
                None => println!("Not found: {statement}"),
            }
        }

        Commands::Stats => {
            let engine = locations.engine()?;
            let store = engine.store();
            println!("Facts:         {}", store.count().map_err(HakError::from)?);
            println!(
                "Audit entries: {}",
                store.audit().count().map_err(HakError::from)?
            );
            let top = store.predicate_counts(10).map_err(HakError::from)?;
            if !top.is_empty() {
                println!("Top predicates:");
                for (predicate, count) in top {
                    println!("  {predicate:<30} {count}");
                }
            }
        }

        Commands::Audit { limit } => {
            let engine = locations.engine()?;
            let entries = engine
                .store()
                .audit()
                .entries(limit)
                .map_err(HakError::from)?;
            if entries.is_empty() {
                println!("Audit log is empty.");
            }
            for entry in &entries {
                println!(
                    "  #{:<6} {} {:<18} {} {}",
                    entry.id,
                    entry.timestamp,
                    entry.event,
                    &entry.hash[..12.min(entry.hash.len())],
                    entry.payload
                );
            }
        }

        Commands::VerifyAudit => {
            let engine = locations.engine()?;
            let report = engine
                .store()
                .audit()
                .verify_chain()
                .map_err(HakError::from)?;
            if report.is_intact() {
                println!("Audit chain intact: {} entries verified.", report.total);
            } else {
                println!(
                    "Audit chain BROKEN: {} of {} entries fail verification.",
                    report.tampered.len(),
                    report.total
                );
                for id in &report.tampered {
                    println!("  tampered entry #{id}");
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
