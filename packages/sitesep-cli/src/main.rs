//! Site Separation CLI - push location-based site separation to IP Fabric
//!
//! This binary takes a hostname -> location mapping (from a file or from
//! ServiceNow) and either:
//! - Assigns every inventory device to a site (manual mode)
//! - Compiles ordered hostname rules with a catch-all (rule mode)
//! - Writes the ServiceNow locations to a file for review

mod config;
mod grex;
mod input;
mod ipfabric;
mod output;
mod servicenow;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use config::Settings;
use ipfabric::IpFabricClient;
use servicenow::ServiceNowClient;
use sitesep_core::{
    CasePolicy, CompileOptions, InventoryDevice, LocationRecord, ManualOptions, PatternSynthesizer,
    Rule, RuleKind, RuleMatcher, SiteDirectory, Strategy, compile_buckets, manual_assignments,
    prepend_to_existing,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "sitesep")]
#[command(author = "Stratiform LLC")]
#[command(version)]
#[command(about = "Push location-based site separation to IP Fabric")]
#[command(long_about = "
sitesep maps network devices to sites from a hostname -> location list and
pushes the result to IP Fabric, either as per-device assignments or as
ordered hostname rules.

Quick start:
  1. Check settings:       sitesep config
  2. Preview assignments:  sitesep manual --file locations.csv --dry-run
  3. Write rules to file:  sitesep rules --file locations.csv --output .
  4. Push rules:           sitesep rules --file locations.csv
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Snapshot id or "$last" (overrides configuration)
    #[arg(long, global = true)]
    pub snapshot: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

/// Where the hostname -> location mapping comes from
#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// CSV, Excel or JSON file with hostname and location columns
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Look up device locations in the ServiceNow CMDB
    #[arg(long)]
    pub servicenow: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Assign every inventory device to a site
    Manual {
        #[command(flatten)]
        source: SourceArgs,

        /// Show assignments without creating sites or pushing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Compile hostname rules and push them as site separation settings
    Rules {
        #[command(flatten)]
        source: SourceArgs,

        /// Keep hostname case instead of upper-casing
        #[arg(long)]
        exact: bool,

        /// Build one pattern per group with grex instead of literal alternation
        #[arg(long)]
        grex: bool,

        /// Maximum hostnames per rule
        #[arg(long)]
        group_size: Option<usize>,

        /// Write rules to a timestamped file in this directory instead of pushing
        #[arg(short, long, value_name = "DIR", conflicts_with = "keep")]
        output: Option<PathBuf>,

        /// Put new rules ahead of the rules already on the snapshot
        #[arg(long)]
        keep: bool,
    },

    /// Write ServiceNow locations of the inventory devices to a file
    Locations {
        /// Directory for the timestamped output file
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,
    },

    /// Show configuration paths and settings
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("sitesep={},sitesep_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut settings = config::load_settings();
    if let Some(snapshot) = &cli.snapshot {
        settings.platform.snapshot = snapshot.clone();
    }

    match &cli.command {
        Commands::Manual { source, dry_run } => cmd_manual(&cli, &settings, source, *dry_run).await,
        Commands::Rules {
            source,
            exact,
            grex,
            group_size,
            output,
            keep,
        } => {
            let request = RulesRequest {
                case: CasePolicy::from_exact_flag(*exact),
                grex: *grex,
                group_size: *group_size,
                output: output.clone(),
                keep: *keep,
            };
            cmd_rules(&cli, &settings, source, request).await
        }
        Commands::Locations { output } => cmd_locations(&cli, &settings, output).await,
        Commands::Config => cmd_config(&cli, &settings),
    }
}

/// Platform client bound to a resolved snapshot
struct Session {
    client: IpFabricClient,
    snapshot: String,
}

impl Session {
    async fn open(settings: &Settings) -> Result<Self> {
        let (api_url, token) = settings.platform.credentials()?;
        let client = IpFabricClient::new(api_url, token)?;
        let snapshot = client.resolve_snapshot(&settings.platform.snapshot).await?;
        Ok(Self { client, snapshot })
    }

    async fn inventory(&self) -> Result<Vec<InventoryDevice>> {
        self.client.fetch_inventory(&self.snapshot).await
    }
}

/// Stands in for the platform during a dry run: new sites get a placeholder id.
struct DryRunDirectory;

impl SiteDirectory for DryRunDirectory {
    async fn create_site(&self, name: &str) -> Result<String> {
        tracing::info!("Would create site '{}'", name);
        Ok(format!("new:{}", name))
    }
}

async fn servicenow_records(settings: &Settings, inventory: &[InventoryDevice]) -> Result<Vec<LocationRecord>> {
    let (url, username, password) = settings.servicenow.credentials()?;
    ServiceNowClient::new(url, username, password)?
        .location_records(inventory)
        .await
}

async fn cmd_manual(cli: &Cli, settings: &Settings, source: &SourceArgs, dry_run: bool) -> Result<()> {
    let session = Session::open(settings).await?;
    let inventory = session.inventory().await?;
    let records = match &source.file {
        Some(path) => input::read_records(path)?,
        None => servicenow_records(settings, &inventory).await?,
    };
    let known_sites = session.client.fetch_sites().await?;

    let options = ManualOptions {
        catch_all: settings.rules.catch_all.clone(),
    };

    let outcome = if dry_run {
        manual_assignments(&records, &inventory, &DryRunDirectory, known_sites, &options).await?
    } else {
        manual_assignments(&records, &inventory, &session.client, known_sites, &options).await?
    };

    if !dry_run {
        session
            .client
            .push_assignments(&session.snapshot, &outcome.assignments)
            .await?;
    }

    let catch_all = outcome.sites.catch_all();
    let unmatched = outcome
        .assignments
        .iter()
        .filter(|a| a.site_id == catch_all.id)
        .count();

    match cli.format {
        OutputFormat::Text => {
            if dry_run {
                println!("Dry run, nothing was changed on the platform.");
                println!();
                for assignment in &outcome.assignments {
                    println!("  {:24} {}", assignment.serial_number, assignment.site_id);
                }
                println!();
            }
            for site in &outcome.created {
                println!("Site '{}' created ({})", site.name, site.id);
            }
            println!(
                "{} devices assigned, {} to '{}'",
                outcome.assignments.len(),
                unmatched,
                catch_all.name
            );
            if !dry_run {
                println!("Site separation switched to {} on snapshot {}", Strategy::Manual, session.snapshot);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "strategy": Strategy::Manual,
                "snapshot": session.snapshot,
                "dry_run": dry_run,
                "created_sites": outcome.created,
                "assignments": outcome.assignments,
                "catch_all_count": unmatched,
            }));
        }
    }

    Ok(())
}

struct RulesRequest {
    case: CasePolicy,
    grex: bool,
    group_size: Option<usize>,
    output: Option<PathBuf>,
    keep: bool,
}

async fn cmd_rules(cli: &Cli, settings: &Settings, source: &SourceArgs, request: RulesRequest) -> Result<()> {
    let mut session = None;
    let mut inventory = None;

    let records = match &source.file {
        Some(path) => input::read_records(path)?,
        None => {
            let opened = Session::open(settings).await?;
            let devices = opened.inventory().await?;
            let records = servicenow_records(settings, &devices).await?;
            session = Some(opened);
            inventory = Some(devices);
            records
        }
    };

    let kind = settings.rules.format.rule_kind();
    let grex = grex::GrexSynthesizer::default();
    let (options, synthesizer): (CompileOptions, Option<&dyn PatternSynthesizer>) = if request.grex {
        grex.check_available()?;
        let size = request.group_size.unwrap_or(settings.rules.synthesized_group_size);
        (
            CompileOptions::synthesized(request.case).with_group_size(size),
            Some(&grex as &dyn PatternSynthesizer),
        )
    } else {
        let size = request.group_size.unwrap_or(settings.rules.literal_group_size);
        (CompileOptions::literal(request.case).with_group_size(size), None)
    };
    let options = options.with_kind(kind);

    let compiled = compile_buckets(&records, &options, synthesizer)?;
    tracing::info!("Compiled {} rules from {} records", compiled.len(), records.len());

    if let Some(dir) = &request.output {
        let rules = prepend_to_existing(compiled, Vec::new(), &settings.rules.catch_all, kind);
        let path = output::write_json(dir, output::RULES_PREFIX, &rules)?;

        match cli.format {
            OutputFormat::Text => println!("Wrote {} rules to {}", rules.len(), path.display()),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({
                    "strategy": Strategy::Rule,
                    "rules": rules,
                    "path": path,
                    "pushed": false,
                }));
            }
        }
        return Ok(());
    }

    let session = match session {
        Some(session) => session,
        None => Session::open(settings).await?,
    };
    let (rules, kept) = assemble_rules(&session, compiled, request.keep, &settings.rules.catch_all, kind).await?;
    let fallback_site = rules.last().map(|r| r.site_name.clone()).unwrap_or_default();

    let inventory = match inventory {
        Some(devices) => devices,
        None => session.inventory().await?,
    };
    let unmatched = catch_all_hits(&rules, &inventory)?;
    if unmatched > 0 {
        tracing::warn!(
            "{} of {} devices only match the catch-all rule",
            unmatched,
            inventory.len()
        );
    }

    session
        .client
        .push_rules(&session.snapshot, &rules, settings.rules.format)
        .await?;

    match cli.format {
        OutputFormat::Text => {
            println!("Pushed {} rules to snapshot {}", rules.len(), session.snapshot);
            if kept > 0 {
                println!("{} existing rules kept after the new ones", kept);
            }
            println!(
                "{} of {} devices fall through to '{}'",
                unmatched,
                inventory.len(),
                fallback_site
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "strategy": Strategy::Rule,
                "snapshot": session.snapshot,
                "rules": rules,
                "kept_rules": kept,
                "catch_all_count": unmatched,
                "pushed": true,
            }));
        }
    }

    Ok(())
}

/// Rule list to push: the compiled rules, then the snapshot's current rules
/// when they are kept. Returns the list and how many rules were kept.
async fn assemble_rules(
    session: &Session,
    compiled: Vec<Rule>,
    keep: bool,
    catch_all: &str,
    kind: RuleKind,
) -> Result<(Vec<Rule>, usize)> {
    let existing = if keep {
        session.client.fetch_rules(&session.snapshot).await?
    } else {
        Vec::new()
    };
    let kept = existing.len();
    Ok((prepend_to_existing(compiled, existing, catch_all, kind), kept))
}

/// Number of inventory devices that only the closing catch-all rule claims.
fn catch_all_hits(rules: &[Rule], inventory: &[InventoryDevice]) -> Result<usize> {
    let fallback = rules
        .last()
        .filter(|r| r.is_catch_all())
        .map(|r| r.site_name.as_str());
    let matcher = RuleMatcher::new(rules)?;
    Ok(inventory
        .iter()
        .filter(|d| {
            let site = matcher.classify(&d.hostname);
            site.is_none() || site == fallback
        })
        .count())
}

async fn cmd_locations(cli: &Cli, settings: &Settings, dir: &Path) -> Result<()> {
    let session = Session::open(settings).await?;
    let inventory = session.inventory().await?;
    let records = servicenow_records(settings, &inventory).await?;
    let path = output::write_json(dir, output::LOCATIONS_PREFIX, &records)?;

    match cli.format {
        OutputFormat::Text => {
            println!(
                "Wrote locations for {} of {} devices to {}",
                records.len(),
                inventory.len(),
                path.display()
            );
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "snapshot": session.snapshot,
                "devices": inventory.len(),
                "located": records.len(),
                "path": path,
            }));
        }
    }

    Ok(())
}

fn cmd_config(cli: &Cli, settings: &Settings) -> Result<()> {
    let config_path = config::get_config_file_path_string();
    let platform = &settings.platform;
    let servicenow = &settings.servicenow;

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Config file:      {}", config_path);
            println!(
                "IP Fabric:        {} (from {})",
                platform.api_url.as_deref().unwrap_or("-"),
                platform.source
            );
            println!("Snapshot:         {}", platform.snapshot);
            println!("API token:        {}", if platform.token.is_some() { "set" } else { "not set" });
            println!(
                "ServiceNow:       {} (from {})",
                servicenow.url.as_deref().unwrap_or("-"),
                servicenow.source
            );
            println!("Catch-all site:   {}", settings.rules.catch_all);
            println!(
                "Group sizes:      {} literal, {} grex",
                settings.rules.literal_group_size, settings.rules.synthesized_group_size
            );
            println!("Payload format:   {:?}", settings.rules.format);
            println!();
            println!("Environment variables:");
            println!("  SITESEP_IPF_URL, SITESEP_IPF_TOKEN, SITESEP_IPF_SNAPSHOT");
            println!("  SITESEP_SNOW_URL, SITESEP_SNOW_USER, SITESEP_SNOW_PASSWORD");
            println!();
            println!("Example config.toml:");
            println!();
            println!("{}", config::generate_example_config());
        }
        OutputFormat::Json => {
            println!("{}", serde_json::json!({
                "config_file": config_path,
                "ipfabric_url": platform.api_url,
                "ipfabric_source": format!("{}", platform.source),
                "snapshot": platform.snapshot,
                "token_set": platform.token.is_some(),
                "servicenow_url": servicenow.url,
                "servicenow_source": format!("{}", servicenow.source),
                "catch_all": settings.rules.catch_all,
                "literal_group_size": settings.rules.literal_group_size,
                "synthesized_group_size": settings.rules.synthesized_group_size,
                "format": settings.rules.format,
            }));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use crate::ipfabric::PayloadFormat;
    use sitesep_core::Transformation;

    fn rule(pattern: &str, site: &str) -> Rule {
        Rule {
            note: String::new(),
            pattern: pattern.to_string(),
            site_name: site.to_string(),
            transformation: Transformation::Uppercase,
            kind: RuleKind::Regex,
            extra: Default::default(),
        }
    }

    fn session(server: &MockServer) -> Session {
        Session {
            client: IpFabricClient::new(&server.url("/api/v6.0"), "test-token").unwrap(),
            snapshot: "snap-1".to_string(),
        }
    }

    #[test]
    fn test_cli_parses_sources() {
        let cli = Cli::try_parse_from(["sitesep", "rules", "--file", "hosts.csv", "--exact"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Rules { ref source, exact: true, .. } if source.file.is_some()
        ));

        assert!(Cli::try_parse_from(["sitesep", "manual"]).is_err());
        assert!(Cli::try_parse_from(["sitesep", "manual", "--file", "a.csv", "--servicenow"]).is_err());
        assert!(Cli::try_parse_from(["sitesep", "manual", "--file", "a.csv", "--exact"]).is_err());
        assert!(
            Cli::try_parse_from(["sitesep", "rules", "--servicenow", "--keep", "--output", "."]).is_err()
        );
    }

    #[tokio::test]
    async fn test_dry_run_directory_creates_nothing() {
        let id = DryRunDirectory.create_site("NYC").await.unwrap();
        assert_eq!(id, "new:NYC");
    }

    #[tokio::test]
    async fn test_keep_pushes_existing_rules_untouched() {
        let server = MockServer::start_async().await;
        let existing = serde_json::json!([
            { "id": "r-1", "note": "", "regex": "^L33", "siteName": "L33",
              "transformation": "none", "type": "regex" },
            { "id": "r-2", "note": "Catch ALL", "regex": ".*", "siteName": "UNSORTED",
              "transformation": "uppercase", "type": "regex" },
        ]);
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/v6.0/snapshots/snap-1/settings");
                then.status(200)
                    .json_body(serde_json::json!({ "siteSeparation": existing.clone() }));
            })
            .await;
        let snapshot = server
            .mock_async(|when, then| {
                when.method(PATCH)
                    .path("/api/v6.0/snapshots/snap-1/settings")
                    .json_body(serde_json::json!({
                        "siteTypeCalc": "rules",
                        "siteSeparation": [
                            { "note": "", "regex": "WEB01", "siteName": "NYC",
                              "transformation": "uppercase", "type": "regex" },
                            existing[0].clone(),
                            existing[1].clone(),
                        ],
                    }));
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PUT).path("/api/v6.0/settings/site-separation");
                then.status(200);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(PATCH).path("/api/v6.0/settings");
                then.status(200);
            })
            .await;

        let session = session(&server);
        let (rules, kept) = assemble_rules(&session, vec![rule("WEB01", "NYC")], true, "_catch_all_", RuleKind::Regex)
            .await
            .unwrap();
        session
            .client
            .push_rules(&session.snapshot, &rules, PayloadFormat::Flat)
            .await
            .unwrap();

        snapshot.assert_async().await;
        assert_eq!(kept, 2);
        assert_eq!(rules.last().unwrap().site_name, "UNSORTED");
    }

    #[tokio::test]
    async fn test_fresh_rules_close_with_configured_catch_all() {
        let server = MockServer::start_async().await;

        let (rules, kept) = assemble_rules(
            &session(&server),
            vec![rule("WEB01", "NYC")],
            false,
            "unassigned",
            RuleKind::Regex,
        )
        .await
        .unwrap();

        assert_eq!(kept, 0);
        assert_eq!(rules[1], Rule::catch_all_to("unassigned", RuleKind::Regex));
    }

    #[test]
    fn test_catch_all_hits() {
        let rules = vec![rule("WEB0[12]", "NYC"), Rule::catch_all_to("UNSORTED", RuleKind::Regex)];
        let inventory = vec![
            InventoryDevice::new("web01", "S1"),
            InventoryDevice::new("web03", "S2"),
            InventoryDevice::new("fw01", "S3"),
        ];

        assert_eq!(catch_all_hits(&rules, &inventory).unwrap(), 2);
    }
}
