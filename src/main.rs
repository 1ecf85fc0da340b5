//! jtrack CLI - Keep exactly one Jira ticket per external identifier.

use clap::Parser;
use jtrack::cli::{Cli, Commands, ConfigCommands, MappingCommands, UpsertArgs};
use jtrack::commands::{self, mappings, settings};
use jtrack::config::{ConfigOverrides, ResolvedConfig, process_env, resolve_config};
use jtrack::{
    IdentifierStore, JiraClient, Result, UpsertEngine, UpsertRequest, logging,
    validate_attachment,
};
use std::env;
use std::process;

const BANNER: &str = r#"
  ,--.,--------.                     ,--.
  `--''--.  .--',--.--. ,--,--. ,---.|  |,-.
  ,--.   |  |   |  .--'' ,-.  || .--'|     /
  |  |   |  |   |  |   \ '-'  |\ `--.|  \  \
.-'  /   `--'   `--'    `--`--' `---'`--'`--'
'---'
"#;

fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    logging::init_logging(cli.verbose, cli.quiet, json);

    if !json && !cli.quiet && !cli.no_banner {
        eprintln!("{}", BANNER);
    }

    if let Err(e) = run(cli) {
        tracing::debug!(error = ?e, "command failed");
        if json {
            eprintln!("{}", serde_json::json!({ "error": e.to_string() }));
        } else {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let json = cli.json;
    let base = ConfigOverrides {
        database: cli.db,
        config_file: cli.config,
        ..Default::default()
    };

    match cli.command {
        Commands::Upsert(args) => {
            let overrides = ConfigOverrides {
                database: base.database,
                config_file: base.config_file,
                ..args.overrides()
            };
            upsert(&args, &resolve(&overrides)?, json)
        }
        Commands::Mappings { command } => {
            let config = resolve(&base)?;
            let store = IdentifierStore::open(&config.database.value)?;
            match command {
                MappingCommands::List => commands::output(&mappings::mapping_list(&store)?, json),
                MappingCommands::Show { identifier } => {
                    commands::output(&mappings::mapping_show(&store, &identifier)?, json)
                }
                MappingCommands::Set {
                    identifier,
                    ticket_key,
                } => commands::output(
                    &mappings::mapping_set(&store, &identifier, &ticket_key)?,
                    json,
                ),
            }
            Ok(())
        }
        Commands::Config { command } => match command {
            ConfigCommands::Show => {
                commands::output(&settings::config_show(&resolve(&base)?), json);
                Ok(())
            }
        },
    }
}

fn resolve(overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let working_dir = env::current_dir()?;
    resolve_config(overrides, &working_dir, &process_env)
}

fn upsert(args: &UpsertArgs, config: &ResolvedConfig, json: bool) -> Result<()> {
    // Fail before touching the store or building a client.
    if let Some(path) = &args.attachment {
        validate_attachment(path)?;
    }

    let mut request = UpsertRequest::new(&args.identifier, &args.project, &args.summary)
        .with_issue_type(config.issue_type.value.clone())
        .with_labels(config.labels.value.iter().cloned())
        .with_closed_statuses(config.closed_statuses.value.iter().cloned())
        .with_skip_existing(args.skip_existing);
    if let Some(description) = &args.description {
        request = request.with_description(description.clone());
    }
    if let Some(path) = &args.attachment {
        request = request.with_attachment(path.clone());
    }

    let connection = config.jira_connection()?;
    let store = IdentifierStore::open(&config.database.value)?;
    let client = JiraClient::new(&connection);
    tracing::info!(
        identifier = %request.identifier,
        jira = client.base_url(),
        db = %store.path().display(),
        "running upsert"
    );

    let report = UpsertEngine::new(&store, &client)
        .with_storage_fault_policy(config.storage_fault_policy.value)
        .run(&request)?;
    commands::output(&report, json);
    Ok(())
}
