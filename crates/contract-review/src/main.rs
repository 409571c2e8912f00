//! `crev` - CLI for contract-review
//!
//! Starts the HTTP API and offers offline maintenance of audit rules and
//! configuration.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::Utc;
use clap::Parser;

use contract_review::cli::{
    Cli, Command, ConfigCommand, LocateCommand, RulesCommand, ServeCommand,
};
use contract_review::locate::{MatchKind, HIGHLIGHT_CLOSE, HIGHLIGHT_OPEN};
use contract_review::model::RuleQuery;
use contract_review::transfer::rules;
use contract_review::{init_logging, Config, Storage, TextLocator};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Validation must work on a config that would fail to load.
    if let Command::Config(ConfigCommand::Validate { file }) = &cli.command {
        init_logging(cli.verbosity().unwrap_or_default());
        return handle_validate(file.clone().or_else(|| cli.config.clone()));
    }

    let config = Config::load_from(cli.config.clone()).context("failed to load configuration")?;
    init_logging(cli.verbosity().unwrap_or_else(|| config.verbosity()));

    match cli.command {
        Command::Serve(cmd) => handle_serve(config, &cmd),
        Command::Status(cmd) => handle_status(&config, cmd.json),
        Command::Rules(cmd) => handle_rules(&config, cmd),
        Command::Locate(cmd) => handle_locate(&cmd),
        Command::Config(cmd) => handle_config(&config, &cmd),
    }
}

fn handle_serve(mut config: Config, cmd: &ServeCommand) -> anyhow::Result<()> {
    if let Some(host) = &cmd.host {
        config.server.host.clone_from(host);
    }
    if let Some(port) = cmd.port {
        config.server.port = port;
    }
    config.validate()?;

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(contract_review::serve(config))?;
    Ok(())
}

fn handle_status(config: &Config, json: bool) -> anyhow::Result<()> {
    let storage = Storage::open(config.database_path())?;
    let stats = storage.stats()?;

    if json {
        let status = serde_json::json!({
            "database_path": config.database_path(),
            "upload_dir": config.upload_dir(),
            "converter": config.converter.backend_url,
            "stats": stats,
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        println!("crev status");
        println!("-----------");
        println!("Database:      {}", config.database_path().display());
        println!("Upload dir:    {}", config.upload_dir().display());
        println!(
            "Converter:     {}",
            config
                .converter
                .backend_url
                .as_deref()
                .unwrap_or("text only")
        );
        println!();
        println!("Contracts:     {}", stats.total_contracts);
        println!("Audit rules:   {}", stats.total_rules);
        println!("Risk points:   {}", stats.total_risk_points);
        if let Some(newest) = stats.newest_upload {
            println!("Last upload:   {}", newest.format("%Y-%m-%d %H:%M:%S UTC"));
        }
        println!("DB size:       {} bytes", stats.db_size_bytes);
    }
    Ok(())
}

fn handle_rules(config: &Config, cmd: RulesCommand) -> anyhow::Result<()> {
    let output = cmd.output_path(Utc::now().date_naive());
    match cmd {
        RulesCommand::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let drafts = rules::import_rules(&content)?;
            if drafts.is_empty() {
                bail!("{} contains no valid rules", file.display());
            }

            let storage = Storage::open(config.database_path())?;
            let imported = storage.insert_rules(drafts)?;
            println!("Imported {} rules from {}", imported.len(), file.display());
        }
        RulesCommand::Export { .. } => {
            let storage = Storage::open(config.database_path())?;
            let csv = rules::export_rules(&storage.list_rules(&RuleQuery::default())?)?;
            write_output(output.as_deref(), &csv)?;
        }
        RulesCommand::Template { .. } => {
            write_output(output.as_deref(), &rules::rule_template()?)?;
        }
    }
    Ok(())
}

/// `-` writes to stdout.
fn write_output(path: Option<&Path>, content: &str) -> anyhow::Result<()> {
    let Some(path) = path else {
        bail!("command has no output");
    };
    if path == Path::new("-") {
        print!("{content}");
    } else {
        std::fs::write(path, content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn handle_locate(cmd: &LocateCommand) -> anyhow::Result<()> {
    let document = std::fs::read_to_string(&cmd.file)
        .with_context(|| format!("failed to read {}", cmd.file.display()))?;
    let locator = TextLocator::new(&document);

    let Some(found) = locator.locate(&cmd.query) else {
        bail!("no match for \"{}\" in {}", cmd.query, cmd.file.display());
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else if cmd.highlight {
        println!(
            "{}",
            locator.highlight_match(&found, HIGHLIGHT_OPEN, HIGHLIGHT_CLOSE)
        );
    } else {
        let how = match &found.kind {
            MatchKind::Exact => "exact match".to_string(),
            MatchKind::Token { token } => format!("token match on \"{token}\""),
        };
        println!("{how} at bytes {}..{}", found.start, found.end);
        println!("{}", found.text);
    }
    Ok(())
}

fn handle_config(config: &Config, cmd: &ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if *json {
                println!("{}", serde_json::to_string_pretty(config)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Server]");
                println!("  Bind address:       {}", config.bind_address());
                println!("  Environment:        {}", config.server.env);
                println!();
                println!("[Storage]");
                println!("  Database path:      {}", config.database_path().display());
                println!();
                println!("[Upload]");
                println!("  Directory:          {}", config.upload_dir().display());
                println!("  Max file size:      {} bytes", config.upload.max_file_size);
                println!(
                    "  Allowed extensions: {}",
                    config.upload.allowed_extensions.join(", ")
                );
                println!();
                println!("[Converter]");
                println!(
                    "  Backend URL:        {}",
                    config.converter.backend_url.as_deref().unwrap_or("(none)")
                );
                println!("  Timeout (secs):     {}", config.converter.timeout_secs);
                println!();
                println!("[Logging]");
                println!("  Level:              {}", config.logging.level);
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => handle_validate(file.clone())?,
    }
    Ok(())
}

fn handle_validate(file: Option<PathBuf>) -> anyhow::Result<()> {
    let path = file.unwrap_or_else(Config::default_config_path);
    println!("Validating configuration: {}", path.display());
    match Config::load_from(Some(path)) {
        Ok(_) => {
            println!("Configuration is valid.");
            Ok(())
        }
        Err(e) => bail!("configuration error: {e}"),
    }
}
