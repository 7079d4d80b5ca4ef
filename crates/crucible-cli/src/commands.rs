use std::io::Write;
use std::sync::Arc;

use anyhow::Context;

use crucible_server::{CrucibleServer, ServerConfig};
use crucible_service::{Service, ServiceConfig};

use crate::cli::{AliasAction, Cli, Command, OutputFormat};

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let service = Service::new(ServiceConfig {
        db_path: cli.db.clone(),
        scratch_root: cli.scratch.clone(),
        ..ServiceConfig::default()
    })?;

    match cli.command {
        Command::Serve(args) => {
            let config = ServerConfig {
                bind_addr: args.bind.parse().context("invalid bind address")?,
                ..ServerConfig::default()
            };
            CrucibleServer::new(Arc::new(service), config).serve().await?;
            Ok(())
        }

        Command::Compile(args) => {
            let source = std::fs::read(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let outcome = service.compile(&args.language, &source).await?;
            if let Some(out) = &args.out {
                std::fs::write(out, &outcome.bytes)
                    .with_context(|| format!("writing {}", out.display()))?;
            }
            match cli.format {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({
                            "input_hash": outcome.input_hash.to_hex(),
                            "output_hash": outcome.output_hash.to_hex(),
                            "duration_ms": outcome.duration_ms,
                            "validation": outcome.validation,
                        })
                    );
                }
                OutputFormat::Text => {
                    println!("input   {}", outcome.input_hash);
                    println!("output  {}", outcome.output_hash);
                    println!("valid   {}", outcome.validation.valid);
                    for error in &outcome.validation.errors {
                        println!("error   {error}");
                    }
                    for warning in &outcome.validation.warnings {
                        println!("warning {warning}");
                    }
                }
            }
            Ok(())
        }

        Command::Run(args) => {
            let input = match &args.input {
                Some(path) => std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => Vec::new(),
            };
            let outcome = service.run(&args.reference, &input).await?;
            match &args.out {
                Some(path) => std::fs::write(path, &outcome.output)
                    .with_context(|| format!("writing {}", path.display()))?,
                None => std::io::stdout().write_all(&outcome.output)?,
            }
            eprintln!("module  {}", outcome.module_hash);
            eprintln!("output  {} ({} bytes)", outcome.output_hash, outcome.output.len());
            Ok(())
        }

        Command::Validate(args) => {
            let bytes = std::fs::read(&args.file)
                .with_context(|| format!("reading {}", args.file.display()))?;
            let report = service.validate(&bytes);
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!("valid {}", report.valid);
                    for error in &report.errors {
                        println!("error   {error}");
                    }
                    for warning in &report.warnings {
                        println!("warning {warning}");
                    }
                }
            }
            Ok(())
        }

        Command::Alias(args) => {
            match args.action {
                AliasAction::Set { name, hash } => {
                    let record = service.set_alias(&name, &hash)?;
                    println!("{} -> {}", record.name, record.hash);
                }
                AliasAction::Get { name } => match service.alias(&name)? {
                    Some(record) => println!("{} -> {}", record.name, record.hash),
                    None => anyhow::bail!("alias not found: {name}"),
                },
                AliasAction::Delete { name } => {
                    if !service.delete_alias(&name)? {
                        anyhow::bail!("alias not found: {name}");
                    }
                    println!("deleted {name}");
                }
                AliasAction::List => {
                    for record in service.list_aliases()? {
                        println!("{} -> {}", record.name, record.hash);
                    }
                }
            }
            Ok(())
        }

        Command::Events(args) => {
            let events = service.events(Some(args.limit))?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&events)?),
                OutputFormat::Text => {
                    for event in events {
                        let status = if event.success { "ok" } else { "failed" };
                        println!(
                            "#{} {} {} {}",
                            event.id,
                            crucible_types::timestamp::format_millis(&event.timestamp),
                            event.kind,
                            status
                        );
                    }
                }
            }
            Ok(())
        }

        Command::Languages => {
            for language in service.languages() {
                println!("{} ({} -> {})", language.name, language.input_file, language.output_file);
            }
            Ok(())
        }

        Command::Stats => {
            let stats = service.stats()?;
            match cli.format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
                OutputFormat::Text => {
                    println!("blobs   {} ({} bytes)", stats.blobs, stats.blob_bytes);
                    println!("aliases {}", stats.aliases);
                    println!("events  {}", stats.events);
                    for (kind, count) in &stats.events_by_kind {
                        println!("  {kind}: {count}");
                    }
                }
            }
            Ok(())
        }
    }
}
