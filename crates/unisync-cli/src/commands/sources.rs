use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{Value, json};

use crate::cli::{OutputFormat, OwnerArgs, RegisterArgs, UnregisterArgs};
use crate::client::AdminClient;
use crate::output::{print_success, print_value};

fn read_config(file: &Option<String>) -> Result<Value> {
    let content = match file {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))?
        }
        None => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read from stdin")?;
            buf
        }
    };
    serde_json::from_str(&content).context("Invalid JSON")
}

fn owner_json(owner: &OwnerArgs) -> Value {
    json!({
        "kind": owner.owner_kind,
        "namespace": owner.namespace,
        "name": owner.owner,
    })
}

/// Admin API request body for `POST /api/sources`.
pub fn register_body(args: &RegisterArgs, config: Value) -> Value {
    let mut body = json!({
        "resourceType": args.resource_type,
        "owner": owner_json(&args.owner),
        "priority": args.priority,
        "config": config,
        "accountScope": args.account,
        "credentialsRef": args.credentials,
    });
    if let Some(zone) = &args.zone {
        body["zoneScope"] = json!(zone);
    }
    if let Some(id) = &args.external_id {
        body["externalId"] = json!(id);
    }
    if let Some(key) = &args.natural_key {
        body["naturalKey"] = json!(key);
    }
    body
}

pub async fn register(
    client: &AdminClient,
    args: &RegisterArgs,
    format: OutputFormat,
) -> Result<()> {
    let config = read_config(&args.file)?;
    let state = client.register(&register_body(args, config)).await?;
    let name = state.get("name").and_then(Value::as_str).unwrap_or("?");
    print_success(&format!(
        "Registered {} on {}/{}",
        args.owner.owner.cyan(),
        args.resource_type.cyan(),
        name.cyan()
    ));
    print_value(&state, format);
    Ok(())
}

pub async fn unregister(client: &AdminClient, args: &UnregisterArgs) -> Result<()> {
    let body = json!({
        "resourceType": args.resource_type,
        "name": args.name,
        "owner": owner_json(&args.owner),
    });
    let resp = client.unregister(&body).await?;
    let target = format!("{}/{}", args.resource_type, args.name);
    match resp.get("outcome").and_then(Value::as_str) {
        Some("not_registered") => println!(
            "{} {} was not registered on {}",
            "-".yellow(),
            args.owner.owner,
            target
        ),
        Some("source_removed") => {
            let remaining = resp.get("remaining").and_then(Value::as_u64).unwrap_or(0);
            print_success(&format!(
                "Removed source from {target} ({remaining} remaining)"
            ));
        }
        Some("deletion_pending") => print_success(&format!(
            "Last source removed; {target} will be deleted externally"
        )),
        _ => print_success(&format!("Removed {target}")),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_register_body_carries_optional_fields() {
        let cli = Cli::try_parse_from([
            "unisyncctl",
            "register",
            "DnsRecord",
            "--owner",
            "web",
            "--namespace",
            "prod",
            "--owner-kind",
            "DnsEntry",
            "--account",
            "acct-1",
            "--zone",
            "zone-9",
            "--natural-key",
            "www",
        ])
        .unwrap();
        let Commands::Register(args) = cli.command else {
            panic!("expected register");
        };

        let body = register_body(&args, json!({ "type": "A" }));
        assert_eq!(body["resourceType"], "DnsRecord");
        assert_eq!(
            body["owner"],
            json!({ "kind": "DnsEntry", "namespace": "prod", "name": "web" })
        );
        assert_eq!(body["priority"], 0);
        assert_eq!(body["zoneScope"], "zone-9");
        assert_eq!(body["naturalKey"], "www");
        assert!(body.get("externalId").is_none());
        assert_eq!(body["config"], json!({ "type": "A" }));
    }
}
