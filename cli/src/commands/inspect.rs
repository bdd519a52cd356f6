use crate::utils::loading::{LoadedPolicy, PolicyArgs};
use anyhow::Result;
use authz::{Authority, CumulativeRecordPermission, QueryAccess, UserEntityPermissionSet};
use colored::*;
use serde_json::{json, Value as JsonValue};

/// Execute the inspect command
pub fn execute(args: PolicyArgs, format: String) -> Result<()> {
    let loaded = LoadedPolicy::load(&args)?;
    let authority = &loaded.authority;

    match format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&authority_json(authority))?);
        }
        _ => {
            print_authority_text(authority);
        }
    }

    Ok(())
}

fn authority_json(authority: &Authority) -> JsonValue {
    let entities: serde_json::Map<String, JsonValue> = authority
        .entity_types()
        .filter_map(|t| authority.entity_permissions(t))
        .map(|set| (set.entity_type().to_string(), entity_json(set)))
        .collect();
    let objects: serde_json::Map<String, JsonValue> = authority
        .object_permissions()
        .map(|(key, access)| (key.to_string(), json!(access.to_string())))
        .collect();

    json!({
        "roles": authority.roles(),
        "entities": entities,
        "objects": objects,
        "custom": authority.custom_permissions().iter().map(|c| json!({
            "name": c.name(),
            "data": c.data(),
        })).collect::<Vec<_>>(),
        "dynamic_grants": authority.dynamic_grants().iter().map(|d| json!({
            "key": d.key().to_string(),
            "activity": d.activity().name(),
            "document_key": d.document_key(),
        })).collect::<Vec<_>>(),
    })
}

fn entity_json(set: &UserEntityPermissionSet) -> JsonValue {
    json!({
        "has_filter": set.has_filter(),
        "has_dynamic_permissions": set.has_dynamic_permissions(),
        "fixed_type_access": set.fixed_type_permissions().map(|f| f.access().to_string()),
        "fixed_record_permissions": set.fixed_record_permissions(),
        "read_query_filter": set.read_query_filter(),
        "rules": set.conditional_permissions().iter().map(rule_json).collect::<Vec<_>>(),
    })
}

fn rule_json(rule: &CumulativeRecordPermission) -> JsonValue {
    json!({
        "access": rule.permission().access().to_string(),
        "permission": rule.permission(),
        "filter": rule.filter().map(|f| f.filter_name()),
        "dynamic_grants": rule.dynamic_grants().iter().map(|d| d.activity().name()).collect::<Vec<_>>(),
        "source_grants": rule.source_grants().map(|g| g.to_string()).collect::<Vec<_>>(),
    })
}

fn print_authority_text(authority: &Authority) {
    println!("\n{}", "=== Compiled Authority ===".bold().cyan());
    println!(
        "{}: {}\n",
        "Roles".bold(),
        authority.roles().join(", ").bright_white()
    );

    println!("{}", "Entity types".bold().underline());
    let mut any = false;
    for set in authority
        .entity_types()
        .filter_map(|t| authority.entity_permissions(t))
    {
        any = true;
        let type_access = match set.fixed_type_permissions() {
            Some(fixed) if fixed.has_filter() => format!("{} (filtered)", fixed.access()).yellow(),
            Some(fixed) => fixed.access().to_string().green(),
            None => "dynamic".yellow(),
        };
        println!("  {} {}", format!("{}:", set.entity_type()).bold(), type_access);
        for rule in set.conditional_permissions() {
            let mut conditions = Vec::new();
            if let Some(filter) = rule.filter() {
                conditions.push(format!("filter {}", filter.filter_name()));
            }
            for grant in rule.dynamic_grants() {
                conditions.push(format!("while {} active", grant.activity().name()));
            }
            let conditions = if conditions.is_empty() {
                "always".to_string()
            } else {
                conditions.join(", ")
            };
            println!(
                "    - {} [{}]",
                rule.permission().access().to_string().bright_white(),
                conditions.dimmed()
            );
        }
        let query = match set.read_query_filter() {
            QueryAccess::Unrestricted => "unrestricted".green(),
            QueryAccess::Filtered(predicate) => predicate.to_string().yellow(),
            QueryAccess::Denied => "denied".red(),
        };
        println!("    {} {}", "read query:".dimmed(), query);
    }
    if !any {
        println!("  {}", "(none)".dimmed());
    }

    let objects: Vec<_> = authority.object_permissions().collect();
    if !objects.is_empty() {
        println!("\n{}", "Objects".bold().underline());
        for (key, access) in objects {
            println!("  {}: {}", key.bold(), access.to_string().green());
        }
    }

    if !authority.custom_permissions().is_empty() {
        println!("\n{}", "Custom permissions".bold().underline());
        for custom in authority.custom_permissions() {
            println!("  - {}", custom.name().bright_white());
        }
    }

    if !authority.dynamic_grants().is_empty() {
        println!("\n{}", "Dynamic grants".bold().underline());
        for grant in authority.dynamic_grants() {
            println!(
                "  - {} ({})",
                grant.activity().name().bright_white(),
                grant.key()
            );
        }
    }
}
