use crate::utils::loading::{parse_access, read_record, LoadedPolicy, PolicyArgs};
use anyhow::{anyhow, Result};
use authz::{ActivationScope, OperationContext, QueryAccess, TypeAccess};
use colored::*;
use entities::Record;
use serde_json::json;
use std::path::PathBuf;

pub struct CheckRequest {
    pub policy: PolicyArgs,
    pub entity: String,
    pub access: String,
    pub record: Option<PathBuf>,
    pub field: Option<String>,
    pub user: Option<String>,
    pub activate: Vec<String>,
    pub format: String,
}

/// Execute the check command; returns whether the access is allowed
pub fn execute(request: CheckRequest) -> Result<bool> {
    let loaded = LoadedPolicy::load(&request.policy)?;
    loaded.model.require(&request.entity)?;
    let access = parse_access(&request.access)?;
    let authority = &loaded.authority;

    let ctx = match &request.user {
        Some(user) => OperationContext::for_user("polc", user.as_str()),
        None => OperationContext::new("polc"),
    };

    let record = request
        .record
        .as_deref()
        .map(|path| read_record(path, &request.entity))
        .transpose()?;

    // Scopes stay open until the checks below are done
    let mut scopes: Vec<ActivationScope<'_>> = Vec::new();
    if let Some(record) = &record {
        for name in &request.activate {
            let grant = loaded
                .policy
                .dynamic_grant(name)
                .ok_or_else(|| anyhow!("Unknown dynamic grant '{}'", name))?;
            scopes.push(grant.execute(&ctx, Some(record as &dyn Record), None)?);
        }
    }

    let type_access = authority.check_type(&request.entity, access);
    let record_allowed = record
        .as_ref()
        .map(|r| authority.check_record(r, access, &ctx));
    let field_allowed = match (&record, &request.field) {
        (Some(r), Some(field)) => Some(authority.check_field(r, field, access, &ctx)),
        _ => None,
    };
    let query = authority.read_query_filter(&request.entity, &ctx);

    let allowed = field_allowed.or(record_allowed).unwrap_or(matches!(
        type_access,
        TypeAccess::Allowed | TypeAccess::AllowedWithFilter
    ));

    match request.format.as_str() {
        "json" => {
            let output = json!({
                "roles": authority.roles(),
                "entity": request.entity,
                "access": access.to_string(),
                "type_access": type_access,
                "record": record_allowed,
                "field": request.field.as_ref().map(|f| json!({ "name": f, "allowed": field_allowed })),
                "read_query": query,
                "allowed": allowed,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        _ => {
            print_check_text(&request, access, type_access, record_allowed, field_allowed, &query, allowed);
        }
    }

    drop(scopes);
    Ok(allowed)
}

fn print_check_text(
    request: &CheckRequest,
    access: authz::AccessType,
    type_access: TypeAccess,
    record_allowed: Option<bool>,
    field_allowed: Option<bool>,
    query: &QueryAccess,
    allowed: bool,
) {
    println!("\n{}", "=== Access Check ===".bold().cyan());
    println!(
        "{}: {}",
        "Roles".bold(),
        request.policy.roles.join(", ").bright_white()
    );
    println!("{}: {}", "Entity".bold(), request.entity.bright_white());
    println!("{}: {}", "Access".bold(), access.to_string().bright_white());
    if !request.activate.is_empty() {
        println!(
            "{}: {}",
            "Activated".bold(),
            request.activate.join(", ").bright_white()
        );
    }
    println!();

    let type_text = match type_access {
        TypeAccess::Allowed => "allowed".green(),
        TypeAccess::AllowedWithFilter => "allowed with filter".yellow(),
        TypeAccess::Denied => "denied".red(),
        TypeAccess::Unknown => "depends on dynamic grants".yellow(),
    };
    println!("  {} {}", "Type:".bold(), type_text);
    if let Some(allowed) = record_allowed {
        println!("  {} {}", "Record:".bold(), verdict(allowed));
    }
    if let (Some(field), Some(allowed)) = (&request.field, field_allowed) {
        println!("  {} {} {}", "Field:".bold(), field, verdict(allowed));
    }
    let query_text = match query {
        QueryAccess::Unrestricted => "unrestricted".green(),
        QueryAccess::Filtered(predicate) => predicate.to_string().yellow(),
        QueryAccess::Denied => "denied".red(),
    };
    println!("  {} {}", "Read query:".bold(), query_text);

    println!(
        "\n{}: {}",
        "Result".bold(),
        if allowed {
            "ALLOW".green().bold()
        } else {
            "DENY".red().bold()
        }
    );
}

fn verdict(allowed: bool) -> ColoredString {
    if allowed {
        "allowed".green()
    } else {
        "denied".red()
    }
}
