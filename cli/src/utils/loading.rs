use anyhow::{anyhow, bail, Context, Result};
use authz::{build_authority, Authority, PolicyLoader, PolicySet};
use clap::Args;
use entities::{EntityModel, GenericRecord, SchemaLoader};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Inputs shared by every command: where the model and policy live and
/// which roles to compile.
#[derive(Args, Debug)]
pub struct PolicyArgs {
    /// Directory of *.schema.yaml entity definitions
    #[arg(short, long, env = "POLC_SCHEMAS")]
    pub schemas: PathBuf,

    /// Policy document (YAML)
    #[arg(short, long, env = "POLC_POLICY")]
    pub policy: PathBuf,

    /// Comma separated role names
    #[arg(long, value_delimiter = ',', required = true)]
    pub roles: Vec<String>,
}

/// A loaded model and policy with the authority for the requested roles
pub struct LoadedPolicy {
    pub model: EntityModel,
    pub policy: PolicySet,
    pub authority: Authority,
}

impl LoadedPolicy {
    pub fn load(args: &PolicyArgs) -> Result<Self> {
        let model = SchemaLoader::load_model_from_directory(&args.schemas)
            .with_context(|| format!("Failed to load schemas from {:?}", args.schemas))?;
        let policy = PolicyLoader::new()
            .load_file(&args.policy)
            .with_context(|| format!("Failed to load policy from {:?}", args.policy))?;
        policy.init(&model).context("Invalid policy")?;

        let roles = policy.roles_named(&args.roles)?;
        let authority = build_authority(&roles, &model)?;
        debug!("Compiled authority for roles {:?}", args.roles);

        Ok(Self {
            model,
            policy,
            authority,
        })
    }
}

/// Read a record of `entity_type` from a JSON object file
pub fn read_record(path: &Path, entity_type: &str) -> Result<GenericRecord> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read record file {:?}", path))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse record file {:?}", path))?;
    let serde_json::Value::Object(values) = value else {
        bail!("Record file {:?} must contain a JSON object", path);
    };

    let mut record = GenericRecord::new(entity_type);
    for (field, value) in values {
        record.set(field, value);
    }
    Ok(record)
}

pub fn parse_access(text: &str) -> Result<authz::AccessType> {
    authz::AccessType::parse(text).ok_or_else(|| anyhow!("Unknown access type '{}'", text))
}
