//! YAML policy documents.
//!
//! A document declares filters, activities and roles by name; names are
//! resolved once the whole document has been read, so declaration order
//! does not matter:
//!
//! ```yaml
//! filters:
//!   - name: own_documents
//!     conditions:
//!       - entity: document
//!         field: owner
//!         equals_context: user_id
//! activities:
//!   - name: edit_docs
//!     permissions:
//!       - kind: entity
//!         name: edit_documents
//!         access: update
//!         entities:
//!           - entity: document
//!             fields: [title, body]
//!     children: [view_docs]
//! roles:
//!   - name: editor
//!     grants:
//!       - activity: edit_docs
//!         filter: own_documents
//! ```
//!
//! Filters that cannot be expressed as equality conditions are defined in
//! code and registered with [`PolicyLoader::with_filter`].

use crate::access::AccessType;
use crate::activity::Activity;
use crate::context::OperationContext;
use crate::dynamic::DynamicGrant;
use crate::error::{AuthzError, Result};
use crate::filter::{AuthorizationFilter, QueryPredicate};
use crate::permission::{CustomPermission, EntityGroupPermission, ObjectAccessPermission, Permission};
use crate::resource::{EntityGroupResource, EntityResource};
use crate::role::Role;
use entities::{EntityModel, Record};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    filters: Vec<FilterSpec>,
    #[serde(default)]
    activities: Vec<ActivitySpec>,
    #[serde(default)]
    roles: Vec<RoleSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterSpec {
    name: String,
    conditions: Vec<ConditionSpec>,
}

/// `field` equals a literal (`equals`) or a context value (`equals_context`).
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConditionSpec {
    entity: String,
    field: String,
    #[serde(default)]
    equals: Option<JsonValue>,
    #[serde(default)]
    equals_context: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ActivitySpec {
    name: String,
    #[serde(default)]
    permissions: Vec<PermissionSpec>,
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum PermissionSpec {
    Entity {
        name: String,
        access: String,
        entities: Vec<EntitySpec>,
    },
    Object {
        name: String,
        access: String,
        types: Vec<String>,
    },
    Custom {
        name: String,
        #[serde(default)]
        data: JsonValue,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntitySpec {
    entity: String,
    #[serde(default)]
    fields: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RoleSpec {
    name: String,
    #[serde(default)]
    children: Vec<String>,
    #[serde(default)]
    grants: Vec<GrantSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GrantSpec {
    activity: String,
    #[serde(default)]
    filter: Option<String>,
    #[serde(default)]
    dynamic: Option<DynamicSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct DynamicSpec {
    name: String,
    #[serde(default)]
    document_key: Option<String>,
    #[serde(default)]
    check_filter: Option<String>,
}

/// A loaded policy graph, addressable by name.
#[derive(Debug, Default)]
pub struct PolicySet {
    filters: BTreeMap<String, Arc<AuthorizationFilter>>,
    activities: BTreeMap<String, Arc<Activity>>,
    roles: BTreeMap<String, Arc<Role>>,
    dynamic_grants: BTreeMap<String, Arc<DynamicGrant>>,
}

impl PolicySet {
    pub fn filter(&self, name: &str) -> Option<&Arc<AuthorizationFilter>> {
        self.filters.get(name)
    }

    pub fn activity(&self, name: &str) -> Option<&Arc<Activity>> {
        self.activities.get(name)
    }

    pub fn role(&self, name: &str) -> Option<&Arc<Role>> {
        self.roles.get(name)
    }

    pub fn dynamic_grant(&self, name: &str) -> Option<&Arc<DynamicGrant>> {
        self.dynamic_grants.get(name)
    }

    pub fn role_names(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }

    pub fn activity_names(&self) -> impl Iterator<Item = &str> {
        self.activities.keys().map(String::as_str)
    }

    pub fn dynamic_grant_names(&self) -> impl Iterator<Item = &str> {
        self.dynamic_grants.keys().map(String::as_str)
    }

    /// Look up several roles; any unknown name is an error.
    pub fn roles_named<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Arc<Role>>> {
        names
            .iter()
            .map(|name| lookup(&self.roles, "role", name.as_ref()).cloned())
            .collect()
    }

    /// Initialize every activity and role against the model.
    pub fn init(&self, model: &EntityModel) -> Result<()> {
        for activity in self.activities.values() {
            activity.init(model)?;
        }
        for role in self.roles.values() {
            role.init(model)?;
        }
        info!(
            activities = self.activities.len(),
            roles = self.roles.len(),
            "initialized policy set"
        );
        Ok(())
    }
}

/// Reads policy documents into [`PolicySet`]s.
#[derive(Debug, Default)]
pub struct PolicyLoader {
    filters: BTreeMap<String, Arc<AuthorizationFilter>>,
}

impl PolicyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a code-defined filter available to documents under its name
    pub fn with_filter(mut self, filter: Arc<AuthorizationFilter>) -> Self {
        self.filters.insert(filter.name().to_string(), filter);
        self
    }

    pub fn load_file(&self, path: &Path) -> Result<PolicySet> {
        debug!("Loading policy from: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let policy = self.load_str(&content)?;
        info!(
            "Loaded policy from {:?}: {} roles, {} activities",
            path,
            policy.roles.len(),
            policy.activities.len()
        );
        Ok(policy)
    }

    pub fn load_str(&self, content: &str) -> Result<PolicySet> {
        let document: PolicyDocument = serde_yaml::from_str(content)
            .map_err(|e| AuthzError::PolicyParse(format!("Failed to parse YAML: {}", e)))?;

        let mut policy = PolicySet {
            filters: self.filters.clone(),
            ..PolicySet::default()
        };

        for spec in &document.filters {
            let filter = Arc::new(build_filter(spec)?);
            insert_unique(&mut policy.filters, "filter", &spec.name, filter)?;
        }

        for spec in &document.activities {
            let permissions = spec
                .permissions
                .iter()
                .map(build_permission)
                .collect::<Result<Vec<_>>>()?;
            let activity = Activity::with_permissions(spec.name.clone(), permissions);
            insert_unique(&mut policy.activities, "activity", &spec.name, activity)?;
        }
        for spec in &document.activities {
            let activity = lookup(&policy.activities, "activity", &spec.name)?;
            let children = spec
                .children
                .iter()
                .map(|name| lookup(&policy.activities, "activity", name).cloned())
                .collect::<Result<Vec<_>>>()?;
            activity.add_activities(children);
        }

        for spec in &document.roles {
            insert_unique(&mut policy.roles, "role", &spec.name, Role::new(spec.name.clone()))?;
        }
        for spec in &document.roles {
            let role = lookup(&policy.roles, "role", &spec.name)?.clone();
            let children = spec
                .children
                .iter()
                .map(|name| lookup(&policy.roles, "role", name).cloned())
                .collect::<Result<Vec<_>>>()?;
            role.add_child_roles(children);

            for grant in &spec.grants {
                let activity = lookup(&policy.activities, "activity", &grant.activity)?.clone();
                let filter = grant
                    .filter
                    .as_deref()
                    .map(|name| lookup(&policy.filters, "filter", name).cloned())
                    .transpose()?;
                match &grant.dynamic {
                    None => {
                        match filter {
                            Some(filter) => role.grant_filtered(activity, filter),
                            None => role.grant(activity),
                        };
                    }
                    Some(dynamic) => {
                        let check_filter = dynamic
                            .check_filter
                            .as_deref()
                            .map(|name| lookup(&policy.filters, "filter", name).cloned())
                            .transpose()?;
                        let handle = role.grant_dynamic(
                            activity,
                            filter,
                            dynamic.document_key.clone(),
                            check_filter,
                        );
                        insert_unique(&mut policy.dynamic_grants, "dynamic grant", &dynamic.name, handle)?;
                    }
                }
            }
        }

        debug!(
            filters = policy.filters.len(),
            activities = policy.activities.len(),
            roles = policy.roles.len(),
            dynamic_grants = policy.dynamic_grants.len(),
            "parsed policy document"
        );
        Ok(policy)
    }
}

fn lookup<'a, T>(map: &'a BTreeMap<String, T>, kind: &'static str, name: &str) -> Result<&'a T> {
    map.get(name).ok_or_else(|| AuthzError::UnknownReference {
        kind,
        name: name.to_string(),
    })
}

fn insert_unique<T>(
    map: &mut BTreeMap<String, T>,
    kind: &'static str,
    name: &str,
    value: T,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(AuthzError::DuplicateName {
            kind,
            name: name.to_string(),
        });
    }
    map.insert(name.to_string(), value);
    Ok(())
}

fn parse_access(text: &str, permission: &str) -> Result<AccessType> {
    AccessType::parse(text).ok_or_else(|| {
        AuthzError::PolicyParse(format!(
            "Invalid access '{}' in permission '{}'",
            text, permission
        ))
    })
}

fn build_permission(spec: &PermissionSpec) -> Result<Permission> {
    let permission = match spec {
        PermissionSpec::Entity {
            name,
            access,
            entities,
        } => {
            let resources = entities
                .iter()
                .map(|e| {
                    Arc::new(match &e.fields {
                        Some(fields) => EntityResource::with_fields(e.entity.clone(), fields.iter().cloned()),
                        None => EntityResource::new(e.entity.clone()),
                    })
                })
                .collect();
            EntityGroupPermission::new(
                name.clone(),
                parse_access(access, name)?,
                vec![Arc::new(EntityGroupResource::new(name.clone(), resources))],
            )
            .into()
        }
        PermissionSpec::Object {
            name,
            access,
            types,
        } => ObjectAccessPermission::new(name.clone(), parse_access(access, name)?, types.iter().cloned()).into(),
        PermissionSpec::Custom { name, data } => {
            CustomPermission::with_data(name.clone(), data.clone()).into()
        }
    };
    Ok(permission)
}

fn build_filter(spec: &FilterSpec) -> Result<AuthorizationFilter> {
    let mut filter = AuthorizationFilter::new(spec.name.clone());
    let mut entities = Vec::new();
    for condition in &spec.conditions {
        if entities.contains(&condition.entity) {
            return Err(AuthzError::DuplicateName {
                kind: "filter condition",
                name: format!("{}.{}", spec.name, condition.entity),
            });
        }
        entities.push(condition.entity.clone());

        let field = condition.field.clone();
        filter = match (&condition.equals, &condition.equals_context) {
            (Some(expected), None) => {
                let query = QueryPredicate::expr(format!("{} = {}", field, literal(expected)));
                let expected = expected.clone();
                filter.with_filter(
                    condition.entity.clone(),
                    move |record: &dyn Record, _: &OperationContext| record.get(&field) == Some(&expected),
                    query,
                )
            }
            (None, Some(key)) => {
                let query = QueryPredicate::expr(format!("{} = @{}", field, key));
                let key = key.clone();
                filter.with_filter(
                    condition.entity.clone(),
                    move |record: &dyn Record, ctx: &OperationContext| {
                        ctx.get_value(&key)
                            .map_or(false, |value| record.get(&field) == Some(&value))
                    },
                    query,
                )
            }
            _ => {
                return Err(AuthzError::PolicyParse(format!(
                    "Condition on '{}.{}' in filter '{}' needs exactly one of 'equals' or 'equals_context'",
                    condition.entity, condition.field, spec.name
                )))
            }
        };
    }
    Ok(filter)
}

/// Query text for a literal value
fn literal(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => format!("'{}'", s.replace('\'', "''")),
        other => other.to_string(),
    }
}
