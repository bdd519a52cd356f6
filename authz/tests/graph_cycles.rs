use authz::{build_authority, AccessType, Activity, AuthzError, EntityGroupPermission, EntityGroupResource, Role};
use entities::{EntityDefinition, EntityModel, Field, FieldType};
use std::sync::Arc;

fn model() -> EntityModel {
    EntityModel::from_definitions(vec![EntityDefinition::new(
        "document",
        "Document",
        vec![Field::new("title", FieldType::Text, "Title")],
    )])
    .unwrap()
}

fn view() -> Arc<Activity> {
    Activity::with_permissions(
        "view",
        [EntityGroupPermission::new(
            "read_docs",
            AccessType::READ,
            vec![Arc::new(EntityGroupResource::of_entities("docs", ["document"]))],
        )
        .into()],
    )
}

#[test]
fn two_cycle_role_graph_fails_to_build() {
    let a = Role::new("a");
    let b = Role::new("b");
    a.grant(view());
    a.add_child_roles([b.clone()]);
    b.add_child_roles([a.clone()]);

    let err = build_authority(&[a], &model()).unwrap_err();
    assert!(matches!(err, AuthzError::RoleCycle(_)));
    assert!(err.is_configuration());
}

#[test]
fn three_cycle_role_graph_fails_to_build_from_any_member() {
    let a = Role::new("a");
    let b = Role::new("b");
    let c = Role::new("c");
    a.add_child_roles([b.clone()]);
    b.add_child_roles([c.clone()]);
    c.add_child_roles([a.clone()]);

    let model = model();
    for role in [a, b, c] {
        assert!(matches!(
            build_authority(&[role], &model),
            Err(AuthzError::RoleCycle(_))
        ));
    }
}

#[test]
fn cycle_below_an_acyclic_role_is_still_rejected() {
    let top = Role::new("top");
    let a = Role::new("a");
    let b = Role::new("b");
    top.add_child_roles([a.clone()]);
    a.add_child_roles([b.clone()]);
    b.add_child_roles([a.clone()]);

    let err = build_authority(&[top], &model()).unwrap_err();
    assert!(matches!(err, AuthzError::RoleCycle(name) if name == "a" || name == "b"));
}

#[test]
fn cycle_linked_after_init_is_rejected() {
    let model = model();
    let a = Role::new("a");
    let b = Role::new("b");
    a.grant(view());
    a.init(&model).unwrap();
    b.init(&model).unwrap();
    a.add_child_roles([b.clone()]);
    b.add_child_roles([a.clone()]);

    let err = build_authority(&[a.clone()], &model).unwrap_err();
    assert!(matches!(err, AuthzError::RoleCycle(name) if name == "a"));
    assert!(matches!(b.runtime_data(&model), Err(AuthzError::RoleCycle(name)) if name == "b"));
}

#[test]
fn activity_self_cycle_fails_to_build() {
    let looping = view();
    looping.add_activities([looping.clone()]);
    let role = Role::new("r");
    role.grant(looping);

    let err = build_authority(&[role], &model()).unwrap_err();
    assert!(matches!(err, AuthzError::ActivityCycle(name) if name == "view"));
}

#[test]
fn role_is_never_its_own_descendant() {
    let model = model();
    let base = Role::new("base");
    let mid = Role::new("mid");
    let top = Role::new("top");
    mid.add_child_roles([base.clone()]);
    top.add_child_roles([mid.clone(), base.clone()]);

    for role in [&base, &mid, &top] {
        let data = role.runtime_data(&model).unwrap();
        assert!(!data.has_descendant(role));
    }
    assert_eq!(top.runtime_data(&model).unwrap().descendant_roles().len(), 2);
}

#[test]
fn unknown_field_is_a_configuration_error() {
    let role = Role::new("r");
    role.grant(Activity::with_permissions(
        "bad",
        [EntityGroupPermission::new(
            "bad",
            AccessType::READ,
            vec![Arc::new(EntityGroupResource::new(
                "bad",
                vec![Arc::new(authz::EntityResource::with_fields("document", ["nope"]))],
            ))],
        )
        .into()],
    ));
    let err = build_authority(&[role], &model()).unwrap_err();
    assert!(matches!(err, AuthzError::UnknownField { ref field, .. } if field == "nope"));
}
