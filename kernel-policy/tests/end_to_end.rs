//! End-to-end scenarios from spec.md §8.

use kernel_core::RiskLevel;
use kernel_policy::{
    Decision, PluginRule, PluginsPolicy, PolicyDocument, PolicyEngine, PolicySource, ToolsPolicy,
};

#[test]
fn scenario_org_deny_beats_user_allow() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            deny: vec!["shell-*".into()],
            ..Default::default()
        }),
    ).unwrap();
    engine.set_policy(
        PolicySource::User,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            allow: vec!["shell-exec".into()],
            ..Default::default()
        }),
    ).unwrap();

    let result = engine.evaluate_tool("shell-exec");
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.source, PolicySource::Organization);
}

#[test]
fn scenario_trusted_author_bypass() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_plugins(PluginsPolicy {
            trusted_authors: vec!["Corp".into()],
            ..Default::default()
        }),
    ).unwrap();

    let result = engine.evaluate_plugin("p", Some("Corp"), None);
    assert_eq!(result.decision, Decision::Allow);
    assert!(result.reason.contains("trusted"));
}

#[test]
fn scenario_risk_cap_denies_and_blocks_load() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_plugins(PluginsPolicy {
            max_risk_level: Some(RiskLevel::LocalMutation),
            ..Default::default()
        }),
    ).unwrap();

    let result = engine.evaluate_plugin("p", None, Some(RiskLevel::Network));
    assert_eq!(result.decision, Decision::Deny);
}

#[test]
fn scenario_domain_subdomain_block() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_connectivity(kernel_policy::ConnectivityPolicy {
            blocked_domains: vec!["blocked.com".into()],
            ..Default::default()
        }),
    ).unwrap();

    let result = engine.evaluate_domain("api.blocked.com");
    assert_eq!(result.decision, Decision::Deny);
}

#[test]
fn higher_authority_allow_short_circuits_before_lower_authority_deny_is_reached() {
    let engine = PolicyEngine::new();
    // Deny placed in the lowest-authority source that is still walked.
    engine.set_policy(
        PolicySource::Session,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            deny: vec!["danger-*".into()],
            ..Default::default()
        }),
    ).unwrap();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            allow: vec!["danger-*".into()],
            ..Default::default()
        }),
    ).unwrap();

    // Organization is walked first and allows; the fixed per-source
    // order means org's allow wins here since deny/allow/rules are
    // evaluated within *each* source before moving to the next one —
    // org's allow list matches before session is ever consulted.
    let result = engine.evaluate_tool("danger-zone");
    assert_eq!(result.decision, Decision::Allow);
    assert_eq!(result.source, PolicySource::Organization);
}

#[test]
fn deny_anywhere_in_the_same_document_wins_over_allow_in_a_weaker_one() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            deny: vec!["danger-*".into()],
            ..Default::default()
        }),
    ).unwrap();
    engine.set_policy(
        PolicySource::User,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            allow: vec!["danger-*".into()],
            ..Default::default()
        }),
    ).unwrap();

    let result = engine.evaluate_tool("danger-zone");
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.source, PolicySource::Organization);
}

#[test]
fn org_lock_falls_through_to_document_default_when_unmatched() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0")
            .locked()
            .with_default(Decision::Deny),
    ).unwrap();

    let result = engine.evaluate_tool("anything-unmatched");
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.source, PolicySource::Organization);
}

#[test]
fn org_lock_falls_through_to_document_default_for_domains() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0")
            .locked()
            .with_default(Decision::Deny),
    ).unwrap();

    // Host matches neither blocked_domains nor allowed_domains, so
    // without the org-lock check this would fall through to the
    // domain section's unconditional default of Allow.
    let result = engine.evaluate_domain("anything-unmatched.example.com");
    assert_eq!(result.decision, Decision::Deny);
    assert_eq!(result.source, PolicySource::Organization);
}

#[test]
fn evaluation_is_deterministic() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            deny: vec!["shell-*".into()],
            ..Default::default()
        }),
    ).unwrap();

    let a = engine.evaluate_tool("shell-exec");
    let b = engine.evaluate_tool("shell-exec");
    assert_eq!(a.decision, b.decision);
    assert_eq!(a.source, b.source);
    assert_eq!(a.reason, b.reason);
}

#[test]
fn safety_valve_like_plugin_rule_ids_are_honored() {
    let engine = PolicyEngine::new();
    engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_plugins(PluginsPolicy {
            rules: vec![PluginRule {
                id: "r1".into(),
                plugin: "com.x.*".into(),
                decision: Decision::AllowWithApproval,
                reason: Some("new publisher".into()),
                constraints: None,
            }],
            ..Default::default()
        }),
    ).unwrap();

    let result = engine.evaluate_plugin("com.x.greeter", None, None);
    assert_eq!(result.decision, Decision::AllowWithApproval);
    assert_eq!(result.rule_id.as_deref(), Some("r1"));
}

#[test]
fn set_policy_rejects_a_document_with_malformed_rules() {
    let engine = PolicyEngine::new();

    let duplicate_ids = engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            rules: vec![
                kernel_policy::ToolRule {
                    id: "r1".into(),
                    tool: "a-*".into(),
                    decision: Decision::Allow,
                    reason: None,
                    constraints: None,
                    conditions: None,
                },
                kernel_policy::ToolRule {
                    id: "r1".into(),
                    tool: "b-*".into(),
                    decision: Decision::Deny,
                    reason: None,
                    constraints: None,
                    conditions: None,
                },
            ],
            ..Default::default()
        }),
    );
    assert!(duplicate_ids.is_err());

    let empty_constraints = engine.set_policy(
        PolicySource::Organization,
        PolicyDocument::new("1.0.0").with_tools(ToolsPolicy {
            rules: vec![kernel_policy::ToolRule {
                id: "r1".into(),
                tool: "a-*".into(),
                decision: Decision::AllowWithConstraints,
                reason: None,
                constraints: None,
                conditions: None,
            }],
            ..Default::default()
        }),
    );
    assert!(empty_constraints.is_err());

    // Neither rejected document was installed; the tool still falls
    // through to the implicit default.
    let result = engine.evaluate_tool("a-anything");
    assert_eq!(result.decision, Decision::Allow);
    assert_eq!(result.source, PolicySource::Default);
}
