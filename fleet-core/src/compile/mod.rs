//! Deterministic compiler from a configuration's rule set to the
//! Traffic Server artifacts.
//!
//! The fingerprint that drives fleet convergence is the SHA-256 of the
//! concatenated artifact bytes, so this module must produce identical
//! bytes for identical inputs on every host: ordering is total
//! (priority ascending, ties broken by byte-wise selector order), line
//! terminators are `\n`, and no locale, clock or randomness is
//! consulted.

mod cidr;

pub use cidr::{cidr_to_range, parse_ipv4_cidr};

use sha2::{Digest, Sha256};

use crate::types::{ClientAclRule, DomainRule, IpRangeRule, ParentProxy, RuleAction};

/// Everything the compiler needs, taken by value.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub default_action: RuleAction,
    pub domains: Vec<DomainRule>,
    pub ip_ranges: Vec<IpRangeRule>,
    pub parents: Vec<ParentProxy>,
    pub client_acl: Vec<ClientAclRule>,
}

/// The three generated files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub parent_config: String,
    pub sni_yaml: String,
    pub ip_allow_yaml: String,
}

impl Artifacts {
    /// Hex-encoded SHA-256 over `parent_config || sni_yaml || ip_allow_yaml`.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.parent_config.as_bytes());
        hasher.update(self.sni_yaml.as_bytes());
        hasher.update(self.ip_allow_yaml.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Compile a rule set into the three artifacts.
pub fn compile(mut rules: RuleSet) -> Artifacts {
    rules
        .ip_ranges
        .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.cidr.cmp(&b.cidr)));
    rules
        .domains
        .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.domain.cmp(&b.domain)));
    rules.parents.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then_with(|| a.address.cmp(&b.address))
            .then_with(|| a.port.cmp(&b.port))
    });
    rules
        .client_acl
        .sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.cidr.cmp(&b.cidr)));

    let parent_list = render_parent_list(&rules.parents);

    Artifacts {
        parent_config: render_parent_config(&rules, parent_list.as_deref()),
        sni_yaml: render_sni_yaml(&rules.domains),
        ip_allow_yaml: render_ip_allow_yaml(&rules.client_acl),
    }
}

/// `addr:port` entries of the enabled parents, semicolon-joined.
/// `None` when no parent is enabled.
fn render_parent_list(parents: &[ParentProxy]) -> Option<String> {
    let list: Vec<String> = parents
        .iter()
        .filter(|p| p.enabled)
        .map(|p| format!("{}:{}", p.address, p.port))
        .collect();
    if list.is_empty() {
        None
    } else {
        Some(list.join(";"))
    }
}

/// `*.example.com` becomes `.example.com` (the ATS wildcard convention);
/// bare domains pass through.
fn domain_to_ats(domain: &str) -> &str {
    domain.strip_prefix('*').unwrap_or(domain)
}

/// Selector format for sni.yaml: a leading-dot pattern is rendered as a
/// `*.` glob, everything else passes through.
fn domain_to_sni(domain: &str) -> String {
    if domain.starts_with('.') {
        format!("*{domain}")
    } else {
        domain.to_string()
    }
}

fn render_parent_config(rules: &RuleSet, parent_list: Option<&str>) -> String {
    let mut out = String::new();

    // Infrastructure preamble, identical for every configuration.
    out.push_str("# Localhost\n");
    out.push_str("dest_ip=127.0.0.0-127.255.255.255 go_direct=true\n");
    out.push_str("# Link-local\n");
    out.push_str("dest_ip=169.254.0.0-169.254.255.255 go_direct=true\n");
    out.push_str("# Kubernetes\n");
    out.push_str("dest_domain=.svc.cluster.local go_direct=true\n");
    out.push_str("dest_domain=.cluster.local go_direct=true\n");
    out.push_str("dest_domain=localhost go_direct=true\n");
    out.push('\n');

    for rule in &rules.ip_ranges {
        let range = cidr_to_range(&rule.cidr);
        match rule.action {
            RuleAction::Direct => {
                out.push_str(&format!("dest_ip={range} go_direct=true\n"));
            }
            RuleAction::Parent => {
                if let Some(parents) = parent_list {
                    out.push_str(&format!(
                        "dest_ip={range} parent=\"{parents}\" round_robin=strict go_direct=false\n"
                    ));
                }
            }
        }
    }

    for rule in &rules.domains {
        let domain = domain_to_ats(&rule.domain);
        match rule.action {
            RuleAction::Direct => {
                out.push_str(&format!("dest_domain={domain} go_direct=true\n"));
            }
            RuleAction::Parent => {
                if let Some(parents) = parent_list {
                    out.push_str(&format!(
                        "dest_domain={domain} parent=\"{parents}\" round_robin=strict go_direct=false\n"
                    ));
                }
            }
        }
    }

    // Default rule. A parent default without any enabled parent falls
    // back to direct rather than emitting an empty parent list.
    match (rules.default_action, parent_list) {
        (RuleAction::Parent, Some(parents)) => {
            out.push_str(&format!(
                "dest_domain=. parent=\"{parents}\" round_robin=strict go_direct=false\n"
            ));
        }
        _ => {
            out.push_str("dest_domain=. go_direct=true\n");
        }
    }

    out
}

fn render_sni_yaml(domains: &[DomainRule]) -> String {
    let mut out = String::from("sni:\n");
    for rule in domains {
        if rule.action == RuleAction::Direct {
            let fqdn = domain_to_sni(domain_to_ats(&rule.domain));
            out.push_str(&format!("  - fqdn: '{fqdn}'\n    tunnel_route: direct\n"));
        }
    }
    out
}

fn render_ip_allow_yaml(acl: &[ClientAclRule]) -> String {
    let mut out = String::from("ip_allow:\n");
    for rule in acl {
        let action = match rule.action {
            crate::types::AclAction::Allow => "set_allow",
            crate::types::AclAction::Deny => "set_deny",
        };
        out.push_str(&format!(
            "  - apply: in\n    ip_addrs: {}\n    action: {}\n    methods: ALL\n",
            rule.cidr, action
        ));
    }
    // Safety floor: everything not explicitly allowed is denied.
    out.push_str("  - apply: in\n    ip_addrs: 0/0\n    action: set_deny\n    methods: ALL\n");
    out.push_str("  - apply: in\n    ip_addrs: ::/0\n    action: set_deny\n    methods: ALL\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AclAction;
    use chrono::Utc;
    use uuid::Uuid;

    fn domain_rule(domain: &str, action: RuleAction, priority: i64) -> DomainRule {
        DomainRule {
            id: Uuid::new_v4(),
            config_id: Uuid::nil(),
            domain: domain.to_string(),
            action,
            priority,
            created_at: Utc::now(),
        }
    }

    fn ip_rule(cidr: &str, action: RuleAction, priority: i64) -> IpRangeRule {
        IpRangeRule {
            id: Uuid::new_v4(),
            config_id: Uuid::nil(),
            cidr: cidr.to_string(),
            action,
            priority,
            created_at: Utc::now(),
        }
    }

    fn parent(address: &str, port: i64, priority: i64, enabled: bool) -> ParentProxy {
        ParentProxy {
            id: Uuid::new_v4(),
            config_id: Uuid::nil(),
            address: address.to_string(),
            port,
            priority,
            enabled,
            created_at: Utc::now(),
        }
    }

    fn acl(cidr: &str, action: AclAction, priority: i64) -> ClientAclRule {
        ClientAclRule {
            id: Uuid::new_v4(),
            config_id: Uuid::nil(),
            cidr: cidr.to_string(),
            action,
            priority,
            created_at: Utc::now(),
        }
    }

    fn empty(default_action: RuleAction) -> RuleSet {
        RuleSet {
            default_action,
            domains: vec![],
            ip_ranges: vec![],
            parents: vec![],
            client_acl: vec![],
        }
    }

    const PREAMBLE: &str = "# Localhost\n\
dest_ip=127.0.0.0-127.255.255.255 go_direct=true\n\
# Link-local\n\
dest_ip=169.254.0.0-169.254.255.255 go_direct=true\n\
# Kubernetes\n\
dest_domain=.svc.cluster.local go_direct=true\n\
dest_domain=.cluster.local go_direct=true\n\
dest_domain=localhost go_direct=true\n\n";

    #[test]
    fn empty_rule_set_compiles_to_preamble_and_direct_default() {
        let artifacts = compile(empty(RuleAction::Direct));
        assert_eq!(
            artifacts.parent_config,
            format!("{PREAMBLE}dest_domain=. go_direct=true\n")
        );
        assert_eq!(artifacts.sni_yaml, "sni:\n");
    }

    #[test]
    fn happy_path_matches_expected_bytes() {
        let mut rules = empty(RuleAction::Direct);
        rules.domains.push(domain_rule("*.internal.local", RuleAction::Direct, 10));
        rules.ip_ranges.push(ip_rule("10.0.0.0/8", RuleAction::Direct, 10));
        rules.parents.push(parent("10.96.215.26", 3128, 1, true));

        let artifacts = compile(rules);
        let expected = format!(
            "{PREAMBLE}\
dest_ip=10.0.0.0-10.255.255.255 go_direct=true\n\
dest_domain=.internal.local go_direct=true\n\
dest_domain=. go_direct=true\n"
        );
        assert_eq!(artifacts.parent_config, expected);
        assert_eq!(
            artifacts.sni_yaml,
            "sni:\n  - fqdn: '*.internal.local'\n    tunnel_route: direct\n"
        );
        assert_eq!(artifacts.fingerprint().len(), 64);
    }

    #[test]
    fn compilation_is_deterministic() {
        let mut rules = empty(RuleAction::Parent);
        rules.domains.push(domain_rule("b.example.com", RuleAction::Parent, 5));
        rules.domains.push(domain_rule("a.example.com", RuleAction::Direct, 5));
        rules.ip_ranges.push(ip_rule("192.168.0.0/16", RuleAction::Parent, 1));
        rules.parents.push(parent("10.0.0.2", 3128, 2, true));
        rules.parents.push(parent("10.0.0.1", 3128, 1, true));
        rules.client_acl.push(acl("10.0.0.0/8", AclAction::Allow, 1));

        let a = compile(rules.clone());
        let b = compile(rules);
        assert_eq!(a, b);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn equal_priority_rules_order_by_selector() {
        let mut rules = empty(RuleAction::Direct);
        rules.domains.push(domain_rule("zzz.example.com", RuleAction::Direct, 10));
        rules.domains.push(domain_rule("aaa.example.com", RuleAction::Direct, 10));

        let artifacts = compile(rules);
        let aaa = artifacts.parent_config.find("dest_domain=aaa").unwrap();
        let zzz = artifacts.parent_config.find("dest_domain=zzz").unwrap();
        assert!(aaa < zzz);
    }

    #[test]
    fn parent_rules_are_skipped_without_enabled_parents() {
        let mut rules = empty(RuleAction::Parent);
        rules.domains.push(domain_rule("proxy.example.com", RuleAction::Parent, 10));
        rules.parents.push(parent("10.0.0.1", 3128, 1, false));

        let artifacts = compile(rules);
        assert!(!artifacts.parent_config.contains("proxy.example.com"));
        // Parent default with no enabled parent falls back to direct.
        assert!(artifacts.parent_config.ends_with("dest_domain=. go_direct=true\n"));
        assert!(!artifacts.parent_config.contains("parent=\"\""));
    }

    #[test]
    fn parent_rules_render_the_enabled_pool_in_priority_order() {
        let mut rules = empty(RuleAction::Parent);
        rules.domains.push(domain_rule("corp.example.com", RuleAction::Parent, 10));
        rules.parents.push(parent("10.0.0.2", 3129, 2, true));
        rules.parents.push(parent("10.0.0.1", 3128, 1, true));
        rules.parents.push(parent("10.0.0.3", 3130, 3, false));

        let artifacts = compile(rules);
        assert!(artifacts.parent_config.contains(
            "dest_domain=corp.example.com parent=\"10.0.0.1:3128;10.0.0.2:3129\" round_robin=strict go_direct=false\n"
        ));
        assert!(artifacts.parent_config.ends_with(
            "dest_domain=. parent=\"10.0.0.1:3128;10.0.0.2:3129\" round_robin=strict go_direct=false\n"
        ));
    }

    #[test]
    fn sni_lists_only_direct_domains() {
        let mut rules = empty(RuleAction::Direct);
        rules.domains.push(domain_rule("*.a.example.com", RuleAction::Direct, 1));
        rules.domains.push(domain_rule("b.example.com", RuleAction::Parent, 2));
        rules.domains.push(domain_rule("c.example.com", RuleAction::Direct, 3));
        rules.parents.push(parent("10.0.0.1", 3128, 1, true));

        let artifacts = compile(rules);
        assert_eq!(
            artifacts.sni_yaml,
            "sni:\n  - fqdn: '*.a.example.com'\n    tunnel_route: direct\n  - fqdn: 'c.example.com'\n    tunnel_route: direct\n"
        );
    }

    #[test]
    fn ip_allow_appends_deny_all_floor() {
        let mut rules = empty(RuleAction::Direct);
        rules.client_acl.push(acl("127.0.0.1", AclAction::Allow, 10));
        rules.client_acl.push(acl("10.1.0.0/16", AclAction::Deny, 20));

        let artifacts = compile(rules);
        assert_eq!(
            artifacts.ip_allow_yaml,
            "ip_allow:\n\
  - apply: in\n    ip_addrs: 127.0.0.1\n    action: set_allow\n    methods: ALL\n\
  - apply: in\n    ip_addrs: 10.1.0.0/16\n    action: set_deny\n    methods: ALL\n\
  - apply: in\n    ip_addrs: 0/0\n    action: set_deny\n    methods: ALL\n\
  - apply: in\n    ip_addrs: ::/0\n    action: set_deny\n    methods: ALL\n"
        );
    }

    #[test]
    fn fingerprint_changes_with_any_artifact() {
        let base = compile(empty(RuleAction::Direct));

        let mut with_acl = empty(RuleAction::Direct);
        with_acl.client_acl.push(acl("10.0.0.0/8", AclAction::Allow, 1));
        let changed = compile(with_acl);

        assert_eq!(base.parent_config, changed.parent_config);
        assert_ne!(base.fingerprint(), changed.fingerprint());
    }
}
