//! Validation applied to every configuration create/update.
//!
//! All problems are collected and reported in one `bad_request` so the
//! operator can fix a form in a single pass.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::LazyLock;

use regex::Regex;

use crate::compile::parse_ipv4_cidr;
use crate::error::{Error, Result};
use crate::types::{AclAction, ConfigInput, RuleAction};

static DOMAIN_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\*\.)?[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$")
        .expect("domain pattern compiles")
});

/// The default action field treats empty as `direct`.
pub fn effective_default_action(s: &str) -> Option<RuleAction> {
    if s.is_empty() {
        Some(RuleAction::Direct)
    } else {
        RuleAction::parse(s)
    }
}

/// Validate a configuration write. Returns `bad_request` carrying every
/// problem found, `;`-joined.
pub fn validate_config(input: &ConfigInput) -> Result<()> {
    let mut errs: Vec<String> = Vec::new();

    if input.name.is_empty() {
        errs.push("name is required".to_string());
    }

    if effective_default_action(&input.default_action).is_none() {
        errs.push(format!(
            "default_action: '{}' is not valid, must be 'direct' or 'parent'",
            input.default_action
        ));
    }

    for (i, d) in input.domains.iter().enumerate() {
        if d.domain.is_empty() {
            errs.push(format!("domains[{i}]: domain cannot be empty"));
            continue;
        }
        if d.domain == "*." || d.domain == "*" {
            errs.push(format!(
                "domains[{i}]: '{}' total wildcard is not allowed",
                d.domain
            ));
            continue;
        }
        if !DOMAIN_PATTERN.is_match(&d.domain) {
            errs.push(format!(
                "domains[{i}]: '{}' is not a valid domain (use *.example.com or host.example.com)",
                d.domain
            ));
        }
        if RuleAction::parse(&d.action).is_none() {
            errs.push(format!("domains[{i}]: action '{}' is not valid", d.action));
        }
    }

    for (i, r) in input.ip_ranges.iter().enumerate() {
        if r.cidr.is_empty() {
            errs.push(format!("ip_ranges[{i}]: CIDR cannot be empty"));
            continue;
        }
        if let Some(err) = check_ipv4_selector(&r.cidr, &format!("ip_ranges[{i}]")) {
            errs.push(err);
        }
        if RuleAction::parse(&r.action).is_none() {
            errs.push(format!("ip_ranges[{i}]: action '{}' is not valid", r.action));
        }
    }

    for (i, a) in input.client_acl.iter().enumerate() {
        if a.cidr.is_empty() {
            errs.push(format!("client_acl[{i}]: CIDR cannot be empty"));
            continue;
        }
        // Client ACLs additionally accept bare IPv6 literals (e.g. ::1).
        if a.cidr.parse::<Ipv6Addr>().is_err() {
            if let Some(err) = check_ipv4_selector(&a.cidr, &format!("client_acl[{i}]")) {
                errs.push(err);
            }
        }
        if AclAction::parse(&a.action).is_none() {
            errs.push(format!("client_acl[{i}]: action '{}' is not valid", a.action));
        }
    }

    for (i, p) in input.parent_proxies.iter().enumerate() {
        if p.address.is_empty() {
            errs.push(format!("parent_proxies[{i}]: address cannot be empty"));
        } else if p.address.parse::<Ipv4Addr>().is_err() {
            errs.push(format!(
                "parent_proxies[{i}]: '{}' is not a valid IPv4 address",
                p.address
            ));
        }
        if !(1024..=65535).contains(&p.port) {
            errs.push(format!(
                "parent_proxies[{i}]: port {} is out of range (1024-65535)",
                p.port
            ));
        }
    }

    if errs.is_empty() {
        Ok(())
    } else {
        Err(Error::BadRequest(errs.join("; ")))
    }
}

/// Check a bare-IPv4-or-IPv4-CIDR selector. The all-zero address is
/// rejected in both forms, including any CIDR whose network address is
/// 0.0.0.0 (which covers zero-prefix CIDRs like 10.0.0.0/0).
fn check_ipv4_selector(selector: &str, field: &str) -> Option<String> {
    if let Ok(addr) = selector.parse::<Ipv4Addr>() {
        if addr == Ipv4Addr::UNSPECIFIED {
            return Some(format!("{field}: 0.0.0.0 is not allowed"));
        }
        return None;
    }
    match parse_ipv4_cidr(selector) {
        Some((network, prefix)) => {
            if network == Ipv4Addr::UNSPECIFIED {
                Some(format!("{field}: 0.0.0.0/{prefix} is not allowed"))
            } else {
                None
            }
        }
        None => Some(format!(
            "{field}: '{selector}' is not a valid CIDR or IP address"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientAclInput, DomainRuleInput, IpRangeInput, ParentProxyInput};

    fn base_input() -> ConfigInput {
        ConfigInput {
            name: "corp-routing".to_string(),
            default_action: "direct".to_string(),
            ..Default::default()
        }
    }

    fn domain(domain: &str) -> DomainRuleInput {
        DomainRuleInput {
            domain: domain.to_string(),
            action: "direct".to_string(),
            priority: 10,
        }
    }

    fn ip_range(cidr: &str) -> IpRangeInput {
        IpRangeInput {
            cidr: cidr.to_string(),
            action: "direct".to_string(),
            priority: 10,
        }
    }

    fn acl(cidr: &str) -> ClientAclInput {
        ClientAclInput {
            cidr: cidr.to_string(),
            action: "allow".to_string(),
            priority: 10,
        }
    }

    fn parent(address: &str, port: i64) -> ParentProxyInput {
        ParentProxyInput {
            address: address.to_string(),
            port,
            priority: 1,
            enabled: true,
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        let mut input = base_input();
        input.domains.push(domain("*.internal.local"));
        input.ip_ranges.push(ip_range("10.0.0.0/8"));
        input.client_acl.push(acl("::1"));
        input.parent_proxies.push(parent("10.96.215.26", 3128));
        assert!(validate_config(&input).is_ok());
    }

    #[test]
    fn rejects_empty_name() {
        let mut input = base_input();
        input.name.clear();
        assert!(matches!(
            validate_config(&input),
            Err(Error::BadRequest(msg)) if msg.contains("name is required")
        ));
    }

    #[test]
    fn empty_default_action_is_direct() {
        let mut input = base_input();
        input.default_action.clear();
        assert!(validate_config(&input).is_ok());
        assert_eq!(effective_default_action(""), Some(RuleAction::Direct));
    }

    #[test]
    fn rejects_bad_default_action() {
        let mut input = base_input();
        input.default_action = "bypass".to_string();
        assert!(validate_config(&input).is_err());
    }

    #[test]
    fn domain_boundaries() {
        for bad in ["*", "*.", "x", "-bad.example.com", "exa_mple.com"] {
            let mut input = base_input();
            input.domains.push(domain(bad));
            assert!(validate_config(&input).is_err(), "{bad} should be rejected");
        }
        for good in ["*.x.y", "host.example.com", "EXAMPLE.COM", "a-b.c-d.io"] {
            let mut input = base_input();
            input.domains.push(domain(good));
            assert!(validate_config(&input).is_ok(), "{good} should be accepted");
        }
    }

    #[test]
    fn zero_addresses_are_rejected() {
        for bad in ["0.0.0.0", "0.0.0.0/0", "0.0.0.0/8", "10.0.0.0/0"] {
            let mut input = base_input();
            input.ip_ranges.push(ip_range(bad));
            assert!(validate_config(&input).is_err(), "{bad} should be rejected");

            let mut input = base_input();
            input.client_acl.push(acl(bad));
            assert!(validate_config(&input).is_err(), "{bad} should be rejected in ACL");
        }
    }

    #[test]
    fn ip_ranges_are_ipv4_only() {
        let mut input = base_input();
        input.ip_ranges.push(ip_range("::1"));
        assert!(validate_config(&input).is_err());
    }

    #[test]
    fn client_acl_accepts_bare_ipv6() {
        let mut input = base_input();
        input.client_acl.push(acl("::1"));
        assert!(validate_config(&input).is_ok());
    }

    #[test]
    fn parent_port_boundaries() {
        for (port, ok) in [(1023, false), (1024, true), (65535, true), (65536, false)] {
            let mut input = base_input();
            input.parent_proxies.push(parent("10.0.0.1", port));
            assert_eq!(validate_config(&input).is_ok(), ok, "port {port}");
        }
    }

    #[test]
    fn parent_address_must_be_ipv4() {
        let mut input = base_input();
        input.parent_proxies.push(parent("proxy.example.com", 3128));
        assert!(validate_config(&input).is_err());
    }

    #[test]
    fn collects_every_problem() {
        let mut input = base_input();
        input.name.clear();
        input.domains.push(domain("*"));
        input.parent_proxies.push(parent("10.0.0.1", 80));
        let Err(Error::BadRequest(msg)) = validate_config(&input) else {
            panic!("expected bad_request");
        };
        assert_eq!(msg.matches("; ").count(), 2);
    }
}
