//! Configuration lifecycle: create, edit, submit, approve, reject,
//! clone, delete.
//!
//! Every mutation that touches a configuration together with its child
//! rules commits in one transaction. Child collections use replace-all
//! semantics on update: the existing rows are deleted and the request
//! body is inserted wholesale.

use fleet_core::compile::{compile, Artifacts, RuleSet};
use fleet_core::types::{
    AclAction, ClientAclRule, Config, ConfigInput, ConfigStatus, DomainRule, IpRangeRule,
    ParentProxy, Proxy, RuleAction,
};
use fleet_core::{validate, Error, Result};
use serde::Serialize;
use serde_json::json;
use sqlx::{SqliteConnection, SqlitePool};
use uuid::Uuid;

use crate::error::db_err;
use crate::repos::{client_acl, config, config_proxy, domain_rule, ip_range_rule, parent_proxy};
use crate::services::audit::record_on;

#[derive(Debug, Clone, Serialize)]
pub struct ConfigDetail {
    #[serde(flatten)]
    pub config: Config,
    pub domains: Vec<DomainRule>,
    pub ip_ranges: Vec<IpRangeRule>,
    pub parent_proxies: Vec<ParentProxy>,
    pub client_acl: Vec<ClientAclRule>,
    pub proxies: Vec<Proxy>,
}

#[derive(Clone)]
pub struct ConfigService {
    pool: SqlitePool,
}

impl ConfigService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn list(
        &self,
        status: Option<ConfigStatus>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Config>, i64)> {
        if page < 1 || !(1..=100).contains(&limit) {
            return Err(Error::BadRequest("invalid pagination".to_string()));
        }
        let offset = (page - 1) * limit;
        let configs = config::list(&self.pool, status, limit, offset).await?;
        let total = config::count(&self.pool, status).await?;
        Ok((configs, total))
    }

    pub async fn get_detail(&self, id: Uuid) -> Result<ConfigDetail> {
        let cfg = config::get_by_id(&self.pool, id).await?;
        Ok(ConfigDetail {
            domains: domain_rule::list_by_config(&self.pool, id).await?,
            ip_ranges: ip_range_rule::list_by_config(&self.pool, id).await?,
            parent_proxies: parent_proxy::list_by_config(&self.pool, id).await?,
            client_acl: client_acl::list_by_config(&self.pool, id).await?,
            proxies: config_proxy::list_proxies_by_config(&self.pool, id)
                .await?
                .into_iter()
                .map(Into::into)
                .collect(),
            config: cfg,
        })
    }

    pub async fn create(
        &self,
        input: ConfigInput,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<ConfigDetail> {
        validate::validate_config(&input)?;
        let default_action =
            validate::effective_default_action(&input.default_action).unwrap_or(RuleAction::Direct);

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let cfg = config::insert(
            &mut *tx,
            &input.name,
            input.description.as_deref(),
            default_action,
            1,
            user_id,
        )
        .await?;

        let detail = insert_children(&mut tx, cfg, &input, user_id, true).await?;

        record_on(
            &mut *tx,
            Some(user_id),
            "config.create",
            "config",
            Some(detail.config.id),
            None,
            None,
            ip,
        )
        .await;

        tx.commit().await.map_err(db_err)?;
        Ok(detail)
    }

    pub async fn update(
        &self,
        id: Uuid,
        input: ConfigInput,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<ConfigDetail> {
        validate::validate_config(&input)?;
        let default_action =
            validate::effective_default_action(&input.default_action).unwrap_or(RuleAction::Direct);

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let existing = config::get_by_id(&mut *tx, id).await?;
        if existing.status != ConfigStatus::Draft {
            return Err(Error::InvalidStatus(
                "can only edit configs in draft status".to_string(),
            ));
        }

        config::update_draft(
            &mut *tx,
            id,
            &input.name,
            input.description.as_deref(),
            default_action,
            user_id,
        )
        .await?;

        // Replace-all: wipe every child collection, then insert the body.
        domain_rule::delete_by_config(&mut *tx, id).await?;
        ip_range_rule::delete_by_config(&mut *tx, id).await?;
        parent_proxy::delete_by_config(&mut *tx, id).await?;
        client_acl::delete_by_config(&mut *tx, id).await?;
        config_proxy::delete_by_config(&mut *tx, id).await?;

        let updated = config::get_by_id(&mut *tx, id).await?;
        let detail = insert_children(&mut tx, updated, &input, user_id, false).await?;

        record_on(
            &mut *tx,
            Some(user_id),
            "config.update",
            "config",
            Some(id),
            None,
            None,
            ip,
        )
        .await;

        tx.commit().await.map_err(db_err)?;
        Ok(detail)
    }

    /// Copy an existing configuration into a fresh draft with
    /// `version = source.version + 1`.
    pub async fn clone_config(
        &self,
        id: Uuid,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<ConfigDetail> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let source = config::get_by_id(&mut *tx, id).await?;
        let cfg = config::insert(
            &mut *tx,
            &source.name,
            source.description.as_deref(),
            source.default_action,
            source.version + 1,
            user_id,
        )
        .await?;
        let new_id = cfg.id;

        let mut domains = Vec::new();
        for rule in domain_rule::list_by_config(&mut *tx, id).await? {
            domains.push(
                domain_rule::insert(&mut *tx, new_id, &rule.domain, rule.action, rule.priority)
                    .await?,
            );
        }
        let mut ip_ranges = Vec::new();
        for rule in ip_range_rule::list_by_config(&mut *tx, id).await? {
            ip_ranges.push(
                ip_range_rule::insert(&mut *tx, new_id, &rule.cidr, rule.action, rule.priority)
                    .await?,
            );
        }
        let mut parents = Vec::new();
        for pp in parent_proxy::list_by_config(&mut *tx, id).await? {
            parents.push(
                parent_proxy::insert(&mut *tx, new_id, &pp.address, pp.port, pp.priority, pp.enabled)
                    .await?,
            );
        }
        let mut acl = Vec::new();
        for rule in client_acl::list_by_config(&mut *tx, id).await? {
            acl.push(
                client_acl::insert(&mut *tx, new_id, &rule.cidr, rule.action, rule.priority)
                    .await?,
            );
        }

        let assigned = config_proxy::list_proxies_by_config(&mut *tx, id).await?;
        for proxy in &assigned {
            config_proxy::assign(&mut *tx, new_id, proxy.id, user_id).await?;
        }

        record_on(
            &mut *tx,
            Some(user_id),
            "config.clone",
            "config",
            Some(new_id),
            Some(json!({ "source_id": id })),
            None,
            ip,
        )
        .await;

        tx.commit().await.map_err(db_err)?;

        Ok(ConfigDetail {
            config: cfg,
            domains,
            ip_ranges,
            parent_proxies: parents,
            client_acl: acl,
            proxies: assigned.into_iter().map(Into::into).collect(),
        })
    }

    pub async fn submit(&self, id: Uuid, user_id: Uuid, ip: Option<&str>) -> Result<Config> {
        config::submit(&self.pool, id, user_id).await?;
        record_on(
            &self.pool,
            Some(user_id),
            "config.submit",
            "config",
            Some(id),
            Some(json!({ "status": "draft" })),
            Some(json!({ "status": "pending_approval" })),
            ip,
        )
        .await;
        config::get_by_id(&self.pool, id).await
    }

    /// Approve a pending configuration: compile and persist the
    /// fingerprint, displace overlapping active configurations, and
    /// activate. Approval is restricted to the submitter (the second
    /// confirmation of the two-step rule).
    pub async fn approve(&self, id: Uuid, user_id: Uuid, ip: Option<&str>) -> Result<Config> {
        let cfg = config::get_by_id(&self.pool, id).await?;
        if cfg.status != ConfigStatus::PendingApproval {
            return Err(Error::InvalidStatus(
                "config is not pending approval".to_string(),
            ));
        }
        if cfg.submitted_by != Some(user_id) {
            return Err(Error::Forbidden(
                "approval must be done by the same user who submitted".to_string(),
            ));
        }

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let artifacts = compile_config(&mut tx, &cfg).await?;
        let fingerprint = artifacts.fingerprint();

        config::deactivate_others(&mut *tx, id).await?;
        config::approve(&mut *tx, id, user_id, &fingerprint).await?;

        record_on(
            &mut *tx,
            Some(user_id),
            "config.approve",
            "config",
            Some(id),
            Some(json!({ "status": "pending_approval" })),
            Some(json!({ "status": "active" })),
            ip,
        )
        .await;

        tx.commit().await.map_err(db_err)?;
        config::get_by_id(&self.pool, id).await
    }

    pub async fn reject(&self, id: Uuid, user_id: Uuid, ip: Option<&str>) -> Result<Config> {
        config::reject(&self.pool, id).await?;
        record_on(
            &self.pool,
            Some(user_id),
            "config.reject",
            "config",
            Some(id),
            Some(json!({ "status": "pending_approval" })),
            Some(json!({ "status": "draft" })),
            ip,
        )
        .await;
        config::get_by_id(&self.pool, id).await
    }

    /// Delete a configuration that has never been approved. Cascades to
    /// every child row and assignment.
    pub async fn delete(&self, id: Uuid, user_id: Uuid, ip: Option<&str>) -> Result<()> {
        let cfg = config::get_by_id(&self.pool, id).await?;
        if cfg.status == ConfigStatus::Active {
            return Err(Error::BadRequest(
                "cannot delete an active config".to_string(),
            ));
        }
        if cfg.approved_at.is_some() {
            return Err(Error::BadRequest(
                "cannot delete a config that was previously activated".to_string(),
            ));
        }

        config::delete(&self.pool, id).await?;
        record_on(
            &self.pool,
            Some(user_id),
            "config.delete",
            "config",
            Some(id),
            Some(json!({ "name": cfg.name, "status": cfg.status.as_str() })),
            None,
            ip,
        )
        .await;
        Ok(())
    }
}

/// Load every child collection and compile. Pure once the rows are in
/// hand, so it is safe inside a transaction.
pub(crate) async fn compile_config(
    conn: &mut SqliteConnection,
    cfg: &Config,
) -> Result<Artifacts> {
    let rules = RuleSet {
        default_action: cfg.default_action,
        domains: domain_rule::list_by_config(&mut *conn, cfg.id).await?,
        ip_ranges: ip_range_rule::list_by_config(&mut *conn, cfg.id).await?,
        parents: parent_proxy::list_by_config(&mut *conn, cfg.id).await?,
        client_acl: client_acl::list_by_config(&mut *conn, cfg.id).await?,
    };
    Ok(compile(rules))
}

/// Client ACL seeded when a new configuration arrives without one.
fn default_client_acl() -> Vec<(String, AclAction, i64)> {
    vec![
        ("127.0.0.1".to_string(), AclAction::Allow, 10),
        ("::1".to_string(), AclAction::Allow, 20),
        ("10.0.0.0/8".to_string(), AclAction::Allow, 30),
    ]
}

async fn insert_children(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    cfg: Config,
    input: &ConfigInput,
    user_id: Uuid,
    seed_default_acl: bool,
) -> Result<ConfigDetail> {
    let id = cfg.id;

    let mut domains = Vec::with_capacity(input.domains.len());
    for d in &input.domains {
        let action = RuleAction::parse(&d.action).unwrap_or(RuleAction::Direct);
        domains.push(domain_rule::insert(&mut **tx, id, &d.domain, action, d.priority).await?);
    }

    let mut ip_ranges = Vec::with_capacity(input.ip_ranges.len());
    for r in &input.ip_ranges {
        let action = RuleAction::parse(&r.action).unwrap_or(RuleAction::Direct);
        ip_ranges.push(ip_range_rule::insert(&mut **tx, id, &r.cidr, action, r.priority).await?);
    }

    let mut parents = Vec::with_capacity(input.parent_proxies.len());
    for p in &input.parent_proxies {
        parents.push(
            parent_proxy::insert(&mut **tx, id, &p.address, p.port, p.priority, p.enabled).await?,
        );
    }

    let mut acl = Vec::new();
    if input.client_acl.is_empty() && seed_default_acl {
        for (cidr, action, priority) in default_client_acl() {
            acl.push(client_acl::insert(&mut **tx, id, &cidr, action, priority).await?);
        }
    } else {
        for a in &input.client_acl {
            let action = AclAction::parse(&a.action).unwrap_or(AclAction::Deny);
            acl.push(client_acl::insert(&mut **tx, id, &a.cidr, action, a.priority).await?);
        }
    }

    for proxy_id in &input.proxy_ids {
        config_proxy::assign(&mut **tx, id, *proxy_id, user_id).await?;
    }

    Ok(ConfigDetail {
        config: cfg,
        domains,
        ip_ranges,
        parent_proxies: parents,
        client_acl: acl,
        proxies: Vec::new(),
    })
}
