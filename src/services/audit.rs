use crate::{
    config::AuditConfig,
    entities::{
        admin_session::{self, Entity as AdminSession},
        audit_log::{self, Entity as AuditLog},
        security_event::{self, Entity as SecurityEvent, Severity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Duration, Timelike, Utc};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub const REPEATED_FAILED_ACTIONS: &str = "repeated_failed_actions";
pub const OFF_HOURS_ACTIVITY: &str = "off_hours_activity";

/// One administrative action to append to the trail.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub admin_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
}

impl AuditEntry {
    pub fn new(admin_id: Uuid, action: &str, resource_type: &str) -> Self {
        Self {
            admin_id,
            action: action.to_string(),
            resource_type: resource_type.to_string(),
            resource_id: None,
            details: None,
            ip_address: None,
            user_agent: None,
            success: true,
        }
    }

    pub fn resource(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn client(mut self, ip_address: Option<String>, user_agent: Option<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    pub fn succeeded(mut self, success: bool) -> Self {
        self.success = success;
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuditLogFilter {
    pub admin_id: Option<Uuid>,
    pub action: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub success: Option<bool>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AuditLogFilter {
    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(admin_id) = self.admin_id {
            cond = cond.add(audit_log::Column::AdminId.eq(admin_id));
        }
        if let Some(action) = &self.action {
            cond = cond.add(audit_log::Column::Action.eq(action.as_str()));
        }
        if let Some(resource_type) = &self.resource_type {
            cond = cond.add(audit_log::Column::ResourceType.eq(resource_type.as_str()));
        }
        if let Some(resource_id) = &self.resource_id {
            cond = cond.add(audit_log::Column::ResourceId.eq(resource_id.as_str()));
        }
        if let Some(success) = self.success {
            cond = cond.add(audit_log::Column::Success.eq(success));
        }
        if let Some(from) = self.from {
            cond = cond.add(audit_log::Column::CreatedAt.gte(from));
        }
        if let Some(to) = self.to {
            cond = cond.add(audit_log::Column::CreatedAt.lte(to));
        }
        cond
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SecurityEventFilter {
    pub admin_id: Option<Uuid>,
    pub event_type: Option<String>,
    pub severity: Option<Severity>,
    pub resolved: Option<bool>,
    pub from: Option<DateTime<Utc>>,
}

impl SecurityEventFilter {
    pub fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if let Some(admin_id) = self.admin_id {
            cond = cond.add(security_event::Column::AdminId.eq(admin_id));
        }
        if let Some(event_type) = &self.event_type {
            cond = cond.add(security_event::Column::EventType.eq(event_type.as_str()));
        }
        if let Some(severity) = self.severity {
            cond = cond.add(security_event::Column::Severity.eq(severity));
        }
        if let Some(resolved) = self.resolved {
            cond = cond.add(security_event::Column::Resolved.eq(resolved));
        }
        if let Some(from) = self.from {
            cond = cond.add(security_event::Column::CreatedAt.gte(from));
        }
        cond
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewSecurityEvent {
    pub admin_id: Option<Uuid>,
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    pub ip_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogView {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub success: bool,
    pub created_at: DateTime<Utc>,
}

impl From<audit_log::Model> for AuditLogView {
    fn from(m: audit_log::Model) -> Self {
        Self {
            id: m.id,
            admin_id: m.admin_id,
            action: m.action,
            resource_type: m.resource_type,
            resource_id: m.resource_id,
            details: m.details,
            ip_address: m.ip_address,
            user_agent: m.user_agent,
            success: m.success,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecurityEventView {
    pub id: Uuid,
    pub admin_id: Option<Uuid>,
    pub event_type: String,
    pub severity: Severity,
    pub description: String,
    pub ip_address: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<security_event::Model> for SecurityEventView {
    fn from(m: security_event::Model) -> Self {
        Self {
            id: m.id,
            admin_id: m.admin_id,
            event_type: m.event_type,
            severity: m.severity,
            description: m.description,
            ip_address: m.ip_address,
            metadata: m.metadata,
            resolved: m.resolved,
            created_at: m.created_at,
            resolved_at: m.resolved_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminSessionView {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub ip_address: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub active: bool,
}

impl From<admin_session::Model> for AdminSessionView {
    fn from(m: admin_session::Model) -> Self {
        Self {
            active: m.is_active(),
            id: m.id,
            admin_id: m.admin_id,
            ip_address: m.ip_address,
            started_at: m.started_at,
            last_activity_at: m.last_activity_at,
            ended_at: m.ended_at,
        }
    }
}

/// A pattern found by [`AuditService::detect_suspicious_activity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SuspiciousPattern {
    pub pattern: String,
    pub severity: Severity,
    pub occurrences: u64,
}

/// True when `at`, shifted to store-local time, falls outside
/// `[start_hour, end_hour)`.
pub fn is_off_hours(at: DateTime<Utc>, config: &AuditConfig) -> bool {
    let hour = (at + Duration::minutes(i64::from(config.utc_offset_minutes))).hour();
    hour < config.business_hours_start || hour >= config.business_hours_end
}

/// Admin audit trail, security events and admin sessions.
#[derive(Clone)]
pub struct AuditService {
    db: Arc<DatabaseConnection>,
    config: AuditConfig,
    event_sender: Option<Arc<EventSender>>,
}

impl AuditService {
    pub fn new(db: Arc<DatabaseConnection>, config: AuditConfig) -> Self {
        Self {
            db,
            config,
            event_sender: None,
        }
    }

    pub fn with_event_sender(mut self, sender: Arc<EventSender>) -> Self {
        self.event_sender = Some(sender);
        self
    }

    /// Appends an entry. Failures are logged and swallowed so auditing never
    /// blocks the action being audited.
    pub async fn log_action(&self, entry: AuditEntry) {
        let action = entry.action.clone();
        let model = audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            admin_id: Set(entry.admin_id),
            action: Set(entry.action),
            resource_type: Set(entry.resource_type),
            resource_id: Set(entry.resource_id),
            details: Set(entry.details),
            ip_address: Set(entry.ip_address),
            user_agent: Set(entry.user_agent),
            success: Set(entry.success),
            created_at: Set(Utc::now()),
        };
        if let Err(e) = model.insert(&*self.db).await {
            warn!(error = %e, action = %action, "Failed to write audit log entry");
        }
    }

    pub async fn list(
        &self,
        filter: &AuditLogFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<AuditLogView>, u64), ServiceError> {
        let paginator = AuditLog::find()
            .filter(filter.condition())
            .order_by_desc(audit_log::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type, severity = %event.severity))]
    pub async fn record_security_event(
        &self,
        event: NewSecurityEvent,
    ) -> Result<SecurityEventView, ServiceError> {
        let model = security_event::ActiveModel {
            id: Set(Uuid::new_v4()),
            admin_id: Set(event.admin_id),
            event_type: Set(event.event_type),
            severity: Set(event.severity),
            description: Set(event.description),
            ip_address: Set(event.ip_address),
            metadata: Set(event.metadata),
            resolved: Set(false),
            created_at: Set(Utc::now()),
            resolved_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        if model.severity >= Severity::High {
            warn!(id = %model.id, "High severity security event recorded");
        }
        Ok(model.into())
    }

    pub async fn list_security_events(
        &self,
        filter: &SecurityEventFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<SecurityEventView>, u64), ServiceError> {
        let paginator = SecurityEvent::find()
            .filter(filter.condition())
            .order_by_desc(security_event::Column::CreatedAt)
            .paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let rows = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;
        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    pub async fn resolve_security_event(&self, id: Uuid) -> Result<SecurityEventView, ServiceError> {
        let event = SecurityEvent::find_by_id(id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Security event {} not found", id)))?;
        if event.resolved {
            return Ok(event.into());
        }
        let mut active: security_event::ActiveModel = event.into();
        active.resolved = Set(true);
        active.resolved_at = Set(Some(Utc::now()));
        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(updated.into())
    }

    #[instrument(skip(self, user_agent))]
    pub async fn start_session(
        &self,
        admin_id: Uuid,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Result<AdminSessionView, ServiceError> {
        let now = Utc::now();
        let session = admin_session::ActiveModel {
            id: Set(Uuid::new_v4()),
            admin_id: Set(admin_id),
            ip_address: Set(ip_address),
            user_agent: Set(user_agent),
            started_at: Set(now),
            last_activity_at: Set(now),
            ended_at: Set(None),
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::db_error)?;
        info!(session_id = %session.id, "Admin session started");
        Ok(session.into())
    }

    /// Bumps the last-activity time of the admin's open sessions.
    pub async fn touch_sessions(&self, admin_id: Uuid) -> Result<u64, ServiceError> {
        let result = AdminSession::update_many()
            .col_expr(admin_session::Column::LastActivityAt, Expr::value(Utc::now()))
            .filter(admin_session::Column::AdminId.eq(admin_id))
            .filter(admin_session::Column::EndedAt.is_null())
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(result.rows_affected)
    }

    /// Ends a session. Only its owner can end it; ending twice is a no-op.
    pub async fn end_session(
        &self,
        admin_id: Uuid,
        session_id: Uuid,
    ) -> Result<AdminSessionView, ServiceError> {
        let session = AdminSession::find_by_id(session_id)
            .filter(admin_session::Column::AdminId.eq(admin_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))?;
        if !session.is_active() {
            return Ok(session.into());
        }
        let now = Utc::now();
        let mut active: admin_session::ActiveModel = session.into();
        active.ended_at = Set(Some(now));
        active.last_activity_at = Set(now);
        let updated = active
            .update(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(updated.into())
    }

    /// Scans the admin's recent trail for repeated failures and off-hours
    /// work. Each pattern found is stored as a security event unless an
    /// unresolved one of the same type already exists for this admin.
    #[instrument(skip(self))]
    pub async fn detect_suspicious_activity(
        &self,
        admin_id: Uuid,
    ) -> Result<Vec<SuspiciousPattern>, ServiceError> {
        let since = Utc::now() - Duration::hours(self.config.window_hours);
        let recent = AuditLog::find()
            .filter(audit_log::Column::AdminId.eq(admin_id))
            .filter(audit_log::Column::CreatedAt.gte(since))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        let failed = recent.iter().filter(|e| !e.success).count() as u64;
        let off_hours = recent
            .iter()
            .filter(|e| is_off_hours(e.created_at, &self.config))
            .count() as u64;

        let mut found = Vec::new();
        if failed >= self.config.failed_action_threshold {
            found.push(SuspiciousPattern {
                pattern: REPEATED_FAILED_ACTIONS.to_string(),
                severity: Severity::High,
                occurrences: failed,
            });
        }
        if off_hours >= self.config.off_hours_threshold {
            found.push(SuspiciousPattern {
                pattern: OFF_HOURS_ACTIVITY.to_string(),
                severity: Severity::Medium,
                occurrences: off_hours,
            });
        }

        for pattern in &found {
            let open = SecurityEvent::find()
                .filter(security_event::Column::AdminId.eq(admin_id))
                .filter(security_event::Column::EventType.eq(pattern.pattern.as_str()))
                .filter(security_event::Column::Resolved.eq(false))
                .count(&*self.db)
                .await
                .map_err(ServiceError::db_error)?;
            if open > 0 {
                continue;
            }
            self.record_security_event(NewSecurityEvent {
                admin_id: Some(admin_id),
                event_type: pattern.pattern.clone(),
                severity: pattern.severity,
                description: format!(
                    "{} occurrences of {} in the last {} hours",
                    pattern.occurrences, pattern.pattern, self.config.window_hours
                ),
                ip_address: None,
                metadata: Some(serde_json::json!({
                    "occurrences": pattern.occurrences,
                    "windowHours": self.config.window_hours,
                })),
            })
            .await?;
            if let Some(sender) = &self.event_sender {
                sender.send_or_log(Event::SuspiciousActivity {
                    admin_id,
                    pattern: pattern.pattern.clone(),
                });
            }
        }
        Ok(found)
    }
}
