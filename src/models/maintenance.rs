use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "maintenance_category", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceCategory {
    Plumbing,
    Electrical,
    Heating,
    Appliance,
    Structural,
    Pest,
    Landscaping,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "maintenance_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceStatus {
    Open,
    InProgress,
    Completed,
    Cancelled,
}

impl Default for MaintenanceStatus {
    fn default() -> Self {
        Self::Open
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "maintenance_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MaintenancePriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for MaintenancePriority {
    fn default() -> Self {
        Self::Medium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaintenanceRequest {
    pub id: Uuid,
    pub property_id: Uuid,
    pub tenant_id: Uuid,
    pub landlord_id: Uuid,
    pub assigned_manager_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub category: MaintenanceCategory,
    pub priority: MaintenancePriority,
    pub status: MaintenanceStatus,
    pub notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MaintenancePhoto {
    pub id: Uuid,
    pub request_id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Fields a maintenance update may touch, one flag per updatable column.
/// Consulted as an explicit per-role mask instead of inspecting which keys
/// the payload happened to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceFieldMask {
    pub title: bool,
    pub description: bool,
    pub category: bool,
    pub priority: bool,
    pub status: bool,
    pub notes: bool,
}

impl MaintenanceFieldMask {
    pub const NONE: Self = Self {
        title: false,
        description: false,
        category: false,
        priority: false,
        status: false,
        notes: false,
    };

    pub const ALL: Self = Self {
        title: true,
        description: true,
        category: true,
        priority: true,
        status: true,
        notes: true,
    };
}

/// Per-role update mask. Tenants may only reword their own description;
/// managers work the request (status, priority, notes); landlords and
/// admins may change anything.
pub fn update_mask_for_role(role: &UserRole) -> MaintenanceFieldMask {
    match role {
        UserRole::Tenant => MaintenanceFieldMask {
            description: true,
            ..MaintenanceFieldMask::NONE
        },
        UserRole::Manager => MaintenanceFieldMask {
            priority: true,
            status: true,
            notes: true,
            ..MaintenanceFieldMask::NONE
        },
        UserRole::Landlord | UserRole::Admin => MaintenanceFieldMask::ALL,
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MaintenanceRequestResponse {
    pub id: Uuid,
    pub property_id: Uuid,
    pub property_title: Option<String>,
    pub tenant_id: Uuid,
    pub tenant_name: Option<String>,
    pub assigned_manager_id: Option<Uuid>,
    pub assigned_manager_name: Option<String>,
    pub title: String,
    pub description: String,
    pub category: MaintenanceCategory,
    pub priority: MaintenancePriority,
    pub status: MaintenanceStatus,
    pub notes: Option<String>,
    pub photos: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMaintenanceRequest {
    pub property_id: Uuid,
    pub title: String,
    pub description: String,
    pub category: MaintenanceCategory,
    pub priority: Option<MaintenancePriority>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMaintenanceRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<MaintenanceCategory>,
    pub priority: Option<MaintenancePriority>,
    pub status: Option<MaintenanceStatus>,
    pub notes: Option<String>,
}

impl UpdateMaintenanceRequest {
    /// True when the payload touches a field the mask does not allow.
    pub fn violates_mask(&self, mask: &MaintenanceFieldMask) -> bool {
        (self.title.is_some() && !mask.title)
            || (self.description.is_some() && !mask.description)
            || (self.category.is_some() && !mask.category)
            || (self.priority.is_some() && !mask.priority)
            || (self.status.is_some() && !mask.status)
            || (self.notes.is_some() && !mask.notes)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignMaintenanceRequest {
    pub manager_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct MaintenanceQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub property_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_mask_is_description_only() {
        let mask = update_mask_for_role(&UserRole::Tenant);
        assert!(mask.description);
        assert!(!mask.title);
        assert!(!mask.status);
        assert!(!mask.priority);
        assert!(!mask.notes);
    }

    #[test]
    fn test_manager_mask() {
        let mask = update_mask_for_role(&UserRole::Manager);
        assert!(mask.status);
        assert!(mask.priority);
        assert!(mask.notes);
        assert!(!mask.title);
        assert!(!mask.description);
    }

    #[test]
    fn test_landlord_mask_is_full() {
        assert_eq!(update_mask_for_role(&UserRole::Landlord), MaintenanceFieldMask::ALL);
        assert_eq!(update_mask_for_role(&UserRole::Admin), MaintenanceFieldMask::ALL);
    }

    #[test]
    fn test_violates_mask() {
        let tenant_mask = update_mask_for_role(&UserRole::Tenant);

        let description_only = UpdateMaintenanceRequest {
            title: None,
            description: Some("The leak got worse".to_string()),
            category: None,
            priority: None,
            status: None,
            notes: None,
        };
        assert!(!description_only.violates_mask(&tenant_mask));

        let status_change = UpdateMaintenanceRequest {
            title: None,
            description: None,
            category: None,
            priority: None,
            status: Some(MaintenanceStatus::Completed),
            notes: None,
        };
        assert!(status_change.violates_mask(&tenant_mask));
        assert!(!status_change.violates_mask(&update_mask_for_role(&UserRole::Manager)));
    }
}
