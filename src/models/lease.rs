use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "lease_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum LeaseStatus {
    Draft,
    Pending,
    Active,
    Expired,
    Terminated,
}

impl Default for LeaseStatus {
    fn default() -> Self {
        Self::Draft
    }
}

/// Which side of the lease a signature belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaseParty {
    Landlord,
    Tenant,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Lease {
    pub id: Uuid,
    pub property_id: Uuid,
    pub landlord_id: Uuid,
    pub tenant_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rent_amount: Decimal,
    pub deposit_amount: Decimal,
    pub payment_due_day: i32,
    pub terms: Option<String>,
    pub status: LeaseStatus,
    pub landlord_signed: bool,
    pub landlord_signature_data: Option<String>,
    pub landlord_signed_at: Option<DateTime<Utc>>,
    pub landlord_signature_ip: Option<String>,
    pub tenant_signed: bool,
    pub tenant_signature_data: Option<String>,
    pub tenant_signed_at: Option<DateTime<Utc>>,
    pub tenant_signature_ip: Option<String>,
    pub document_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_fully_signed(&self) -> bool {
        self.landlord_signed && self.tenant_signed
    }

    pub fn party_of(&self, user_id: Uuid) -> Option<LeaseParty> {
        if user_id == self.landlord_id {
            Some(LeaseParty::Landlord)
        } else if user_id == self.tenant_id {
            Some(LeaseParty::Tenant)
        } else {
            None
        }
    }

    pub fn has_signed(&self, party: LeaseParty) -> bool {
        match party {
            LeaseParty::Landlord => self.landlord_signed,
            LeaseParty::Tenant => self.tenant_signed,
        }
    }
}

/// Status that results from one more signature landing on the lease.
/// Both parties signed means the lease goes live; a single signature
/// moves it out of draft into pending.
pub fn status_after_sign(landlord_signed: bool, tenant_signed: bool) -> LeaseStatus {
    if landlord_signed && tenant_signed {
        LeaseStatus::Active
    } else {
        LeaseStatus::Pending
    }
}

/// Termination is allowed from any state except terminated itself; a
/// draft or pending agreement is simply cancelled.
pub fn can_terminate(status: &LeaseStatus) -> bool {
    !matches!(status, LeaseStatus::Terminated)
}

/// Inclusive date-range intersection check used for the duplicate-lease guard.
pub fn ranges_overlap(
    existing_start: NaiveDate,
    existing_end: NaiveDate,
    new_start: NaiveDate,
    new_end: NaiveDate,
) -> bool {
    existing_start <= new_end && existing_end >= new_start
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaseSignature {
    pub signed: bool,
    pub signed_at: Option<DateTime<Utc>>,
    pub ip_address: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LeaseResponse {
    pub id: Uuid,
    pub property_id: Uuid,
    pub property_title: Option<String>,
    pub property_address: Option<String>,
    pub landlord_id: Uuid,
    pub landlord_name: Option<String>,
    pub tenant_id: Uuid,
    pub tenant_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rent_amount: Decimal,
    pub deposit_amount: Decimal,
    pub payment_due_day: i32,
    pub terms: Option<String>,
    pub status: LeaseStatus,
    pub landlord_signature: LeaseSignature,
    pub tenant_signature: LeaseSignature,
    pub is_fully_signed: bool,
    pub document_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLeaseRequest {
    pub property_id: Uuid,
    pub tenant_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rent_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub payment_due_day: i32,
    pub terms: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLeaseRequest {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub rent_amount: Option<Decimal>,
    pub deposit_amount: Option<Decimal>,
    pub payment_due_day: Option<i32>,
    pub terms: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SignLeaseRequest {
    /// Base64 data URL of the drawn signature image.
    pub signature_data: String,
}

#[derive(Debug, Deserialize, ToSchema, utoipa::IntoParams)]
pub struct LeasesQuery {
    pub status: Option<String>,
    pub property_id: Option<Uuid>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ranges_overlap() {
        // Contained
        assert!(ranges_overlap(
            date(2024, 1, 1),
            date(2024, 12, 31),
            date(2024, 3, 1),
            date(2024, 6, 30)
        ));
        // Partial overlap at the tail
        assert!(ranges_overlap(
            date(2024, 1, 1),
            date(2024, 6, 30),
            date(2024, 6, 1),
            date(2025, 5, 31)
        ));
        // Touching endpoints count as overlap
        assert!(ranges_overlap(
            date(2024, 1, 1),
            date(2024, 6, 30),
            date(2024, 6, 30),
            date(2025, 6, 29)
        ));
        // Disjoint
        assert!(!ranges_overlap(
            date(2024, 1, 1),
            date(2024, 6, 30),
            date(2024, 7, 1),
            date(2025, 6, 30)
        ));
        assert!(!ranges_overlap(
            date(2025, 1, 1),
            date(2025, 12, 31),
            date(2024, 1, 1),
            date(2024, 12, 31)
        ));
    }

    #[test]
    fn test_status_after_sign() {
        assert_eq!(status_after_sign(true, false), LeaseStatus::Pending);
        assert_eq!(status_after_sign(false, true), LeaseStatus::Pending);
        assert_eq!(status_after_sign(true, true), LeaseStatus::Active);
    }

    #[test]
    fn test_can_terminate() {
        assert!(can_terminate(&LeaseStatus::Draft));
        assert!(can_terminate(&LeaseStatus::Pending));
        assert!(can_terminate(&LeaseStatus::Active));
        assert!(can_terminate(&LeaseStatus::Expired));
        assert!(!can_terminate(&LeaseStatus::Terminated));
    }

    #[test]
    fn test_party_and_signed_state() {
        let landlord = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let lease = Lease {
            id: Uuid::new_v4(),
            property_id: Uuid::new_v4(),
            landlord_id: landlord,
            tenant_id: tenant,
            start_date: date(2024, 1, 1),
            end_date: date(2024, 12, 31),
            rent_amount: Decimal::new(150000, 2),
            deposit_amount: Decimal::new(150000, 2),
            payment_due_day: 1,
            terms: None,
            status: LeaseStatus::Pending,
            landlord_signed: true,
            landlord_signature_data: Some("data:image/png;base64,...".to_string()),
            landlord_signed_at: Some(Utc::now()),
            landlord_signature_ip: Some("127.0.0.1".to_string()),
            tenant_signed: false,
            tenant_signature_data: None,
            tenant_signed_at: None,
            tenant_signature_ip: None,
            document_url: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(lease.party_of(landlord), Some(LeaseParty::Landlord));
        assert_eq!(lease.party_of(tenant), Some(LeaseParty::Tenant));
        assert_eq!(lease.party_of(Uuid::new_v4()), None);
        assert!(lease.has_signed(LeaseParty::Landlord));
        assert!(!lease.has_signed(LeaseParty::Tenant));
        assert!(!lease.is_fully_signed());
    }
}
