//! Loyalty ledger domain types.
//!
//! Plain data carried between the accrual engine and `LedgerStore`
//! implementations. None of these types perform I/O.

use std::fmt;

use uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Membership level governing payout rates.
///
/// Tiers are owned by the external billing flow and stored as lowercase
/// labels. Labels this crate does not know are preserved in `Other` and pay
/// nothing rather than failing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MembershipTier {
    Free,
    Paid,
    Gold,
    Supporter,
    Other(String),
}

impl MembershipTier {
    /// Parse a stored tier label. Matching is case-insensitive.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "free" => Self::Free,
            "paid" => Self::Paid,
            "gold" => Self::Gold,
            "supporter" => Self::Supporter,
            _ => Self::Other(label.trim().to_string()),
        }
    }

    /// Label used when persisting the tier.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
            Self::Gold => "gold",
            Self::Supporter => "supporter",
            Self::Other(label) => label,
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's loyalty state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub membership_tier: MembershipTier,
    pub balance: u64,
    pub created_at: Timestamp,
    pub last_recurring_award_at: Option<Timestamp>,
}

impl Account {
    /// New account with a zero balance and no recurring award yet.
    pub fn new(id: Uuid, membership_tier: MembershipTier, created_at: Timestamp) -> Self {
        Self {
            id,
            membership_tier,
            balance: 0,
            created_at,
            last_recurring_award_at: None,
        }
    }

    /// Timestamp the next recurring eligibility window is measured from.
    pub fn recurring_anchor(&self) -> Timestamp {
        self.last_recurring_award_at.unwrap_or(self.created_at)
    }
}

/// A unit of user-generated content eligible for a one-time award.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishableItem {
    pub id: Uuid,
    pub owner_account_id: Uuid,
    pub is_public: bool,
    pub points_awarded: bool,
}

impl PublishableItem {
    /// New private, unpaid item.
    pub fn new(id: Uuid, owner_account_id: Uuid) -> Self {
        Self {
            id,
            owner_account_id,
            is_public: false,
            points_awarded: false,
        }
    }
}

/// Why points were credited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwardKind {
    Recurring,
    Publication,
}

impl AwardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recurring => "recurring",
            Self::Publication => "publication",
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "recurring" => Some(Self::Recurring),
            "publication" => Some(Self::Publication),
            _ => None,
        }
    }
}

/// Audit log entry written in the same transaction as every credit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwardRecord {
    pub account_id: Uuid,
    pub kind: AwardKind,
    /// Set for publication awards only.
    pub item_id: Option<Uuid>,
    pub points: u64,
    pub awarded_at: Timestamp,
}
