//! Remote registration record as held by the document store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::entity::RecordStatus;
use crate::entities::application::ApplicationDraft;

/// A submitted application and its review metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: String,

    /// Section data (identity, address, employment, documents)
    #[serde(flatten)]
    pub data: ApplicationDraft,

    #[serde(default)]
    pub status: RecordStatus,

    /// One-time correction code as held by the store
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_code: Option<String>,

    #[serde(default)]
    pub security_code_used: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_code_expiry: Option<DateTime<Utc>>,

    /// Reviewer note explaining what needs correcting
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_note: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteRecord {
    /// A freshly submitted record in `pending` status
    pub fn new(id: impl Into<String>, data: ApplicationDraft, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            data,
            status: RecordStatus::Pending,
            security_code: None,
            security_code_used: false,
            security_code_expiry: None,
            review_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The correction code has already been redeemed
    pub fn code_redeemed(&self) -> bool {
        self.security_code_used
    }

    /// The correction code is past its expiry (a missing expiry never expires)
    pub fn code_expired(&self, now: DateTime<Utc>) -> bool {
        self.security_code_expiry.is_some_and(|expiry| expiry < now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_record_serializes_sections_at_top_level() {
        let mut data = ApplicationDraft::default();
        data.identity.insert("firstName".into(), json!("Awa"));
        let now = Utc::now();
        let record = RemoteRecord::new("APP-1", data, now);

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["identity"]["firstName"], json!("Awa"));
        assert_eq!(value["status"], json!("pending"));
        assert_eq!(value["securityCodeUsed"], json!(false));
        assert!(value.get("securityCode").is_none());

        let back: RemoteRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_code_expiry() {
        let now = Utc::now();
        let mut record = RemoteRecord::new("APP-1", ApplicationDraft::default(), now);
        assert!(!record.code_expired(now));

        record.security_code_expiry = Some(now - Duration::minutes(1));
        assert!(record.code_expired(now));

        record.security_code_expiry = Some(now + Duration::hours(1));
        assert!(!record.code_expired(now));
    }
}
