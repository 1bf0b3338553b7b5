//! Record status shared by the remote store and the reviewer workflow

/// Lifecycle status of a submitted application
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    serde::Serialize,
    serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    /// Submitted and waiting for a reviewer
    #[default]
    Pending,
    /// Sent back to the applicant for corrections
    UnderReview,
    Approved,
    Rejected,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::UnderReview => "under_review",
            RecordStatus::Approved => "approved",
            RecordStatus::Rejected => "rejected",
        }
    }

    /// Whether applicant corrections are accepted in this status
    pub fn accepts_corrections(&self) -> bool {
        matches!(self, RecordStatus::UnderReview)
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(RecordStatus::Pending),
            "under_review" | "review" => Ok(RecordStatus::UnderReview),
            "approved" => Ok(RecordStatus::Approved),
            "rejected" => Ok(RecordStatus::Rejected),
            _ => Err(format!("Unknown status: {}", s)),
        }
    }
}
