use super::ServiceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client sign-off state for a service. One record per service.
///
/// `approved` and `revision_requested` are never both set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Approval {
    pub service_id: ServiceId,
    pub approved: bool,
    pub revision_requested: bool,
    pub client_note: Option<String>,
    /// Whether a preview deliverable existed when approval was last requested.
    pub has_preview: bool,
    pub approved_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Approval {
    pub fn requested(service_id: ServiceId, has_preview: bool, now: DateTime<Utc>) -> Self {
        Self {
            service_id,
            approved: false,
            revision_requested: false,
            client_note: None,
            has_preview,
            approved_at: None,
            updated_at: now,
        }
    }

    /// Refreshes the preview snapshot when approval is requested again.
    pub fn rerequest(&mut self, has_preview: bool, now: DateTime<Utc>) {
        self.has_preview = has_preview;
        self.updated_at = now;
    }

    pub fn approve(&mut self, note: Option<String>, now: DateTime<Utc>) {
        self.approved = true;
        self.approved_at = Some(now);
        self.revision_requested = false;
        self.client_note = note;
        self.updated_at = now;
    }

    pub fn request_revision(&mut self, note: Option<String>, now: DateTime<Utc>) {
        self.revision_requested = true;
        self.approved = false;
        self.approved_at = None;
        self.client_note = note;
        self.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_approve_and_revise_are_exclusive() {
        let now = Utc::now();
        let mut approval = Approval::requested(Uuid::new_v4(), true, now);
        assert!(!approval.approved && !approval.revision_requested);

        approval.request_revision(Some("darker logo".to_string()), now);
        assert!(approval.revision_requested);
        assert!(!approval.approved);

        approval.approve(None, now);
        assert!(approval.approved);
        assert!(!approval.revision_requested);
        assert_eq!(approval.approved_at, Some(now));

        approval.request_revision(None, now);
        assert!(!approval.approved);
        assert!(approval.approved_at.is_none());
    }

    #[test]
    fn test_approve_twice_reasserts() {
        let now = Utc::now();
        let mut approval = Approval::requested(Uuid::new_v4(), false, now);
        approval.approve(Some("great".to_string()), now);
        let first = approval.clone();
        approval.approve(Some("great".to_string()), now);
        assert_eq!(approval, first);
    }

    #[test]
    fn test_rerequest_keeps_decision() {
        let now = Utc::now();
        let mut approval = Approval::requested(Uuid::new_v4(), false, now);
        approval.request_revision(Some("again".to_string()), now);
        approval.rerequest(true, now);
        assert!(approval.has_preview);
        assert!(approval.revision_requested);
        assert_eq!(approval.client_note.as_deref(), Some("again"));
    }
}
