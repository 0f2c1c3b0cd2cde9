use super::{MilestoneId, ServiceId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MilestoneStatus {
    Unpaid,
    Locked,
    Paid,
}

/// Reference to the external payment request created for a milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub reference: String,
    pub redirect_url: String,
}

/// One scheduled partial payment of a service.
///
/// Sequences are dense and 0-based: 0 is the deposit collected with the
/// original order, the highest sequence is the final milestone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: MilestoneId,
    pub service_id: ServiceId,
    pub sequence: u32,
    pub amount: Decimal,
    pub status: MilestoneStatus,
    pub payment: Option<PaymentLink>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Milestone {
    /// Builds the milestone row for position `sequence` of a freshly booked
    /// service: the deposit is already paid, the final one starts locked.
    pub fn scheduled(
        service_id: ServiceId,
        sequence: u32,
        amount: Decimal,
        is_final: bool,
        now: DateTime<Utc>,
    ) -> Self {
        let (status, paid_at) = if sequence == 0 {
            (MilestoneStatus::Paid, Some(now))
        } else if is_final {
            (MilestoneStatus::Locked, None)
        } else {
            (MilestoneStatus::Unpaid, None)
        };

        Self {
            id: Uuid::new_v4(),
            service_id,
            sequence,
            amount,
            status,
            payment: None,
            paid_at,
            created_at: now,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == MilestoneStatus::Paid
    }

    /// `locked -> unpaid`; a no-op in any other state.
    pub fn unlock(&mut self) -> bool {
        if self.status == MilestoneStatus::Locked {
            self.status = MilestoneStatus::Unpaid;
            true
        } else {
            false
        }
    }

    pub fn mark_paid(&mut self, at: DateTime<Utc>) {
        self.status = MilestoneStatus::Paid;
        self.paid_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_scheduled_statuses() {
        let now = Utc::now();
        let service = Uuid::new_v4();

        let deposit = Milestone::scheduled(service, 0, dec!(50), false, now);
        assert_eq!(deposit.status, MilestoneStatus::Paid);
        assert_eq!(deposit.paid_at, Some(now));

        let middle = Milestone::scheduled(service, 1, dec!(25), false, now);
        assert_eq!(middle.status, MilestoneStatus::Unpaid);
        assert!(middle.paid_at.is_none());

        let last = Milestone::scheduled(service, 2, dec!(25), true, now);
        assert_eq!(last.status, MilestoneStatus::Locked);
    }

    #[test]
    fn test_single_entry_template_is_a_paid_deposit() {
        let m = Milestone::scheduled(Uuid::new_v4(), 0, dec!(100), true, Utc::now());
        assert!(m.is_paid());
    }

    #[test]
    fn test_unlock_is_idempotent() {
        let mut m = Milestone::scheduled(Uuid::new_v4(), 1, dec!(10), true, Utc::now());
        assert!(m.unlock());
        assert_eq!(m.status, MilestoneStatus::Unpaid);
        assert!(!m.unlock());
        assert_eq!(m.status, MilestoneStatus::Unpaid);

        m.mark_paid(Utc::now());
        assert!(!m.unlock());
        assert!(m.is_paid());
    }
}
