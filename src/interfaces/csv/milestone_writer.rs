use crate::domain::milestone::{Milestone, MilestoneStatus};
use crate::domain::service::{Service, ServiceStatus};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

/// One line of the milestone report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MilestoneRow {
    pub shop: String,
    pub order: String,
    pub service_status: ServiceStatus,
    pub sequence: u32,
    pub amount: Decimal,
    pub status: MilestoneStatus,
    pub payment_ref: String,
}

impl MilestoneRow {
    pub fn new(shop: &str, service: &Service, milestone: &Milestone) -> Self {
        Self {
            shop: shop.to_string(),
            order: service.order_id.clone(),
            service_status: service.status,
            sequence: milestone.sequence,
            amount: milestone.amount,
            status: milestone.status,
            payment_ref: milestone
                .payment
                .as_ref()
                .map(|p| p.reference.clone())
                .unwrap_or_default(),
        }
    }
}

/// Writes milestone rows as CSV, header first.
pub struct MilestoneWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> MilestoneWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_rows(&mut self, rows: impl IntoIterator<Item = MilestoneRow>) -> Result<()> {
        let mut wrote = false;
        for row in rows {
            self.writer.serialize(row)?;
            wrote = true;
        }
        if !wrote {
            // serialize() emits the header with the first row only.
            self.writer.write_record(HEADER)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

const HEADER: [&str; 7] = [
    "shop",
    "order",
    "service_status",
    "sequence",
    "amount",
    "status",
    "payment_ref",
];

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn row(sequence: u32, status: MilestoneStatus, payment_ref: &str) -> MilestoneRow {
        MilestoneRow {
            shop: "demo.example.com".to_string(),
            order: "1001".to_string(),
            service_status: ServiceStatus::Booked,
            sequence,
            amount: dec!(60.00),
            status,
            payment_ref: payment_ref.to_string(),
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let mut out = Vec::new();
        MilestoneWriter::new(&mut out)
            .write_rows(vec![
                row(0, MilestoneStatus::Paid, ""),
                row(1, MilestoneStatus::Unpaid, "gid://platform/DraftOrder/1"),
            ])
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "shop,order,service_status,sequence,amount,status,payment_ref");
        assert_eq!(lines[1], "demo.example.com,1001,Booked,0,60.00,paid,");
        assert_eq!(lines[2], "demo.example.com,1001,Booked,1,60.00,unpaid,gid://platform/DraftOrder/1");
    }

    #[test]
    fn test_empty_report_still_has_header() {
        let mut out = Vec::new();
        MilestoneWriter::new(&mut out).write_rows(Vec::new()).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            "shop,order,service_status,sequence,amount,status,payment_ref"
        );
    }
}
