//! Domain layer: records, value objects, pure workflow rules, and the ports
//! the application layer talks to.

pub mod approval;
pub mod audit;
pub mod calculator;
pub mod deliverable;
pub mod ledger;
pub mod milestone;
pub mod money;
pub mod portal;
pub mod ports;
pub mod service;
pub mod shop;
pub mod template;

pub type ShopId = uuid::Uuid;
pub type ServiceId = uuid::Uuid;
pub type MilestoneId = uuid::Uuid;
