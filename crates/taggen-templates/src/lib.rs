//! Equipment templates for tag generation
//!
//! A template is a named list of members. Instantiating a template under a
//! name prefix yields one point per member, plus trend and alarm records for
//! the members that opt in. This crate only holds the definitions; expansion
//! lives in the `taggen` crate and takes a registry by reference.
//!
//! # Example
//!
//! ```yaml
//! Pump_Basic:
//!   description: Basic pump
//!   members:
//!     - suffix: .Run
//!       type: DIGITAL
//!       address_offset: .RunStatus
//!       comment_template: "{parent_desc} Run Status"
//!       is_trend: true
//!     - suffix: .Fault
//!       type: DIGITAL
//!       address_offset: .Fault
//!       comment_template: "{parent_desc} Fault"
//!       is_alarm: true
//!       alarm_category: ALM_CRIT
//! ```

mod definition;
mod error;
mod registry;

pub use definition::{TemplateDefinition, TemplateMember, PARENT_DESC_PLACEHOLDER};
pub use error::TemplateError;
pub use registry::TemplateRegistry;
