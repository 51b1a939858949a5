//! `bpgate-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, aggregate traits, the injected clock and
//! pagination types shared by every layer.

pub mod aggregate;
pub mod clock;
pub mod error;
pub mod id;
pub mod page;
pub mod value_object;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{Bpnl, ExternalId, RelationId, SharingStateId, TenantBpnl};
pub use page::{Page, PageRequest};
pub use value_object::ValueObject;
