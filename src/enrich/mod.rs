//! Background enrichment — non-blocking side work triggered by turns.
//!
//! Two independent task kinds: intel capture (visitor questions and
//! objections as signals) and schema normalization (rebuilding the lead
//! profile from all answers so far). Both run on a worker decoupled from
//! the turn's request/response lifecycle, with their own error boundary:
//! failures are logged and swallowed, never surfaced to the visitor.

mod intel;
mod profile;
mod worker;

pub use intel::{IntelItem, IntelKind};
pub use profile::{LeadProfile, LeadProfileDocument};
pub use worker::{EnrichmentQueue, EnrichmentTask};
