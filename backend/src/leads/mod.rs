// Lead intake pipeline: canonical field extraction, scoring, and the
// deduplicating repository over (workspace_id, email).

pub mod extractor;
pub mod repository;
pub mod scoring;

pub use extractor::{extract, CanonicalFields, ExtractedSubmission};
pub use repository::{FindOrCreateOutcome, LeadRepository, ManualLead, SourceMeta};
