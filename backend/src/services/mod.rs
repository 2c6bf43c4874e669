pub mod email;
pub mod enrichment;

pub use email::{render_merge_tags, EmailService};
pub use enrichment::EnrichmentService;
