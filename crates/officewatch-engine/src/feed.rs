//! Pluggable candidate sources for the background scan path.
//!
//! A [`CandidateSource`] is the seam between "some external signal says
//! the org is paying for X" and the merge resolver. The shipped
//! [`SimulatedFeed`] stands in for a mailbox-provider integration; a real
//! one can replace it without touching the resolver.

use rand::Rng;

use crate::detect::CandidateFact;

/// Produces candidate subscription facts from an external signal.
pub trait CandidateSource: Send + Sync {
    /// Pull the current batch of candidates. An empty batch is a valid,
    /// non-error outcome.
    fn pull(&self) -> Vec<CandidateFact>;
}

/// Plausible app/cost/category tuples the simulated feed draws from.
const CATALOG: &[(&str, f64, &str)] = &[
    ("Dropbox", 11.99, "Storage"),
    ("Canva", 12.99, "Design"),
    ("Zoom", 14.99, "Communication"),
    ("Grammarly", 12.00, "Productivity"),
    ("Mailchimp", 13.00, "Marketing"),
    ("Asana", 10.99, "Productivity"),
];

/// Simulated email-scan feed: each pull "discovers" one random catalog
/// entry, as if a billing email had been spotted in the user's inbox.
#[derive(Debug, Default, Clone, Copy)]
pub struct SimulatedFeed;

impl CandidateSource for SimulatedFeed {
    fn pull(&self) -> Vec<CandidateFact> {
        let mut rng = rand::thread_rng();
        let (name, cost, category) = CATALOG[rng.gen_range(0..CATALOG.len())];
        vec![CandidateFact {
            name: name.to_string(),
            cost,
            category: category.to_string(),
        }]
    }
}

// ── tests ────────────────────────────────────────────────────────────
