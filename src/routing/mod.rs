//! Query classification and per-class admission control.

mod admission;
mod router;


pub use admission::{
    AdmissionConfig, AdmissionController, AdmissionError, AdmissionStats, AdmissionTicket,
    MAX_COMPLEX_LIMIT, MAX_SIMPLE_LIMIT, SlotStats,
};
pub use router::{
    COMPLEX_PATTERNS, FALLBACK_COMPLEX_CHARS, Provenance, RouteClass, RouteDecision, Router,
    RouterStats, SIMPLE_PATTERNS,
};
