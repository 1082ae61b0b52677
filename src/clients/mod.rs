//! Thin clients for the external services the worker consumes.
//!
//! Every service sits behind a trait so jobs can be exercised against stubs;
//! the HTTP implementations are blocking and are always dispatched off the
//! event loop via `spawn_blocking`.

pub mod clingen;
pub mod clinvar;
pub mod gnomad;
pub mod publications;
pub mod vrs;

use std::sync::Arc;

use crate::identifiers::PublicationClients;

/// Bundle of all external service clients, owned by the application context.
#[derive(Clone)]
pub struct ExternalClients {
    pub vrs: Arc<dyn vrs::VrsMapperClient>,
    pub clingen: Arc<dyn clingen::ClinGenClient>,
    pub clinvar: Arc<dyn clinvar::ClinVarArchiveClient>,
    pub gnomad: Arc<dyn gnomad::GnomadSourceClient>,
    pub publications: PublicationClients,
}
