//! PGDAS-D filing core: activity classification, declaration assembly,
//! SERPRO transmission and the audit store around it.

pub mod activity;
pub mod archive;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod declaration;
pub mod error;
pub mod pipeline;
pub mod sources;
pub mod store;
pub mod telemetry;
pub mod transmission;
pub mod transport;
