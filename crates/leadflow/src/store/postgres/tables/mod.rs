//! Per-table Postgres repositories.

pub mod events;
pub mod flows;
pub mod jobs;
pub mod leads;
pub mod steps;
