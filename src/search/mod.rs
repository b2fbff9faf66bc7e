//! Fan-out coordination: one concurrent unit of work per provider, joined into a single report.

pub(crate) mod engine;
