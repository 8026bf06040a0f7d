//! Test suites for the graft daemon.

pub(crate) mod support;
