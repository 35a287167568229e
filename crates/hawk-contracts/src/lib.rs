//! Shared, version-pinned report identifiers.
//!
//! These constants are the single source of truth for schema/version strings that
//! appear in machine-readable output of the `hawk` tool.

pub const HAWK_REGRESS_REPORT_SCHEMA_VERSION: &str = "hawk.regress.report@0.1.0";
pub const HAWK_RUN_REPORT_SCHEMA_VERSION: &str = "hawk.run.report@0.1.0";
pub const HAWK_CLEAN_REPORT_SCHEMA_VERSION: &str = "hawk.clean.report@0.1.0";

pub const HAWK_TOOLCHAIN_CONFIG_FILE: &str = "hawk.json";
