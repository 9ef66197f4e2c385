//! Configuration module.
//!
//! This module handles all configuration-related functionality:
//! - Parsing and deserializing `bowtie.yaml`
//! - Environment overrides and credentials
//! - Validation of declared entities
//! - Hashing for change detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use hash::ConfigHasher;
pub use parser::{
    ConfigParser, DEFAULT_CONFIG_FILES, ENV_HOST, ENV_PASSWORD, ENV_STATE_PATH, ENV_USERNAME,
    apply_overrides, find_config_file,
};
pub use spec::{
    BowtieConfig, DEFAULT_STATE_PATH, DnsBlockListConfig, DnsConfig, GroupConfig, PortsSpec, ResourceConfig,
    ResourceGroupConfig, SiteConfig, SiteRangeConfig, StateConfig,
};
pub use validator::{ConfigValidator, ValidationError, ValidationResult};
