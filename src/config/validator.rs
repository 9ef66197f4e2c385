//! Configuration validation.
//!
//! Checks declared entities for consistency before anything is planned:
//! unique names and ids, well-formed ranges, locations and ports, and
//! resolvable references.

use crate::api::codec::ResourceLocation;
use crate::error::{BowtieError, ConfigError, Result};
use ipnetwork::IpNetwork;
use reqwest::Url;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use tracing::debug;

use super::spec::{
    BowtieConfig, DnsBlockListConfig, DnsConfig, ResourceConfig, ResourceGroupConfig, SiteConfig,
};

/// Validator for declared configurations.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ValidationResult {
    fn error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a configuration.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, config: &BowtieConfig) -> Result<ValidationResult> {
        let mut result = ValidationResult::default();

        Self::validate_host(config, &mut result);
        Self::validate_ids(config, &mut result);
        Self::validate_sites(&config.sites, &mut result);
        Self::validate_dns(config, &config.dns, &mut result);
        Self::validate_dns_block_lists(&config.dns_block_lists, &mut result);
        Self::validate_groups(config, &mut result);
        Self::validate_resources(&config.resources, &mut result);
        Self::validate_resource_groups(config, &config.resource_groups, &mut result);

        if result.errors.is_empty() {
            debug!(
                "Configuration validation passed with {} warning(s)",
                result.warnings.len()
            );
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(BowtieError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    fn validate_host(config: &BowtieConfig, result: &mut ValidationResult) {
        if let Some(host) = &config.host {
            if !(host.starts_with("http://") || host.starts_with("https://")) {
                result.error("host", format!("Host '{host}' must start with http:// or https://"));
            }
        }
    }

    /// Explicit ids must be unique across every entity kind.
    fn validate_ids(config: &BowtieConfig, result: &mut ValidationResult) {
        let mut claims: Vec<(&str, String)> = Vec::new();
        for site in &config.sites {
            if let Some(id) = &site.id {
                claims.push((id, format!("site '{}'", site.name)));
            }
            for range in &site.ranges {
                if let Some(id) = &range.id {
                    claims.push((id, format!("site '{}' range '{}'", site.name, range.name)));
                }
            }
        }
        for dns in &config.dns {
            if let Some(id) = &dns.id {
                claims.push((id, format!("dns '{}'", dns.name)));
            }
        }
        for list in &config.dns_block_lists {
            if let Some(id) = &list.id {
                claims.push((id, format!("dns block list '{}'", list.name)));
            }
        }
        for group in &config.groups {
            if let Some(id) = &group.id {
                claims.push((id, format!("group '{}'", group.name)));
            }
        }
        for resource in &config.resources {
            if let Some(id) = &resource.id {
                claims.push((id, format!("resource '{}'", resource.name)));
            }
        }
        for group in &config.resource_groups {
            if let Some(id) = &group.id {
                claims.push((id, format!("resource group '{}'", group.name)));
            }
        }

        let mut seen: HashMap<&str, String> = HashMap::new();
        for (id, owner) in claims {
            if id.is_empty() {
                result.error(format!("{owner}.id"), "Explicit id cannot be empty");
            } else if let Some(first) = seen.get(id) {
                result.error(
                    format!("{owner}.id"),
                    format!("Id '{id}' is already used by {first}"),
                );
            } else {
                seen.insert(id, owner);
            }
        }
    }

    fn validate_sites(sites: &[SiteConfig], result: &mut ValidationResult) {
        check_names("sites", sites.iter().map(|s| s.name.as_str()), result);

        for (i, site) in sites.iter().enumerate() {
            let prefix = format!("sites[{i}]");
            check_names(
                &format!("{prefix}.ranges"),
                site.ranges.iter().map(|r| r.name.as_str()),
                result,
            );

            for (j, range) in site.ranges.iter().enumerate() {
                let field = format!("{prefix}.ranges[{j}]");
                let v4 = range.ipv4_range.as_deref().filter(|s| !s.is_empty());
                let v6 = range.ipv6_range.as_deref().filter(|s| !s.is_empty());
                match (v4, v6) {
                    (Some(_), Some(_)) => result.error(
                        &field,
                        "Only one of ipv4_range and ipv6_range may be set",
                    ),
                    (None, None) => {
                        result.error(&field, "One of ipv4_range or ipv6_range is required");
                    }
                    (Some(cidr), None) => {
                        if !is_valid_cidr(cidr, true) {
                            result.error(
                                format!("{field}.ipv4_range"),
                                format!("'{cidr}' is not an IPv4 CIDR"),
                            );
                        }
                    }
                    (None, Some(cidr)) => {
                        if !is_valid_cidr(cidr, false) {
                            result.error(
                                format!("{field}.ipv6_range"),
                                format!("'{cidr}' is not an IPv6 CIDR"),
                            );
                        }
                    }
                }
            }
        }
    }

    fn validate_dns(config: &BowtieConfig, dns: &[DnsConfig], result: &mut ValidationResult) {
        check_names("dns", dns.iter().map(|d| d.name.as_str()), result);
        let site_names: HashSet<&str> = config.sites.iter().map(|s| s.name.as_str()).collect();

        for (i, policy) in dns.iter().enumerate() {
            let prefix = format!("dns[{i}]");

            for (j, server) in policy.servers.iter().enumerate() {
                if server.parse::<IpAddr>().is_err() {
                    result.error(
                        format!("{prefix}.servers[{j}]"),
                        format!("'{server}' is not an IP address"),
                    );
                }
            }
            warn_duplicates(&format!("{prefix}.servers"), &policy.servers, result);
            warn_duplicates(&format!("{prefix}.excludes"), &policy.excludes, result);

            for site in &policy.include_only_sites {
                if !site_names.contains(site.as_str()) {
                    result.warn(format!(
                        "{prefix}.include_only_sites: '{site}' is not a declared site, using it as an id"
                    ));
                }
            }

            if policy.servers.is_empty() && !policy.is_drop_all {
                result.warn(format!("{prefix}: DNS '{}' has no servers", policy.name));
            }
        }
    }

    fn validate_dns_block_lists(lists: &[DnsBlockListConfig], result: &mut ValidationResult) {
        check_names("dns_block_lists", lists.iter().map(|l| l.name.as_str()), result);

        for (i, list) in lists.iter().enumerate() {
            let prefix = format!("dns_block_lists[{i}]");

            let is_http = Url::parse(&list.upstream)
                .is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host());
            if !is_http {
                result.error(
                    format!("{prefix}.upstream"),
                    format!("Upstream '{}' must be an http:// or https:// URL", list.upstream),
                );
            }

            if list.override_to_allow.iter().any(String::is_empty) {
                result.error(
                    format!("{prefix}.override_to_allow"),
                    "Allowed names cannot be empty",
                );
            }
            warn_duplicates(
                &format!("{prefix}.override_to_allow"),
                &list.override_to_allow,
                result,
            );
        }
    }

    fn validate_groups(config: &BowtieConfig, result: &mut ValidationResult) {
        check_names("groups", config.groups.iter().map(|g| g.name.as_str()), result);

        for (i, group) in config.groups.iter().enumerate() {
            if let Some(users) = &group.users {
                if users.iter().any(String::is_empty) {
                    result.error(format!("groups[{i}].users"), "User ids cannot be empty");
                }
            }
        }
    }

    fn validate_resources(resources: &[ResourceConfig], result: &mut ValidationResult) {
        check_names("resources", resources.iter().map(|r| r.name.as_str()), result);

        for (i, resource) in resources.iter().enumerate() {
            let prefix = format!("resources[{i}]");

            if resource.protocol.is_empty() {
                result.error(format!("{prefix}.protocol"), "Protocol cannot be empty");
            }

            if let Err(e) = ResourceLocation::try_from(&resource.location) {
                result.error(format!("{prefix}.location"), e.to_string());
            }

            if let Some([low, high]) = resource.ports.range {
                if low == 0 || low > high {
                    result.error(
                        format!("{prefix}.ports.range"),
                        ConfigError::InvalidPort {
                            spec: format!("[{low}, {high}]"),
                        }
                        .to_string(),
                    );
                }
                if !resource.ports.collection.is_empty() {
                    result.warn(format!(
                        "{prefix}.ports: both range and collection set, collection is ignored"
                    ));
                }
            } else if resource.ports.collection.contains(&0) {
                result.error(
                    format!("{prefix}.ports.collection"),
                    ConfigError::InvalidPort {
                        spec: String::from("0"),
                    }
                    .to_string(),
                );
            } else if resource.ports.collection.is_empty() {
                result.warn(format!("{prefix}: resource '{}' declares no ports", resource.name));
            }
        }
    }

    fn validate_resource_groups(
        config: &BowtieConfig,
        groups: &[ResourceGroupConfig],
        result: &mut ValidationResult,
    ) {
        check_names("resource_groups", groups.iter().map(|g| g.name.as_str()), result);
        let resource_names: HashSet<&str> =
            config.resources.iter().map(|r| r.name.as_str()).collect();
        let group_names: HashSet<&str> = groups.iter().map(|g| g.name.as_str()).collect();

        for (i, group) in groups.iter().enumerate() {
            let prefix = format!("resource_groups[{i}]");

            for resource in &group.resources {
                if !resource_names.contains(resource.as_str()) {
                    result.warn(format!(
                        "{prefix}.resources: '{resource}' is not a declared resource, using it as an id"
                    ));
                }
            }

            for inherited in &group.inherited {
                if *inherited == group.name {
                    result.error(
                        format!("{prefix}.inherited"),
                        format!("Resource group '{}' cannot inherit itself", group.name),
                    );
                } else if !group_names.contains(inherited.as_str()) {
                    result.warn(format!(
                        "{prefix}.inherited: '{inherited}' is not a declared resource group, using it as an id"
                    ));
                }
            }
        }
    }
}

/// Names must be non-empty and unique within their collection.
fn check_names<'a>(
    field: &str,
    names: impl Iterator<Item = &'a str>,
    result: &mut ValidationResult,
) {
    let mut seen = HashSet::new();
    for (i, name) in names.enumerate() {
        if name.is_empty() {
            result.error(format!("{field}[{i}].name"), "Name cannot be empty");
        } else if !seen.insert(name) {
            result.error(
                format!("{field}[{i}].name"),
                ConfigError::DuplicateName {
                    kind: field.to_string(),
                    name: name.to_string(),
                }
                .to_string(),
            );
        }
    }
}

fn warn_duplicates(field: &str, values: &[String], result: &mut ValidationResult) {
    let mut seen = HashSet::new();
    for value in values {
        if !seen.insert(value) {
            result.warn(format!("{field}: '{value}' is listed more than once"));
        }
    }
}

/// Checks `address/prefix` notation for the given family. A bare address
/// is rejected even though it would parse as a host network.
fn is_valid_cidr(cidr: &str, v4: bool) -> bool {
    cidr.contains('/')
        && cidr
            .parse::<IpNetwork>()
            .is_ok_and(|network| if v4 { network.is_ipv4() } else { network.is_ipv6() })
}
