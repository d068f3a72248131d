//! Reverse DNS Module
//!
//! This module maps the source IPs of SPF failures back to hostnames. Lookups are
//! blocking, performed once per distinct IP at report time, and never cached
//! across runs.
use crate::aggregate::FailureAggregate;
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::system_conf::read_system_conf;
use hickory_resolver::Resolver;
use log::{debug, warn};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::net::IpAddr;
use std::time::Duration;

/// Shown in place of a hostname whenever no PTR name is available.
pub const NO_REVERSE_DNS: &str = "No reverse DNS found";

/// Outcome of a PTR lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReverseDns {
    Resolved(String),
    /// The address has no PTR record.
    NotFound,
    /// The lookup itself went wrong (timeout, bad address, no resolver).
    Failed(String),
}

impl ReverseDns {
    /// Hostname for display, or [`NO_REVERSE_DNS`].
    pub fn display_name(&self) -> &str {
        match self {
            ReverseDns::Resolved(host) => host,
            ReverseDns::NotFound | ReverseDns::Failed(_) => NO_REVERSE_DNS,
        }
    }
}

impl Serialize for ReverseDns {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

/// Anything that can answer "which host is this IP?".
pub trait ReverseResolver {
    fn reverse(&self, ip: &str) -> ReverseDns;
}

/// Blocking resolver configured from the operating system (`/etc/resolv.conf`).
pub struct SystemResolver {
    resolver: Resolver,
}

impl SystemResolver {
    /// Builds a resolver from the system configuration with a per-query `timeout`.
    pub fn new(timeout: Duration) -> std::io::Result<Self> {
        let (config, mut opts) = read_system_conf()?;
        opts.timeout = timeout;
        let resolver = Resolver::new(config, opts)?;
        Ok(Self { resolver })
    }
}

impl ReverseResolver for SystemResolver {
    fn reverse(&self, ip: &str) -> ReverseDns {
        let addr: IpAddr = match ip.trim().parse() {
            Ok(addr) => addr,
            Err(_) => return ReverseDns::Failed(format!("'{}' is not an IP address", ip)),
        };
        match self.resolver.reverse_lookup(addr) {
            Ok(lookup) => match lookup.iter().next() {
                Some(name) => {
                    ReverseDns::Resolved(name.to_string().trim_end_matches('.').to_string())
                }
                None => ReverseDns::NotFound,
            },
            Err(e) => classify_lookup_error(&e),
        }
    }
}

/// An answer without PTR records means "no name"; anything else is a failed lookup.
fn classify_lookup_error(error: &ResolveError) -> ReverseDns {
    match error.kind() {
        ResolveErrorKind::NoRecordsFound { .. } => ReverseDns::NotFound,
        _ => ReverseDns::Failed(error.to_string()),
    }
}

/// Stand-in used when the system resolver could not be built.
pub struct UnavailableResolver {
    cause: String,
}

impl UnavailableResolver {
    pub fn new(cause: impl ToString) -> Self {
        Self {
            cause: cause.to_string(),
        }
    }
}

impl ReverseResolver for UnavailableResolver {
    fn reverse(&self, _ip: &str) -> ReverseDns {
        ReverseDns::Failed(self.cause.clone())
    }
}

/// Fixed IP → hostname table. Unknown IPs have no PTR record.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
    names: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ip: &str, host: &str) -> Self {
        self.names.insert(ip.to_string(), host.to_string());
        self
    }
}

impl ReverseResolver for StaticResolver {
    fn reverse(&self, ip: &str) -> ReverseDns {
        match self.names.get(ip) {
            Some(host) => ReverseDns::Resolved(host.clone()),
            None => ReverseDns::NotFound,
        }
    }
}

/// Looks up every IP of `aggregate` once, in key order.
pub fn resolve_all(
    aggregate: &FailureAggregate,
    resolver: &dyn ReverseResolver,
) -> BTreeMap<String, ReverseDns> {
    aggregate
        .ips()
        .map(|ip| {
            let outcome = resolver.reverse(ip);
            match &outcome {
                ReverseDns::Resolved(host) => debug!("{} -> {}", ip, host),
                ReverseDns::NotFound => debug!("{} has no PTR record", ip),
                ReverseDns::Failed(cause) => warn!("Reverse DNS lookup for {} failed: {}", ip, cause),
            }
            (ip.to_string(), outcome)
        })
        .collect()
}
