/*
** This file is a part of Iksemel (XML parser for Jabber/XMPP)
** Copyright (C) 2000-2025 Gurer Ozen
**
** Iksemel is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use std::future::Future;

use tracing::debug;
use tracing::info;
use tracing::warn;
use trust_dns_resolver::TokioAsyncResolver;
use trust_dns_resolver::config::ResolverConfig;
use trust_dns_resolver::config::ResolverOpts;

use super::constants::CLIENT_PORT;
use super::constants::CLIENT_SRV_SERVICE;

/// Host and port to connect to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
}

/// Finds the server of an XMPP domain.
pub trait Resolver {
    /// Returns None if the domain has no reachable client service.
    fn resolve(&self, domain: &str) -> impl Future<Output = Option<ServerTarget>>;
}

/// Resolves the `_xmpp-client._tcp` SRV record of the domain.
///
/// Without any SRV records the domain itself is used with the default
/// client port. A single `.` target means the domain explicitly offers
/// no client service.
#[derive(Clone, Copy, Debug, Default)]
pub struct SrvResolver;

impl SrvResolver {
    /// All targets in the order they should be tried.
    pub async fn candidates(&self, domain: &str) -> Vec<ServerTarget> {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(resolver) => resolver,
            Err(err) => {
                warn!(%err, "cannot load system DNS config, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };

        let srv_name = format!("{}.{}", CLIENT_SRV_SERVICE, domain);
        let lookup = match resolver.srv_lookup(srv_name.as_str()).await {
            Ok(lookup) => lookup,
            Err(err) => {
                debug!(srv = %srv_name, %err, "SRV lookup failed, using the domain");
                return vec![ServerTarget {
                    host: domain.to_string(),
                    port: CLIENT_PORT,
                }];
            }
        };

        let mut records: Vec<_> = lookup.iter().collect();
        if records.is_empty() {
            return vec![ServerTarget {
                host: domain.to_string(),
                port: CLIENT_PORT,
            }];
        }
        // Lower priority first, then higher weight
        records.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then(b.weight().cmp(&a.weight()))
        });
        let mut targets = Vec::with_capacity(records.len());
        for record in records {
            let host = record.target().to_string().trim_end_matches('.').to_string();
            if host.is_empty() {
                continue;
            }
            info!(%host, port = record.port(), priority = record.priority(), "SRV record");
            targets.push(ServerTarget {
                host,
                port: record.port(),
            });
        }
        targets
    }
}

impl Resolver for SrvResolver {
    async fn resolve(&self, domain: &str) -> Option<ServerTarget> {
        self.candidates(domain).await.into_iter().next()
    }
}
