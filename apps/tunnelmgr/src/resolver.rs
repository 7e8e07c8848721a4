//! Establishment ordering for chained tunnels.
//!
//! A connection whose target port is forwarded locally by another connection
//! can only be reached once that other connection is up. The resolver emits
//! connections in strata: each stratum holds every remaining connection with
//! no provider left in the remaining set, in input order.

use log::debug;

use crate::connection::ConnectionSpec;
use crate::error::TunnelError;

pub struct DependencyResolver;

impl DependencyResolver {
    /// Orders `connections` so that every port provider precedes its
    /// consumers.
    ///
    /// Fails with [`TunnelError::CyclicDependency`] naming the connections
    /// still unresolved when no further stratum can be formed.
    pub fn order<'c>(
        connections: &'c [ConnectionSpec],
    ) -> Result<Vec<&'c ConnectionSpec>, TunnelError> {
        let mut remaining: Vec<&ConnectionSpec> = connections.iter().collect();
        let mut ordered = Vec::with_capacity(remaining.len());
        let mut stratum = 0;

        while !remaining.is_empty() {
            let (independent, dependent): (Vec<_>, Vec<_>) = remaining
                .iter()
                .copied()
                .partition(|conn| !Self::has_provider(conn, &remaining));

            if independent.is_empty() {
                let names = dependent.iter().map(|c| c.name().to_string()).collect();
                return Err(TunnelError::CyclicDependency(names));
            }

            debug!(
                "Stratum {}: {}",
                stratum,
                independent
                    .iter()
                    .map(|c| c.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );

            ordered.extend(independent);
            remaining = dependent;
            stratum += 1;
        }

        Ok(ordered)
    }

    /// Whether some other connection in `pool` forwards the port `conn`
    /// targets.
    fn has_provider(conn: &ConnectionSpec, pool: &[&ConnectionSpec]) -> bool {
        pool.iter().any(|other| {
            !std::ptr::eq(*other, conn) && other.local_source_ports().contains(&conn.port())
        })
    }
}
