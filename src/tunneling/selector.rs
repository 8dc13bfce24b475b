use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};
use thiserror::Error;

use crate::config::SelectionPolicy;

use super::registry::TunnelRecord;

#[derive(Error, Debug, PartialEq)]
pub enum SelectError {
    #[error("no tunnels available")]
    EmptyRegistry,
}

/// Picks one tunnel uniformly at random. Draws are independent of each other.
pub(crate) fn select<'r, R: Rng + ?Sized>(
    tunnels: &'r [TunnelRecord],
    rng: &mut R,
) -> Result<&'r TunnelRecord, SelectError> {
    tunnels.choose(rng).ok_or(SelectError::EmptyRegistry)
}

pub(crate) struct TunnelSelector {
    policy: SelectionPolicy,
    rng: StdRng,
    /// id of the tunnel handed out last
    previous: Option<String>,
}

impl TunnelSelector {
    pub fn new(policy: SelectionPolicy) -> Self {
        TunnelSelector::with_rng(policy, StdRng::from_entropy())
    }
    pub fn with_rng(policy: SelectionPolicy, rng: StdRng) -> Self {
        TunnelSelector {
            policy,
            rng,
            previous: None,
        }
    }
    pub fn next<'r>(
        &mut self,
        tunnels: &'r [TunnelRecord],
    ) -> Result<&'r TunnelRecord, SelectError> {
        let chosen = match (self.policy, self.previous.as_deref()) {
            (SelectionPolicy::AvoidPrevious, Some(previous)) => {
                let others: Vec<&TunnelRecord> =
                    tunnels.iter().filter(|t| t.id != previous).collect();
                match others.choose(&mut self.rng) {
                    Some(tunnel) => *tunnel,
                    // single tunnel pool, nothing to rotate to
                    None => select(tunnels, &mut self.rng)?,
                }
            }
            _ => select(tunnels, &mut self.rng)?,
        };
        self.previous = Some(chosen.id.clone());
        Ok(chosen)
    }
}
