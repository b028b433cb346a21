use crate::sampling::{clamped_normal, drift};
use dashmap::DashMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Period of the ambient random walk
pub const UPDATE_PERIOD: Duration = Duration::from_secs(1);

/// Ground-truth readings shared by every device placed in one zone.
///
/// One updater task writes, any number of devices read; each variable is
/// read and written independently.
#[derive(Debug)]
pub struct AmbientZone {
    name: String,
    vars: DashMap<String, f64>,
}

impl AmbientZone {
    /// Draw the initial value of each variable from `clamped_normal(mu, sigma)`
    pub fn new<R: Rng + ?Sized>(name: &str, vars: &BTreeMap<String, [f64; 2]>, rng: &mut R) -> Self {
        let values = DashMap::new();
        for (var, [mu, sigma]) in vars {
            values.insert(var.clone(), clamped_normal(rng, *mu, *sigma, 0.0));
        }
        Self {
            name: name.to_string(),
            vars: values,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest value of `var`
    pub fn get(&self, var: &str) -> Option<f64> {
        self.vars.get(var).map(|v| *v)
    }

    pub fn contains(&self, var: &str) -> bool {
        self.vars.contains_key(var)
    }

    /// Advance every variable one random-walk step
    pub fn step<R: Rng + ?Sized>(&self, rng: &mut R) {
        for mut entry in self.vars.iter_mut() {
            let next = drift(rng, *entry.value());
            *entry.value_mut() = next;
        }
    }

    /// Spawn the updater, stepping every second until shutdown
    pub fn spawn_updater(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(zone = %self.name, variables = self.vars.len(), "Ambient zone started");
            let mut rng = StdRng::from_entropy();
            let mut ticker = tokio::time::interval(UPDATE_PERIOD);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.step(&mut rng);
                        debug!(zone = %self.name, "Ambient zone updated");
                    }
                    _ = shutdown.changed() => break,
                }
            }

            info!(zone = %self.name, "Ambient zone stopped");
        })
    }
}
