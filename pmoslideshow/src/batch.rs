//! Validation concurrente d'un lot d'URLs contre une échéance unique
//!
//! Chaque URL est validée dans sa propre tâche. Le lot réussit seulement si
//! toutes les validations réussissent avant l'échéance ; la première erreur
//! observée annule les tâches restantes.

use crate::validator::ImageValidator;
use crate::{Error, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Validateur de lots
#[derive(Clone)]
pub struct BatchValidator {
    validator: Arc<dyn ImageValidator>,
    deadline: Duration,
}

impl BatchValidator {
    pub fn new(validator: Arc<dyn ImageValidator>, deadline: Duration) -> Self {
        Self {
            validator,
            deadline,
        }
    }

    /// Valide toutes les URLs (tout ou rien)
    ///
    /// L'ordre de complétion n'a aucune influence : seul le verdict global
    /// est retourné. À l'échéance, l'erreur nomme la première URL encore en
    /// attente dans l'ordre de la requête.
    pub async fn validate_all(&self, urls: &[String]) -> Result<()> {
        if urls.is_empty() {
            return Ok(());
        }

        let deadline = Instant::now() + self.deadline;
        let mut tasks = JoinSet::new();
        for (index, url) in urls.iter().enumerate() {
            let validator = self.validator.clone();
            let url = url.clone();
            tasks.spawn(async move { (index, validator.validate(&url).await) });
        }

        let mut pending: BTreeSet<usize> = (0..urls.len()).collect();

        while !pending.is_empty() {
            let joined = match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => joined,
                Ok(None) => break,
                Err(_) => {
                    tasks.abort_all();
                    let index = pending.iter().next().copied().unwrap_or_default();
                    warn!(
                        "Validation of {} images timed out after {:?} ({} pending)",
                        urls.len(),
                        self.deadline,
                        pending.len()
                    );
                    return Err(Error::ValidationTimeout {
                        url: urls[index].clone(),
                    });
                }
            };

            match joined {
                Ok((index, Ok(()))) => {
                    pending.remove(&index);
                }
                Ok((index, Err(err))) => {
                    tasks.abort_all();
                    debug!("Validation failed for {}: {}", urls[index], err);
                    return Err(err);
                }
                Err(join_err) => {
                    tasks.abort_all();
                    return Err(Error::internal(format!(
                        "validation task failed: {}",
                        join_err
                    )));
                }
            }
        }

        debug!("Validated {} images", urls.len());
        Ok(())
    }
}
