// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Producer registry and lifecycle state machine.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::event::{SYSTEM_PRODUCER_ID, Timestamp};

use super::managed_producer::{ManagedProducer, ProducerInfo, ProducerStatus};
use super::producer_config::{DisconnectPolicy, ProducerConfig};

/// Outcome of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Registration {
    pub generation: u64,
    /// Producer archived because the new registration took its slot.
    pub replaced: Option<ReplacedProducer>,
}

/// A producer archived by a slot takeover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReplacedProducer {
    pub producer_id: String,
    /// Whether it still counted towards live aggregates.
    pub was_live: bool,
}

/// Tracks every producer registered on a bus.
///
/// The registry only keeps bookkeeping; the bus turns each transition
/// into a lifecycle event and applies it to the state store under the
/// same write lock.
#[derive(Debug, Default)]
pub(crate) struct ProducerRegistry {
    producers: HashMap<String, ManagedProducer>,
    /// Physical slot -> producer id currently holding it.
    slots: HashMap<String, String>,
    archived: Vec<ProducerInfo>,
    next_generation: u64,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if `producer_id` is reserved or held by a live registration.
    pub fn check_available(&self, producer_id: &str) -> Result<()> {
        let taken = producer_id == SYSTEM_PRODUCER_ID
            || self
                .producers
                .get(producer_id)
                .is_some_and(|p| p.status.is_live());
        if taken {
            Err(Error::ProducerConflict(producer_id.to_string()))
        } else {
            Ok(())
        }
    }

    /// Records a registration. Callers must run
    /// [`check_available`](Self::check_available) first.
    pub fn register(
        &mut self,
        config: ProducerConfig,
        policy: DisconnectPolicy,
        now: Timestamp,
    ) -> Registration {
        let producer_id = config.producer_id.clone();
        let mut replaced = None;

        // Drop a stale slot binding left by an earlier registration of this id.
        self.slots
            .retain(|slot, holder| *holder != producer_id || config.slot.as_ref() == Some(slot));

        if let Some(slot) = &config.slot {
            let previous = self
                .slots
                .insert(slot.clone(), producer_id.clone())
                .filter(|holder| *holder != producer_id);
            if let Some(holder) = previous
                && let Some(mut archived) = self.producers.remove(&holder)
            {
                let was_live = archived.status.is_live();
                archived.status = ProducerStatus::Replaced;
                tracing::info!(
                    %producer_id,
                    previous_producer_id = %holder,
                    %slot,
                    "Producer replaced on slot"
                );
                self.archived.push(archived.info());
                replaced = Some(ReplacedProducer {
                    producer_id: holder,
                    was_live,
                });
            }
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        self.producers.insert(
            producer_id,
            ManagedProducer::new(config, policy, generation, now),
        );

        Registration {
            generation,
            replaced,
        }
    }

    /// Moves a freshly registered producer to `Available`.
    pub fn activate(&mut self, producer_id: &str) {
        if let Some(producer) = self.producers.get_mut(producer_id)
            && producer.status == ProducerStatus::Registered
        {
            producer.status = ProducerStatus::Available;
        }
    }

    /// Checks that a live producer declared `event_type`.
    pub fn authorize(&self, producer_id: &str, event_type: &str) -> Result<()> {
        match self.producers.get(producer_id) {
            Some(p) if p.status.is_live() && p.config.supports(event_type) => Ok(()),
            _ => Err(Error::unauthorized(producer_id, event_type)),
        }
    }

    /// Records a heartbeat.
    ///
    /// With `generation`, the heartbeat comes from a handle and must match
    /// the current registration. Returns `true` if the producer recovered.
    pub fn touch(
        &mut self,
        producer_id: &str,
        generation: Option<u64>,
        now: Timestamp,
    ) -> Result<bool> {
        let producer = self
            .producers
            .get_mut(producer_id)
            .filter(|p| p.status.is_live())
            .filter(|p| generation.is_none_or(|g| g == p.generation))
            .ok_or_else(|| Error::NotConnected(producer_id.to_string()))?;

        let recovered = producer.touch(now);
        if recovered {
            tracing::info!(%producer_id, "Producer recovered");
        }
        Ok(recovered)
    }

    /// Marks a producer as explicitly disconnected.
    pub fn disconnect(&mut self, producer_id: &str, generation: u64) -> Result<()> {
        let producer = self
            .producers
            .get_mut(producer_id)
            .filter(|p| p.status.is_live() && p.generation == generation)
            .ok_or_else(|| Error::NotConnected(producer_id.to_string()))?;

        producer.status = ProducerStatus::Disconnected;
        Ok(())
    }

    /// Advances heartbeat supervision by one tick.
    ///
    /// Returns `(producer_id, missed_heartbeats)` for every producer that
    /// crossed its threshold on this tick, sorted by id.
    pub fn check_heartbeats(&mut self) -> Vec<(String, u32)> {
        let mut crossed: Vec<(String, u32)> = self
            .producers
            .values_mut()
            .filter_map(|producer| {
                producer
                    .supervise()
                    .then(|| (producer.producer_id().to_string(), producer.missed_heartbeats))
            })
            .collect();
        crossed.sort();

        for (producer_id, missed) in &crossed {
            tracing::warn!(
                %producer_id,
                missed_heartbeats = missed,
                "Producer suspected disconnected"
            );
        }
        crossed
    }

    /// Returns the status of a producer, including archived ones.
    pub fn status(&self, producer_id: &str) -> Option<ProducerStatus> {
        self.producers
            .get(producer_id)
            .map(|p| p.status)
            .or_else(|| {
                self.archived
                    .iter()
                    .any(|a| a.producer_id == producer_id)
                    .then_some(ProducerStatus::Replaced)
            })
    }

    /// Returns every registered producer, sorted by id.
    pub fn producers(&self) -> Vec<ProducerInfo> {
        let mut infos: Vec<ProducerInfo> =
            self.producers.values().map(ManagedProducer::info).collect();
        infos.sort_by(|a, b| a.producer_id.cmp(&b.producer_id));
        infos
    }

    /// Returns producers archived by replacement, oldest first.
    pub fn archived(&self) -> &[ProducerInfo] {
        &self.archived
    }
}
