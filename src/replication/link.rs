//! In-process transport between one authority and its observers.
//!
//! Every frame goes through bincode on the way across. Best-effort frames
//! can be dropped at a configured rate and reliable frames can be delivered
//! twice, which is how the tests exercise lossy and redundant delivery.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{Channel, ClientMessage, Envelope, ReplicationError, ServerMessage};
use crate::session::MatchSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Probability in 0..=1 that a best-effort frame is lost
    pub best_effort_drop_rate: f32,
    /// Deliver every reliable frame twice
    pub duplicate_reliable: bool,
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            best_effort_drop_rate: 0.0,
            duplicate_reliable: false,
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub frames_duplicated: u64,
    pub bytes: u64,
}

pub struct LoopbackLink {
    config: LinkConfig,
    rng: Xoshiro256PlusPlus,
    stats: LinkStats,
}

impl LoopbackLink {
    pub fn new(config: LinkConfig) -> Self {
        let rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);
        Self {
            config,
            rng,
            stats: LinkStats::default(),
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Encode, lose or duplicate, decode
    fn carry<T>(&mut self, frames: &[Envelope<T>]) -> Result<Vec<Envelope<T>>, ReplicationError>
    where
        T: Serialize + DeserializeOwned + Clone,
    {
        let mut delivered = Vec::with_capacity(frames.len());
        for frame in frames {
            let bytes = frame.encode()?;
            self.stats.frames_sent += 1;
            self.stats.bytes += bytes.len() as u64;
            match frame.channel {
                Channel::BestEffort => {
                    if self.rng.gen::<f32>() < self.config.best_effort_drop_rate {
                        self.stats.frames_dropped += 1;
                        continue;
                    }
                    delivered.push(Envelope::decode(&bytes)?);
                }
                Channel::Reliable => {
                    delivered.push(Envelope::decode(&bytes)?);
                    if self.config.duplicate_reliable {
                        self.stats.frames_duplicated += 1;
                        delivered.push(Envelope::decode(&bytes)?);
                    }
                }
            }
        }
        Ok(delivered)
    }

    /// Run one network flush: authority broadcast, then observer requests
    pub fn pump(
        &mut self,
        authority: &mut MatchSession,
        observers: &mut [MatchSession],
    ) -> Result<(), ReplicationError> {
        if !authority.role().is_authority() {
            return Err(ReplicationError::WrongRole("pump"));
        }

        let broadcast: Vec<Envelope<ServerMessage>> = authority.take_outgoing();
        for observer in observers.iter_mut() {
            for frame in self.carry(&broadcast)? {
                observer.receive_server(frame);
            }
        }

        for observer in observers.iter_mut() {
            let requests: Vec<Envelope<ClientMessage>> = observer.take_requests();
            let Some(player) = observer.local_player() else {
                continue;
            };
            for frame in self.carry(&requests)? {
                authority.receive_client(player, frame);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for LoopbackLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopbackLink")
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}
