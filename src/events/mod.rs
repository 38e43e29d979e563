//! Gameplay Notifications
//!
//! Publish/subscribe between the core and whatever presents it (HUD, audio,
//! bots, tests). Observers register with the [`EventBus`] and receive every
//! event, or only the kinds they asked for. The Bevy bridge reads the same
//! stream through the buffered queue.

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::ids::{EntityId, PlayerId};
use crate::weapon::WeaponKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameEvent {
    TerrainInitialized,
    TerrainUpdated {
        revision: u64,
        triangles: usize,
    },
    TurnStarted {
        player: PlayerId,
        character: EntityId,
        index: usize,
    },
    TurnEnded {
        player: Option<PlayerId>,
    },
    /// A character's "my turn" flag flipped
    TurnChanged {
        character: EntityId,
        is_my_turn: bool,
    },
    CurrentPlayerChanged {
        name: String,
    },
    HealthChanged {
        character: EntityId,
        health: f32,
    },
    CharacterDied {
        character: EntityId,
        player: PlayerId,
    },
    WeaponEquipped {
        character: EntityId,
        weapon: EntityId,
        kind: WeaponKind,
    },
    /// Power in 0..=1 across the weapon's range
    PowerChanged {
        weapon: EntityId,
        normalized: f32,
    },
    AmmoChanged {
        weapon: EntityId,
        ammo: u32,
    },
    ReloadStarted {
        weapon: EntityId,
    },
    ReloadFinished {
        weapon: EntityId,
    },
    ProjectileFired {
        projectile: EntityId,
        instigator: EntityId,
    },
    Explosion {
        position: Vec3,
        radius: f32,
    },
    GameOver {
        winner: Option<PlayerId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Terrain,
    Turn,
    Character,
    Weapon,
    Projectile,
    Match,
}

impl GameEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            GameEvent::TerrainInitialized | GameEvent::TerrainUpdated { .. } => EventKind::Terrain,
            GameEvent::TurnStarted { .. }
            | GameEvent::TurnEnded { .. }
            | GameEvent::TurnChanged { .. }
            | GameEvent::CurrentPlayerChanged { .. } => EventKind::Turn,
            GameEvent::HealthChanged { .. } | GameEvent::CharacterDied { .. } => {
                EventKind::Character
            }
            GameEvent::WeaponEquipped { .. }
            | GameEvent::PowerChanged { .. }
            | GameEvent::AmmoChanged { .. }
            | GameEvent::ReloadStarted { .. }
            | GameEvent::ReloadFinished { .. } => EventKind::Weapon,
            GameEvent::ProjectileFired { .. } | GameEvent::Explosion { .. } => {
                EventKind::Projectile
            }
            GameEvent::GameOver { .. } => EventKind::Match,
        }
    }
}

/// Anything that wants to hear about gameplay
pub trait GameObserver: Send + Sync {
    fn on_event(&mut self, event: &GameEvent);
}

impl<F> GameObserver for F
where
    F: FnMut(&GameEvent) + Send + Sync,
{
    fn on_event(&mut self, event: &GameEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    kinds: Option<Vec<EventKind>>,
    observer: Box<dyn GameObserver>,
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Subscriber>,
    next_id: u64,
    buffering: bool,
    buffer: Vec<GameEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: impl GameObserver + 'static) -> SubscriptionId {
        self.add(None, Box::new(observer))
    }

    /// Subscribe to a subset of event kinds
    pub fn subscribe_to(
        &mut self,
        kinds: &[EventKind],
        observer: impl GameObserver + 'static,
    ) -> SubscriptionId {
        self.add(Some(kinds.to_vec()), Box::new(observer))
    }

    fn add(&mut self, kinds: Option<Vec<EventKind>>, observer: Box<dyn GameObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.subscribers.push(Subscriber {
            id,
            kinds,
            observer,
        });
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        before != self.subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn publish(&mut self, event: GameEvent) {
        let kind = event.kind();
        for sub in &mut self.subscribers {
            if sub.kinds.as_ref().map_or(true, |k| k.contains(&kind)) {
                sub.observer.on_event(&event);
            }
        }
        if self.buffering {
            self.buffer.push(event);
        }
    }

    /// Keep a copy of every published event until `drain` is called
    pub fn set_buffering(&mut self, enabled: bool) {
        self.buffering = enabled;
        if !enabled {
            self.buffer.clear();
        }
    }

    pub fn drain(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.buffer)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<GameEvent>>>, impl GameObserver) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        (log, move |e: &GameEvent| sink.lock().unwrap().push(e.clone()))
    }

    #[test]
    fn test_subscribers_receive_events() {
        let mut bus = EventBus::new();
        let (log, observer) = recorder();
        bus.subscribe(observer);
        bus.publish(GameEvent::TerrainInitialized);
        bus.publish(GameEvent::TurnEnded { player: None });
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_kind_filter() {
        let mut bus = EventBus::new();
        let (log, observer) = recorder();
        bus.subscribe_to(&[EventKind::Turn], observer);
        bus.publish(GameEvent::TerrainInitialized);
        bus.publish(GameEvent::CurrentPlayerChanged {
            name: "Alice".into(),
        });
        let log = log.lock().unwrap();
        assert_eq!(log.len(), 1);
        assert!(matches!(log[0], GameEvent::CurrentPlayerChanged { .. }));
    }

    #[test]
    fn test_unsubscribe() {
        let mut bus = EventBus::new();
        let (log, observer) = recorder();
        let id = bus.subscribe(observer);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.publish(GameEvent::TerrainInitialized);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_buffering() {
        let mut bus = EventBus::new();
        bus.publish(GameEvent::TerrainInitialized);
        assert!(bus.drain().is_empty());

        bus.set_buffering(true);
        bus.publish(GameEvent::GameOver { winner: None });
        assert_eq!(bus.drain().len(), 1);
        assert!(bus.drain().is_empty());
    }
}
