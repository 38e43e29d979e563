use bevy::prelude::*;

use super::MatchSession;
use crate::config::MatchConfig;
use crate::events::GameEvent;
use crate::ids::PlayerId;
use crate::replication::NetRole;

/// Runs one [`MatchSession`] inside a Bevy app
pub struct WormsCorePlugin {
    pub role: NetRole,
    pub config: MatchConfig,
    /// Observer sessions act for exactly one player
    pub local_player: Option<PlayerId>,
}

impl WormsCorePlugin {
    pub fn authority(config: MatchConfig) -> Self {
        Self {
            role: NetRole::Authority,
            config,
            local_player: None,
        }
    }

    pub fn observer(config: MatchConfig, local_player: PlayerId) -> Self {
        Self {
            role: NetRole::Observer,
            config,
            local_player: Some(local_player),
        }
    }
}

impl Plugin for WormsCorePlugin {
    fn build(&self, app: &mut App) {
        let mut session = match (self.role, self.local_player) {
            (NetRole::Observer, Some(player)) => MatchSession::observer(self.config.clone(), player),
            (NetRole::Observer, None) => {
                tracing::warn!("observer plugin without a local player, running as authority");
                MatchSession::authority(self.config.clone())
            }
            (NetRole::Authority, _) => MatchSession::authority(self.config.clone()),
        };
        session.events_mut().set_buffering(true);
        if let Err(e) = session.start() {
            tracing::debug!("session not started: {e}");
        }

        app.insert_resource(session)
            .add_event::<CoreEvent>()
            .add_systems(Update, (tick_session, forward_events).chain());
    }
}

/// Gameplay notification re-emitted as a Bevy event
#[derive(Event, Debug, Clone, PartialEq)]
pub struct CoreEvent(pub GameEvent);

fn tick_session(time: Res<Time>, mut session: ResMut<MatchSession>) {
    session.tick(time.delta_secs());
}

fn forward_events(mut session: ResMut<MatchSession>, mut writer: EventWriter<CoreEvent>) {
    for event in session.events_mut().drain() {
        writer.send(CoreEvent(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_steps_session() {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(WormsCorePlugin::authority(MatchConfig::default()));
        app.update();
        app.update();
        let session = app.world().resource::<MatchSession>();
        assert!(session.tick_count() >= 2);
        assert!(session.tasks().len() >= 4);
    }
}
