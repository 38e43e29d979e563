//! Headless match runner
//!
//! Plays a bot-only match on the authority and mirrors it into one observer
//! session over the loopback link, then reports whether the mirror agrees.
//!
//! Usage: `worms-headless [--config path.ron] [--bots N] [--max-seconds S]`

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use bevy::app::ScheduleRunnerPlugin;
use bevy::prelude::*;
use tracing::{debug, error, info, warn};

use worms_core::config::MatchConfig;
use worms_core::events::GameEvent;
use worms_core::ids::{EntityId, PlayerId};
use worms_core::logging::LoggingPlugin;
use worms_core::replication::{LinkConfig, LoopbackLink};
use worms_core::session::{CoreEvent, MatchSession, WormsCorePlugin};

const DEFAULT_CONFIG: &str = "config/match.ron";

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|val| val.parse().ok())
}

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let config_path: PathBuf = parse_arg(&args, "--config").unwrap_or_else(|| DEFAULT_CONFIG.into());
    let bots: usize = parse_arg(&args, "--bots").unwrap_or(4);
    let max_seconds: f32 = parse_arg(&args, "--max-seconds").unwrap_or(600.0);

    let config = if config_path.exists() {
        MatchConfig::load(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        MatchConfig::default()
    };
    config.validate().context("match config")?;

    App::new()
        .add_plugins(MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(
            1.0 / 60.0,
        ))))
        .add_plugins(LoggingPlugin {
            config: config.logging.clone(),
        })
        .add_plugins(WormsCorePlugin::authority(config.clone()))
        .insert_resource(Headless {
            config,
            bot_count: bots.max(2),
            max_seconds,
        })
        .insert_resource(Bots::default())
        .add_systems(Startup, spawn_bots)
        .add_systems(Update, (drive_bots, pump_mirror, watch_events).chain())
        .run();
    Ok(())
}

#[derive(Resource)]
struct Headless {
    config: MatchConfig,
    bot_count: usize,
    max_seconds: f32,
}

#[derive(Resource, Default)]
struct Bots {
    players: Vec<PlayerId>,
    /// Character whose turn was already played, and when it fired
    fired: Option<(EntityId, f64)>,
}

/// Observer replica fed over the loopback link
#[derive(Resource)]
struct Mirror {
    session: MatchSession,
    link: LoopbackLink,
}

fn spawn_bots(
    mut commands: Commands,
    mut session: ResMut<MatchSession>,
    mut bots: ResMut<Bots>,
    headless: Res<Headless>,
) {
    let terrain = &headless.config.terrain;
    let n = headless.bot_count;
    for i in 0..n {
        let x = terrain.width * (i as f32 + 0.5) / n as f32;
        let spawn = Vec3::new(x, terrain.depth * 0.5, terrain.height + headless.config.character.collision_radius)
            + Vec3::from_array(terrain.origin);
        match session.add_player(format!("Bot{i}"), spawn) {
            Ok(player) => bots.players.push(player),
            Err(e) => error!("bot {i} not added: {e}"),
        }
    }
    if let Some(&first) = bots.players.first() {
        commands.insert_resource(Mirror {
            session: MatchSession::observer(headless.config.clone(), first),
            link: LoopbackLink::new(LinkConfig {
                best_effort_drop_rate: 0.1,
                ..LinkConfig::default()
            }),
        });
    }
    info!("{} bots ready", bots.players.len());
}

/// Lob angle that lands a shot `range` away at launch speed `speed`
fn lob_direction(from: Vec3, to: Vec3, speed: f32, gravity: f32) -> Vec3 {
    let flat = Vec3::new(to.x - from.x, to.y - from.y, 0.0);
    let range = flat.length();
    let heading = flat.try_normalize().unwrap_or(Vec3::X);
    let ratio = (range * gravity.abs() / (speed * speed)).clamp(0.0, 1.0);
    let angle = (std::f32::consts::PI - ratio.asin()) * 0.5;
    heading * angle.cos() + Vec3::Z * angle.sin()
}

fn drive_bots(mut session: ResMut<MatchSession>, mut bots: ResMut<Bots>) {
    if session.is_game_over() {
        return;
    }
    let Some(active) = session.active_character() else {
        return;
    };
    let (id, player, position) = (active.id, active.player, active.position);
    if !bots.players.contains(&player) {
        return;
    }
    let now = session.now();

    match bots.fired {
        Some((fired_by, at)) if fired_by == id => {
            // end once the shot has resolved
            if session.projectiles().next().is_none() && now - at > 1.0 {
                if let Err(e) = session.request_end_turn(player) {
                    warn!("bot could not end turn: {e}");
                }
                bots.fired = None;
            }
        }
        _ => {
            let target = session
                .characters()
                .filter(|c| c.is_alive() && c.id != id)
                .min_by(|a, b| {
                    a.position
                        .distance_squared(position)
                        .total_cmp(&b.position.distance_squared(position))
                })
                .map(|c| c.position);
            let Some(target) = target else {
                return;
            };
            let config = session.config();
            let (speed, gravity) = (config.weapon.min_power, config.projectile.gravity);
            let steps = (config.weapon.max_power - config.weapon.min_power) / config.weapon.power_step;
            let direction = lob_direction(position, target, speed, gravity);

            let fired = session
                .adjust_power(player, -steps)
                .and_then(|_| session.set_aim(player, direction))
                .and_then(|_| session.fire(player));
            match fired {
                Ok(()) => bots.fired = Some((id, now)),
                // weapon not spawned yet or cooling down; try next frame
                Err(e) => debug!("bot shot deferred: {e}"),
            }
        }
    }
}

fn pump_mirror(mut session: ResMut<MatchSession>, mirror: Option<ResMut<Mirror>>, time: Res<Time>) {
    let Some(mut mirror) = mirror else {
        return;
    };
    let Mirror { session: observer, link } = &mut *mirror;
    if let Err(e) = link.pump(&mut *session, std::slice::from_mut(observer)) {
        error!("link pump failed: {e}");
    }
    observer.tick(time.delta_secs());
}

fn watch_events(
    mut events: EventReader<CoreEvent>,
    session: Res<MatchSession>,
    mirror: Option<Res<Mirror>>,
    headless: Res<Headless>,
    mut exit: EventWriter<AppExit>,
) {
    let mut done = false;
    for CoreEvent(event) in events.read() {
        match event {
            GameEvent::TurnStarted { player, .. } => info!("turn: {player}"),
            GameEvent::CharacterDied { player, .. } => info!("{player} is out"),
            GameEvent::GameOver { winner } => {
                match winner {
                    Some(p) => info!("winner: {p}"),
                    None => info!("no winner"),
                }
                done = true;
            }
            _ => {}
        }
    }
    if session.now() as f32 > headless.max_seconds {
        warn!("match hit the {}s limit", headless.max_seconds);
        done = true;
    }
    if done {
        if let (Some(mirror), Some(terrain)) = (mirror, session.terrain()) {
            let agrees = mirror
                .session
                .terrain()
                .is_some_and(|t| t.mesh().checksum() == terrain.mesh().checksum());
            info!(agrees, "mirror terrain check");
        }
        exit.send(AppExit::Success);
    }
}
