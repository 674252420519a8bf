//! Loopback demo: one predicting client and one authority over a lossy
//! in-process link.
//!
//! A scripted timeline walks, teleports, thrusts, runs along a wall, wall
//! jumps and asks for a freeze. Move packets travel on the unreliable
//! channel and commands on the reliable one, both through the real wire
//! codecs. A summary of corrections and link statistics is logged at the
//! end.
//!
//! Run with `cargo run -p kinetic-demo -- --latency 6 --loss 0.2`.

mod link;

use clap::Parser;
use glam::Vec3;
use kinetic_config::{CliArgs, Config, default_config_dir};
use kinetic_movement::{
    Arena, AuthoritativeCharacter, CombatSnapshot, MovementEnv, MovementEvent, Plane,
    PredictedCharacter, Reliability, ServerTickSchedule, WireError, decode_command, decode_moves,
    decode_server_message, encode_command, encode_moves, encode_server_message,
};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use tracing::{debug, error, info, warn};

use crate::link::{LinkStats, LossyLink};

/// Distance of the runnable wall from the spawn line, m.
const WALL_OFFSET: f32 = 3.0;

/// Render frame times are drawn from this range, s.
const FRAME_TIME_RANGE: std::ops::Range<f64> = 0.004..0.020;

/// Client → authority payloads.
enum Uplink {
    Moves(Vec<u8>),
    Command(Vec<u8>),
}

/// One scripted input change.
#[derive(Debug, Clone, Copy)]
enum Action {
    Move(Vec3),
    Teleport,
    Jetpack(bool),
    WallRun(bool),
    WallJump,
    Freeze(bool),
}

/// Input timeline, in seconds from start.
const TIMELINE: &[(f32, Action)] = &[
    (0.0, Action::Move(Vec3::X)),
    (0.8, Action::Teleport),
    (1.5, Action::Jetpack(true)),
    (2.0, Action::Jetpack(false)),
    (2.5, Action::Move(Vec3::new(0.7071, 0.7071, 0.0))),
    (2.5, Action::WallRun(true)),
    (4.5, Action::WallJump),
    (5.0, Action::WallRun(false)),
    (5.0, Action::Move(Vec3::X)),
    (5.5, Action::Freeze(true)),
    (9.0, Action::Move(Vec3::ZERO)),
];

#[derive(Debug, Default)]
struct Summary {
    ticks: u64,
    frames: u64,
    corrections: u64,
    max_error: f32,
    teleports: u32,
    wall_runs: u32,
    wall_jumps: u32,
    landings: u32,
    freezes: u32,
    rejected_commands: u32,
    uplink: LinkStats,
    downlink: LinkStats,
    client_position: Vec3,
    server_position: Vec3,
}

impl Summary {
    fn count(&mut self, event: &MovementEvent) {
        match event {
            MovementEvent::Teleported { .. } => self.teleports += 1,
            MovementEvent::WallRunStarted { .. } => self.wall_runs += 1,
            MovementEvent::WallJumped { .. } => self.wall_jumps += 1,
            MovementEvent::Landed => self.landings += 1,
            MovementEvent::Frozen => self.freezes += 1,
            _ => {}
        }
    }

    fn log(&self) {
        info!(
            ticks = self.ticks,
            frames = self.frames,
            "Loopback finished"
        );
        info!(
            teleports = self.teleports,
            wall_runs = self.wall_runs,
            wall_jumps = self.wall_jumps,
            landings = self.landings,
            freezes = self.freezes,
            "Client events"
        );
        info!(
            corrections = self.corrections,
            max_error = self.max_error,
            rejected_commands = self.rejected_commands,
            "Reconciliation"
        );
        info!(
            sent = self.uplink.sent,
            dropped = self.uplink.dropped,
            delivered = self.uplink.delivered,
            "Uplink"
        );
        info!(
            sent = self.downlink.sent,
            dropped = self.downlink.dropped,
            delivered = self.downlink.delivered,
            "Downlink"
        );
        info!(
            client = ?self.client_position,
            server = ?self.server_position,
            divergence = self.client_position.distance(self.server_position),
            "Final positions"
        );
    }
}

fn main() {
    let args = CliArgs::parse();

    let config_dir = args.config.clone().unwrap_or_else(default_config_dir);
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    let log_dir = config_dir.join("logs");
    kinetic_log::init_logging(Some(&log_dir), cfg!(debug_assertions), Some(&config));
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        std::process::exit(2);
    }

    info!(
        tick_rate = config.simulation.tick_rate,
        latency_ticks = config.network.latency_ticks,
        loss = config.network.unreliable_loss,
        seed = config.network.seed,
        "Starting loopback"
    );

    match run(&config, u64::from(args.ticks)) {
        Ok(summary) => summary.log(),
        Err(e) => {
            error!("Loopback aborted: {e}");
            std::process::exit(1);
        }
    }
}

fn run(config: &Config, ticks: u64) -> Result<Summary, WireError> {
    let arena = Arena::open_floor(0.0, config.wall_run.collision_radius).with_surface(Plane::new(
        Vec3::new(0.0, WALL_OFFSET, 0.0),
        Vec3::NEG_Y,
        true,
    ));
    let combat = CombatSnapshot::idle(&config.simulation);
    let env = MovementEnv::new(&arena, &combat);

    let mut client = PredictedCharacter::new(config, Vec3::ZERO);
    let mut server = AuthoritativeCharacter::new(config, Vec3::ZERO);

    let net = &config.network;
    let mut uplink = LossyLink::new(net.latency_ticks, net.unreliable_loss, net.seed);
    let mut downlink =
        LossyLink::new(net.latency_ticks, net.unreliable_loss, net.seed.wrapping_add(1));

    let mut frame_rng = Xoshiro256StarStar::seed_from_u64(net.seed.wrapping_add(2));
    let mut schedule = ServerTickSchedule::with_tick_rate(config.simulation.tick_rate);
    let dt = schedule.tick_duration_secs() as f32;

    let mut summary = Summary::default();
    let mut next_action = 0;

    while schedule.total_ticks() < ticks {
        summary.frames += 1;
        let frame_ticks = schedule.accumulate(frame_rng.gen_range(FRAME_TIME_RANGE));

        for _ in 0..frame_ticks {
            let tick = client.current_tick() + 1;
            let now = tick as f32 * dt;
            while let Some(&(at, action)) = TIMELINE.get(next_action)
                && at <= now
            {
                debug!(at, ?action, "Timeline");
                apply_action(&mut client, action);
                next_action += 1;
            }

            // Client predicts and sends.
            let out = client.tick(dt, env);
            for event in &out.events {
                summary.count(event);
            }
            if let Some(moves) = out.moves {
                uplink.send(tick, Uplink::Moves(encode_moves(&moves)?), Reliability::Unreliable);
            }
            for command in out.commands {
                let payload = Uplink::Command(encode_command(&command)?);
                uplink.send(tick, payload, command.reliability());
            }

            // Authority processes what arrived, then its timers.
            let mut replies = Vec::new();
            for payload in uplink.deliver(tick) {
                match payload {
                    Uplink::Moves(bytes) => {
                        let moves = decode_moves(&bytes)?;
                        replies.extend(server.receive_moves(&moves, env).reply);
                    }
                    Uplink::Command(bytes) => {
                        let command = decode_command(&bytes)?;
                        match server.handle_command(command, env) {
                            Ok(messages) => replies.extend(messages),
                            Err(_) => summary.rejected_commands += 1,
                        }
                    }
                }
            }
            replies.extend(server.advance(dt));
            for reply in &replies {
                downlink.send(tick, encode_server_message(reply)?, reply.reliability());
            }

            // Client applies what came back.
            for bytes in downlink.deliver(tick) {
                let message = decode_server_message(&bytes)?;
                if let Some(result) = client.receive(&message, env)
                    && result.corrected
                {
                    summary.max_error = summary.max_error.max(result.error);
                }
            }
        }
    }

    if client.buffer().len() > config.prediction.buffer_capacity / 2 {
        warn!(pending = client.buffer().len(), "Many moves still unacknowledged");
    }

    summary.ticks = schedule.total_ticks();
    summary.corrections = client.corrections();
    summary.uplink = uplink.stats();
    summary.downlink = downlink.stats();
    summary.client_position = client.state().position;
    summary.server_position = server.state().position;
    Ok(summary)
}

fn apply_action(client: &mut PredictedCharacter, action: Action) {
    match action {
        Action::Move(direction) => client.set_move_direction(direction),
        Action::Teleport => client.on_teleport_requested(),
        Action::Jetpack(active) => client.on_jetpack_toggled(active),
        Action::WallRun(active) => client.on_wall_run_toggled(active),
        Action::WallJump => client.on_wall_jump_requested(None),
        Action::Freeze(frozen) => client.on_freeze_requested(frozen),
    }
}
