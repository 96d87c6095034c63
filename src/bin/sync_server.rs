//! entity-sync-server binary
//!
//! Runs a small demo simulation through the sync pipeline. Outbound messages
//! are written to stdout as `<subject> <client|*> <json>`; intents are read
//! from stdin as `<client> <json>` (or `<client> !snapshot` / `<client> !bye`).
//!
//! ## Configuration (flags / env / TOML via `config` crate)
//!
//! | Key                        | Default   | Description                        |
//! |----------------------------|-----------|------------------------------------|
//! | `SYNC_TICK_RATE_HZ`        | `20`      | Tick rate                          |
//! | `SYNC_ENTITIES`            | `8`       | Demo entity count                  |
//! | `SYNC_CONFIG`              | *(none)*  | Optional TOML file                 |
//! | `SYNC_WORLD_ID`            | `default` | World id (file / env)              |
//! | `SYNC_KEYFRAME_INTERVAL`   | `300`     | Ticks between full snapshots       |
//! | `SYNC_VALIDATE_OUTBOUND`   | `true`    | Validate every outbound message    |

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use entity_sync::{
    agent::{Inbound, Publisher, SyncAgent, SyncAgentConfig, WorldFrame, WorldSource},
    component::{ComponentMap, EntityMap, Health, Transform, Visual},
    event::{EventPacket, HitPayload, JoinPayload},
    math::{clamp, lerp},
    service::SyncService,
    types::SyncServiceConfig,
};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "entity-sync-server", about = "Entity sync demo server", version)]
struct Args {
    /// Tick rate (Hz)
    #[arg(long, env = "SYNC_TICK_RATE_HZ", default_value_t = 20.0)]
    tick_rate_hz: f32,

    /// Number of demo entities
    #[arg(long, env = "SYNC_ENTITIES", default_value_t = 8)]
    entities: usize,

    /// Optional TOML config file for the sync service
    #[arg(long, env = "SYNC_CONFIG")]
    config: Option<String>,

    /// Override the keyframe interval from the config file
    #[arg(long)]
    keyframe_interval: Option<u64>,
}

fn load_service_config(path: Option<&str>) -> Result<SyncServiceConfig> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    builder
        .add_source(config::Environment::with_prefix("SYNC").try_parsing(true))
        .build()
        .context("Failed to load sync config")?
        .try_deserialize()
        .context("Invalid sync config")
}

// ---------------------------------------------------------------------------
// Demo simulation
// ---------------------------------------------------------------------------

/// Entities orbit the origin, lose health, vanish at zero and respawn.
struct OrbitWorld {
    world_id: String,
    count: usize,
    radius: f64,
}

const LIFE_TICKS: u64 = 240;
const DEAD_TICKS: u64 = 40;

impl WorldSource for OrbitWorld {
    fn step(&mut self, tick: u64) -> Option<WorldFrame> {
        let mut entities = EntityMap::new();
        let mut events = Vec::new();
        let t_server_ms = entity_sync::agent::now_ms() as f64;

        for i in 0..self.count {
            let id = format!("npc-{i}");
            let phase = (tick + i as u64 * 37) % (LIFE_TICKS + DEAD_TICKS);
            if phase >= LIFE_TICKS {
                continue;
            }
            if phase == 0 {
                events.push(EventPacket::Join {
                    t_server_ms,
                    payload: JoinPayload {
                        player_id: id.clone(),
                        world_id: self.world_id.clone(),
                    },
                });
            }

            let angle = tick as f64 * 0.05 + i as f64 * std::f64::consts::TAU / self.count as f64;
            let (s, c) = angle.sin_cos();
            // Every other entity idles in place so deltas stay sparse.
            let moving = i % 2 == 0;
            let position = if moving {
                [c * self.radius, 0.0, s * self.radius]
            } else {
                [i as f64, 0.0, 0.0]
            };
            let mut transform = Transform::new(position, [0.0, (angle / 2.0).sin(), 0.0, (angle / 2.0).cos()]);
            if moving {
                transform.velocity = Some([-s * self.radius * 0.05, 0.0, c * self.radius * 0.05]);
            } else {
                transform.rotation = [0.0, 0.0, 0.0, 1.0];
            }

            let max = 100.0;
            let current = clamp(max - (phase / 20) as f64 * 10.0, 0.0, max);
            if phase > 0 && phase % 20 == 0 {
                events.push(EventPacket::Hit {
                    t_server_ms,
                    payload: HitPayload {
                        attacker: "environment".into(),
                        target: id.clone(),
                        amount: 10.0,
                        damage_type: Some("decay".into()),
                    },
                });
            }

            let heat = current / max;
            let mut components = ComponentMap::new()
                .with_transform(transform)
                .with_health(Health::new(current, max));
            // Visual drops off for the final stretch of life.
            if current > 10.0 {
                components = components.with_visual(Visual {
                    model: Some("orb".into()),
                    tint: Some([lerp(1.0, 0.2, heat), lerp(0.2, 1.0, heat), 0.2]),
                });
            }
            entities.insert(id, components);
        }

        Some(WorldFrame { entities, events })
    }
}

// ---------------------------------------------------------------------------
// Transport stand-ins
// ---------------------------------------------------------------------------

struct StdoutPublisher;

impl Publisher for StdoutPublisher {
    fn publish(&self, subject: &str, client: Option<&str>, payload: Bytes) -> Result<()> {
        let mut out = std::io::stdout().lock();
        write!(out, "{} {} ", subject, client.unwrap_or("*"))?;
        out.write_all(&payload)?;
        writeln!(out)?;
        Ok(())
    }
}

fn parse_line(line: &str) -> Option<Inbound> {
    let (client, rest) = line.trim().split_once(' ')?;
    let client = client.to_string();
    Some(match rest.trim() {
        "!snapshot" => Inbound::SnapshotRequest { client },
        "!bye" => Inbound::Disconnected { client },
        json => Inbound::Intent {
            client,
            payload: Bytes::from(json.to_owned()),
        },
    })
}

async fn read_stdin(tx: mpsc::Sender<Inbound>) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match parse_line(&line) {
                Some(msg) => {
                    if tx.send(msg).await.is_err() {
                        break;
                    }
                }
                None => log::warn!("Ignoring malformed input line: {:?}", line),
            },
            Ok(None) => break,
            Err(e) => {
                log::warn!("stdin read failed: {}", e);
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays a clean message stream.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("entity_sync=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let mut service_config = load_service_config(args.config.as_deref())?;
    if let Some(interval) = args.keyframe_interval {
        service_config.keyframe_interval = interval;
    }

    log::info!(
        "Starting entity-sync-server (world='{}', entities={}, keyframe_interval={}, rate={}Hz)",
        service_config.world_id,
        args.entities,
        service_config.keyframe_interval,
        args.tick_rate_hz,
    );

    let agent_config = SyncAgentConfig {
        world_id: service_config.world_id.clone(),
        tick_rate_hz: args.tick_rate_hz,
    };
    let source = OrbitWorld {
        world_id: service_config.world_id.clone(),
        count: args.entities.max(1),
        radius: 10.0,
    };
    let service = Arc::new(Mutex::new(SyncService::new(service_config)));

    let (tx, rx) = mpsc::channel(256);
    // Keep a sender alive so a closed stdin does not stop the server.
    let _keepalive = tx.clone();
    tokio::spawn(read_stdin(tx));

    // Run until shutdown
    SyncAgent::new(agent_config, service, StdoutPublisher)
        .run(source, rx)
        .await
}
