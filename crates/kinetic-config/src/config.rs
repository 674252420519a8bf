//! Configuration structs with sensible defaults and RON persistence.
//!
//! Distances are in meters, durations in seconds, and the up axis is `+Z`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// File name used inside the config directory.
const CONFIG_FILE_NAME: &str = "config.ron";

/// Top-level movement configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Core kinematics: gravity, walking, speed caps.
    pub simulation: SimulationConfig,
    /// Teleport ability tuning.
    pub teleport: TeleportConfig,
    /// Jetpack ability tuning.
    pub jetpack: JetpackConfig,
    /// Wall-run ability tuning.
    pub wall_run: WallRunConfig,
    /// Wall-jump impulse tuning.
    pub wall_jump: WallJumpConfig,
    /// Freeze ability tuning.
    pub freeze: FreezeConfig,
    /// Client prediction and correction settings.
    pub prediction: PredictionConfig,
    /// Admission checks for authoritative commands.
    pub validation: ValidationConfig,
    /// Loopback transport settings.
    pub network: NetworkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Core kinematic settings shared by every movement mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed simulation rate in Hz.
    pub tick_rate: u32,
    /// Gravity acceleration along Z (negative = down), m/s².
    pub gravity_z: f32,
    /// Base horizontal speed cap, m/s.
    pub max_walk_speed: f32,
    /// Base horizontal acceleration cap, m/s².
    pub max_acceleration: f32,
    /// Deceleration applied on the ground without input, m/s².
    pub braking_deceleration: f32,
    /// Fraction of `max_acceleration` available while airborne.
    pub air_control: f32,
    /// Speed multiplier while the combat layer reports targeting.
    pub targeting_speed_modifier: f32,
    /// Speed multiplier while the combat layer reports running.
    pub running_speed_modifier: f32,
}

/// Teleport settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TeleportConfig {
    /// Whether the ability is available.
    pub enabled: bool,
    /// Maximum forward teleport distance, m.
    pub distance: f32,
}

/// Jetpack settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct JetpackConfig {
    /// Whether the ability is available.
    pub enabled: bool,
    /// Fuel tank capacity.
    pub max_fuel: f32,
    /// Fuel burned per second of thrust.
    pub consumption_rate: f32,
    /// Fuel regained per second while walking.
    pub refill_rate: f32,
    /// Upward velocity gained per second of thrust, m/s².
    pub thrust_force: f32,
    /// Multiplier on the acceleration cap while thrusting.
    pub acceleration_modifier: f32,
    /// Gravity multiplier while thrusting (0 = no gravity).
    pub gravity_scale: f32,
}

/// Wall-run settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WallRunConfig {
    /// Whether the ability is available.
    pub enabled: bool,
    /// Maximum time attached to a wall before the automatic wall jump, s.
    pub max_run_time: f32,
    /// Minimum horizontal speed required to attach, m/s.
    pub min_speed: f32,
    /// Character collision radius, m.
    pub collision_radius: f32,
    /// Extra probe distance beyond the collision radius, m.
    pub detection_margin: f32,
    /// Maximum tilt of a wall away from vertical, degrees.
    pub max_wall_tilt_deg: f32,
    /// Camera roll applied while running on a wall, degrees.
    pub side_lean_deg: f32,
}

/// Wall-jump settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WallJumpConfig {
    /// Launch speed applied along the jump direction, m/s.
    pub strength: f32,
}

/// Freeze settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FreezeConfig {
    /// How long a freeze lasts before it expires on its own, s.
    pub frozen_time: f32,
}

/// Client-side prediction settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictionConfig {
    /// Maximum number of unacknowledged moves held by the client.
    pub buffer_capacity: usize,
    /// Ticks between move packets; moves in between may be combined.
    pub send_interval_ticks: u32,
    /// Largest delta time a combined move may cover, s.
    pub max_combined_delta: f32,
    /// Position error the server tolerates before correcting, m.
    pub position_tolerance: f32,
    /// Fuel error the server tolerates before correcting, fuel units.
    pub fuel_tolerance: f32,
    /// Corrections up to this distance are smoothed visually, m.
    pub max_smooth_distance: f32,
    /// Corrections beyond this distance snap instantly, m.
    pub no_smooth_distance: f32,
    /// Exponential decay rate of the visual offset, 1/s.
    pub smoothing_decay_rate: f32,
    /// Divergence above this distance is logged as a warning, m.
    pub divergence_warn_distance: f32,
}

/// Admission checks for authoritative commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationConfig {
    /// Maximum reliable commands accepted per second.
    pub max_commands_per_second: u32,
    /// Maximum launch speed accepted from `LaunchCharacter`, m/s.
    pub max_launch_speed: f32,
    /// Extra distance allowed when checking that a wall jump has a wall, m.
    pub wall_jump_margin: f32,
}

/// Loopback transport settings used by the demo.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// One-way latency in ticks for both channels.
    pub latency_ticks: u32,
    /// Probability that an unreliable packet is dropped (0.0 - 1.0).
    pub unreliable_loss: f32,
    /// Seed for the loss generator.
    pub seed: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

// --- Default implementations ---

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            gravity_z: -9.81,
            max_walk_speed: 6.0,
            max_acceleration: 20.0,
            braking_deceleration: 20.0,
            air_control: 0.35,
            targeting_speed_modifier: 0.5,
            running_speed_modifier: 1.5,
        }
    }
}

impl Default for TeleportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            distance: 10.0,
        }
    }
}

impl Default for JetpackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_fuel: 100.0,
            consumption_rate: 10.0,
            refill_rate: 5.0,
            thrust_force: 12.0,
            acceleration_modifier: 2.0,
            gravity_scale: 0.0,
        }
    }
}

impl Default for WallRunConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_run_time: 3.5,
            min_speed: 2.0,
            collision_radius: 0.35,
            detection_margin: 0.3,
            max_wall_tilt_deg: 45.0,
            side_lean_deg: 15.0,
        }
    }
}

impl Default for WallJumpConfig {
    fn default() -> Self {
        Self { strength: 8.0 }
    }
}

impl Default for FreezeConfig {
    fn default() -> Self {
        Self { frozen_time: 3.0 }
    }
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 128,
            send_interval_ticks: 2,
            max_combined_delta: 0.125,
            position_tolerance: 0.01,
            fuel_tolerance: 0.05,
            max_smooth_distance: 0.92,
            no_smooth_distance: 1.4,
            smoothing_decay_rate: 10.0,
            divergence_warn_distance: 2.0,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_commands_per_second: 20,
            max_launch_speed: 20.0,
            wall_jump_margin: 0.25,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            latency_ticks: 3,
            unreliable_loss: 0.05,
            seed: 7,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Default per-user config directory (`<config_dir>/kinetic`), falling back
/// to the working directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("kinetic"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            let config = read_config(&config_path)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        std::fs::create_dir_all(config_dir).map_err(|source| ConfigError::Write {
            path: config_dir.to_path_buf(),
            source,
        })?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized = ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::Encode)?;

        std::fs::write(&config_path, serialized)
            .map_err(|source| ConfigError::Write { path: config_path, source })?;
        Ok(())
    }

    /// Hot-reload: returns `Some(new_config)` if the file changed, `None` otherwise.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let new_config = read_config(&config_dir.join(CONFIG_FILE_NAME))?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }

    /// Rejects values the simulator or the link cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let prediction = &self.prediction;
        if self.simulation.tick_rate == 0 {
            return Err(ConfigError::out_of_range("simulation.tick_rate", "must be at least 1"));
        }
        if prediction.send_interval_ticks == 0 {
            return Err(ConfigError::out_of_range(
                "prediction.send_interval_ticks",
                "must be at least 1",
            ));
        }
        if prediction.buffer_capacity == 0 {
            return Err(ConfigError::out_of_range(
                "prediction.buffer_capacity",
                "must be at least 1",
            ));
        }
        if prediction.position_tolerance.is_nan() || prediction.position_tolerance < 0.0 {
            return Err(ConfigError::out_of_range(
                "prediction.position_tolerance",
                "must not be negative",
            ));
        }
        if prediction.fuel_tolerance.is_nan() || prediction.fuel_tolerance < 0.0 {
            return Err(ConfigError::out_of_range(
                "prediction.fuel_tolerance",
                "must not be negative",
            ));
        }
        if self.jetpack.max_fuel.is_nan() || self.jetpack.max_fuel <= 0.0 {
            return Err(ConfigError::out_of_range("jetpack.max_fuel", "must be positive"));
        }
        if !(0.0..=1.0).contains(&self.network.unreliable_loss) {
            return Err(ConfigError::out_of_range(
                "network.unreliable_loss",
                "must be within 0..=1",
            ));
        }
        Ok(())
    }

    /// Duration of one simulation tick in seconds.
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.simulation.tick_rate.max(1) as f32
    }
}

/// Reads, parses and validates the config file at `path`.
fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = ron::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let config = Config::default();
        let ron_str =
            ron::ser::to_string_pretty(&config, ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(!ron_str.is_empty());
        assert!(ron_str.contains("max_run_time: 3.5"));
        assert!(ron_str.contains("tick_rate: 60"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let ron_str = ron::to_string(&config).unwrap();
        let deserialized: Config = ron::from_str(&ron_str).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let ron_str = "(simulation: (), teleport: (distance: 4.0))";
        let config: Config = ron::from_str(ron_str).unwrap();
        assert_eq!(config.jetpack, JetpackConfig::default());
        assert_eq!(config.teleport.distance, 4.0);
        assert!(config.teleport.enabled);
    }

    #[test]
    fn test_extra_field_ignored() {
        let ron_str = "(future_setting: true)";
        let result: Result<Config, _> = ron::from_str(ron_str);
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.jetpack.max_fuel = 250.0;
        config.wall_run.enabled = false;

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(loaded, Config::default());
        assert!(dir.path().join("config.ron").exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.freeze.frozen_time = 1.25;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_some());
        assert_eq!(result.unwrap().freeze.frozen_time, 1.25);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let result: Result<Config, _> = ron::from_str("{{not valid}}");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_file_error_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(&path, "{{not valid}}").unwrap();

        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(&err, ConfigError::Parse { path: p, .. } if *p == path));
        assert!(err.to_string().contains("config.ron"));
    }

    #[test]
    fn test_out_of_range_values_rejected_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.prediction.send_interval_ticks = 0;
        config.save(dir.path()).unwrap();

        let err = Config::load_or_create(dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { field: "prediction.send_interval_ticks", .. }
        ));
        assert!(config.reload(dir.path()).is_err());
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.network.unreliable_loss = 1.5;
        assert!(config.validate().is_err());
        config.network.unreliable_loss = 0.2;
        config.prediction.fuel_tolerance = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tick_seconds_matches_rate() {
        let mut config = Config::default();
        config.simulation.tick_rate = 20;
        assert!((config.tick_seconds() - 0.05).abs() < f32::EPSILON);
    }
}
