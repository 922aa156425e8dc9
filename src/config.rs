//! Configuration management for the gesture scroll application

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How long a vanished hand keeps its state before a forced release (ms)
    pub hand_loss_grace_ms: u64,

    /// Camera capture configuration
    pub camera: CameraConfig,

    /// TouchProof fusion detector configuration
    pub touchproof: TouchProofConfig,

    /// Velocity tracker configuration
    pub velocity: VelocityConfig,

    /// Scroll activation controller configuration
    pub controller: ControllerConfig,

    /// Scroll emission configuration
    pub scroll: ScrollConfig,

    /// Optical flow probe configuration
    pub optical_flow: OpticalFlowConfig,

    /// HUD broadcaster configuration
    pub hud: HudConfig,

    /// Hand pose test configuration
    pub pose: PoseConfig,
}

/// Camera capture parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index
    pub index: i32,

    /// Requested capture width in pixels
    pub frame_width: i32,

    /// Mirror the feed horizontally
    pub mirror: bool,
}

/// TouchProof multi-signal detection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TouchProofConfig {
    /// Fingertip separation considered touching (finger-length units)
    pub proximity_enter: f64,

    /// Fingertip separation considered apart
    pub proximity_exit: f64,

    /// Separation beyond which the frame auto-fails
    pub proximity_hard_cap: f64,

    /// Max fingertip angle for parallel fingers (degrees)
    pub angle_enter_deg: f64,

    /// Exit angle threshold (degrees)
    pub angle_exit_deg: f64,

    /// Angle beyond which the frame auto-fails (degrees)
    pub angle_hard_cap_deg: f64,

    /// Proximity threshold leniency per unit of distance factor
    pub k_d: f64,

    /// Angle threshold tightening per unit of closeness (degrees)
    pub k_theta: f64,

    /// EMA weight of the new proximity score
    pub proximity_ema_alpha: f64,

    /// EMA weight of the new raw angle
    pub angle_ema_alpha: f64,

    /// Visibility asymmetry that saturates the occlusion signal
    pub visibility_asymmetry_min: f64,

    /// Fused score required to arm
    pub fused_enter_threshold: f64,

    /// Fused score below which the detector disarms
    pub fused_exit_threshold: f64,

    /// Consecutive qualifying frames to arm
    pub frames_to_enter: u32,

    /// Consecutive qualifying frames to disarm
    pub frames_to_exit: u32,

    /// Lower edge of the uncertainty band that triggers MFC evaluation
    pub mfc_gate_low: f64,

    /// Upper edge of the uncertainty band that triggers MFC evaluation
    pub mfc_gate_high: f64,
}

/// Velocity tracker parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Trailing window for the endpoint velocity estimate (ms)
    pub window_ms: u64,

    /// EMA weight of the new raw velocity
    pub ema_beta: f64,

    /// Deadband: smoothed components below this are zeroed (units/s)
    pub noise_threshold: f64,

    /// Minimum samples in the window for a valid estimate
    pub min_samples: usize,

    /// Minimum window span for a valid estimate (ms)
    pub min_dt_ms: u64,
}

/// Scroll activation controller parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Velocity magnitude treated as idle (units/s)
    pub end_idle_threshold: f64,

    /// Sustained-idle duration that ends an episode; None leaves the tail
    /// to OS momentum
    pub end_idle_hold_ms: Option<u64>,
}

/// Scroll emission parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Enable scroll event posting
    pub enabled: bool,

    /// Pixels per image-normalized unit of fingertip travel
    pub pixels_per_unit: f64,

    /// Largest delta a single event may carry (px)
    pub max_step_px: f64,

    /// Velocity magnitude that maps to HUD speed 1.0 (units/s)
    pub velocity_ref: f64,

    /// Respect the OS natural-scrolling preference
    pub respect_system_preference: bool,
}

/// Optical flow probe parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpticalFlowConfig {
    /// Flow-pair history length in frames
    pub window_frames: usize,

    /// Square patch side for Lucas-Kanade (px)
    pub patch_size: i32,

    /// Smallest magnitude ratio that still counts as agreement
    pub mag_ratio_min: f64,
}

/// HUD broadcaster parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HudConfig {
    /// Enable the WebSocket HUD channel
    pub enabled: bool,

    /// Localhost port to bind
    pub port: u16,

    /// Session token; auto-generated when None
    pub token: Option<String>,

    /// Ceiling for scroll/touchproof messages (Hz)
    pub hud_hz: u32,

    /// Ceiling for camera frames (Hz)
    pub camera_hz: u32,

    /// Secondary divider: publish every Nth camera frame
    pub camera_frame_skip: u32,

    /// HUD window placement hint forwarded to clients
    pub position: String,

    /// HUD opacity hint forwarded to clients
    pub opacity: f64,
}

/// Hand pose test parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    /// Finger-lengths a tip must sit beyond its knuckle, along the hand
    /// axis, to count as extended
    pub extension_margin: f64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hand_loss_grace_ms: 200,
            camera: CameraConfig::default(),
            touchproof: TouchProofConfig::default(),
            velocity: VelocityConfig::default(),
            controller: ControllerConfig::default(),
            scroll: ScrollConfig::default(),
            optical_flow: OpticalFlowConfig::default(),
            hud: HudConfig::default(),
            pose: PoseConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            index: 0,
            frame_width: 960,
            mirror: true,
        }
    }
}

impl Default for TouchProofConfig {
    fn default() -> Self {
        Self {
            proximity_enter: 0.15,
            proximity_exit: 0.25,
            proximity_hard_cap: 0.70,
            angle_enter_deg: 20.0,
            angle_exit_deg: 28.0,
            angle_hard_cap_deg: 45.0,
            k_d: 0.30,
            k_theta: 2.0,
            proximity_ema_alpha: 0.3,
            angle_ema_alpha: 0.2,
            visibility_asymmetry_min: 0.12,
            fused_enter_threshold: 0.75,
            fused_exit_threshold: 0.58,
            frames_to_enter: 4,
            frames_to_exit: 3,
            mfc_gate_low: 0.40,
            mfc_gate_high: 0.70,
        }
    }
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            window_ms: 100,
            ema_beta: 0.3,
            noise_threshold: 0.01,
            min_samples: 3,
            min_dt_ms: 10,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            end_idle_threshold: 0.05,
            end_idle_hold_ms: None,
        }
    }
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pixels_per_unit: 800.0,
            max_step_px: 100.0,
            velocity_ref: 3.0,
            respect_system_preference: true,
        }
    }
}

impl Default for OpticalFlowConfig {
    fn default() -> Self {
        Self {
            window_frames: 5,
            patch_size: 15,
            mag_ratio_min: 0.6,
        }
    }
}

impl Default for HudConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8765,
            token: None,
            hud_hz: 60,
            camera_hz: 30,
            camera_frame_skip: 3,
            position: "bottom-right".to_string(),
            opacity: 0.8,
        }
    }
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            extension_margin: 0.25,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::Config(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let tp = &self.touchproof;
        // Equal enter/exit is allowed: the scorer degrades to a step function
        if tp.proximity_enter > tp.proximity_exit {
            return Err(Error::Config(
                "proximity_enter must not exceed proximity_exit".to_string(),
            ));
        }
        if tp.proximity_exit > tp.proximity_hard_cap {
            return Err(Error::Config(
                "proximity_exit must not exceed proximity_hard_cap".to_string(),
            ));
        }
        if tp.angle_enter_deg > tp.angle_exit_deg {
            return Err(Error::Config(
                "angle_enter_deg must not exceed angle_exit_deg".to_string(),
            ));
        }
        if tp.angle_exit_deg > tp.angle_hard_cap_deg {
            return Err(Error::Config(
                "angle_exit_deg must not exceed angle_hard_cap_deg".to_string(),
            ));
        }
        if tp.fused_exit_threshold >= tp.fused_enter_threshold {
            return Err(Error::Config(
                "fused_exit_threshold must be below fused_enter_threshold".to_string(),
            ));
        }
        if tp.frames_to_enter == 0 || tp.frames_to_exit == 0 {
            return Err(Error::Config(
                "frames_to_enter and frames_to_exit must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("touchproof.proximity_ema_alpha", tp.proximity_ema_alpha),
            ("touchproof.angle_ema_alpha", tp.angle_ema_alpha),
            ("velocity.ema_beta", self.velocity.ema_beta),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::Config(format!("{name} must be between 0.0 and 1.0")));
            }
        }
        if tp.mfc_gate_low > tp.mfc_gate_high {
            return Err(Error::Config(
                "mfc_gate_low must not exceed mfc_gate_high".to_string(),
            ));
        }

        if self.velocity.window_ms == 0 {
            return Err(Error::Config("velocity.window_ms must be greater than 0".to_string()));
        }
        if self.velocity.min_samples < 2 {
            return Err(Error::Config("velocity.min_samples must be at least 2".to_string()));
        }

        if self.scroll.pixels_per_unit <= 0.0 || self.scroll.max_step_px <= 0.0 {
            return Err(Error::Config(
                "scroll.pixels_per_unit and scroll.max_step_px must be positive".to_string(),
            ));
        }
        if self.scroll.velocity_ref <= 0.0 {
            return Err(Error::Config("scroll.velocity_ref must be positive".to_string()));
        }

        if self.optical_flow.window_frames < 3 {
            return Err(Error::Config(
                "optical_flow.window_frames must be at least 3".to_string(),
            ));
        }
        if self.optical_flow.patch_size < 3 {
            return Err(Error::Config("optical_flow.patch_size must be at least 3".to_string()));
        }

        if self.hud.hud_hz == 0 || self.hud.camera_hz == 0 || self.hud.camera_frame_skip == 0 {
            return Err(Error::Config(
                "hud.hud_hz, hud.camera_hz and hud.camera_frame_skip must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.hud.opacity) {
            return Err(Error::Config("hud.opacity must be between 0.0 and 1.0".to_string()));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Glide gesture scroll configuration

hand_loss_grace_ms: 200

camera:
  index: 0
  frame_width: 960
  mirror: true

touchproof:
  proximity_enter: 0.15
  proximity_exit: 0.25
  proximity_hard_cap: 0.70
  angle_enter_deg: 20.0
  angle_exit_deg: 28.0
  angle_hard_cap_deg: 45.0
  k_d: 0.30
  k_theta: 2.0
  proximity_ema_alpha: 0.3
  angle_ema_alpha: 0.2
  visibility_asymmetry_min: 0.12
  fused_enter_threshold: 0.75
  fused_exit_threshold: 0.58
  frames_to_enter: 4
  frames_to_exit: 3
  mfc_gate_low: 0.40
  mfc_gate_high: 0.70

velocity:
  window_ms: 100
  ema_beta: 0.3
  noise_threshold: 0.01
  min_samples: 3
  min_dt_ms: 10

controller:
  end_idle_threshold: 0.05
  end_idle_hold_ms: null

scroll:
  enabled: true
  pixels_per_unit: 800.0
  max_step_px: 100.0
  velocity_ref: 3.0
  respect_system_preference: true

optical_flow:
  window_frames: 5
  patch_size: 15
  mag_ratio_min: 0.6

hud:
  enabled: true
  port: 8765
  token: null
  hud_hz: 60
  camera_hz: 30
  camera_frame_skip: 3
  position: "bottom-right"
  opacity: 0.8

pose:
  extension_margin: 0.25
"#;
