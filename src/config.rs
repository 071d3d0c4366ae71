//! Configuration management for the probe.
//!
//! This module handles loading and saving configuration from disk: which
//! remote device to probe, which service to look for and how to answer
//! pairing and HFP feature exchanges.

use std::{
   env, fs,
   path::{Path, PathBuf},
   str::FromStr,
   time::Duration,
};

use bluer::Address;
use serde::{Deserialize, Serialize};

use crate::error::{ProbeError, Result};

/// Main configuration structure for the probe.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Config {
   /// Remote device to query and connect to.
   #[serde(default = "default_remote_address")]
   pub remote_address: String,

   /// Adapter name (e.g. `hci0`); the default adapter when unset.
   #[serde(default)]
   pub adapter: Option<String>,

   /// 16-bit service class UUID to search for.
   #[serde(default = "default_service_uuid")]
   pub service_uuid: u16,

   /// RFCOMM channel to open. `0` means the first discovered channel.
   #[serde(default = "default_rfcomm_channel")]
   pub rfcomm_channel: Option<u8>,

   #[serde(default = "default_pin_code")]
   pub pin_code: String,

   /// Audio Gateway supported features reported in `+BRSF`.
   #[serde(default = "default_ag_features")]
   pub ag_features: u32,

   #[serde(default = "default_sdp_timeout")]
   pub sdp_timeout_sec: u64,

   #[serde(default = "default_connect_timeout")]
   pub connect_timeout_sec: u64,

   #[serde(default = "default_rfcomm_frame_size")]
   pub rfcomm_frame_size: u16,
}

fn default_remote_address() -> String {
   "00:21:3C:AC:F7:38".to_string()
}

const fn default_service_uuid() -> u16 {
   0x111E
}

const fn default_rfcomm_channel() -> Option<u8> {
   Some(2)
}

fn default_pin_code() -> String {
   "0000".to_string()
}

const fn default_ag_features() -> u32 {
   224
}

const fn default_sdp_timeout() -> u64 {
   10
}

const fn default_connect_timeout() -> u64 {
   10
}

const fn default_rfcomm_frame_size() -> u16 {
   667
}

impl Default for Config {
   fn default() -> Self {
      Self {
         remote_address: default_remote_address(),
         adapter: None,
         service_uuid: default_service_uuid(),
         rfcomm_channel: default_rfcomm_channel(),
         pin_code: default_pin_code(),
         ag_features: default_ag_features(),
         sdp_timeout_sec: default_sdp_timeout(),
         connect_timeout_sec: default_connect_timeout(),
         rfcomm_frame_size: default_rfcomm_frame_size(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      Self::load_from(&Self::config_path()?)
   }

   /// Loads configuration from `path`, writing the defaults there if the
   /// file does not exist yet.
   pub fn load_from(path: &Path) -> Result<Self> {
      let config = if path.exists() {
         let contents = fs::read_to_string(path)?;
         toml::from_str::<Self>(&contents)?
      } else {
         let config = Self::default();
         config.save_to(path)?;
         config
      };
      config.validate()?;
      Ok(config)
   }

   /// Saves the current configuration to `path`.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      if let Ok(home) = env::var("HFP_PROBE_HOME") {
         return Ok(PathBuf::from(home).join("config.toml"));
      }

      let config_dir = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
         PathBuf::from(config_home)
      } else {
         dirs::config_dir().ok_or(ProbeError::ConfigDirNotFound)?
      };

      Ok(config_dir.join("hfp-probe").join("config.toml"))
   }

   fn validate(&self) -> Result<()> {
      self.remote()?;
      if self.pin_code.is_empty() || self.pin_code.len() > 16 {
         return Err(ProbeError::InvalidPinCode);
      }
      Ok(())
   }

   /// Parses the configured remote address.
   pub fn remote(&self) -> Result<Address> {
      Address::from_str(&self.remote_address)
         .map_err(|_| ProbeError::InvalidAddress(self.remote_address.clone()))
   }

   /// Replaces the remote address, e.g. from the command line.
   pub fn with_remote(mut self, address: &str) -> Result<Self> {
      self.remote_address = address.to_string();
      self.remote()?;
      Ok(self)
   }

   pub const fn sdp_timeout(&self) -> Duration {
      Duration::from_secs(self.sdp_timeout_sec)
   }

   pub const fn connect_timeout(&self) -> Duration {
      Duration::from_secs(self.connect_timeout_sec)
   }
}
