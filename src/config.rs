//! Configuration management for the monitor.
//!
//! Settings come from an optional TOML file, with command line flags
//! layered on top.

use std::{
   env, fs,
   path::{Path, PathBuf},
   time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
   bluetooth::address::DeviceAddress,
   error::{MonitorError, Result},
};

/// Main configuration structure for the monitor.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
   /// Only report this device.
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub filter_address: Option<DeviceAddress>,

   /// Device whose disconnection triggers the lock action.
   #[serde(default, skip_serializing_if = "Option::is_none")]
   pub lock_address: Option<DeviceAddress>,

   #[serde(default = "default_lock_delay")]
   pub lock_delay: u64,

   #[serde(default = "default_lock_script")]
   pub lock_script: PathBuf,

   #[serde(default = "default_poll_interval")]
   pub poll_interval: u64,

   #[serde(default = "default_query_timeout")]
   pub query_timeout: u64,

   #[serde(default = "default_name_timeout")]
   pub name_timeout: u64,

   #[serde(default = "default_feed_restart_delay")]
   pub feed_restart_delay: u64,
}

/// Values given on the command line, overriding the file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
   pub filter_address: Option<DeviceAddress>,
   pub lock_address: Option<DeviceAddress>,
   pub lock_delay: Option<u64>,
   pub lock_script: Option<PathBuf>,
}

const fn default_lock_delay() -> u64 {
   5
}

fn default_lock_script() -> PathBuf {
   PathBuf::from("lock_screen.sh")
}

const fn default_poll_interval() -> u64 {
   5
}

const fn default_query_timeout() -> u64 {
   5
}

const fn default_name_timeout() -> u64 {
   2
}

const fn default_feed_restart_delay() -> u64 {
   1
}

impl Default for Config {
   fn default() -> Self {
      Self {
         filter_address: None,
         lock_address: None,
         lock_delay: default_lock_delay(),
         lock_script: default_lock_script(),
         poll_interval: default_poll_interval(),
         query_timeout: default_query_timeout(),
         name_timeout: default_name_timeout(),
         feed_restart_delay: default_feed_restart_delay(),
      }
   }
}

impl Config {
   /// Loads configuration from disk or creates default if not exists.
   pub fn load() -> Result<Self> {
      let config_path = Self::config_path()?;

      if config_path.exists() {
         Self::read(&config_path)
      } else {
         let config = Self::default();
         config.save_to(&config_path)?;
         Ok(config)
      }
   }

   /// Loads configuration from an explicit path, which must exist.
   pub fn load_from(path: &Path) -> Result<Self> {
      if !path.exists() {
         return Err(MonitorError::ConfigNotFound(path.to_path_buf()));
      }
      Self::read(path)
   }

   fn read(path: &Path) -> Result<Self> {
      let contents = fs::read_to_string(path)?;
      Ok(toml::from_str(&contents)?)
   }

   /// Saves the configuration to `path`, creating parent directories.
   pub fn save_to(&self, path: &Path) -> Result<()> {
      if let Some(parent) = path.parent() {
         fs::create_dir_all(parent)?;
      }

      let contents = toml::to_string_pretty(self)?;
      fs::write(path, contents)?;

      Ok(())
   }

   fn config_path() -> Result<PathBuf> {
      let config_dir = if let Ok(home) = env::var("BLUEWATCH_HOME") {
         PathBuf::from(home)
      } else if let Some(config_home) = dirs::config_dir() {
         config_home.join("bluewatch")
      } else {
         return Err(MonitorError::ConfigDirNotFound);
      };

      Ok(config_dir.join("config.toml"))
   }

   /// Applies command line values on top of the loaded configuration.
   #[must_use]
   pub fn with_overrides(mut self, overrides: Overrides) -> Self {
      if overrides.filter_address.is_some() {
         self.filter_address = overrides.filter_address;
      }
      if overrides.lock_address.is_some() {
         self.lock_address = overrides.lock_address;
      }
      if let Some(delay) = overrides.lock_delay {
         self.lock_delay = delay;
      }
      if let Some(script) = overrides.lock_script {
         self.lock_script = script;
      }
      self
   }

   /// Rejects values the monitor cannot run with.
   pub fn validate(&self) -> Result<()> {
      for (field, secs) in [
         ("poll_interval", self.poll_interval),
         ("query_timeout", self.query_timeout),
         ("name_timeout", self.name_timeout),
      ] {
         if secs == 0 {
            return Err(MonitorError::InvalidConfig(format!("{field} must be at least 1 second")));
         }
      }

      let now = Instant::now();
      for (field, secs) in [
         ("lock_delay", self.lock_delay),
         ("poll_interval", self.poll_interval),
         ("feed_restart_delay", self.feed_restart_delay),
      ] {
         if now.checked_add(Duration::from_secs(secs)).is_none() {
            return Err(MonitorError::InvalidConfig(format!("{field} of {secs}s is too large")));
         }
      }

      // The filter hides every other device, including the watched one.
      if let (Some(filter), Some(lock)) = (&self.filter_address, &self.lock_address)
         && filter != lock
      {
         return Err(MonitorError::InvalidConfig(format!(
            "lock address {lock} is excluded by filter {filter}"
         )));
      }

      Ok(())
   }

   pub const fn lock_delay(&self) -> Duration {
      Duration::from_secs(self.lock_delay)
   }

   pub const fn poll_interval(&self) -> Duration {
      Duration::from_secs(self.poll_interval)
   }

   pub const fn query_timeout(&self) -> Duration {
      Duration::from_secs(self.query_timeout)
   }

   pub const fn name_timeout(&self) -> Duration {
      Duration::from_secs(self.name_timeout)
   }

   pub const fn feed_restart_delay(&self) -> Duration {
      Duration::from_secs(self.feed_restart_delay)
   }
}

#[cfg(test)]
mod tests {
   use tempfile::TempDir;

   use super::*;

   #[test]
   fn test_defaults() {
      let config = Config::default();
      assert_eq!(config.lock_delay(), Duration::from_secs(5));
      assert_eq!(config.poll_interval(), Duration::from_secs(5));
      assert_eq!(config.query_timeout(), Duration::from_secs(5));
      assert_eq!(config.name_timeout(), Duration::from_secs(2));
      assert_eq!(config.lock_script, PathBuf::from("lock_screen.sh"));
      assert!(config.lock_address.is_none());
   }

   #[test]
   fn test_partial_file_uses_defaults() {
      let config: Config = toml::from_str(
         r#"
            lock_address = "5c-a0-6c-16-8a-24"
            lock_delay = 30
         "#,
      )
      .unwrap();
      assert_eq!(
         config.lock_address,
         Some("5C:A0:6C:16:8A:24".parse().unwrap())
      );
      assert_eq!(config.lock_delay(), Duration::from_secs(30));
      assert_eq!(config.poll_interval, default_poll_interval());
   }

   #[test]
   fn test_invalid_address_is_rejected() {
      let result = toml::from_str::<Config>(r#"filter_address = "not-a-mac""#);
      assert!(result.is_err());
   }

   #[test]
   fn test_save_and_load_roundtrip() {
      let dir = TempDir::new().unwrap();
      let path = dir.path().join("nested").join("config.toml");
      let config = Config {
         filter_address: Some("AA:BB:CC:11:22:33".parse().unwrap()),
         lock_script: PathBuf::from("/usr/local/bin/lock"),
         ..Config::default()
      };

      config.save_to(&path).unwrap();
      assert_eq!(Config::load_from(&path).unwrap(), config);
   }

   #[test]
   fn test_load_from_missing_path() {
      let dir = TempDir::new().unwrap();
      let result = Config::load_from(&dir.path().join("absent.toml"));
      assert!(matches!(result, Err(MonitorError::ConfigNotFound(_))));
   }

   #[test]
   fn test_load_creates_default_file() {
      let dir = TempDir::new().unwrap();
      unsafe {
         env::set_var("BLUEWATCH_HOME", dir.path());
      }

      let config = Config::load().unwrap();
      assert_eq!(config, Config::default());
      assert!(dir.path().join("config.toml").exists());
   }

   #[test]
   fn test_validate_accepts_defaults() {
      assert!(Config::default().validate().is_ok());

      let same = Config {
         filter_address: Some("AA:BB:CC:11:22:33".parse().unwrap()),
         lock_address: Some("aa:bb:cc:11:22:33".parse().unwrap()),
         ..Config::default()
      };
      assert!(same.validate().is_ok());
   }

   #[test]
   fn test_validate_rejects_zero_durations() {
      for config in [
         Config {
            poll_interval: 0,
            ..Config::default()
         },
         Config {
            query_timeout: 0,
            ..Config::default()
         },
         Config {
            name_timeout: 0,
            ..Config::default()
         },
      ] {
         assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));
      }
   }

   #[test]
   fn test_validate_rejects_unrepresentable_delays() {
      for config in [
         Config {
            lock_delay: u64::MAX,
            ..Config::default()
         },
         Config {
            poll_interval: u64::MAX,
            ..Config::default()
         },
         Config {
            feed_restart_delay: u64::MAX,
            ..Config::default()
         },
      ] {
         assert!(matches!(config.validate(), Err(MonitorError::InvalidConfig(_))));
      }
   }

   #[test]
   fn test_validate_rejects_lock_address_outside_filter() {
      let config = Config {
         filter_address: Some("AA:BB:CC:11:22:33".parse().unwrap()),
         lock_address: Some("5C:A0:6C:16:8A:24".parse().unwrap()),
         ..Config::default()
      };
      let err = config.validate().unwrap_err();
      assert!(err.to_string().contains("excluded by filter"));
   }

   #[test]
   fn test_overrides_take_precedence() {
      let file = Config {
         lock_address: Some("AA:BB:CC:11:22:33".parse().unwrap()),
         lock_delay: 30,
         ..Config::default()
      };
      let config = file.with_overrides(Overrides {
         lock_address: Some("5C:A0:6C:16:8A:24".parse().unwrap()),
         lock_script: Some(PathBuf::from("/opt/lock")),
         ..Overrides::default()
      });

      assert_eq!(config.lock_address, Some("5C:A0:6C:16:8A:24".parse().unwrap()));
      assert_eq!(config.lock_delay, 30);
      assert_eq!(config.lock_script, PathBuf::from("/opt/lock"));
      assert!(config.filter_address.is_none());
   }
}
