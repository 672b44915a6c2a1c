/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: String,
    /// Joins beyond this are refused
    pub max_participants: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:9002".to_string(),
            max_participants: 64,
        }
    }
}

impl RelayConfig {
    /// Defaults, with the listen address taken from `CLASSROOM_RELAY_ADDR` when set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = std::env::var("CLASSROOM_RELAY_ADDR") {
            config.listen_addr = addr;
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.trim().is_empty() {
            return Err("listen_addr must not be empty".to_string());
        }
        if self.max_participants == 0 {
            return Err("max_participants must be > 0".to_string());
        }
        if self.max_participants > u16::MAX as usize {
            return Err(format!(
                "max_participants must be <= {}, got {}",
                u16::MAX,
                self.max_participants
            ));
        }
        Ok(())
    }
}
