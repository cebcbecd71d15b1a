//! Tuning parameters for the hub and per-connection loops.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroCapacity(&'static str),

    #[error("ping interval ({ping:?}) must be shorter than the read timeout ({read:?})")]
    PingNotBeforeReadTimeout { ping: Duration, read: Duration },
}

/// Hub-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HubConfig {
    /// Capacity of each of the hub's intakes.
    pub intake_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            intake_capacity: 256,
        }
    }
}

impl HubConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.intake_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("intake capacity"));
        }
        Ok(())
    }
}

/// Settings applied to every admitted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Bound of the per-connection outbound queue. A full queue gets the
    /// connection evicted.
    pub outbound_capacity: usize,
    /// Largest inbound WebSocket message accepted, in bytes.
    pub max_message_size: usize,
    /// Interval between liveness probes written by the outbound loop.
    pub ping_interval: Duration,
    /// Maximum silence tolerated on the read side (pongs count as traffic).
    pub read_timeout: Duration,
    /// Deadline for every single outbound write.
    pub write_timeout: Duration,
    /// Deadline for one best-effort persistence call.
    pub persist_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: 1024,
            max_message_size: 64 * 1024,
            ping_interval: Duration::from_secs(54),
            read_timeout: Duration::from_secs(60),
            write_timeout: Duration::from_secs(10),
            persist_timeout: Duration::from_secs(5),
        }
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_capacity == 0 {
            return Err(ConfigError::ZeroCapacity("outbound capacity"));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::ZeroCapacity("max message size"));
        }
        if self.ping_interval >= self.read_timeout {
            return Err(ConfigError::PingNotBeforeReadTimeout {
                ping: self.ping_interval,
                read: self.read_timeout,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        // テスト項目: デフォルト設定はバリデーションを通過する
        // given (前提条件):
        let hub = HubConfig::default();
        let connection = ConnectionConfig::default();

        // when (操作):
        let results = (hub.validate(), connection.validate());

        // then (期待する結果):
        assert_eq!(results, (Ok(()), Ok(())));
    }

    #[test]
    fn test_ping_interval_must_be_shorter_than_read_timeout() {
        // テスト項目: ping 間隔が読み取りタイムアウト以上だとエラーになる
        // given (前提条件):
        let config = ConnectionConfig {
            ping_interval: Duration::from_secs(60),
            read_timeout: Duration::from_secs(60),
            ..ConnectionConfig::default()
        };

        // when (操作):
        let result = config.validate();

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(ConfigError::PingNotBeforeReadTimeout { .. })
        ));
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        // テスト項目: 容量 0 の設定はエラーになる
        // given (前提条件):
        let hub = HubConfig { intake_capacity: 0 };
        let connection = ConnectionConfig {
            outbound_capacity: 0,
            ..ConnectionConfig::default()
        };

        // when (操作):
        let hub_result = hub.validate();
        let connection_result = connection.validate();

        // then (期待する結果):
        assert_eq!(hub_result, Err(ConfigError::ZeroCapacity("intake capacity")));
        assert_eq!(
            connection_result,
            Err(ConfigError::ZeroCapacity("outbound capacity"))
        );
    }
}
