// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Execution configuration for aggregate operator instances.
//!
//! Values come from defaults, optionally overridden by `BASALT_*` environment
//! variables. The struct is validated once and then treated as read-only.

/// Runtime knobs for one operator factory and the instances it creates.
#[derive(Clone, Debug)]
pub struct ExecConfig {
    /// Max rows per output chunk produced during the output phase.
    pub chunk_size: usize,
    /// Block size for the aggregate state arena.
    pub state_arena_block_size: usize,
    /// Whether to attempt a specialized row-batch routine at build start.
    pub enable_specialization: bool,
    /// Memory limit in bytes for one operator instance; negative means unlimited.
    pub mem_limit_bytes: i64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            state_arena_block_size: 64 * 1024,
            enable_specialization: true,
            mem_limit_bytes: -1,
        }
    }
}

impl ExecConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = parse_env::<usize>("BASALT_CHUNK_SIZE") {
            config.chunk_size = v;
        }
        if let Some(v) = parse_env::<usize>("BASALT_STATE_ARENA_BLOCK_SIZE") {
            config.state_arena_block_size = v;
        }
        if let Some(v) = parse_env::<bool>("BASALT_ENABLE_SPECIALIZATION") {
            config.enable_specialization = v;
        }
        if let Some(v) = parse_env::<i64>("BASALT_MEM_LIMIT_BYTES") {
            config.mem_limit_bytes = v;
        }
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("chunk_size must be positive".to_string());
        }
        if self.state_arena_block_size == 0 {
            return Err("state_arena_block_size must be positive".to_string());
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring unparsable {}={}", name, trimmed);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ExecConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = ExecConfig {
            chunk_size: 0,
            ..ExecConfig::default()
        };
        let err = config.validate().expect_err("expected validation error");
        assert!(err.contains("chunk_size"), "err={}", err);
    }
}
