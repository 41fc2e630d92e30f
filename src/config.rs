use std::env;
use std::str::FromStr;

use crate::blockchain::{DEFAULT_BLOCK_REWARD, DEFAULT_DIFFICULTY};
use crate::error::{NodeError, Result};

/// Node settings, read from the process environment (and `.env`).
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub http_host: String,
    pub http_port: u16,
    pub p2p_port: u16,
    pub initial_peers: Vec<String>,
    pub mail_address: String,
    pub difficulty: u32,
    pub block_reward: u64,
}

impl NodeConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup; `from_env` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mail_address = lookup("EMAIL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| NodeError::Config("Mail address was not specified!".into()))?;

        let initial_peers = lookup("PEERS")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            http_host: lookup("HTTP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            http_port: parse_or(&lookup, "HTTP_PORT", 3001)?,
            p2p_port: parse_or(&lookup, "P2P_PORT", 6001)?,
            initial_peers,
            mail_address,
            difficulty: parse_or(&lookup, "DIFFICULTY", DEFAULT_DIFFICULTY)?,
            block_reward: parse_or(&lookup, "BLOCK_REWARD", DEFAULT_BLOCK_REWARD)?,
        })
    }

    /// Address other nodes dial to reach our gossip listener.
    pub fn p2p_address(&self) -> String {
        format!("{}:{}", self.http_host, self.p2p_port)
    }

    /// Challenge string signed during peer authorization.
    pub fn advertised_url(&self) -> String {
        format!("tcp://{}", self.p2p_address())
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| NodeError::Config(format!("{key} has an invalid value: {raw}"))),
        None => Ok(default),
    }
}
