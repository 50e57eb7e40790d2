//! Configuration de la recherche SSDP
//!
//! La configuration suit le même schéma que le reste de PMOMusic :
//! 1. configuration par défaut intégrée (`pmossdp.yaml`)
//! 2. fusion avec un fichier YAML externe optionnel
//! 3. surcharges par variables d'environnement `PMOSSDP_CONFIG__SECTION__KEY`
//!
//! ```no_run
//! use pmossdp::SsdpConfig;
//!
//! let config = SsdpConfig::load(None)?;
//! println!("MX = {}", config.search.mx);
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::env;
use std::fs;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::{info, warn};

use crate::errors::SsdpError;
use crate::ssdp_multicast_host;

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("pmossdp.yaml");

const ENV_PREFIX: &str = "PMOSSDP_CONFIG__";

const DEFAULT_SEARCH_TARGET: &str = "ssdp:all";
const DEFAULT_MX: u32 = 2;
const DEFAULT_NUM_SENDS: usize = 3;
const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:0";
const DEFAULT_MULTICAST_TTL: u32 = 2;
const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Configuration complète du client SSDP
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SsdpConfig {
    pub search: SearchSection,
    pub network: NetworkSection,
}

/// Paramètres par défaut d'un M-SEARCH
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Cible de recherche (en-tête ST)
    pub target: String,
    /// Attente maximale annoncée aux devices, en secondes (en-tête MX)
    pub mx: u32,
    /// Nombre d'émissions de la requête
    pub num_sends: usize,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            target: DEFAULT_SEARCH_TARGET.to_string(),
            mx: DEFAULT_MX,
            num_sends: DEFAULT_NUM_SENDS,
        }
    }
}

/// Paramètres du socket HTTPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// Adresse locale du socket ; port 0 pour ne jamais occuper le port 1900
    pub bind_address: String,
    /// Destination des M-SEARCH (groupe multicast ou device en unicast)
    pub destination: String,
    pub multicast_ttl: u32,
    /// Taille du tampon de réception d'un datagramme
    pub buffer_size: usize,
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            destination: ssdp_multicast_host(),
            multicast_ttl: DEFAULT_MULTICAST_TTL,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }
}

impl SsdpConfig {
    /// Charge la configuration : défauts intégrés, fichier optionnel, environnement
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, env::vars())
    }

    /// Comme [`SsdpConfig::load`] avec un jeu de variables explicite
    pub fn load_with_env<I>(path: Option<&Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;

        if let Some(path) = path {
            match fs::read(path) {
                Ok(data) => {
                    info!(config_file=%path.display(), "Loaded SSDP config file");
                    let external: Value = serde_yaml::from_slice(&data)
                        .with_context(|| format!("Invalid YAML in {}", path.display()))?;
                    merge_yaml(&mut config_value, &lower_keys_value(external));
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    info!(config_file=%path.display(), "SSDP config file not found, using defaults");
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Cannot read SSDP config file {}", path.display()));
                }
            }
        }

        apply_env_overrides(&mut config_value, vars);

        serde_yaml::from_value(config_value).context("Invalid SSDP configuration")
    }

    /// Parse une configuration YAML complète ou partielle
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let mut config_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        let external: Value = serde_yaml::from_str(yaml)?;
        merge_yaml(&mut config_value, &lower_keys_value(external));
        Ok(serde_yaml::from_value(config_value)?)
    }

    pub fn bind_addr(&self) -> std::result::Result<SocketAddr, SsdpError> {
        parse_socket_addr("network.bind_address", &self.network.bind_address)
    }

    pub fn destination_addr(&self) -> std::result::Result<SocketAddr, SsdpError> {
        parse_socket_addr("network.destination", &self.network.destination)
    }
}

fn parse_socket_addr(key: &str, value: &str) -> std::result::Result<SocketAddr, SsdpError> {
    value
        .parse()
        .map_err(|e| SsdpError::Config(format!("{} = {:?}: {}", key, value, e)))
}

/// Applique les surcharges `PMOSSDP_CONFIG__...` et renvoie les variables ignorées
fn apply_env_overrides<I>(config: &mut Value, vars: I) -> Vec<String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut rejected = Vec::new();
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let key_path = stripped.split("__").collect::<Vec<_>>();
            let yaml_value = convert_env_value(&value);
            if let Err(error) = set_value_internal(config, &key_path, yaml_value) {
                warn!(key = %key, error = %error, "⚠️ Ignoring SSDP config override");
                rejected.push(key);
            }
        }
    }
    rejected
}

fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
    if path.is_empty() {
        *data = value;
        return Ok(());
    }
    if let Value::Mapping(map) = data {
        let key_value = Value::String(path[0].to_lowercase());
        if path.len() == 1 {
            map.insert(key_value, value);
        } else {
            let entry = map
                .entry(key_value)
                .or_insert(Value::Mapping(Mapping::new()));
            set_value_internal(entry, &path[1..], value)?;
        }
        Ok(())
    } else {
        Err(anyhow!("Current node is not a map"))
    }
}

fn convert_env_value(value: &str) -> Value {
    if let Ok(parsed) = serde_yaml::from_str::<Value>(value) {
        return parsed;
    }
    Value::String(value.to_string())
}

fn lower_keys_value(value: Value) -> Value {
    match value {
        Value::Mapping(map) => {
            let mut new_map = Mapping::new();
            for (k, v) in map {
                let k = match k {
                    Value::String(s) => Value::String(s.to_lowercase()),
                    other => other,
                };
                new_map.insert(k, lower_keys_value(v));
            }
            Value::Mapping(new_map)
        }
        Value::Sequence(seq) => Value::Sequence(seq.into_iter().map(lower_keys_value).collect()),
        _ => value,
    }
}

fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        // Fichier vide ou clé sans valeur : on garde le défaut
        (_, Value::Null) => {}
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}
