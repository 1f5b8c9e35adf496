use std::fmt;
use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use interlock_codec::{Framing, TypeWidth};
use interlock_mesh::{MeshConfig, PeerSeed};

/// Node configuration, layered defaults < file < `INTERLOCK_*` env vars.
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub name: String,
    pub bind: String,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
    #[serde(deserialize_with = "deserialize_list")]
    pub accepted_signals: Vec<String>,
    #[serde(deserialize_with = "deserialize_list")]
    pub emit_signals: Vec<String>,
    /// `binary-u8`, `binary-u16`, or `json`.
    pub framing: String,
    /// Static peers as `name@host:port` literals.
    #[serde(deserialize_with = "deserialize_list")]
    pub peers: Vec<String>,
}

impl NodeConfig {
    /// Loads config with built-in defaults. A missing file is recovered
    /// with the defaults; the caller logs the warning since falling back
    /// silently changes port/peer behavior.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("name", "interlock-node")?
            .set_default("bind", "0.0.0.0:47000")?
            .set_default("heartbeat_interval", "5s")?
            .set_default("heartbeat_timeout", "15s")?
            .set_default("accepted_signals", Vec::<String>::new())?
            .set_default("emit_signals", Vec::<String>::new())?
            .set_default("framing", "binary-u8")?
            .set_default("peers", Vec::<String>::new())?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(Environment::with_prefix("INTERLOCK"));
        builder.build()?.try_deserialize()
    }

    /// Converts into the mesh-layer config, parsing peer and framing
    /// literals.
    pub fn into_mesh_config(self) -> Result<MeshConfig, String> {
        let framing = parse_framing(&self.framing)?;
        let peers = self
            .peers
            .iter()
            .map(|literal| parse_peer_literal(literal))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MeshConfig {
            name: self.name,
            bind: self.bind,
            peers,
            heartbeat_interval: self.heartbeat_interval,
            heartbeat_timeout: self.heartbeat_timeout,
            accepted_signals: self.accepted_signals,
            emit_signals: self.emit_signals,
            framing,
        })
    }
}

fn parse_framing(literal: &str) -> Result<Framing, String> {
    match literal {
        "binary-u8" => Ok(Framing::Binary(TypeWidth::U8)),
        "binary-u16" => Ok(Framing::Binary(TypeWidth::U16)),
        "json" => Ok(Framing::Json),
        other => Err(format!(
            "unknown framing `{other}` (expected binary-u8, binary-u16, or json)"
        )),
    }
}

fn parse_peer_literal(literal: &str) -> Result<PeerSeed, String> {
    let (name, addr) = literal
        .split_once('@')
        .ok_or_else(|| format!("peer `{literal}` is not name@host:port"))?;
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| format!("peer `{literal}` is missing a port"))?;
    let port: u16 = port
        .parse()
        .map_err(|_| format!("peer `{literal}` has an invalid port"))?;
    if name.is_empty() || host.is_empty() {
        return Err(format!("peer `{literal}` is not name@host:port"));
    }
    Ok(PeerSeed {
        name: name.to_string(),
        host: host.to_string(),
        port,
    })
}

fn deserialize_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ListVisitor;

    impl<'de> Visitor<'de> for ListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or a sequence of strings")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(value
                .split(|c| c == ',' || c == ';')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect())
        }

        fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
        where
            S: de::SeqAccess<'de>,
        {
            let mut vec = Vec::new();
            while let Some(element) = seq.next_element()? {
                vec.push(element);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(ListVisitor)
}
