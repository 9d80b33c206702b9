use std::str::FromStr;

use crate::slots::{GridConfig, GridError};

/// Server settings, read once from `DAYGRID_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind: String,
    pub max_connections: usize,
    pub metrics_port: Option<u16>,
    pub grid: GridConfig,
    /// Therapists always shown as columns.
    pub roster: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5433,
            bind: "0.0.0.0".into(),
            max_connections: 256,
            metrics_port: None,
            grid: GridConfig::default(),
            roster: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, GridError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GridError> {
        let defaults = Config::default();

        let grid = GridConfig {
            start_hour: parse_var(&lookup, "DAYGRID_START_HOUR").unwrap_or(defaults.grid.start_hour),
            end_hour: parse_var(&lookup, "DAYGRID_END_HOUR").unwrap_or(defaults.grid.end_hour),
            slot_minutes: parse_var(&lookup, "DAYGRID_SLOT_MINUTES").unwrap_or(defaults.grid.slot_minutes),
            ..defaults.grid
        };
        grid.validate()?;

        let roster = lookup("DAYGRID_ROSTER")
            .map(|s| {
                s.split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            port: parse_var(&lookup, "DAYGRID_PORT").unwrap_or(defaults.port),
            bind: lookup("DAYGRID_BIND").unwrap_or(defaults.bind),
            max_connections: parse_var(&lookup, "DAYGRID_MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            metrics_port: parse_var(&lookup, "DAYGRID_METRICS_PORT"),
            grid,
            roster,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<Config, GridError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.addr(), "0.0.0.0:5433");
    }

    #[test]
    fn reads_overrides() {
        let config = from_pairs(&[
            ("DAYGRID_PORT", "6000"),
            ("DAYGRID_BIND", "127.0.0.1"),
            ("DAYGRID_METRICS_PORT", "9100"),
            ("DAYGRID_START_HOUR", "8"),
            ("DAYGRID_SLOT_MINUTES", "30"),
            ("DAYGRID_ROSTER", "Katy M, May L,,  "),
        ])
        .unwrap();
        assert_eq!(config.addr(), "127.0.0.1:6000");
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.grid.start_hour, 8);
        assert_eq!(config.grid.end_hour, 23);
        assert_eq!(config.grid.slot_minutes, 30);
        assert_eq!(config.roster, vec!["Katy M", "May L"]);
    }

    #[test]
    fn garbage_keeps_default() {
        let config = from_pairs(&[("DAYGRID_PORT", "lots"), ("DAYGRID_MAX_CONNECTIONS", "-1")]).unwrap();
        assert_eq!(config.port, 5433);
        assert_eq!(config.max_connections, 256);
    }

    #[test]
    fn rejects_bad_grid() {
        assert_eq!(
            from_pairs(&[("DAYGRID_START_HOUR", "23")]),
            Err(GridError::HourRange { start_hour: 23, end_hour: 23 })
        );
        assert_eq!(
            from_pairs(&[("DAYGRID_SLOT_MINUTES", "7")]),
            Err(GridError::SlotMinutes(7))
        );
    }
}
