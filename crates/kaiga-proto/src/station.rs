use serde::{Deserialize, Serialize};

/// A fixed streaming-audio source.  Stations are defined once at startup
/// (built-in catalog or `stations.toml`) and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Station {
    pub id: u32,
    pub name: String,
    /// Dial position, e.g. "91.3 FM"
    pub frequency: String,
    pub stream_url: String,
    #[serde(default)]
    pub logo_url: String,
    /// Accent color as a `#rrggbb` string
    #[serde(default)]
    pub color: String,
}

struct CatalogEntry {
    id: u32,
    name: &'static str,
    frequency: &'static str,
    stream_url: &'static str,
    logo_url: &'static str,
    color: &'static str,
}

const BUILTIN: &[CatalogEntry] = &[
    CatalogEntry {
        id: 1,
        name: "Radio Simba",
        frequency: "98.4 FM",
        stream_url: "http://radiosimba.com:8000/live",
        logo_url: "https://radiosimba.com/wp-content/uploads/2021/06/logo-1.png",
        color: "#e94560",
    },
    CatalogEntry {
        id: 2,
        name: "Capital FM",
        frequency: "91.3 FM",
        stream_url: "http://stream.ved Rwanda:8000/capital",
        logo_url: "https://capitalfm.co.ug/wp-content/uploads/2020/01/capital-fm-uganda-logo.png",
        color: "#0f3460",
    },
    CatalogEntry {
        id: 3,
        name: "NBS Radio",
        frequency: "92.2 FM",
        stream_url: "https://stream.nbsmedia.co.ug/nbsradio",
        logo_url: "https://nbsmedia.co.ug/wp-content/uploads/2021/06/nbs-logo.png",
        color: "#16c79a",
    },
    CatalogEntry {
        id: 4,
        name: "KFM",
        frequency: "103.8 FM",
        stream_url: "https://kfmstream.siminetworks.com/kfm",
        logo_url: "https://kfm.co.ug/wp-content/uploads/2020/03/kfm-logo.png",
        color: "#11999e",
    },
    CatalogEntry {
        id: 5,
        name: "Beat FM",
        frequency: "88.6 FM",
        stream_url: "https://stream.beat.co.ug/beat",
        logo_url: "https://beat.co.ug/wp-content/uploads/2021/02/beat-fm-uganda.png",
        color: "#f64c72",
    },
    CatalogEntry {
        id: 6,
        name: "Radio One",
        frequency: "90.0 FM",
        stream_url: "https://radioonefm.siminetworks.com/radioone",
        logo_url: "https://radioonefm.co.ug/wp-content/uploads/2020/01/radio-one-logo.png",
        color: "#fcbad3",
    },
    CatalogEntry {
        id: 7,
        name: "CBS Radio",
        frequency: "89.2 FM",
        stream_url: "https://stream.cbsmedia.co.ug/cbs",
        logo_url: "https://cbsmedia.co.ug/wp-content/uploads/2021/01/cbs-logo.png",
        color: "#00b8a9",
    },
    CatalogEntry {
        id: 8,
        name: "Sanyuka FM",
        frequency: "93.3 FM",
        stream_url: "https://sanyukafm.siminetworks.com/sanyuka",
        logo_url: "https://sanyukafm.co.ug/wp-content/uploads/2020/03/sanyuka-logo.png",
        color: "#845ec2",
    },
];

/// The built-in station list.
pub fn builtin_stations() -> Vec<Station> {
    BUILTIN
        .iter()
        .map(|e| Station {
            id: e.id,
            name: e.name.to_string(),
            frequency: e.frequency.to_string(),
            stream_url: e.stream_url.to_string(),
            logo_url: e.logo_url.to_string(),
            color: e.color.to_string(),
        })
        .collect()
}

/// Immutable, id-addressable list of stations.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    stations: Vec<Station>,
}

impl Catalog {
    pub fn new(stations: Vec<Station>) -> Self {
        Self { stations }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_stations())
    }

    pub fn get(&self, id: u32) -> Option<&Station> {
        self.stations.iter().find(|s| s.id == id)
    }

    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

// ── TOML station loader ───────────────────────────────────────────────────────

/// Matches the `[[station]]` tables of a stations file.  Kept apart from
/// `Station` so ids can be assigned by position when omitted.
#[derive(Debug, Deserialize)]
struct TomlStationFile {
    station: Vec<TomlStation>,
}

#[derive(Debug, Deserialize)]
struct TomlStation {
    #[serde(default)]
    id: Option<u32>,
    name: String,
    url: String,
    #[serde(default)]
    frequency: String,
    #[serde(default)]
    logo: String,
    #[serde(default)]
    color: String,
}

pub fn parse_stations_from_toml_str(content: &str) -> anyhow::Result<Vec<Station>> {
    let file: TomlStationFile = toml::from_str(content)?;
    let mut stations: Vec<Station> = Vec::with_capacity(file.station.len());
    for (pos, s) in file.station.into_iter().enumerate() {
        let id = s.id.unwrap_or(pos as u32 + 1);
        if stations.iter().any(|existing| existing.id == id) {
            anyhow::bail!("duplicate station id {}", id);
        }
        stations.push(Station {
            id,
            name: s.name,
            frequency: s.frequency,
            stream_url: s.url,
            logo_url: s.logo,
            color: s.color,
        });
    }
    Ok(stations)
}

pub fn load_stations_from_toml(path: &std::path::Path) -> anyhow::Result<Vec<Station>> {
    let content = std::fs::read_to_string(path)?;
    parse_stations_from_toml_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_catalog() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.len(), 8);
        let capital = catalog.get(2).unwrap();
        assert_eq!(capital.name, "Capital FM");
        assert_eq!(capital.frequency, "91.3 FM");
        assert!(catalog.get(99).is_none());
    }

    #[test]
    fn test_parse_toml_assigns_positional_ids() {
        let toml = r##"
[[station]]
name = "First"
url = "https://example.com/a"

[[station]]
id = 10
name = "Second"
url = "https://example.com/b"
frequency = "100.1 FM"
color = "#ffffff"
"##;
        let stations = parse_stations_from_toml_str(toml).unwrap();
        assert_eq!(stations.len(), 2);
        assert_eq!(stations[0].id, 1);
        assert_eq!(stations[1].id, 10);
        assert_eq!(stations[1].frequency, "100.1 FM");
        assert_eq!(stations[0].logo_url, "");
    }

    #[test]
    fn test_parse_toml_rejects_duplicate_ids() {
        let toml = r#"
[[station]]
id = 3
name = "A"
url = "https://example.com/a"

[[station]]
id = 3
name = "B"
url = "https://example.com/b"
"#;
        assert!(parse_stations_from_toml_str(toml).is_err());
    }
}
