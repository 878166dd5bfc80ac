//! Physical container formats and the share of their volume that is fragrance.
//!
//! All volume math references this table directly. Bump `CATALOG_VERSION`
//! whenever an entry changes so persisted records can be told apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Version of the container table below.
pub const CATALOG_VERSION: u32 = 1;

/// A physical product format.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContainerType {
    pub id: &'static str,
    pub label: &'static str,
    pub total_volume_ml: f64,
    pub fragrance_volume_ml: f64,
}

static CONTAINERS: [ContainerType; 3] = [
    ContainerType {
        id: "small-perfume",
        label: "Perfume 10ml",
        total_volume_ml: 10.0,
        fragrance_volume_ml: 2.0,
    },
    ContainerType {
        id: "full-perfume",
        label: "Perfume 50ml",
        total_volume_ml: 50.0,
        fragrance_volume_ml: 10.0,
    },
    ContainerType {
        id: "diffuser",
        label: "Diffuser 5ml",
        total_volume_ml: 5.0,
        fragrance_volume_ml: 5.0,
    },
];

/// Key into the container table. This is what gets stored and sent over the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContainerKind {
    SmallPerfume,
    FullPerfume,
    Diffuser,
}

impl ContainerKind {
    pub const ALL: [ContainerKind; 3] = [
        ContainerKind::SmallPerfume,
        ContainerKind::FullPerfume,
        ContainerKind::Diffuser,
    ];

    /// The catalog entry for this kind.
    pub fn spec(self) -> &'static ContainerType {
        match self {
            ContainerKind::SmallPerfume => &CONTAINERS[0],
            ContainerKind::FullPerfume => &CONTAINERS[1],
            ContainerKind::Diffuser => &CONTAINERS[2],
        }
    }

    pub fn id(self) -> &'static str {
        self.spec().id
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ContainerKind::ALL
            .into_iter()
            .find(|kind| kind.id() == wanted)
            .ok_or_else(|| {
                format!(
                    "Unknown container type '{}'. Known: small-perfume, full-perfume, diffuser",
                    s
                )
            })
    }
}

/// All container entries in catalog order.
pub fn all_containers() -> &'static [ContainerType] {
    &CONTAINERS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_has_three_entries() {
        assert_eq!(all_containers().len(), 3);
        for kind in ContainerKind::ALL {
            assert!(kind.spec().fragrance_volume_ml <= kind.spec().total_volume_ml);
        }
    }

    #[test]
    fn test_full_perfume_volumes() {
        let spec = ContainerKind::FullPerfume.spec();
        assert_eq!(spec.id, "full-perfume");
        assert_eq!(spec.total_volume_ml, 50.0);
        assert_eq!(spec.fragrance_volume_ml, 10.0);
    }

    #[test]
    fn test_parse_round_trips_ids() {
        for kind in ContainerKind::ALL {
            assert_eq!(kind.id().parse::<ContainerKind>().unwrap(), kind);
        }
        assert_eq!(" Diffuser ".parse::<ContainerKind>().unwrap(), ContainerKind::Diffuser);
        assert!("jumbo".parse::<ContainerKind>().is_err());
    }

    #[test]
    fn test_serde_uses_catalog_ids() {
        let json = serde_json::to_string(&ContainerKind::SmallPerfume).unwrap();
        assert_eq!(json, r#""small-perfume""#);
        let kind: ContainerKind = serde_json::from_str(r#""full-perfume""#).unwrap();
        assert_eq!(kind, ContainerKind::FullPerfume);
    }
}
