use tasklane_shared::{Sector, SectorId};

/// Id used for the catch-all sector when none is configured.
pub const FALLBACK_GENERAL_ID: &str = "general";

pub fn general_sector(all: &[Sector]) -> Option<&Sector> {
    all.iter().find(|sector| sector.is_general())
}

/// Id of the catch-all sector: the configured one, else
/// [`FALLBACK_GENERAL_ID`].
pub fn general_id(all: &[Sector]) -> &str {
    general_sector(all).map_or(FALLBACK_GENERAL_ID, |sector| sector.id.as_str())
}

/// Next sector list for a task after toggling `sector_id`.
///
/// The general sector excludes every other one: picking it clears the
/// rest, picking anything else drops it, and removing the last specific
/// sector falls back to it.
pub fn toggle_sector(current: &[SectorId], sector_id: &str, all: &[Sector]) -> Vec<SectorId> {
    let general = general_id(all);

    if sector_id == general {
        return vec![general.to_string()];
    }

    let mut specific: Vec<SectorId> = current
        .iter()
        .filter(|id| id.as_str() != general)
        .cloned()
        .collect();

    if let Some(pos) = specific.iter().position(|id| id == sector_id) {
        specific.remove(pos);
        if specific.is_empty() {
            return vec![general.to_string()];
        }
    } else {
        specific.push(sector_id.to_string());
    }

    specific
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sectors() -> Vec<Sector> {
        vec![
            Sector::new("general", "Geral"),
            Sector::new("s", "Sales"),
            Sector::new("t", "Tech"),
        ]
    }

    fn ids(raw: &[&str]) -> Vec<SectorId> {
        raw.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn specific_sector_replaces_general() {
        let next = toggle_sector(&ids(&["general"]), "s", &sectors());
        assert_eq!(next, ids(&["s"]));
    }

    #[test]
    fn removing_last_specific_sector_reverts_to_general() {
        let next = toggle_sector(&ids(&["s"]), "s", &sectors());
        assert_eq!(next, ids(&["general"]));
    }

    #[test]
    fn choosing_general_clears_everything_else() {
        let next = toggle_sector(&ids(&["s", "t"]), "general", &sectors());
        assert_eq!(next, ids(&["general"]));
    }

    #[test]
    fn specific_sectors_accumulate_and_drop() {
        let both = toggle_sector(&ids(&["s"]), "t", &sectors());
        assert_eq!(both, ids(&["s", "t"]));

        let one = toggle_sector(&both, "s", &sectors());
        assert_eq!(one, ids(&["t"]));
    }

    #[test]
    fn general_is_idempotent() {
        let next = toggle_sector(&ids(&["general"]), "general", &sectors());
        assert_eq!(next, ids(&["general"]));
    }

    #[test]
    fn unconfigured_general_uses_fallback_id() {
        let next = toggle_sector(&ids(&["general"]), "work", &[]);
        assert_eq!(next, ids(&["work"]));

        let back = toggle_sector(&next, "work", &[]);
        assert_eq!(back, ids(&["general"]));
    }

    #[test]
    fn configured_general_id_wins_over_fallback() {
        let custom = vec![Sector::new("all", "Geral"), Sector::new("s", "Sales")];
        let next = toggle_sector(&ids(&["s"]), "s", &custom);
        assert_eq!(next, ids(&["all"]));
        assert_eq!(general_id(&custom), "all");
    }
}
