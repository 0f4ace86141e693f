//! Zone selection for commands and refreshes.

/// Name the controller app uses for the aggregate of every zone.
pub const ALL_ZONES: &str = "All Zones";

/// Which zones a command or refresh targets.
///
/// [`Zones::All`], an empty list, or a list containing [`ALL_ZONES`] all mean
/// "every zone the client currently knows about".
///
/// # Examples
///
/// ```
/// use jellyfish_lighting_rs::Zones;
///
/// let known = vec!["Front".to_string(), "Back".to_string()];
/// assert_eq!(Zones::All.resolve(&known), known);
/// assert_eq!(Zones::from("Back").resolve(&known), vec!["Back".to_string()]);
/// assert_eq!(Zones::from(vec!["All Zones"]).resolve(&known), known);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Zones {
    #[default]
    All,
    Named(Vec<String>),
}

impl Zones {
    /// Expand the selection against the currently known zone list.
    ///
    /// Named zones keep their order; repeated names are sent once. Names are not
    /// checked against `known`, the controller decides what an unknown zone means.
    pub fn resolve(&self, known: &[String]) -> Vec<String> {
        match self {
            Zones::All => known.to_vec(),
            Zones::Named(names) if names.is_empty() || names.iter().any(|n| n == ALL_ZONES) => {
                known.to_vec()
            }
            Zones::Named(names) => {
                let mut resolved: Vec<String> = Vec::with_capacity(names.len());
                for name in names {
                    if !resolved.contains(name) {
                        resolved.push(name.clone());
                    }
                }
                resolved
            }
        }
    }
}

impl From<&str> for Zones {
    fn from(zone: &str) -> Self {
        Zones::Named(vec![zone.to_string()])
    }
}

impl From<String> for Zones {
    fn from(zone: String) -> Self {
        Zones::Named(vec![zone])
    }
}

impl From<Vec<String>> for Zones {
    fn from(zones: Vec<String>) -> Self {
        Zones::Named(zones)
    }
}

impl From<Vec<&str>> for Zones {
    fn from(zones: Vec<&str>) -> Self {
        Zones::Named(zones.into_iter().map(String::from).collect())
    }
}

impl From<&[String]> for Zones {
    fn from(zones: &[String]) -> Self {
        Zones::Named(zones.to_vec())
    }
}

impl<T: Into<Zones>> From<Option<T>> for Zones {
    fn from(zones: Option<T>) -> Self {
        zones.map_or(Zones::All, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known() -> Vec<String> {
        vec!["Front".to_string(), "Back".to_string(), "Garage".to_string()]
    }

    #[test]
    fn test_absent_selection_means_all_known_zones() {
        assert_eq!(Zones::from(None::<&str>).resolve(&known()), known());
        assert_eq!(Zones::Named(Vec::new()).resolve(&known()), known());
    }

    #[test]
    fn test_named_selection_is_deduplicated_in_order() {
        let zones = Zones::from(vec!["Garage", "Front", "Garage"]);
        assert_eq!(zones.resolve(&known()), vec!["Garage".to_string(), "Front".to_string()]);
    }

    #[test]
    fn test_zone_names_are_case_sensitive() {
        let zones = Zones::from("front");
        assert_eq!(zones.resolve(&known()), vec!["front".to_string()]);
    }

    #[test]
    fn test_all_with_nothing_known_is_empty() {
        assert!(Zones::All.resolve(&[]).is_empty());
    }
}
