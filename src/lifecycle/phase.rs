/// A named step of the module lifecycle
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum_macros::Display,
    strum_macros::EnumIter,
    strum_macros::AsRefStr,
)]
pub enum Phase {
    PreConfigure,
    Configure,
    PostConfigure,
    Initialize,
    PostInitialize,
    PreApplication,
    Application,
    PostApplication,
    Shutdown,
}

impl Phase {
    /// Phases every module goes through, in order
    pub const BASELINE: [Phase; 5] = [
        Phase::PreConfigure,
        Phase::Configure,
        Phase::PostConfigure,
        Phase::Initialize,
        Phase::PostInitialize,
    ];

    /// Phases run only for web-capable modules, once a router is supplied
    pub const WEB: [Phase; 3] = [
        Phase::PreApplication,
        Phase::Application,
        Phase::PostApplication,
    ];

    pub fn is_web(self) -> bool {
        Self::WEB.contains(&self)
    }

    /// Whether the service registry is still open during this phase
    pub fn accepts_registrations(self) -> bool {
        matches!(
            self,
            Phase::PreConfigure | Phase::Configure | Phase::PostConfigure
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_declaration_order_is_execution_order() {
        let all: Vec<Phase> = Phase::iter().collect();
        let mut sorted = all.clone();
        sorted.sort();
        assert_eq!(all, sorted);
        assert_eq!(&all[..5], &Phase::BASELINE);
        assert_eq!(&all[5..8], &Phase::WEB);
    }

    #[test]
    fn test_only_configure_phases_accept_registrations() {
        let open: Vec<Phase> = Phase::iter().filter(|p| p.accepts_registrations()).collect();
        assert_eq!(
            open,
            vec![Phase::PreConfigure, Phase::Configure, Phase::PostConfigure]
        );
        assert!(Phase::Application.is_web());
        assert_eq!(Phase::PostInitialize.to_string(), "PostInitialize");
    }
}
