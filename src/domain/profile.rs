use serde::{Deserialize, Serialize};

/// What the printed part is for.
///
/// Force, friction and weight support only apply to functional parts and are
/// cleared otherwise. Heat, pressure and chemical resistance are no longer
/// collected; they keep fixed `false` slots in the model input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "ProfileFlags")]
pub struct RequirementProfile {
    functional: bool,
    decorative: bool,
    force: bool,
    friction: bool,
    weight_support: bool,
    outdoor: bool,
    detail: bool,
}

/// Deserialized form; goes through [`RequirementProfile::new`] so the
/// functional-only flags are cleared the same way.
#[derive(Deserialize)]
struct ProfileFlags {
    #[serde(default)]
    functional: bool,
    #[serde(default)]
    decorative: bool,
    #[serde(default)]
    force: bool,
    #[serde(default)]
    friction: bool,
    #[serde(default)]
    weight_support: bool,
    #[serde(default)]
    outdoor: bool,
    #[serde(default)]
    detail: bool,
}

impl From<ProfileFlags> for RequirementProfile {
    fn from(f: ProfileFlags) -> Self {
        Self::new(
            f.functional,
            f.decorative,
            f.force,
            f.friction,
            f.weight_support,
            f.outdoor,
            f.detail,
        )
    }
}

impl RequirementProfile {
    pub fn new(
        functional: bool,
        decorative: bool,
        force: bool,
        friction: bool,
        weight_support: bool,
        outdoor: bool,
        detail: bool,
    ) -> Self {
        Self {
            functional,
            decorative,
            force: functional && force,
            friction: functional && friction,
            weight_support: functional && weight_support,
            outdoor,
            detail,
        }
    }

    pub fn is_functional(&self) -> bool {
        self.functional
    }

    pub fn is_decorative(&self) -> bool {
        self.decorative
    }

    pub fn is_force(&self) -> bool {
        self.force
    }

    pub fn is_friction(&self) -> bool {
        self.friction
    }

    pub fn is_weight_support(&self) -> bool {
        self.weight_support
    }

    pub fn is_outdoor(&self) -> bool {
        self.outdoor
    }

    pub fn is_detail(&self) -> bool {
        self.detail
    }

    pub fn is_heat(&self) -> bool {
        false
    }

    pub fn is_pressure(&self) -> bool {
        false
    }

    pub fn is_chemical(&self) -> bool {
        false
    }

    /// The ten requirement flags in model-input order.
    pub fn flags(&self) -> [bool; 10] {
        [
            self.functional,
            self.force,
            self.is_heat(),
            self.friction,
            self.is_pressure(),
            self.weight_support,
            self.outdoor,
            self.is_chemical(),
            self.detail,
            self.decorative,
        ]
    }
}
